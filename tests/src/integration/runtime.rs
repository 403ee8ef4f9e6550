//! # Full Runtime
//!
//! Both buses joined by the gateway, with a remote application on loopback
//! TCP.

#[cfg(test)]
mod tests {
    use crate::fixtures::{Tracer, Quiet, Trace};
    use crate::integration::remote::{accept_within, eventually, read_one};
    use nos_bus::codec::{decode_event, encode_event};
    use nos_bus::gateway::{APPHDLR, APPINT};
    use nos_bus::transport::{handshake, write_record};
    use nos_bus::{EngineConfig, EventHandler, EventRecord};
    use nos_runtime::{NosRuntime, RegistryFile, RuntimeConfig};
    use nos_types::{
        component_id, AppEvent, EventPayload, Flow, InfraEvent, PktIn, Status, SubscriberConfig,
    };
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn loopback() -> EngineConfig {
        EngineConfig {
            pull_addr: Some("127.0.0.1:0".to_string()),
            reply_addr: Some("127.0.0.1:0".to_string()),
            recv_timeout: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(500),
            meta_tick: Duration::from_millis(50),
            triggers: vec!["DP_RECEIVE_PACKET>=1".parse().unwrap()],
            ..EngineConfig::local_only()
        }
    }

    struct Controller {
        runtime: NosRuntime,
        trace: Trace,
        app_peer: TcpListener,
    }

    impl Drop for Controller {
        fn drop(&mut self) {
            self.runtime.shutdown();
        }
    }

    fn controller() -> Controller {
        let app_peer = TcpListener::bind("127.0.0.1:0").unwrap();
        let file = RegistryFile {
            components: vec![
                SubscriberConfig::new("flow_mgmt")
                    .with_status(Status::Enabled)
                    .inbound("DP_INSERT_FLOW"),
                SubscriberConfig::new("ofp")
                    .with_status(Status::Enabled)
                    .outbound("DP_RECEIVE_PACKET"),
            ],
            applications: vec![SubscriberConfig::new("fw")
                .with_status(Status::Enabled)
                .remote(app_peer.local_addr().unwrap().to_string(), "127.0.0.1:1")
                .inbound("DP_RECEIVE_PACKET")
                .outbound("DP_INSERT_FLOW")
                .outbound("LOG_INFO")],
        };

        let trace = Trace::default();
        let tracer: Arc<dyn EventHandler<InfraEvent>> = Arc::new(Tracer::new("flow_mgmt", &trace));
        let quiet: Arc<dyn EventHandler<InfraEvent>> = Arc::new(Quiet);
        let components = vec![("flow_mgmt".to_string(), tracer), ("ofp".to_string(), quiet)];
        let config = RuntimeConfig {
            infra: loopback(),
            app: loopback(),
            ..RuntimeConfig::default()
        };
        let runtime = NosRuntime::with_registry(config, file, components, Vec::new()).unwrap();
        runtime.start().unwrap();
        Controller {
            runtime,
            trace,
            app_peer,
        }
    }

    fn app_addrs(c: &Controller) -> (String, String) {
        let bound = c.runtime.app().bound_endpoints();
        (bound.pull.unwrap().to_string(), bound.reply.unwrap().to_string())
    }

    #[test]
    fn test_packet_in_reaches_remote_application() {
        let c = controller();
        let (_, reply) = app_addrs(&c);
        assert_eq!(handshake(&reply, component_id("fw"), "fw", WAIT).unwrap(), 0);

        let pkt = PktIn {
            dpid: 9,
            ..PktIn::default()
        };
        let ret = c.runtime.infra().dp_receive_packet(component_id("ofp"), pkt).unwrap();
        assert_eq!(ret, 0);

        let stream = accept_within(&c.app_peer, WAIT).expect("application never contacted");
        let line = read_one(stream).expect("no record pushed");
        let record: EventRecord<AppEvent> = decode_event(&line).unwrap();
        assert_eq!(record.publisher, component_id(APPINT));
        assert_eq!(record.event, AppEvent::DpReceivePacket);
        assert!(matches!(record.payload, EventPayload::PktIn(p) if p.dpid == 9));
    }

    #[test]
    fn test_application_flow_reaches_component() {
        let c = controller();
        let (pull, _) = app_addrs(&c);
        let flow = Flow {
            dpid: 9,
            ..Flow::default()
        };
        let record = encode_event(component_id("fw"), AppEvent::DpInsertFlow, &EventPayload::Flow(flow))
            .unwrap();
        let mut stream = TcpStream::connect(&pull).unwrap();
        write_record(&mut stream, &record).unwrap();

        assert!(eventually(WAIT, || c.trace.names() == vec!["flow_mgmt"]));
        let seen = c.trace.seen();
        assert_eq!(seen[0].publisher, component_id(APPHDLR));
        assert!(matches!(&seen[0].payload, EventPayload::Flow(f) if f.dpid == 9));
    }

    #[test]
    fn test_application_log_reaches_log_sink() {
        let c = controller();
        let (pull, _) = app_addrs(&c);
        let record = encode_event(
            component_id("fw"),
            AppEvent::LogInfo,
            &EventPayload::Log("rule installed".to_string()),
        )
        .unwrap();
        let mut stream = TcpStream::connect(&pull).unwrap();
        write_record(&mut stream, &record).unwrap();

        assert!(eventually(WAIT, || c.runtime.log_sink().written() == 1));
    }

    #[test]
    fn test_meta_trigger_raises_alert() {
        let c = controller();
        c.runtime
            .infra()
            .dp_receive_packet(component_id("ofp"), PktIn::default())
            .unwrap();
        assert!(eventually(WAIT, || c
            .runtime
            .alerts()
            .recent()
            .iter()
            .any(|a| a.event.contains("DP_RECEIVE_PACKET"))));
    }
}
