//! # Remote Subscribers over Loopback TCP
//!
//! A real engine with bound pull/reply endpoints, and remote peers played by
//! plain sockets in the test.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Accept one connection within `timeout`.
pub fn accept_within(listener: &TcpListener, timeout: Duration) -> Option<TcpStream> {
    listener.set_nonblocking(true).ok()?;
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).ok()?;
                stream.set_read_timeout(Some(timeout)).ok()?;
                return Some(stream);
            }
            Err(_) => std::thread::sleep(Duration::from_millis(10)),
        }
    }
    None
}

/// Read one record from a freshly accepted connection.
pub fn read_one(stream: TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream);
    nos_bus::transport::read_record(&mut reader).ok().flatten()
}

/// Poll `check` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Tracer, Quiet, Trace};
    use nos_bus::codec::{decode_event, decode_reply, encode_event, encode_reply, Handshake};
    use nos_bus::transport::{handshake, read_record, write_record};
    use nos_bus::{EngineConfig, EventRecord, InfraEngine};
    use nos_types::{
        component_id, EventPayload, Host, InfraEvent, PayloadKind, Permission, Status,
        SubscriberConfig, Switch,
    };
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    const WAIT: Duration = Duration::from_secs(2);

    struct Bus {
        engine: Arc<InfraEngine>,
        trace: Trace,
        peer: TcpListener,
        pull: String,
        reply: String,
    }

    impl Drop for Bus {
        fn drop(&mut self) {
            self.engine.shutdown();
        }
    }

    /// `topo` is remote and listens on `peer`; `host_mgmt` and `conn` are local.
    fn bus() -> Bus {
        let peer = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer.local_addr().unwrap().to_string();

        let config = EngineConfig {
            pull_addr: Some("127.0.0.1:0".to_string()),
            reply_addr: Some("127.0.0.1:0".to_string()),
            recv_timeout: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(500),
            ..EngineConfig::local_only()
        };
        let engine = Arc::new(InfraEngine::new(config));
        let trace = Trace::default();
        engine.register_handler("host_mgmt", Arc::new(Tracer::new("host_mgmt", &trace)));
        engine.register_handler("switch_mgmt", Arc::new(Quiet));
        engine.register_handler(
            "conn",
            Arc::new(Tracer::new("conn", &trace).editing(|p| {
                if let EventPayload::Switch(sw) = p {
                    sw.dpid = u64::from(sw.fd) * 100;
                }
            })),
        );
        engine
            .reload(&[
                SubscriberConfig::new("topo")
                    .with_status(Status::Enabled)
                    .remote(peer_addr, "127.0.0.1:1")
                    .inbound("SW_CONNECTED")
                    .outbound("HOST_ADDED")
                    .outbound("SW_GET_DPID"),
                SubscriberConfig::new("host_mgmt")
                    .with_status(Status::Enabled)
                    .inbound("HOST_ADDED"),
                SubscriberConfig::new("conn")
                    .with_status(Status::Enabled)
                    .inbound("SW_GET_DPID"),
                SubscriberConfig::new("switch_mgmt")
                    .with_status(Status::Enabled)
                    .outbound("SW_CONNECTED"),
            ])
            .unwrap();
        engine.start_all();
        engine.start().unwrap();

        let bound = engine.bound_endpoints();
        Bus {
            pull: bound.pull.unwrap().to_string(),
            reply: bound.reply.unwrap().to_string(),
            engine,
            trace,
            peer,
        }
    }

    fn topo_active(engine: &InfraEngine) -> bool {
        engine.show("topo").unwrap().summary.activated
    }

    #[test]
    fn test_handshake_over_tcp() {
        let bus = bus();
        let refused = handshake(&bus.reply, component_id("topo"), "x", WAIT).unwrap();
        assert_eq!(refused, -1);
        assert!(!topo_active(&bus.engine));

        let accepted = handshake(&bus.reply, component_id("topo"), "topo", WAIT).unwrap();
        assert_eq!(accepted, 0);
        assert!(topo_active(&bus.engine));

        // Repeating the handshake re-confirms activation.
        assert_eq!(handshake(&bus.reply, component_id("topo"), "topo", WAIT).unwrap(), 0);
        assert!(topo_active(&bus.engine));
    }

    #[test]
    fn test_notification_is_pushed_to_remote() {
        let bus = bus();
        assert_eq!(handshake(&bus.reply, component_id("topo"), "topo", WAIT).unwrap(), 0);

        let sw = Switch {
            dpid: 0x2a,
            ..Switch::default()
        };
        let ret = bus.engine.sw_connected(component_id("switch_mgmt"), sw).unwrap();
        assert_eq!(ret, 0);

        let stream = accept_within(&bus.peer, WAIT).expect("engine never connected");
        let line = read_one(stream).expect("no record pushed");
        let record: EventRecord<InfraEvent> = decode_event(&line).unwrap();
        assert_eq!(record.publisher, component_id("switch_mgmt"));
        assert_eq!(record.event, InfraEvent::SwConnected);
        match record.payload {
            EventPayload::Switch(sw) => assert_eq!(sw.dpid, 0x2a),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_inactive_remote_gets_nothing() {
        let bus = bus();
        bus.engine
            .sw_connected(component_id("switch_mgmt"), Switch::default())
            .unwrap();
        assert!(accept_within(&bus.peer, Duration::from_millis(300)).is_none());
    }

    #[test]
    fn test_pull_channel_raises_for_remote_publisher() {
        let bus = bus();
        let host = Host {
            dpid: 3,
            port: 4,
            ..Host::default()
        };
        let record = encode_event(
            component_id("topo"),
            InfraEvent::HostAdded,
            &EventPayload::Host(host),
        )
        .unwrap();

        let mut stream = TcpStream::connect(&bus.pull).unwrap();
        write_record(&mut stream, &record).unwrap();
        // An unauthorized record on the same connection is dropped.
        let forged = encode_event(
            component_id("intruder"),
            InfraEvent::HostAdded,
            &EventPayload::Host(Host::default()),
        )
        .unwrap();
        write_record(&mut stream, &forged).unwrap();

        assert!(eventually(WAIT, || bus.trace.names() == vec!["host_mgmt"]));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(bus.trace.names(), vec!["host_mgmt"]);
        assert_eq!(bus.engine.event_count(InfraEvent::HostAdded), 1);
    }

    #[test]
    fn test_reply_channel_answers_queries() {
        let bus = bus();
        let request = encode_event(
            component_id("topo"),
            InfraEvent::SwGetDpid,
            &EventPayload::Switch(Switch {
                fd: 7,
                ..Switch::default()
            }),
        )
        .unwrap();

        let mut stream = TcpStream::connect(&bus.reply).unwrap();
        stream.set_read_timeout(Some(WAIT)).unwrap();
        write_record(&mut stream, &request).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let line = read_record(&mut reader).unwrap().unwrap();

        let (ret, payload) = decode_reply(PayloadKind::Switch, &line).unwrap();
        assert_eq!(ret, 0);
        match payload {
            EventPayload::Switch(sw) => assert_eq!(sw.dpid, 700),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_unreachable_remote_is_deactivated() {
        let bus = bus();
        // Rebuild the registry with a push address nobody listens on.
        let gone = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().to_string()
        };
        bus.engine
            .reload(&[
                SubscriberConfig::new("topo")
                    .with_status(Status::Enabled)
                    .remote(gone, "127.0.0.1:1")
                    .inbound("SW_CONNECTED"),
                SubscriberConfig::new("switch_mgmt")
                    .with_status(Status::Enabled)
                    .outbound("SW_CONNECTED"),
            ])
            .unwrap();
        assert_eq!(handshake(&bus.reply, component_id("topo"), "topo", WAIT).unwrap(), 0);
        assert!(topo_active(&bus.engine));

        let ret = bus
            .engine
            .sw_connected(component_id("switch_mgmt"), Switch::default())
            .unwrap();
        assert_eq!(ret, 0);
        assert!(!topo_active(&bus.engine));
    }

    // =========================================================================
    // Round trips on the notify path
    // =========================================================================

    /// Serve one connection on `listener`, answering every record with
    /// `answer(record)`.
    fn answering_peer(
        listener: TcpListener,
        answer: impl Fn(EventRecord<InfraEvent>) -> String + Send + 'static,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let Some(stream) = accept_within(&listener, WAIT) else {
                return;
            };
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            while let Ok(Some(line)) = read_record(&mut reader) {
                let record = decode_event::<InfraEvent>(&line).unwrap();
                if write_record(&mut writer, &answer(record)).is_err() {
                    break;
                }
            }
        })
    }

    /// Reply with the received host moved to port 99 and `ret`.
    fn moved_to_port_99(ret: i32) -> impl Fn(EventRecord<InfraEvent>) -> String {
        move |record| {
            let mut payload = record.payload;
            if let EventPayload::Host(host) = &mut payload {
                host.port = 99;
            }
            encode_reply(record.publisher, record.event, Some(&payload), ret).unwrap()
        }
    }

    /// Remote `fw` (request address `req`, permission `perm`) ahead of a
    /// local `host_mgmt`; `topo` publishes HOST_ADDED.
    fn firewall_bus(req: String, perm: Permission, grace: Duration) -> (Arc<InfraEngine>, Trace) {
        let engine = Arc::new(InfraEngine::new(EngineConfig {
            shutdown_grace: grace,
            ..EngineConfig::local_only()
        }));
        let trace = Trace::default();
        engine.register_handler("host_mgmt", Arc::new(Tracer::new("host_mgmt", &trace)));
        engine.register_handler("topo", Arc::new(Quiet));
        engine
            .reload(&[
                SubscriberConfig::new("fw")
                    .with_status(Status::Enabled)
                    .with_priority(10)
                    .with_perm(perm)
                    .remote("127.0.0.1:1", req)
                    .inbound("HOST_ADDED"),
                SubscriberConfig::new("host_mgmt")
                    .with_status(Status::Enabled)
                    .inbound("HOST_ADDED"),
                SubscriberConfig::new("topo")
                    .with_status(Status::Enabled)
                    .outbound("HOST_ADDED"),
            ])
            .unwrap();
        engine.start_all();
        engine.handshake(&fw_handshake()).unwrap();
        (engine, trace)
    }

    fn fw_handshake() -> Handshake {
        Handshake {
            id: component_id("fw"),
            name: "fw".into(),
        }
    }

    fn raise_host(engine: &InfraEngine) -> i32 {
        engine
            .host_added(component_id("topo"), Host::default())
            .unwrap()
    }

    fn fw_delivered(engine: &InfraEngine) -> u64 {
        engine.show("fw").unwrap().inbounds[0].delivered
    }

    fn fw_active(engine: &InfraEngine) -> bool {
        engine.show("fw").unwrap().summary.activated
    }

    fn host_mgmt_port(trace: &Trace) -> Vec<u32> {
        trace
            .seen()
            .iter()
            .filter_map(|s| match &s.payload {
                EventPayload::Host(h) => Some(h.port),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_remote_write_is_copied_back() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let req = listener.local_addr().unwrap().to_string();
        let peer = answering_peer(listener, moved_to_port_99(0));

        let (engine, trace) = firewall_bus(req, Permission::READ | Permission::WRITE, WAIT);
        assert_eq!(raise_host(&engine), 0);
        assert_eq!(host_mgmt_port(&trace), vec![99]);
        assert!(fw_active(&engine));

        engine.shutdown();
        peer.join().unwrap();
    }

    #[test]
    fn test_remote_execute_veto_stops_chain() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let req = listener.local_addr().unwrap().to_string();
        let peer = answering_peer(listener, |record| {
            encode_reply(record.publisher, record.event, Some(&record.payload), 1).unwrap()
        });

        let (engine, trace) = firewall_bus(req, Permission::READ | Permission::EXECUTE, WAIT);
        assert_eq!(raise_host(&engine), 1);
        assert!(trace.names().is_empty());

        engine.shutdown();
        peer.join().unwrap();
    }

    #[test]
    fn test_remote_execute_only_reply_is_not_copied() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let req = listener.local_addr().unwrap().to_string();
        let peer = answering_peer(listener, moved_to_port_99(0));

        let (engine, trace) = firewall_bus(req, Permission::READ | Permission::EXECUTE, WAIT);
        assert_eq!(raise_host(&engine), 0);
        assert_eq!(host_mgmt_port(&trace), vec![0]);

        engine.shutdown();
        peer.join().unwrap();
    }

    /// Run `f` on its own thread; `None` if it is still running after
    /// `timeout`.
    fn finishes_within<T: Send + 'static>(
        timeout: Duration,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> Option<T> {
        let handle = thread::spawn(f);
        if eventually(timeout, || handle.is_finished()) {
            handle.join().ok()
        } else {
            None
        }
    }

    #[test]
    fn test_silent_peer_blocks_neither_handshake_nor_shutdown() {
        let silent = TcpListener::bind("127.0.0.1:0").unwrap();
        let req = silent.local_addr().unwrap().to_string();
        // Accepts request channels and never answers.
        thread::spawn(move || {
            let held: Vec<TcpStream> = (0..2)
                .filter_map(|_| accept_within(&silent, Duration::from_secs(5)))
                .collect();
            thread::sleep(Duration::from_secs(10));
            drop(held);
        });

        let grace = Duration::from_millis(200);
        let (engine, trace) = firewall_bus(req, Permission::ALL, grace);

        let stuck = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || raise_host(&engine))
        };
        assert!(eventually(WAIT, || fw_delivered(&engine) == 1));
        thread::sleep(Duration::from_millis(100));
        assert!(!stuck.is_finished());

        // The peer reconnects while the old call is still waiting.
        let repeat = {
            let engine = Arc::clone(&engine);
            finishes_within(WAIT, move || engine.handshake(&fw_handshake()))
        };
        assert!(matches!(repeat, Some(Ok(()))));
        assert!(eventually(WAIT, || stuck.is_finished()));
        // The aborted call is not a veto; host_mgmt still gets the event.
        assert_eq!(stuck.join().unwrap(), 0);
        assert_eq!(trace.names(), vec!["host_mgmt"]);
        assert!(fw_active(&engine));

        let stuck = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || raise_host(&engine))
        };
        assert!(eventually(WAIT, || fw_delivered(&engine) == 2));
        thread::sleep(Duration::from_millis(100));

        let stopped = {
            let engine = Arc::clone(&engine);
            finishes_within(WAIT, move || engine.shutdown())
        };
        assert!(stopped.is_some());
        assert!(eventually(WAIT, || stuck.is_finished()));
        assert!(!fw_active(&engine));
    }
}
