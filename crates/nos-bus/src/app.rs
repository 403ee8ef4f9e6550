//! # Application Bus
//!
//! The engine instance serving applications above the gateway.

use nos_types::{AppEvent, Flow, Host, PktIn, PktOut, Port, Switch};

/// Event engine of the application class.
pub type AppEngine = crate::engine::EventEngine<AppEvent>;

event_api! {
    AppEvent;
    raise {
        // upstream
        dp_receive_packet => DpReceivePacket(PktIn);
        dp_flow_expired => DpFlowExpired(Flow);
        dp_flow_deleted => DpFlowDeleted(Flow);
        dp_port_added => DpPortAdded(Port);
        dp_port_modified => DpPortModified(Port);
        dp_port_deleted => DpPortDeleted(Port);
        // downstream
        dp_send_packet => DpSendPacket(PktOut);
        dp_insert_flow => DpInsertFlow(Flow);
        dp_modify_flow => DpModifyFlow(Flow);
        dp_delete_flow => DpDeleteFlow(Flow);
        // internal notifications
        sw_connected => SwConnected(Switch);
        sw_disconnected => SwDisconnected(Switch);
        host_added => HostAdded(Host);
        host_deleted => HostDeleted(Host);
        link_added => LinkAdded(Port);
        link_deleted => LinkDeleted(Port);
        flow_added => FlowAdded(Flow);
        flow_modified => FlowModified(Flow);
        flow_deleted => FlowDeleted(Flow);
        // log
        log_debug => LogDebug(String);
        log_info => LogInfo(String);
        log_warn => LogWarn(String);
        log_error => LogError(String);
        log_fatal => LogFatal(String);
    }
    query {
        sw_get_info => SwGetInfo(Switch);
        sw_get_all_info => SwGetAllInfo(Switch);
        host_get_info => HostGetInfo(Host);
        host_get_all_info => HostGetAllInfo(Host);
        link_get_info => LinkGetInfo(Port);
        link_get_all_info => LinkGetAllInfo(Port);
        flow_get_info => FlowGetInfo(Flow);
        flow_get_all_info => FlowGetAllInfo(Flow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::envelope::{EventHandler, EventView};
    use nos_types::{component_id, EventPayload, Permission, Status, SubscriberConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Firewall(AtomicUsize);

    impl EventHandler<AppEvent> for Firewall {
        fn handle(&self, view: EventView<'_, AppEvent>) -> i32 {
            self.0.fetch_add(1, Ordering::SeqCst);
            match view.payload() {
                EventPayload::PktIn(p) if p.dst_port == 23 => -1,
                _ => 0,
            }
        }
    }

    #[test]
    fn test_app_veto_on_packet_in() {
        let engine = AppEngine::new(EngineConfig::local_only());
        let fw = Arc::new(Firewall::default());
        let learner = Arc::new(Firewall::default());
        engine.register_handler("firewall", fw.clone());
        engine.register_handler("l2", learner.clone());
        engine
            .reload(&[
                SubscriberConfig::new("firewall")
                    .with_status(Status::Enabled)
                    .with_priority(10)
                    .with_perm(Permission::ALL)
                    .inbound("DP_RECEIVE_PACKET")
                    .outbound("DP_RECEIVE_PACKET"),
                SubscriberConfig::new("l2")
                    .with_status(Status::Enabled)
                    .inbound("DP_RECEIVE_PACKET"),
            ])
            .unwrap();
        engine.start_all();

        let telnet = PktIn {
            dst_port: 23,
            ..PktIn::default()
        };
        let ret = engine.dp_receive_packet(component_id("firewall"), telnet).unwrap();
        assert_eq!(ret, -1);
        assert_eq!(learner.0.load(Ordering::SeqCst), 0);

        let web = PktIn {
            dst_port: 80,
            ..PktIn::default()
        };
        engine.dp_receive_packet(component_id("firewall"), web).unwrap();
        assert_eq!(learner.0.load(Ordering::SeqCst), 1);
        assert_eq!(fw.0.load(Ordering::SeqCst), 2);
    }
}
