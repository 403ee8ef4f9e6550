//! # Infrastructure Bus
//!
//! The engine instance serving internal components, with one named entry
//! point per event type.

use nos_types::{Flow, Host, InfraEvent, PktIn, PktOut, Port, RawMsg, Resource, Switch, Traffic};

/// Event engine of the infrastructure class.
pub type InfraEngine = crate::engine::EventEngine<InfraEvent>;

event_api! {
    InfraEvent;
    raise {
        // upstream
        ofp_msg_in => OfpMsgIn(RawMsg);
        dp_receive_packet => DpReceivePacket(PktIn);
        dp_flow_expired => DpFlowExpired(Flow);
        dp_flow_deleted => DpFlowDeleted(Flow);
        dp_flow_stats => DpFlowStats(Flow);
        dp_aggregate_stats => DpAggregateStats(Flow);
        dp_port_added => DpPortAdded(Port);
        dp_port_modified => DpPortModified(Port);
        dp_port_deleted => DpPortDeleted(Port);
        dp_port_stats => DpPortStats(Port);
        // downstream
        ofp_msg_out => OfpMsgOut(RawMsg);
        dp_send_packet => DpSendPacket(PktOut);
        dp_insert_flow => DpInsertFlow(Flow);
        dp_modify_flow => DpModifyFlow(Flow);
        dp_delete_flow => DpDeleteFlow(Flow);
        dp_request_flow_stats => DpRequestFlowStats(Flow);
        dp_request_aggregate_stats => DpRequestAggregateStats(Flow);
        dp_request_port_stats => DpRequestPortStats(Port);
        // internal notifications
        sw_new_conn => SwNewConn(Switch);
        sw_expired_conn => SwExpiredConn(Switch);
        sw_connected => SwConnected(Switch);
        sw_disconnected => SwDisconnected(Switch);
        sw_update_config => SwUpdateConfig(Switch);
        sw_update_desc => SwUpdateDesc(Switch);
        host_added => HostAdded(Host);
        host_deleted => HostDeleted(Host);
        link_added => LinkAdded(Port);
        link_deleted => LinkDeleted(Port);
        flow_added => FlowAdded(Flow);
        flow_modified => FlowModified(Flow);
        flow_deleted => FlowDeleted(Flow);
        rs_update_usage => RsUpdateUsage(Resource);
        tr_update_stats => TrUpdateStats(Traffic);
        log_update_msgs => LogUpdateMsgs(String);
        // log
        log_debug => LogDebug(String);
        log_info => LogInfo(String);
        log_warn => LogWarn(String);
        log_error => LogError(String);
        log_fatal => LogFatal(String);
    }
    query {
        sw_get_dpid => SwGetDpid(Switch);
        sw_get_fd => SwGetFd(Switch);
        sw_get_xid => SwGetXid(Switch);
    }
}
