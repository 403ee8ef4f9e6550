//! # Event Identifiers
//!
//! Both event classes number their types as small integers split into
//! contiguous categories by sentinel values:
//!
//! ```text
//! NONE | upstream.. | ALL_UPSTREAM | downstream.. | ALL_DOWNSTREAM |
//!      request-response.. | WRT_INTSTREAM | notify.. | ALL_INTSTREAM |
//!      log.. | NUM_EVENTS
//! ```
//!
//! The numeric layout is kept for the wire. In memory every variant carries
//! its [`EventCategory`] as an explicit tag, and the tag is checked against
//! the numeric ranges in the tests below.

use crate::entities::PayloadKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Which engine instance an event type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventClass {
    /// Events among internal components.
    Infrastructure,
    /// Events among applications above the gateway.
    Application,
}

impl EventClass {
    /// Short tag used as a log prefix.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            EventClass::Infrastructure => "infra",
            EventClass::Application => "app",
        }
    }
}

/// Category of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Datapath to controller.
    Upstream,
    /// Controller to datapath.
    Downstream,
    /// Synchronous queries answered through the mutable view.
    RequestResponse,
    /// Internal notifications.
    Notify,
    /// Log messages.
    Log,
}

impl EventCategory {
    /// Resolve a category wildcard name (`ALL_UPSTREAM`, ...).
    #[must_use]
    pub fn from_wildcard(name: &str) -> Option<Self> {
        match strip_prefix(name) {
            "ALL_UPSTREAM" => Some(EventCategory::Upstream),
            "ALL_DOWNSTREAM" => Some(EventCategory::Downstream),
            "WRT_INTSTREAM" => Some(EventCategory::RequestResponse),
            "ALL_INTSTREAM" => Some(EventCategory::Notify),
            _ => None,
        }
    }

    /// Whether Notify Dispatch serves this category.
    #[must_use]
    pub fn is_notify_dispatched(self) -> bool {
        !matches!(self, EventCategory::RequestResponse)
    }
}

/// Sentinel values partitioning an event id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryBounds {
    pub all_upstream: u16,
    pub all_downstream: u16,
    pub wrt_intstream: u16,
    pub all_intstream: u16,
    pub num_events: u16,
}

impl CategoryBounds {
    /// Category implied by the numeric position of `id`.
    ///
    /// Returns `None` for `NONE`, the sentinels themselves and anything at
    /// or beyond `num_events`.
    #[must_use]
    pub fn category_of(&self, id: u16) -> Option<EventCategory> {
        if id == 0 || id >= self.num_events {
            None
        } else if id < self.all_upstream {
            Some(EventCategory::Upstream)
        } else if id == self.all_upstream {
            None
        } else if id < self.all_downstream {
            Some(EventCategory::Downstream)
        } else if id == self.all_downstream {
            None
        } else if id < self.wrt_intstream {
            Some(EventCategory::RequestResponse)
        } else if id == self.wrt_intstream {
            None
        } else if id < self.all_intstream {
            Some(EventCategory::Notify)
        } else if id == self.all_intstream {
            None
        } else {
            Some(EventCategory::Log)
        }
    }
}

/// Common interface of the two event-type enumerations.
///
/// The engine is generic over this trait, so the same dispatch code serves
/// both event classes.
pub trait EventKind:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The event class this enumeration belongs to.
    const CLASS: EventClass;
    /// Sentinel layout of the id space.
    const BOUNDS: CategoryBounds;
    /// Every real event type, in id order.
    const ALL: &'static [Self];

    /// Wire id.
    fn id(self) -> u16;

    /// Canonical upper-case name without class prefix.
    fn name(self) -> &'static str;

    /// Category tag.
    fn category(self) -> EventCategory;

    /// Payload kind carried by this event type.
    fn payload_kind(self) -> PayloadKind;

    /// Look up an event type by wire id.
    fn from_id(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.id() == id)
    }

    /// Look up an event type by name, with or without the `EV_`/`AV_` prefix.
    fn from_name(name: &str) -> Option<Self> {
        let name = strip_prefix(name);
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }

    /// All event types of one category, in id order.
    fn in_category(category: EventCategory) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|e| e.category() == category)
            .collect()
    }

    /// Size of per-type tables indexed by wire id.
    fn slots() -> usize {
        Self::BOUNDS.num_events as usize
    }
}

fn strip_prefix(name: &str) -> &str {
    name.strip_prefix("EV_")
        .or_else(|| name.strip_prefix("AV_"))
        .unwrap_or(name)
}

// =============================================================================
// Infrastructure events
// =============================================================================

/// Event types of the infrastructure bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum InfraEvent {
    // upstream
    OfpMsgIn = 1,
    DpReceivePacket = 2,
    DpFlowExpired = 3,
    DpFlowDeleted = 4,
    DpFlowStats = 5,
    DpAggregateStats = 6,
    DpPortAdded = 7,
    DpPortModified = 8,
    DpPortDeleted = 9,
    DpPortStats = 10,
    // downstream
    OfpMsgOut = 12,
    DpSendPacket = 13,
    DpInsertFlow = 14,
    DpModifyFlow = 15,
    DpDeleteFlow = 16,
    DpRequestFlowStats = 17,
    DpRequestAggregateStats = 18,
    DpRequestPortStats = 19,
    // request-response
    SwGetDpid = 21,
    SwGetFd = 22,
    SwGetXid = 23,
    // notification
    SwNewConn = 25,
    SwExpiredConn = 26,
    SwConnected = 27,
    SwDisconnected = 28,
    SwUpdateConfig = 29,
    SwUpdateDesc = 30,
    HostAdded = 31,
    HostDeleted = 32,
    LinkAdded = 33,
    LinkDeleted = 34,
    FlowAdded = 35,
    FlowModified = 36,
    FlowDeleted = 37,
    RsUpdateUsage = 38,
    TrUpdateStats = 39,
    LogUpdateMsgs = 40,
    // log
    LogDebug = 42,
    LogInfo = 43,
    LogWarn = 44,
    LogError = 45,
    LogFatal = 46,
}

impl EventKind for InfraEvent {
    const CLASS: EventClass = EventClass::Infrastructure;
    const BOUNDS: CategoryBounds = CategoryBounds {
        all_upstream: 11,
        all_downstream: 20,
        wrt_intstream: 24,
        all_intstream: 41,
        num_events: 47,
    };
    const ALL: &'static [Self] = &[
        InfraEvent::OfpMsgIn,
        InfraEvent::DpReceivePacket,
        InfraEvent::DpFlowExpired,
        InfraEvent::DpFlowDeleted,
        InfraEvent::DpFlowStats,
        InfraEvent::DpAggregateStats,
        InfraEvent::DpPortAdded,
        InfraEvent::DpPortModified,
        InfraEvent::DpPortDeleted,
        InfraEvent::DpPortStats,
        InfraEvent::OfpMsgOut,
        InfraEvent::DpSendPacket,
        InfraEvent::DpInsertFlow,
        InfraEvent::DpModifyFlow,
        InfraEvent::DpDeleteFlow,
        InfraEvent::DpRequestFlowStats,
        InfraEvent::DpRequestAggregateStats,
        InfraEvent::DpRequestPortStats,
        InfraEvent::SwGetDpid,
        InfraEvent::SwGetFd,
        InfraEvent::SwGetXid,
        InfraEvent::SwNewConn,
        InfraEvent::SwExpiredConn,
        InfraEvent::SwConnected,
        InfraEvent::SwDisconnected,
        InfraEvent::SwUpdateConfig,
        InfraEvent::SwUpdateDesc,
        InfraEvent::HostAdded,
        InfraEvent::HostDeleted,
        InfraEvent::LinkAdded,
        InfraEvent::LinkDeleted,
        InfraEvent::FlowAdded,
        InfraEvent::FlowModified,
        InfraEvent::FlowDeleted,
        InfraEvent::RsUpdateUsage,
        InfraEvent::TrUpdateStats,
        InfraEvent::LogUpdateMsgs,
        InfraEvent::LogDebug,
        InfraEvent::LogInfo,
        InfraEvent::LogWarn,
        InfraEvent::LogError,
        InfraEvent::LogFatal,
    ];

    fn id(self) -> u16 {
        self as u16
    }

    fn name(self) -> &'static str {
        match self {
            InfraEvent::OfpMsgIn => "OFP_MSG_IN",
            InfraEvent::DpReceivePacket => "DP_RECEIVE_PACKET",
            InfraEvent::DpFlowExpired => "DP_FLOW_EXPIRED",
            InfraEvent::DpFlowDeleted => "DP_FLOW_DELETED",
            InfraEvent::DpFlowStats => "DP_FLOW_STATS",
            InfraEvent::DpAggregateStats => "DP_AGGREGATE_STATS",
            InfraEvent::DpPortAdded => "DP_PORT_ADDED",
            InfraEvent::DpPortModified => "DP_PORT_MODIFIED",
            InfraEvent::DpPortDeleted => "DP_PORT_DELETED",
            InfraEvent::DpPortStats => "DP_PORT_STATS",
            InfraEvent::OfpMsgOut => "OFP_MSG_OUT",
            InfraEvent::DpSendPacket => "DP_SEND_PACKET",
            InfraEvent::DpInsertFlow => "DP_INSERT_FLOW",
            InfraEvent::DpModifyFlow => "DP_MODIFY_FLOW",
            InfraEvent::DpDeleteFlow => "DP_DELETE_FLOW",
            InfraEvent::DpRequestFlowStats => "DP_REQUEST_FLOW_STATS",
            InfraEvent::DpRequestAggregateStats => "DP_REQUEST_AGGREGATE_STATS",
            InfraEvent::DpRequestPortStats => "DP_REQUEST_PORT_STATS",
            InfraEvent::SwGetDpid => "SW_GET_DPID",
            InfraEvent::SwGetFd => "SW_GET_FD",
            InfraEvent::SwGetXid => "SW_GET_XID",
            InfraEvent::SwNewConn => "SW_NEW_CONN",
            InfraEvent::SwExpiredConn => "SW_EXPIRED_CONN",
            InfraEvent::SwConnected => "SW_CONNECTED",
            InfraEvent::SwDisconnected => "SW_DISCONNECTED",
            InfraEvent::SwUpdateConfig => "SW_UPDATE_CONFIG",
            InfraEvent::SwUpdateDesc => "SW_UPDATE_DESC",
            InfraEvent::HostAdded => "HOST_ADDED",
            InfraEvent::HostDeleted => "HOST_DELETED",
            InfraEvent::LinkAdded => "LINK_ADDED",
            InfraEvent::LinkDeleted => "LINK_DELETED",
            InfraEvent::FlowAdded => "FLOW_ADDED",
            InfraEvent::FlowModified => "FLOW_MODIFIED",
            InfraEvent::FlowDeleted => "FLOW_DELETED",
            InfraEvent::RsUpdateUsage => "RS_UPDATE_USAGE",
            InfraEvent::TrUpdateStats => "TR_UPDATE_STATS",
            InfraEvent::LogUpdateMsgs => "LOG_UPDATE_MSGS",
            InfraEvent::LogDebug => "LOG_DEBUG",
            InfraEvent::LogInfo => "LOG_INFO",
            InfraEvent::LogWarn => "LOG_WARN",
            InfraEvent::LogError => "LOG_ERROR",
            InfraEvent::LogFatal => "LOG_FATAL",
        }
    }

    fn category(self) -> EventCategory {
        use InfraEvent::*;
        match self {
            OfpMsgIn | DpReceivePacket | DpFlowExpired | DpFlowDeleted | DpFlowStats
            | DpAggregateStats | DpPortAdded | DpPortModified | DpPortDeleted | DpPortStats => {
                EventCategory::Upstream
            }
            OfpMsgOut | DpSendPacket | DpInsertFlow | DpModifyFlow | DpDeleteFlow
            | DpRequestFlowStats | DpRequestAggregateStats | DpRequestPortStats => {
                EventCategory::Downstream
            }
            SwGetDpid | SwGetFd | SwGetXid => EventCategory::RequestResponse,
            SwNewConn | SwExpiredConn | SwConnected | SwDisconnected | SwUpdateConfig
            | SwUpdateDesc | HostAdded | HostDeleted | LinkAdded | LinkDeleted | FlowAdded
            | FlowModified | FlowDeleted | RsUpdateUsage | TrUpdateStats | LogUpdateMsgs => {
                EventCategory::Notify
            }
            LogDebug | LogInfo | LogWarn | LogError | LogFatal => EventCategory::Log,
        }
    }

    fn payload_kind(self) -> PayloadKind {
        use InfraEvent::*;
        match self {
            OfpMsgIn | OfpMsgOut => PayloadKind::Raw,
            DpReceivePacket => PayloadKind::PktIn,
            DpSendPacket => PayloadKind::PktOut,
            DpFlowExpired | DpFlowDeleted | DpFlowStats | DpAggregateStats | DpInsertFlow
            | DpModifyFlow | DpDeleteFlow | DpRequestFlowStats | DpRequestAggregateStats
            | FlowAdded | FlowModified | FlowDeleted => PayloadKind::Flow,
            DpPortAdded | DpPortModified | DpPortDeleted | DpPortStats | DpRequestPortStats
            | LinkAdded | LinkDeleted => PayloadKind::Port,
            SwGetDpid | SwGetFd | SwGetXid | SwNewConn | SwExpiredConn | SwConnected
            | SwDisconnected | SwUpdateConfig | SwUpdateDesc => PayloadKind::Switch,
            HostAdded | HostDeleted => PayloadKind::Host,
            RsUpdateUsage => PayloadKind::Resource,
            TrUpdateStats => PayloadKind::Traffic,
            LogUpdateMsgs | LogDebug | LogInfo | LogWarn | LogError | LogFatal => PayloadKind::Log,
        }
    }
}

impl fmt::Display for InfraEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EV_{}", self.name())
    }
}

// =============================================================================
// Application events
// =============================================================================

/// Event types of the application bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum AppEvent {
    // upstream
    DpReceivePacket = 1,
    DpFlowExpired = 2,
    DpFlowDeleted = 3,
    DpPortAdded = 4,
    DpPortModified = 5,
    DpPortDeleted = 6,
    // downstream
    DpSendPacket = 8,
    DpInsertFlow = 9,
    DpModifyFlow = 10,
    DpDeleteFlow = 11,
    // request-response
    SwGetInfo = 13,
    SwGetAllInfo = 14,
    HostGetInfo = 15,
    HostGetAllInfo = 16,
    LinkGetInfo = 17,
    LinkGetAllInfo = 18,
    FlowGetInfo = 19,
    FlowGetAllInfo = 20,
    // notification
    SwConnected = 22,
    SwDisconnected = 23,
    HostAdded = 24,
    HostDeleted = 25,
    LinkAdded = 26,
    LinkDeleted = 27,
    FlowAdded = 28,
    FlowModified = 29,
    FlowDeleted = 30,
    // log
    LogDebug = 32,
    LogInfo = 33,
    LogWarn = 34,
    LogError = 35,
    LogFatal = 36,
}

impl EventKind for AppEvent {
    const CLASS: EventClass = EventClass::Application;
    const BOUNDS: CategoryBounds = CategoryBounds {
        all_upstream: 7,
        all_downstream: 12,
        wrt_intstream: 21,
        all_intstream: 31,
        num_events: 37,
    };
    const ALL: &'static [Self] = &[
        AppEvent::DpReceivePacket,
        AppEvent::DpFlowExpired,
        AppEvent::DpFlowDeleted,
        AppEvent::DpPortAdded,
        AppEvent::DpPortModified,
        AppEvent::DpPortDeleted,
        AppEvent::DpSendPacket,
        AppEvent::DpInsertFlow,
        AppEvent::DpModifyFlow,
        AppEvent::DpDeleteFlow,
        AppEvent::SwGetInfo,
        AppEvent::SwGetAllInfo,
        AppEvent::HostGetInfo,
        AppEvent::HostGetAllInfo,
        AppEvent::LinkGetInfo,
        AppEvent::LinkGetAllInfo,
        AppEvent::FlowGetInfo,
        AppEvent::FlowGetAllInfo,
        AppEvent::SwConnected,
        AppEvent::SwDisconnected,
        AppEvent::HostAdded,
        AppEvent::HostDeleted,
        AppEvent::LinkAdded,
        AppEvent::LinkDeleted,
        AppEvent::FlowAdded,
        AppEvent::FlowModified,
        AppEvent::FlowDeleted,
        AppEvent::LogDebug,
        AppEvent::LogInfo,
        AppEvent::LogWarn,
        AppEvent::LogError,
        AppEvent::LogFatal,
    ];

    fn id(self) -> u16 {
        self as u16
    }

    fn name(self) -> &'static str {
        match self {
            AppEvent::DpReceivePacket => "DP_RECEIVE_PACKET",
            AppEvent::DpFlowExpired => "DP_FLOW_EXPIRED",
            AppEvent::DpFlowDeleted => "DP_FLOW_DELETED",
            AppEvent::DpPortAdded => "DP_PORT_ADDED",
            AppEvent::DpPortModified => "DP_PORT_MODIFIED",
            AppEvent::DpPortDeleted => "DP_PORT_DELETED",
            AppEvent::DpSendPacket => "DP_SEND_PACKET",
            AppEvent::DpInsertFlow => "DP_INSERT_FLOW",
            AppEvent::DpModifyFlow => "DP_MODIFY_FLOW",
            AppEvent::DpDeleteFlow => "DP_DELETE_FLOW",
            AppEvent::SwGetInfo => "SW_GET_INFO",
            AppEvent::SwGetAllInfo => "SW_GET_ALL_INFO",
            AppEvent::HostGetInfo => "HOST_GET_INFO",
            AppEvent::HostGetAllInfo => "HOST_GET_ALL_INFO",
            AppEvent::LinkGetInfo => "LINK_GET_INFO",
            AppEvent::LinkGetAllInfo => "LINK_GET_ALL_INFO",
            AppEvent::FlowGetInfo => "FLOW_GET_INFO",
            AppEvent::FlowGetAllInfo => "FLOW_GET_ALL_INFO",
            AppEvent::SwConnected => "SW_CONNECTED",
            AppEvent::SwDisconnected => "SW_DISCONNECTED",
            AppEvent::HostAdded => "HOST_ADDED",
            AppEvent::HostDeleted => "HOST_DELETED",
            AppEvent::LinkAdded => "LINK_ADDED",
            AppEvent::LinkDeleted => "LINK_DELETED",
            AppEvent::FlowAdded => "FLOW_ADDED",
            AppEvent::FlowModified => "FLOW_MODIFIED",
            AppEvent::FlowDeleted => "FLOW_DELETED",
            AppEvent::LogDebug => "LOG_DEBUG",
            AppEvent::LogInfo => "LOG_INFO",
            AppEvent::LogWarn => "LOG_WARN",
            AppEvent::LogError => "LOG_ERROR",
            AppEvent::LogFatal => "LOG_FATAL",
        }
    }

    fn category(self) -> EventCategory {
        use AppEvent::*;
        match self {
            DpReceivePacket | DpFlowExpired | DpFlowDeleted | DpPortAdded | DpPortModified
            | DpPortDeleted => EventCategory::Upstream,
            DpSendPacket | DpInsertFlow | DpModifyFlow | DpDeleteFlow => {
                EventCategory::Downstream
            }
            SwGetInfo | SwGetAllInfo | HostGetInfo | HostGetAllInfo | LinkGetInfo
            | LinkGetAllInfo | FlowGetInfo | FlowGetAllInfo => EventCategory::RequestResponse,
            SwConnected | SwDisconnected | HostAdded | HostDeleted | LinkAdded | LinkDeleted
            | FlowAdded | FlowModified | FlowDeleted => EventCategory::Notify,
            LogDebug | LogInfo | LogWarn | LogError | LogFatal => EventCategory::Log,
        }
    }

    fn payload_kind(self) -> PayloadKind {
        use AppEvent::*;
        match self {
            DpReceivePacket => PayloadKind::PktIn,
            DpSendPacket => PayloadKind::PktOut,
            DpFlowExpired | DpFlowDeleted | DpInsertFlow | DpModifyFlow | DpDeleteFlow
            | FlowGetInfo | FlowGetAllInfo | FlowAdded | FlowModified | FlowDeleted => {
                PayloadKind::Flow
            }
            DpPortAdded | DpPortModified | DpPortDeleted | LinkGetInfo | LinkGetAllInfo
            | LinkAdded | LinkDeleted => PayloadKind::Port,
            SwGetInfo | SwGetAllInfo | SwConnected | SwDisconnected => PayloadKind::Switch,
            HostGetInfo | HostGetAllInfo | HostAdded | HostDeleted => PayloadKind::Host,
            LogDebug | LogInfo | LogWarn | LogError | LogFatal => PayloadKind::Log,
        }
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AV_{}", self.name())
    }
}
