//! # Application Gateway
//!
//! The two buses are joined by a fixed pair of local subscribers:
//!
//! - `apphdlr` on the infrastructure bus republishes datapath and topology
//!   events on the application bus as `appint`;
//! - `appint` on the application bus republishes packet-out, flow and log
//!   requests from applications on the infrastructure bus as `apphdlr`.
//!
//! Each side holds only a weak reference to the other engine, so neither
//! keeps the other alive.

use crate::app::AppEngine;
use crate::envelope::{EventHandler, EventView};
use crate::error::DispatchError;
use crate::infra::InfraEngine;
use nos_types::{component_id, AppEvent, EventPayload, InfraEvent, Status, SubscriberConfig};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Name of the gateway subscriber on the infrastructure bus.
pub const APPHDLR: &str = "apphdlr";
/// Name of the gateway subscriber on the application bus.
pub const APPINT: &str = "appint";

/// Infrastructure events forwarded to applications.
const UPWARD: &[(InfraEvent, AppEvent)] = &[
    (InfraEvent::DpReceivePacket, AppEvent::DpReceivePacket),
    (InfraEvent::DpFlowExpired, AppEvent::DpFlowExpired),
    (InfraEvent::DpFlowDeleted, AppEvent::DpFlowDeleted),
    (InfraEvent::DpPortAdded, AppEvent::DpPortAdded),
    (InfraEvent::DpPortModified, AppEvent::DpPortModified),
    (InfraEvent::DpPortDeleted, AppEvent::DpPortDeleted),
    (InfraEvent::SwConnected, AppEvent::SwConnected),
    (InfraEvent::SwDisconnected, AppEvent::SwDisconnected),
    (InfraEvent::HostAdded, AppEvent::HostAdded),
    (InfraEvent::HostDeleted, AppEvent::HostDeleted),
    (InfraEvent::LinkAdded, AppEvent::LinkAdded),
    (InfraEvent::LinkDeleted, AppEvent::LinkDeleted),
    (InfraEvent::FlowAdded, AppEvent::FlowAdded),
    (InfraEvent::FlowModified, AppEvent::FlowModified),
    (InfraEvent::FlowDeleted, AppEvent::FlowDeleted),
];

/// Application events forwarded to the infrastructure.
const DOWNWARD: &[(AppEvent, InfraEvent)] = &[
    (AppEvent::DpSendPacket, InfraEvent::DpSendPacket),
    (AppEvent::DpInsertFlow, InfraEvent::DpInsertFlow),
    (AppEvent::DpModifyFlow, InfraEvent::DpModifyFlow),
    (AppEvent::DpDeleteFlow, InfraEvent::DpDeleteFlow),
    (AppEvent::LogDebug, InfraEvent::LogDebug),
    (AppEvent::LogInfo, InfraEvent::LogInfo),
    (AppEvent::LogWarn, InfraEvent::LogWarn),
    (AppEvent::LogError, InfraEvent::LogError),
    (AppEvent::LogFatal, InfraEvent::LogFatal),
];

fn forward<K, J>(table: &[(K, J)], event: K) -> Option<J>
where
    K: PartialEq + Copy,
    J: Copy,
{
    table.iter().find(|(from, _)| *from == event).map(|(_, to)| *to)
}

fn log_forward_failure(from: impl std::fmt::Display, result: &Result<i32, DispatchError>) {
    if let Err(e) = result {
        debug!("[gateway] {} not forwarded: {}", from, e);
    }
}

/// `apphdlr`: infrastructure-side half of the gateway.
pub struct AppHandler {
    app: Weak<AppEngine>,
    publisher: u32,
}

impl AppHandler {
    #[must_use]
    pub fn new(app: &Arc<AppEngine>) -> Self {
        Self {
            app: Arc::downgrade(app),
            publisher: component_id(APPINT),
        }
    }
}

impl EventHandler<InfraEvent> for AppHandler {
    fn handle(&self, view: EventView<'_, InfraEvent>) -> i32 {
        let Some(target) = forward(UPWARD, view.event()) else {
            return 0;
        };
        if let Some(app) = self.app.upgrade() {
            let result = app.raise(self.publisher, target, view.payload().clone());
            log_forward_failure(view.event(), &result);
        }
        0
    }
}

/// `appint`: application-side half of the gateway.
pub struct AppInterface {
    infra: Weak<InfraEngine>,
    publisher: u32,
}

impl AppInterface {
    #[must_use]
    pub fn new(infra: &Arc<InfraEngine>) -> Self {
        Self {
            infra: Arc::downgrade(infra),
            publisher: component_id(APPHDLR),
        }
    }
}

impl EventHandler<AppEvent> for AppInterface {
    fn handle(&self, view: EventView<'_, AppEvent>) -> i32 {
        let Some(target) = forward(DOWNWARD, view.event()) else {
            return 0;
        };
        if let Some(infra) = self.infra.upgrade() {
            let payload: EventPayload = view.payload().clone();
            let result = infra.raise(self.publisher, target, payload);
            log_forward_failure(view.event(), &result);
        }
        0
    }
}

/// Wiring helper for both halves.
pub struct Gateway;

impl Gateway {
    /// Register `apphdlr` on `infra` and `appint` on `app`. The descriptors
    /// from [`infra_subscriber`](Self::infra_subscriber) and
    /// [`app_subscriber`](Self::app_subscriber) must be part of the next
    /// reload of each engine.
    pub fn attach(infra: &Arc<InfraEngine>, app: &Arc<AppEngine>) {
        infra.register_handler(APPHDLR, Arc::new(AppHandler::new(app)));
        app.register_handler(APPINT, Arc::new(AppInterface::new(infra)));
    }

    /// Descriptor of `apphdlr`: subscribes to everything it forwards upward
    /// and publishes everything `appint` forwards downward.
    #[must_use]
    pub fn infra_subscriber() -> SubscriberConfig {
        let mut cfg = SubscriberConfig::new(APPHDLR).with_status(Status::Enabled);
        for (event, _) in UPWARD {
            cfg = cfg.inbound(event.to_string().as_str());
        }
        for (_, event) in DOWNWARD {
            cfg = cfg.outbound(event.to_string());
        }
        cfg
    }

    /// Descriptor of `appint`, the mirror image of `apphdlr`.
    #[must_use]
    pub fn app_subscriber() -> SubscriberConfig {
        let mut cfg = SubscriberConfig::new(APPINT).with_status(Status::Enabled);
        for (event, _) in DOWNWARD {
            cfg = cfg.inbound(event.to_string().as_str());
        }
        for (_, event) in UPWARD {
            cfg = cfg.outbound(event.to_string());
        }
        cfg
    }
}
