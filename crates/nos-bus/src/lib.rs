//! # NOS Bus - Event Routing Engine
//!
//! One dispatch machinery, instantiated once per event class:
//!
//! ```text
//!   components                         applications
//!       │                                   │
//!       ▼                                   ▼
//! ┌────────────────┐   apphdlr    ┌────────────────┐
//! │  infra engine  │ ───────────→ │   app engine   │
//! │ (InfraEvent)   │ ←─────────── │  (AppEvent)    │
//! └────────────────┘    appint    └────────────────┘
//!       ▲  pull/reply (TCP)              ▲  pull/reply (TCP)
//!       │                                │
//!  remote components              remote applications
//! ```
//!
//! ## Delivery Rules
//!
//! - Subscribers are visited in registry order (priority, role, permission).
//! - Only subscribers with Write on an event see a mutable payload.
//! - A non-zero return from a subscriber holding Execute stops dispatch.
//! - A Security-Extended subscriber is redelivered to after every other
//!   delivery of the same dispatch.
//! - Remote delivery failures deactivate the remote subscriber; they never
//!   abort the dispatch.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

/// Generates one named `raise` wrapper per notify-dispatched event and one
/// named `query` wrapper per request-response event.
macro_rules! event_api {
    (
        $kind:ident;
        raise { $($raise_fn:ident => $raise_ev:ident($raise_ty:ty);)* }
        query { $($query_fn:ident => $query_ev:ident($query_ty:ty);)* }
    ) => {
        impl $crate::engine::EventEngine<$kind> {
            $(
                #[doc = concat!("Raise `", stringify!($raise_ev), "`.")]
                pub fn $raise_fn(
                    &self,
                    publisher: u32,
                    payload: $raise_ty,
                ) -> Result<i32, $crate::error::DispatchError> {
                    self.raise(publisher, $kind::$raise_ev, payload.into())
                }
            )*
            $(
                #[doc = concat!("Query `", stringify!($query_ev), "`; answers are written into `payload`.")]
                pub fn $query_fn(
                    &self,
                    publisher: u32,
                    payload: &mut $query_ty,
                ) -> Result<i32, $crate::error::DispatchError> {
                    let mut slot = nos_types::EventPayload::from(payload.clone());
                    let ret = self.query(publisher, $kind::$query_ev, &mut slot)?;
                    if let Ok(answer) = <$query_ty>::try_from(slot) {
                        *payload = answer;
                    }
                    Ok(ret)
                }
            )*
        }
    };
}

pub mod app;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod infra;
pub mod meta;
pub mod odp;
pub mod registry;
pub mod transport;
mod workers;

pub use app::AppEngine;
pub use codec::{EventRecord, Handshake};
pub use config::EngineConfig;
pub use engine::{BoundEndpoints, EventEngine};
pub use envelope::{Envelope, EnvelopeHeader, EventHandler, EventView};
pub use error::{AdminError, CodecError, DispatchError, HandshakeError, TransportError};
pub use gateway::{AppHandler, AppInterface, Gateway};
pub use infra::InfraEngine;
pub use meta::{MetaAction, MetaCondition, MetaTrigger, NoopMetaAction};
pub use registry::{
    HandlerTable, Registry, Subscriber, SubscriberDetail, SubscriberSummary,
};
pub use transport::{Connector, RemoteEndpoint, TcpConnector};
