//! # NOS Types Crate
//!
//! Domain types shared by the infrastructure and application event buses.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: event identifiers, payloads and subscriber
//!   descriptors are defined here and nowhere else.
//! - **Tagged Categories**: every event type carries its category explicitly;
//!   the numeric wire ids still follow the sentinel-partitioned layout.
//! - **Structured Configuration**: subscriber descriptors arrive already
//!   structured (`serde`), the engine never parses configuration text.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod errors;
pub mod event_id;
pub mod hash;
pub mod policy;
pub mod subscriber;

pub use entities::*;
pub use errors::*;
pub use event_id::{AppEvent, CategoryBounds, EventCategory, EventClass, EventKind, InfraEvent};
pub use hash::component_id;
pub use policy::{OdpEntry, OdpFlags};
pub use subscriber::{
    InboundSpec, Permission, Role, Site, Status, SubscriberConfig, SubscriberType,
};
