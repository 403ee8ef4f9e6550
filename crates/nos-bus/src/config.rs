//! # Engine Configuration
//!
//! Per-engine settings. The runtime fills these from the environment; tests
//! build them directly.

use crate::meta::MetaTrigger;
use nos_types::EventClass;
use std::time::Duration;

/// Settings for one event engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bind address of the inbound pull endpoint. `None` disables it.
    pub pull_addr: Option<String>,
    /// Bind address of the inbound reply endpoint. `None` disables it.
    pub reply_addr: Option<String>,
    /// Read timeout on inbound connections; the workers check the engine
    /// flag at this interval.
    pub recv_timeout: Duration,
    /// Timeout for outbound connects to remote subscribers.
    pub connect_timeout: Duration,
    /// Connections served at once per inbound endpoint; further peers are
    /// refused until one closes.
    pub max_connections: usize,
    /// Time given to the workers to notice shutdown before they are joined.
    pub shutdown_grace: Duration,
    /// Meta-event monitor period.
    pub meta_tick: Duration,
    /// Meta-event triggers.
    pub triggers: Vec<MetaTrigger>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pull_addr: None,
            reply_addr: None,
            recv_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(1),
            max_connections: 64,
            shutdown_grace: Duration::from_secs(2),
            meta_tick: Duration::from_secs(1),
            triggers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults with the standard endpoints of `class`.
    #[must_use]
    pub fn for_class(class: EventClass) -> Self {
        let (pull, reply) = match class {
            EventClass::Infrastructure => ("0.0.0.0:5001", "0.0.0.0:5002"),
            EventClass::Application => ("0.0.0.0:6001", "0.0.0.0:6002"),
        };
        Self {
            pull_addr: Some(pull.to_string()),
            reply_addr: Some(reply.to_string()),
            ..Self::default()
        }
    }

    /// No inbound endpoints. Used for purely in-process buses.
    #[must_use]
    pub fn local_only() -> Self {
        Self::default()
    }
}
