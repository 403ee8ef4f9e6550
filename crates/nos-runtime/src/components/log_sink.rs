//! # Log Sink
//!
//! The `log` subscriber of the infrastructure bus. Every `LOG_*` event,
//! whether raised by a component or forwarded from an application by the
//! gateway, ends up as a `tracing` event at the matching level.

use nos_bus::{EventHandler, EventView, InfraEngine};
use nos_types::{EventCategory, EventKind, EventPayload, InfraEvent, Status, SubscriberConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Subscriber name.
pub const LOG: &str = "log";

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    #[must_use]
    pub fn of(event: InfraEvent) -> Option<Self> {
        match event {
            InfraEvent::LogDebug => Some(Self::Debug),
            InfraEvent::LogInfo => Some(Self::Info),
            InfraEvent::LogWarn => Some(Self::Warn),
            InfraEvent::LogError => Some(Self::Error),
            InfraEvent::LogFatal => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// Writes log events through `tracing`.
pub struct LogSink {
    engine: Weak<InfraEngine>,
    written: AtomicU64,
}

impl LogSink {
    #[must_use]
    pub fn new(engine: &Arc<InfraEngine>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
            written: AtomicU64::new(0),
        }
    }

    /// Messages written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Register on `engine` under [`LOG`].
    pub fn attach(engine: &Arc<InfraEngine>) -> Arc<Self> {
        let sink = Arc::new(Self::new(engine));
        engine.register_handler(LOG, sink.clone());
        sink
    }

    /// Descriptor subscribing to every log event.
    #[must_use]
    pub fn subscriber() -> SubscriberConfig {
        InfraEvent::in_category(EventCategory::Log)
            .into_iter()
            .fold(
                SubscriberConfig::new(LOG).with_status(Status::Enabled),
                |cfg, event| cfg.inbound(event.to_string().as_str()),
            )
    }

    fn source(&self, publisher: u32) -> String {
        self.engine
            .upgrade()
            .and_then(|engine| {
                engine
                    .list()
                    .into_iter()
                    .find(|s| s.id == publisher)
                    .map(|s| s.name)
            })
            .unwrap_or_else(|| publisher.to_string())
    }
}

impl EventHandler<InfraEvent> for LogSink {
    fn handle(&self, view: EventView<'_, InfraEvent>) -> i32 {
        let Some(severity) = Severity::of(view.event()) else {
            return 0;
        };
        let EventPayload::Log(msg) = view.payload() else {
            return 0;
        };
        let source = self.source(view.publisher());
        let msg = msg.trim_end();

        match severity {
            Severity::Debug => debug!(target: "nos::log", source = %source, "{}", msg),
            Severity::Info => info!(target: "nos::log", source = %source, "{}", msg),
            Severity::Warn => warn!(target: "nos::log", source = %source, "{}", msg),
            Severity::Error => error!(target: "nos::log", source = %source, "{}", msg),
            Severity::Fatal => error!(target: "nos::log", source = %source, fatal = true, "{}", msg),
        }
        self.written.fetch_add(1, Ordering::Relaxed);
        0
    }
}
