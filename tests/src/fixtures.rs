//! Shared helpers for the integration tests and benchmarks.

use nos_bus::{EngineConfig, EventHandler, EventView, InfraEngine};
use nos_types::{EventKind, EventPayload};
use parking_lot::Mutex;
use std::sync::Arc;

/// One observed delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub subscriber: &'static str,
    pub publisher: u32,
    pub writable: bool,
    pub payload: EventPayload,
}

/// Delivery trace shared by every [`Tracer`] of one test.
#[derive(Debug, Default, Clone)]
pub struct Trace(Arc<Mutex<Vec<Seen>>>);

impl Trace {
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.0.lock().iter().map(|s| s.subscriber).collect()
    }

    #[must_use]
    pub fn seen(&self) -> Vec<Seen> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

type Edit = Box<dyn Fn(&mut EventPayload) + Send + Sync>;

/// Records deliveries, optionally edits the payload and returns a fixed code.
pub struct Tracer {
    name: &'static str,
    trace: Trace,
    ret: i32,
    edit: Option<Edit>,
}

impl Tracer {
    #[must_use]
    pub fn new(name: &'static str, trace: &Trace) -> Self {
        Self {
            name,
            trace: trace.clone(),
            ret: 0,
            edit: None,
        }
    }

    #[must_use]
    pub fn returning(mut self, ret: i32) -> Self {
        self.ret = ret;
        self
    }

    #[must_use]
    pub fn editing(mut self, edit: impl Fn(&mut EventPayload) + Send + Sync + 'static) -> Self {
        self.edit = Some(Box::new(edit));
        self
    }
}

impl<K: EventKind> EventHandler<K> for Tracer {
    fn handle(&self, mut view: EventView<'_, K>) -> i32 {
        let writable = view.is_writable();
        if let (Some(edit), Some(out)) = (&self.edit, view.output()) {
            edit(out);
        }
        self.trace.0.lock().push(Seen {
            subscriber: self.name,
            publisher: view.publisher(),
            writable,
            payload: view.payload().clone(),
        });
        self.ret
    }
}

/// Handler for publish-only local components.
pub struct Quiet;

impl<K: EventKind> EventHandler<K> for Quiet {
    fn handle(&self, _view: EventView<'_, K>) -> i32 {
        0
    }
}

/// An infrastructure engine without network endpoints.
#[must_use]
pub fn local_infra() -> Arc<InfraEngine> {
    Arc::new(InfraEngine::new(EngineConfig::local_only()))
}
