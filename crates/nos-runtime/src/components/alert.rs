//! Meta-event alerts: matched triggers are reported through `tracing`.
//! Attached commands are recorded, never executed.

use nos_bus::{MetaAction, MetaTrigger};
use nos_types::EventKind;
use parking_lot::Mutex;
use tracing::warn;

/// One fired trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub event: String,
    pub count: u64,
    pub trigger: String,
}

/// Keeps the most recent alerts.
#[derive(Debug)]
pub struct AlertLog {
    recent: Mutex<Vec<Alert>>,
    capacity: usize,
}

impl AlertLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    #[must_use]
    pub fn recent(&self) -> Vec<Alert> {
        self.recent.lock().clone()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(64)
    }
}

impl<K: EventKind> MetaAction<K> for AlertLog {
    fn fire(&self, event: K, count: u64, trigger: &MetaTrigger) {
        warn!(
            "[meta] {} {}{} (count {}){}",
            event,
            trigger.condition.symbol(),
            trigger.threshold,
            count,
            trigger
                .command
                .as_deref()
                .map(|cmd| format!(", command '{cmd}' not executed"))
                .unwrap_or_default()
        );

        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.remove(0);
        }
        recent.push(Alert {
            event: event.to_string(),
            count,
            trigger: trigger.to_string(),
        });
    }
}
