//! # Meta-Event Monitor
//!
//! Counts events per type and, once per tick, compares each count against
//! the configured triggers before resetting it.
//!
//! A trigger is written `EVENT<op>THRESHOLD`, optionally followed by
//! `|command`:
//!
//! ```text
//! DP_RECEIVE_PACKET>=1000|rate-limit
//! SW_DISCONNECTED>0
//! ```
//!
//! What happens on a match is up to the [`MetaAction`] hook; the default
//! does nothing.

use nos_types::EventKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Comparison applied to a tick's count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaCondition {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl MetaCondition {
    #[must_use]
    pub fn holds(self, count: u64, threshold: u64) -> bool {
        match self {
            Self::Gt => count > threshold,
            Self::Gte => count >= threshold,
            Self::Lt => count < threshold,
            Self::Lte => count <= threshold,
            Self::Eq => count == threshold,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerParseError {
    #[error("No comparison operator in '{0}'")]
    NoOperator(String),

    #[error("Missing event name in '{0}'")]
    NoEvent(String),

    #[error("Invalid threshold in '{0}'")]
    Threshold(String),
}

/// One configured trigger. The event is kept by name so the same list can
/// be handed to either event class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTrigger {
    pub event: String,
    pub condition: MetaCondition,
    pub threshold: u64,
    #[serde(default)]
    pub command: Option<String>,
}

impl FromStr for MetaTrigger {
    type Err = TriggerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rule, command) = match s.split_once('|') {
            Some((rule, cmd)) => (rule, Some(cmd.trim().to_string()).filter(|c| !c.is_empty())),
            None => (s, None),
        };

        // Two-character operators first so ">=" is not read as ">".
        const OPERATORS: [(&str, MetaCondition); 5] = [
            (">=", MetaCondition::Gte),
            ("<=", MetaCondition::Lte),
            ("==", MetaCondition::Eq),
            (">", MetaCondition::Gt),
            ("<", MetaCondition::Lt),
        ];
        let (event, condition, threshold) = OPERATORS
            .iter()
            .find_map(|(op, cond)| {
                rule.split_once(op)
                    .map(|(event, threshold)| (event, *cond, threshold))
            })
            .ok_or_else(|| TriggerParseError::NoOperator(s.to_string()))?;

        let event = event.trim();
        if event.is_empty() {
            return Err(TriggerParseError::NoEvent(s.to_string()));
        }
        let threshold = threshold
            .trim()
            .parse()
            .map_err(|_| TriggerParseError::Threshold(s.to_string()))?;

        Ok(Self {
            event: event.to_string(),
            condition,
            threshold,
            command,
        })
    }
}

impl fmt::Display for MetaTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.event, self.condition.symbol(), self.threshold)?;
        if let Some(cmd) = &self.command {
            write!(f, "|{cmd}")?;
        }
        Ok(())
    }
}

/// Hook invoked when a trigger matches.
pub trait MetaAction<K: EventKind>: Send + Sync {
    fn fire(&self, event: K, count: u64, trigger: &MetaTrigger);
}

/// Action that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetaAction;

impl<K: EventKind> MetaAction<K> for NoopMetaAction {
    fn fire(&self, _event: K, _count: u64, _trigger: &MetaTrigger) {}
}

/// Per-type event counters, reset every tick.
pub struct EventCounters<K: EventKind> {
    counts: Vec<AtomicU64>,
    _kind: std::marker::PhantomData<fn() -> K>,
}

impl<K: EventKind> EventCounters<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: (0..K::slots()).map(|_| AtomicU64::new(0)).collect(),
            _kind: std::marker::PhantomData,
        }
    }

    pub fn incr(&self, event: K) {
        if let Some(c) = self.counts.get(event.id() as usize) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn get(&self, event: K) -> u64 {
        self.counts
            .get(event.id() as usize)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Read and reset.
    pub fn take(&self, event: K) -> u64 {
        self.counts
            .get(event.id() as usize)
            .map_or(0, |c| c.swap(0, Ordering::AcqRel))
    }
}

impl<K: EventKind> Default for EventCounters<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Triggers resolved for one event class.
pub struct MetaMonitor<K: EventKind> {
    triggers: Vec<(K, MetaTrigger)>,
    action: Arc<dyn MetaAction<K>>,
}

impl<K: EventKind> MetaMonitor<K> {
    /// Resolve `triggers` against this class. Triggers naming an event of
    /// the other class are dropped with a warning.
    pub fn new(triggers: &[MetaTrigger], action: Arc<dyn MetaAction<K>>) -> Self {
        let triggers = triggers
            .iter()
            .filter_map(|t| match K::from_name(&t.event) {
                Some(event) => Some((event, t.clone())),
                None => {
                    warn!("[{}] Ignoring meta trigger for unknown event {}", K::CLASS.tag(), t);
                    None
                }
            })
            .collect();
        Self { triggers, action }
    }

    #[must_use]
    pub fn triggers(&self) -> usize {
        self.triggers.len()
    }

    /// Evaluate every trigger against the counts since the last tick, then
    /// reset all counters. Returns the number of triggers that fired.
    pub fn tick(&self, counters: &EventCounters<K>) -> usize {
        let mut fired = 0;
        for &event in K::ALL {
            let count = counters.take(event);
            for (_, trigger) in self.triggers.iter().filter(|(e, _)| *e == event) {
                if trigger.condition.holds(count, trigger.threshold) {
                    debug!("[{}] Meta trigger {} fired (count {})", K::CLASS.tag(), trigger, count);
                    self.action.fire(event, count, trigger);
                    fired += 1;
                }
            }
        }
        fired
    }
}
