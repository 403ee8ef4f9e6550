//! # Envelope
//!
//! One envelope is built per dispatch. Every subscriber of the call sees the
//! same storage: subscribers holding Write permission receive
//! [`EventView::Writable`], all others [`EventView::ReadOnly`]. A change made
//! through a writable view is visible to every later subscriber.

use nos_types::{EventKind, EventPayload};

/// Envelope header.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeHeader<K> {
    /// Id of the subscriber that raised the event.
    pub publisher: u32,
    /// Event type.
    pub event: K,
    /// Payload size as recorded at raise time.
    pub length: usize,
    /// Free for handlers; reset after each writable local delivery.
    pub checksum: u32,
}

/// Header plus the single payload slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<K> {
    pub header: EnvelopeHeader<K>,
    pub payload: EventPayload,
}

impl<K: EventKind> Envelope<K> {
    #[must_use]
    pub fn new(publisher: u32, event: K, payload: EventPayload) -> Self {
        Self {
            header: EnvelopeHeader {
                publisher,
                event,
                length: payload.len(),
                checksum: 0,
            },
            payload,
        }
    }

    #[must_use]
    pub fn event(&self) -> K {
        self.header.event
    }

    #[must_use]
    pub fn publisher(&self) -> u32 {
        self.header.publisher
    }
}

/// What a handler receives for one delivery.
#[derive(Debug)]
pub enum EventView<'a, K> {
    ReadOnly(&'a Envelope<K>),
    Writable(&'a mut Envelope<K>),
}

impl<'a, K: EventKind> EventView<'a, K> {
    /// Read access, whatever the view.
    #[must_use]
    pub fn envelope(&self) -> &Envelope<K> {
        match self {
            EventView::ReadOnly(env) => *env,
            EventView::Writable(env) => &**env,
        }
    }

    #[must_use]
    pub fn event(&self) -> K {
        self.envelope().header.event
    }

    #[must_use]
    pub fn publisher(&self) -> u32 {
        self.envelope().header.publisher
    }

    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.envelope().payload
    }

    /// Mutable payload, only for writable views.
    pub fn output(&mut self) -> Option<&mut EventPayload> {
        match self {
            EventView::ReadOnly(_) => None,
            EventView::Writable(env) => Some(&mut env.payload),
        }
    }

    /// Set the header checksum, only for writable views.
    pub fn set_checksum(&mut self, checksum: u32) -> bool {
        match self {
            EventView::ReadOnly(_) => false,
            EventView::Writable(env) => {
                env.header.checksum = checksum;
                true
            }
        }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self, EventView::Writable(_))
    }
}

/// Implemented by every in-process subscriber.
///
/// `handle` runs on the dispatching thread. A non-zero return from a
/// subscriber holding Execute permission on the event stops the dispatch.
pub trait EventHandler<K: EventKind>: Send + Sync {
    fn handle(&self, view: EventView<'_, K>) -> i32;

    /// Called when the subscriber is activated.
    fn activate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Called when the subscriber is deactivated.
    fn deactivate(&self) {}
}
