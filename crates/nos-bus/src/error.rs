//! # Error Types
//!
//! Every failure the engine reports. None of them is fatal to the process.

use nos_types::{PayloadKind, PolicyError, RegistryError};
use thiserror::Error;

/// Errors returned by `raise` and `query`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The publisher may not emit this event type.
    #[error("Unauthorized: publisher {publisher} may not raise {event}")]
    Unauthorized { publisher: u32, event: String },

    /// `raise` was used for a request-response type or `query` for any
    /// other type.
    #[error("{event} cannot be dispatched this way")]
    WrongCategory { event: String },

    /// The payload does not match the event type's payload kind.
    #[error("{event} carries {expected:?}, got {given:?}")]
    PayloadMismatch {
        event: String,
        expected: PayloadKind,
        given: PayloadKind,
    },
}

impl DispatchError {
    /// Value reported in the `return` field of a reply record.
    #[must_use]
    pub fn code(&self) -> i32 {
        -1
    }
}

/// Errors encoding or decoding transport records.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Record carries publisher id 0")]
    ZeroId,

    #[error("Unknown event type {0}")]
    UnknownEvent(u64),
}

/// Errors talking to a remote peer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No {0} address configured")]
    NoAddress(&'static str),

    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Peer closed the connection")]
    Closed,

    #[error("Endpoint released during the call")]
    Released,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Reasons a handshake is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Malformed handshake record")]
    Malformed,

    #[error("Empty identity (id {id}, name '{name}')")]
    EmptyIdentity { id: u32, name: String },

    #[error("No remote subscriber with id {id} (given name '{name}')")]
    UnknownId { id: u32, name: String },

    #[error("Name mismatch for id {id}: expected '{expected}', given '{given}'")]
    NameMismatch {
        id: u32,
        expected: String,
        given: String,
    },

    #[error("{0} is disabled")]
    Disabled(String),
}

/// Errors from administrative operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("{0} does not exist")]
    UnknownSubscriber(String),

    #[error("{0} is disabled")]
    Disabled(String),

    #[error("{0} is a remote subscriber; it activates by handshake")]
    RemoteActivation(String),

    #[error("Failed to activate {name}: {reason}")]
    Activation { name: String, reason: String },

    #[error("{name} has no policy #{index} ({count} defined)")]
    PolicyIndex {
        name: String,
        index: usize,
        count: usize,
    },

    #[error("{0} already holds the maximum number of policies")]
    TooManyPolicies(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
