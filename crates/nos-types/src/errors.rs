//! # Error Types
//!
//! Errors raised while interpreting subscriber descriptors and policies.

use thiserror::Error;

/// Errors parsing an operator-defined policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A clause is not of the form `field:values`.
    #[error("Malformed policy clause: '{0}'")]
    Malformed(String),

    /// Unknown field name.
    #[error("Unknown policy field: '{0}'")]
    UnknownField(String),

    /// A value is out of range or unparsable.
    #[error("Invalid value '{value}' for policy field '{field}'")]
    InvalidValue { field: String, value: String },

    /// A field lists more values than an entry can hold.
    #[error("Too many values for policy field '{field}' (max {max})")]
    TooManyValues { field: String, max: usize },

    /// No field was given.
    #[error("Empty policy")]
    Empty,
}

/// Errors building a registry from descriptors. Any of these rejects the
/// whole build; the previous registry stays in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An inbound or outbound name is not an event of this class.
    #[error("{subscriber}: unknown event '{event}'")]
    UnknownEvent { subscriber: String, event: String },

    /// A category wildcard was used by a subscriber below Security role.
    #[error("{subscriber}: wildcard '{event}' requires security role or above")]
    WildcardNotPermitted { subscriber: String, event: String },

    /// A category wildcard appeared in an outbound list.
    #[error("{subscriber}: wildcard '{event}' is not allowed in outbounds")]
    WildcardOutbound { subscriber: String, event: String },

    /// Two descriptors share a name.
    #[error("Duplicate subscriber name: {0}")]
    DuplicateName(String),

    /// Two different names hash to the same id.
    #[error("Subscriber id collision: {first} and {second} both map to {id}")]
    IdCollision {
        first: String,
        second: String,
        id: u32,
    },

    /// A remote descriptor is missing a peer address.
    #[error("{0}: remote subscriber needs push_addr and req_addr")]
    MissingAddress(String),

    /// Empty subscriber name.
    #[error("Subscriber without a name")]
    MissingName,

    /// An initial policy failed to parse.
    #[error("{subscriber}: {source}")]
    Policy {
        subscriber: String,
        #[source]
        source: PolicyError,
    },
}
