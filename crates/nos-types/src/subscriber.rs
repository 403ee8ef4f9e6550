//! # Subscriber Descriptors
//!
//! Structured descriptors from which a registry is built. They are plain
//! data: event names are resolved and checked when the registry is built,
//! not here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

/// Privilege level. Ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Base,
    #[default]
    Network,
    Management,
    Security,
    /// Security-extended: receives every event it subscribes to, even when
    /// an earlier subscriber vetoes or a policy would exclude it.
    SecurityV2,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Base => "base",
            Role::Network => "network",
            Role::Management => "management",
            Role::Security => "security",
            Role::SecurityV2 => "security_v2",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Permission mask: read (4), write (2), execute (1).
///
/// Written as an `rwx` string in descriptors; an empty string means read
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(4);
    pub const WRITE: Self = Self(2);
    pub const EXECUTE: Self = Self(1);
    pub const ALL: Self = Self(7);

    /// Raw mask value.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        self.contains(Self::WRITE)
    }

    #[must_use]
    pub fn can_execute(self) -> bool {
        self.contains(Self::EXECUTE)
    }
}

impl Default for Permission {
    fn default() -> Self {
        Self::READ
    }
}

impl BitAnd for Permission {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for Permission {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::READ);
        }
        s.chars().try_fold(Self::NONE, |acc, c| match c {
            'r' => Ok(acc | Self::READ),
            'w' => Ok(acc | Self::WRITE),
            'x' => Ok(acc | Self::EXECUTE),
            other => Err(format!("invalid permission character '{other}'")),
        })
    }
}

impl TryFrom<String> for Permission {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, c) in [(Self::READ, 'r'), (Self::WRITE, 'w'), (Self::EXECUTE, 'x')] {
            if self.contains(bit) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// Where a subscriber runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Site {
    /// In-process handler, called on the dispatching thread.
    #[default]
    #[serde(rename = "internal", alias = "local")]
    Local,
    /// Out-of-process peer reached over the transport.
    #[serde(rename = "external", alias = "remote")]
    Remote,
}

/// Administrative status. Only enabled subscribers can be activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Enabled,
    #[default]
    Disabled,
}

/// Whether a subscriber only reacts to events or also runs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberType {
    #[default]
    General,
    #[serde(alias = "auto")]
    Autonomous,
}

/// One inbound subscription: an event or category name, optionally with a
/// per-event permission (masked by the subscriber's global permission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundSpec {
    Name(String),
    WithPerm { event: String, perm: Permission },
}

impl InboundSpec {
    #[must_use]
    pub fn event(&self) -> &str {
        match self {
            InboundSpec::Name(name) | InboundSpec::WithPerm { event: name, .. } => name,
        }
    }

    /// Explicit per-event permission, if any.
    #[must_use]
    pub fn perm(&self) -> Option<Permission> {
        match self {
            InboundSpec::Name(_) => None,
            InboundSpec::WithPerm { perm, .. } => Some(*perm),
        }
    }
}

impl From<&str> for InboundSpec {
    fn from(value: &str) -> Self {
        InboundSpec::Name(value.to_string())
    }
}

/// Structured descriptor of one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SubscriberType,
    pub site: Site,
    pub role: Role,
    pub perm: Permission,
    pub status: Status,
    /// Higher values are delivered first.
    pub priority: i32,
    pub inbounds: Vec<InboundSpec>,
    pub outbounds: Vec<String>,
    /// Address of the peer's pull endpoint (Remote only).
    pub push_addr: Option<String>,
    /// Address of the peer's reply endpoint (Remote only).
    pub req_addr: Option<String>,
    /// Initial policy entries in text form.
    pub policies: Vec<String>,
}

impl SubscriberConfig {
    /// Descriptor with defaults for everything but the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_perm(mut self, perm: Permission) -> Self {
        self.perm = perm;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn remote(mut self, push_addr: impl Into<String>, req_addr: impl Into<String>) -> Self {
        self.site = Site::Remote;
        self.push_addr = Some(push_addr.into());
        self.req_addr = Some(req_addr.into());
        self
    }

    #[must_use]
    pub fn inbound(mut self, entry: impl Into<InboundSpec>) -> Self {
        self.inbounds.push(entry.into());
        self
    }

    #[must_use]
    pub fn inbound_with(mut self, event: impl Into<String>, perm: Permission) -> Self {
        self.inbounds.push(InboundSpec::WithPerm {
            event: event.into(),
            perm,
        });
        self
    }

    #[must_use]
    pub fn outbound(mut self, event: impl Into<String>) -> Self {
        self.outbounds.push(event.into());
        self
    }
}
