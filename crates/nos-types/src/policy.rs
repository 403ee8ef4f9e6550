//! # Operator-Defined Policies
//!
//! A policy entry narrows which events a subscriber sees. Entries are OR'ed;
//! within an entry every enabled field must match; within a field any listed
//! value may match.
//!
//! Text form, as accepted by the admin `add_policy` operation:
//!
//! ```text
//! dpid:1,2;port:3;proto:arp,tcp;vlan:10;srcip:10.0.0.0;dstip:10.0.1.1;sport:80;dport:443
//! ```
//!
//! IP addresses are held as `u32::from(Ipv4Addr)`; a policy address matches
//! an event address when `(policy & event) == policy`, so `10.0.0.0` covers
//! the whole `10/8` block.

use crate::entities::proto;
use crate::errors::PolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum number of policy entries per subscriber.
pub const MAX_POLICIES: usize = 16;

/// Maximum number of values in one field list.
pub const MAX_POLICY_ENTRIES: usize = 8;

/// Highest valid port number, exclusive.
pub const MAX_NUM_PORTS: u32 = 128;

/// Bitmask of enabled fields in an [`OdpEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OdpFlags(pub u16);

impl OdpFlags {
    pub const DPID: u16 = 1 << 0;
    pub const PORT: u16 = 1 << 1;
    pub const PROTO: u16 = 1 << 2;
    pub const VLAN: u16 = 1 << 3;
    pub const SRCIP: u16 = 1 << 4;
    pub const DSTIP: u16 = 1 << 5;
    pub const SPORT: u16 = 1 << 6;
    pub const DPORT: u16 = 1 << 7;

    #[must_use]
    pub fn has(self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u16) {
        self.0 |= bit;
    }

    /// Number of enabled fields.
    #[must_use]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// One policy entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OdpEntry {
    pub flags: OdpFlags,
    pub dpid: Vec<u64>,
    pub port: Vec<u32>,
    /// Protocol bitmask; matches when it shares any bit with the event.
    pub proto: u16,
    pub vlan: Vec<u16>,
    pub srcip: Vec<u32>,
    pub dstip: Vec<u32>,
    pub sport: Vec<u16>,
    pub dport: Vec<u16>,
}

fn parse_list<T, F>(field: &str, values: &str, parse: F) -> Result<Vec<T>, PolicyError>
where
    F: Fn(&str) -> Option<T>,
{
    let items: Vec<&str> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if items.len() > MAX_POLICY_ENTRIES {
        return Err(PolicyError::TooManyValues {
            field: field.to_string(),
            max: MAX_POLICY_ENTRIES,
        });
    }
    items
        .into_iter()
        .map(|v| {
            parse(v).ok_or_else(|| PolicyError::InvalidValue {
                field: field.to_string(),
                value: v.to_string(),
            })
        })
        .collect()
}

fn parse_proto(name: &str) -> Option<u16> {
    match name {
        "arp" => Some(proto::ARP),
        "dhcp" => Some(proto::DHCP),
        "lldp" => Some(proto::LLDP),
        "ipv4" => Some(proto::IPV4),
        "tcp" => Some(proto::TCP),
        "udp" => Some(proto::UDP),
        "icmp" => Some(proto::ICMP),
        _ => None,
    }
}

fn parse_l4_port(v: &str) -> Option<u16> {
    v.parse::<u16>().ok().filter(|p| *p > 0)
}

impl FromStr for OdpEntry {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entry = OdpEntry::default();

        for clause in s.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let (field, values) = clause
                .split_once(':')
                .ok_or_else(|| PolicyError::Malformed(clause.to_string()))?;

            match field.trim() {
                "dpid" => {
                    entry.dpid = parse_list("dpid", values, |v| {
                        v.parse::<u64>().ok().filter(|d| *d > 0)
                    })?;
                    entry.flags.set(OdpFlags::DPID);
                }
                "port" => {
                    entry.port = parse_list("port", values, |v| {
                        v.parse::<u32>()
                            .ok()
                            .filter(|p| *p > 0 && *p < MAX_NUM_PORTS)
                    })?;
                    entry.flags.set(OdpFlags::PORT);
                }
                "proto" => {
                    entry.proto = parse_list("proto", values, parse_proto)?
                        .into_iter()
                        .fold(0, |acc, bit| acc | bit);
                    entry.flags.set(OdpFlags::PROTO);
                }
                "vlan" => {
                    entry.vlan = parse_list("vlan", values, |v| {
                        v.parse::<u16>().ok().filter(|id| *id > 0 && *id < 4096)
                    })?;
                    entry.flags.set(OdpFlags::VLAN);
                }
                "srcip" => {
                    entry.srcip = parse_list("srcip", values, |v| {
                        v.parse::<Ipv4Addr>().ok().map(u32::from).filter(|ip| *ip > 0)
                    })?;
                    entry.flags.set(OdpFlags::SRCIP);
                }
                "dstip" => {
                    entry.dstip = parse_list("dstip", values, |v| {
                        v.parse::<Ipv4Addr>().ok().map(u32::from).filter(|ip| *ip > 0)
                    })?;
                    entry.flags.set(OdpFlags::DSTIP);
                }
                "sport" => {
                    entry.sport = parse_list("sport", values, parse_l4_port)?;
                    entry.flags.set(OdpFlags::SPORT);
                }
                "dport" => {
                    entry.dport = parse_list("dport", values, parse_l4_port)?;
                    entry.flags.set(OdpFlags::DPORT);
                }
                other => return Err(PolicyError::UnknownField(other.to_string())),
            }
        }

        if entry.flags.count() == 0 {
            return Err(PolicyError::Empty);
        }
        Ok(entry)
    }
}

impl fmt::Display for OdpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }
        fn join_ip(items: &[u32]) -> String {
            items
                .iter()
                .map(|ip| Ipv4Addr::from(*ip).to_string())
                .collect::<Vec<_>>()
                .join(",")
        }

        let mut clauses = Vec::new();
        if self.flags.has(OdpFlags::DPID) {
            clauses.push(format!("dpid:{}", join(&self.dpid)));
        }
        if self.flags.has(OdpFlags::PORT) {
            clauses.push(format!("port:{}", join(&self.port)));
        }
        if self.flags.has(OdpFlags::PROTO) {
            let names: Vec<&str> = [
                (proto::ARP, "arp"),
                (proto::DHCP, "dhcp"),
                (proto::LLDP, "lldp"),
                (proto::IPV4, "ipv4"),
                (proto::TCP, "tcp"),
                (proto::UDP, "udp"),
                (proto::ICMP, "icmp"),
            ]
            .iter()
            .filter(|(bit, _)| self.proto & bit != 0)
            .map(|(_, name)| *name)
            .collect();
            clauses.push(format!("proto:{}", names.join(",")));
        }
        if self.flags.has(OdpFlags::VLAN) {
            clauses.push(format!("vlan:{}", join(&self.vlan)));
        }
        if self.flags.has(OdpFlags::SRCIP) {
            clauses.push(format!("srcip:{}", join_ip(&self.srcip)));
        }
        if self.flags.has(OdpFlags::DSTIP) {
            clauses.push(format!("dstip:{}", join_ip(&self.dstip)));
        }
        if self.flags.has(OdpFlags::SPORT) {
            clauses.push(format!("sport:{}", join(&self.sport)));
        }
        if self.flags.has(OdpFlags::DPORT) {
            clauses.push(format!("dport:{}", join(&self.dport)));
        }
        f.write_str(&clauses.join(";"))
    }
}
