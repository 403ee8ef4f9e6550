//! # Event Payloads
//!
//! Every event type carries exactly one payload kind. The structs here are
//! the in-memory form; their `serde` representation is the flat JSON object
//! used on the remote transport (missing numeric fields decode as 0).
//!
//! ## Wire conventions
//!
//! - MAC addresses travel as 48-bit integers ([`MacAddr`]).
//! - Packet bytes travel as standard base64, `"None"` when empty.
//! - Action lists travel as `"type:value,type:value"`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of actions carried by a packet-out or flow.
pub const MAX_ACTIONS: usize = 8;

/// Maximum number of bytes kept from a datapath packet.
pub const MAX_PKT_SIZE: usize = 1514;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 48-bit MAC address stored in the low bits of a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddr(pub u64);

impl MacAddr {
    /// Build from the six address octets, most significant first.
    #[must_use]
    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(
            octets
                .iter()
                .fold(0u64, |acc, octet| (acc << 8) | u64::from(*octet)),
        )
    }

    /// The six address octets, most significant first.
    #[must_use]
    pub fn octets(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (self.0 >> (8 * (5 - i))) as u8;
        }
        out
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Protocol bits carried in packet-in `proto` and in policy entries.
pub mod proto {
    pub const VLAN: u16 = 1 << 0;
    pub const ARP: u16 = 1 << 1;
    pub const LLDP: u16 = 1 << 2;
    pub const IPV4: u16 = 1 << 3;
    pub const TCP: u16 = 1 << 4;
    pub const UDP: u16 = 1 << 5;
    pub const ICMP: u16 = 1 << 6;
    pub const UNKNOWN: u16 = 1 << 7;
    pub const DHCP: u16 = 1 << 8;
}

// =============================================================================
// ACTIONS
// =============================================================================

/// Datapath action kinds, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ActionType {
    Discard = 0,
    Output = 1,
    SetVlanVid = 2,
    SetVlanPcp = 4,
    StripVlan = 8,
    SetSrcMac = 16,
    SetDstMac = 32,
    SetSrcIp = 64,
    SetDstIp = 128,
    SetIpTos = 256,
    SetSrcPort = 512,
    SetDstPort = 1024,
}

impl ActionType {
    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => ActionType::Discard,
            1 => ActionType::Output,
            2 => ActionType::SetVlanVid,
            4 => ActionType::SetVlanPcp,
            8 => ActionType::StripVlan,
            16 => ActionType::SetSrcMac,
            32 => ActionType::SetDstMac,
            64 => ActionType::SetSrcIp,
            128 => ActionType::SetDstIp,
            256 => ActionType::SetIpTos,
            512 => ActionType::SetSrcPort,
            1024 => ActionType::SetDstPort,
            _ => return None,
        })
    }
}

/// One datapath action. `value` holds the port, VLAN, MAC integer, IP
/// address or ToS depending on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionType,
    pub value: u64,
}

impl Action {
    #[must_use]
    pub fn new(kind: ActionType, value: u64) -> Self {
        Self { kind, value }
    }

    /// Shorthand for an output action.
    #[must_use]
    pub fn output(port: u16) -> Self {
        Self::new(ActionType::Output, u64::from(port))
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Raw switch-protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMsg {
    pub fd: u32,
    pub length: u16,
    #[serde(with = "packet_data")]
    pub data: Vec<u8>,
}

/// Switch description.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Switch {
    pub dpid: u64,
    pub fd: u32,
    pub xid: u32,
    pub remote: u32,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: u32,
    pub actions: u32,
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

/// Port description and counters. `next_dpid`/`next_port` describe the far
/// end of a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    pub dpid: u64,
    pub port: u32,
    pub hw_addr: MacAddr,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub next_dpid: u64,
    pub next_port: u32,
    pub remote: u32,
}

/// Host attachment point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub dpid: u64,
    pub port: u32,
    pub mac: MacAddr,
    pub ip: u32,
    pub remote: u32,
}

/// Packet received from a datapath.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PktIn {
    pub dpid: u64,
    pub port: u32,
    pub xid: u32,
    pub buffer_id: u32,
    pub reason: u8,
    pub proto: u16,
    pub vlan_id: u16,
    pub vlan_pcp: u8,
    pub ip_tos: u8,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub total_len: u16,
    #[serde(with = "packet_data")]
    pub data: Vec<u8>,
}

/// Packet sent to a datapath.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PktOut {
    pub dpid: u64,
    pub port: u32,
    pub xid: u32,
    pub buffer_id: u32,
    pub total_len: u16,
    #[serde(with = "packet_data")]
    pub data: Vec<u8>,
    #[serde(with = "action_list")]
    pub actions: Vec<Action>,
}

impl PktOut {
    /// Start a packet-out answering `pktin`.
    #[must_use]
    pub fn reply_to(pktin: &PktIn) -> Self {
        Self {
            dpid: pktin.dpid,
            port: pktin.port,
            xid: pktin.xid,
            buffer_id: pktin.buffer_id,
            ..Self::default()
        }
    }
}

/// Flow entry (match, actions and statistics).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Flow {
    pub dpid: u64,
    pub port: u32,
    pub xid: u32,
    pub cookie: u64,
    pub buffer_id: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub flags: u16,
    pub reason: u8,
    pub wildcards: u32,
    pub proto: u16,
    pub vlan_id: u16,
    pub vlan_pcp: u8,
    pub ip_tos: u8,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub pkt_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
    #[serde(with = "action_list")]
    pub actions: Vec<Action>,
}

/// Controller resource usage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub cpu: f64,
    pub mem: f64,
}

/// Control-channel traffic counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Traffic {
    pub in_pkt_cnt: u64,
    pub in_byte_cnt: u64,
    pub out_pkt_cnt: u64,
    pub out_byte_cnt: u64,
}

/// Log text payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMsg {
    pub msg: String,
}

// =============================================================================
// PAYLOAD UNION
// =============================================================================

/// Discriminant of [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Raw,
    Switch,
    Port,
    Host,
    PktIn,
    PktOut,
    Flow,
    Resource,
    Traffic,
    Log,
}

impl PayloadKind {
    /// Whether the policy filter applies to payloads of this kind.
    #[must_use]
    pub fn is_filterable(self) -> bool {
        matches!(
            self,
            PayloadKind::Switch
                | PayloadKind::Port
                | PayloadKind::Host
                | PayloadKind::PktIn
                | PayloadKind::PktOut
                | PayloadKind::Flow
        )
    }
}

/// The single payload slot of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Raw(RawMsg),
    Switch(Switch),
    Port(Port),
    Host(Host),
    PktIn(PktIn),
    PktOut(PktOut),
    Flow(Flow),
    Resource(Resource),
    Traffic(Traffic),
    Log(String),
}

impl EventPayload {
    #[must_use]
    pub fn kind(&self) -> PayloadKind {
        match self {
            EventPayload::Raw(_) => PayloadKind::Raw,
            EventPayload::Switch(_) => PayloadKind::Switch,
            EventPayload::Port(_) => PayloadKind::Port,
            EventPayload::Host(_) => PayloadKind::Host,
            EventPayload::PktIn(_) => PayloadKind::PktIn,
            EventPayload::PktOut(_) => PayloadKind::PktOut,
            EventPayload::Flow(_) => PayloadKind::Flow,
            EventPayload::Resource(_) => PayloadKind::Resource,
            EventPayload::Traffic(_) => PayloadKind::Traffic,
            EventPayload::Log(_) => PayloadKind::Log,
        }
    }

    /// A zeroed payload of the given kind.
    #[must_use]
    pub fn empty(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Raw => EventPayload::Raw(RawMsg::default()),
            PayloadKind::Switch => EventPayload::Switch(Switch::default()),
            PayloadKind::Port => EventPayload::Port(Port::default()),
            PayloadKind::Host => EventPayload::Host(Host::default()),
            PayloadKind::PktIn => EventPayload::PktIn(PktIn::default()),
            PayloadKind::PktOut => EventPayload::PktOut(PktOut::default()),
            PayloadKind::Flow => EventPayload::Flow(Flow::default()),
            PayloadKind::Resource => EventPayload::Resource(Resource::default()),
            PayloadKind::Traffic => EventPayload::Traffic(Traffic::default()),
            PayloadKind::Log => EventPayload::Log(String::new()),
        }
    }

    /// Datapath id and port used by the policy filter, for kinds that carry
    /// them.
    #[must_use]
    pub fn location(&self) -> Option<(u64, u32)> {
        match self {
            EventPayload::Switch(p) => Some((p.dpid, 0)),
            EventPayload::Port(p) => Some((p.dpid, p.port)),
            EventPayload::Host(p) => Some((p.dpid, p.port)),
            EventPayload::PktIn(p) => Some((p.dpid, p.port)),
            EventPayload::PktOut(p) => Some((p.dpid, p.port)),
            EventPayload::Flow(p) => Some((p.dpid, p.port)),
            _ => None,
        }
    }

    /// Approximate encoded size, recorded in the envelope header.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            EventPayload::Raw(p) => p.data.len(),
            EventPayload::PktIn(p) => std::mem::size_of::<PktIn>() + p.data.len(),
            EventPayload::PktOut(p) => {
                std::mem::size_of::<PktOut>()
                    + p.data.len()
                    + p.actions.len() * std::mem::size_of::<Action>()
            }
            EventPayload::Flow(p) => {
                std::mem::size_of::<Flow>() + p.actions.len() * std::mem::size_of::<Action>()
            }
            EventPayload::Switch(_) => std::mem::size_of::<Switch>(),
            EventPayload::Port(_) => std::mem::size_of::<Port>(),
            EventPayload::Host(_) => std::mem::size_of::<Host>(),
            EventPayload::Resource(_) => std::mem::size_of::<Resource>(),
            EventPayload::Traffic(_) => std::mem::size_of::<Traffic>(),
            EventPayload::Log(s) => s.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! payload_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for EventPayload {
                fn from(value: $ty) -> Self {
                    EventPayload::$variant(value)
                }
            }

            impl TryFrom<EventPayload> for $ty {
                type Error = EventPayload;

                fn try_from(value: EventPayload) -> Result<Self, Self::Error> {
                    match value {
                        EventPayload::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

payload_from!(
    RawMsg => Raw,
    Switch => Switch,
    Port => Port,
    Host => Host,
    PktIn => PktIn,
    PktOut => PktOut,
    Flow => Flow,
    Resource => Resource,
    Traffic => Traffic,
    String => Log,
);

// =============================================================================
// SERDE HELPERS
// =============================================================================

/// Packet bytes as base64 text, `"None"` when empty.
mod packet_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        if data.is_empty() {
            s.serialize_str("None")
        } else {
            s.serialize_str(&STANDARD.encode(data))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        if text.is_empty() || text == "None" {
            return Ok(Vec::new());
        }
        let mut bytes = STANDARD.decode(text.as_bytes()).map_err(de::Error::custom)?;
        bytes.truncate(super::MAX_PKT_SIZE);
        Ok(bytes)
    }
}

/// Action lists as `"type:value,type:value"`.
mod action_list {
    use super::{Action, ActionType, MAX_ACTIONS};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(actions: &[Action], s: S) -> Result<S::Ok, S::Error> {
        let text = actions
            .iter()
            .map(|a| format!("{}:{}", a.kind as u16, a.value))
            .collect::<Vec<_>>()
            .join(",");
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Action>, D::Error> {
        let text = String::deserialize(d)?;
        let mut actions = Vec::new();
        for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if actions.len() == MAX_ACTIONS {
                return Err(de::Error::custom(format!(
                    "more than {MAX_ACTIONS} actions"
                )));
            }
            let (code, value) = item
                .split_once(':')
                .ok_or_else(|| de::Error::custom(format!("malformed action '{item}'")))?;
            let code: u16 = code.trim().parse().map_err(de::Error::custom)?;
            let kind = ActionType::from_code(code)
                .ok_or_else(|| de::Error::custom(format!("unknown action type {code}")))?;
            let value: u64 = value.trim().parse().map_err(de::Error::custom)?;
            actions.push(Action::new(kind, value));
        }
        Ok(actions)
    }
}
