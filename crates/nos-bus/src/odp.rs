//! # Policy Filter
//!
//! Decides whether a subscriber's operator-defined policies admit an event.
//! Switch, port, host, packet-out and flow payloads are checked on datapath
//! id and port only; packet-in payloads are checked on every field.
//!
//! An entry matches when each of its enabled fields matches. A subscriber
//! with no entries sees everything; one with entries sees an event only if
//! some entry matches. Zero ends a value list.

use nos_types::{EventPayload, OdpEntry, OdpFlags, PktIn};

fn listed<T: Copy + Default + PartialEq>(values: &[T], pred: impl Fn(T) -> bool) -> bool {
    values
        .iter()
        .copied()
        .take_while(|v| *v != T::default())
        .any(pred)
}

/// Number of enabled fields and number of matching fields, for the
/// datapath-location fields only.
fn location_score(entry: &OdpEntry, dpid: u64, port: u32) -> (u32, u32) {
    let mut cnt = 0;
    let mut matched = 0;
    if entry.flags.has(OdpFlags::DPID) {
        cnt += 1;
        if listed(&entry.dpid, |d| d == dpid) {
            matched += 1;
        }
    }
    if entry.flags.has(OdpFlags::PORT) {
        cnt += 1;
        if listed(&entry.port, |p| p == port) {
            matched += 1;
        }
    }
    (cnt, matched)
}

fn matches_partial(entry: &OdpEntry, dpid: u64, port: u32) -> bool {
    let (cnt, matched) = location_score(entry, dpid, port);
    cnt == matched
}

fn matches_pktin(entry: &OdpEntry, pkt: &PktIn) -> bool {
    let (mut cnt, mut matched) = location_score(entry, pkt.dpid, pkt.port);
    let mut check = |bit: u16, hit: bool| {
        if entry.flags.has(bit) {
            cnt += 1;
            if hit {
                matched += 1;
            }
        }
    };

    check(OdpFlags::PROTO, entry.proto & pkt.proto != 0);
    check(OdpFlags::VLAN, listed(&entry.vlan, |v| v == pkt.vlan_id));
    check(OdpFlags::SRCIP, listed(&entry.srcip, |p| p & pkt.src_ip == p));
    check(OdpFlags::DSTIP, listed(&entry.dstip, |p| p & pkt.dst_ip == p));
    check(OdpFlags::SPORT, listed(&entry.sport, |p| p == pkt.src_port));
    check(OdpFlags::DPORT, listed(&entry.dport, |p| p == pkt.dst_port));

    cnt == matched
}

/// Whether `payload` passes `policies`.
#[must_use]
pub fn admits(policies: &[OdpEntry], payload: &EventPayload) -> bool {
    if policies.is_empty() || !payload.kind().is_filterable() {
        return true;
    }

    let mut active = policies.iter().take_while(|e| e.flags.0 != 0);
    match payload {
        EventPayload::PktIn(pkt) => active.any(|e| matches_pktin(e, pkt)),
        other => match other.location() {
            Some((dpid, port)) => active.any(|e| matches_partial(e, dpid, port)),
            None => true,
        },
    }
}
