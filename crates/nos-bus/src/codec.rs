//! # Record Codec
//!
//! Remote peers exchange flat JSON objects, one per line:
//!
//! ```text
//! {"id": 153576300, "type": 2, "dpid": 1, "port": 3, ..., "data": "3q2+7w=="}
//! ```
//!
//! `id` is the publisher, `type` the wire event id; payload fields follow.
//! Replies add `"return"`. Handshakes use the reply channel and are
//! prefixed with `#`.

use crate::error::{CodecError, HandshakeError};
use nos_types::{EventKind, EventPayload, LogMsg, PayloadKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// First character of handshake records.
pub const HANDSHAKE_PREFIX: char = '#';

/// Identity a remote peer presents on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub id: u32,
    pub name: String,
}

/// A decoded event record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<K> {
    pub publisher: u32,
    pub event: K,
    pub payload: EventPayload,
}

fn payload_fields(payload: &EventPayload) -> Result<Map<String, Value>, CodecError> {
    let value = match payload {
        EventPayload::Raw(p) => serde_json::to_value(p)?,
        EventPayload::Switch(p) => serde_json::to_value(p)?,
        EventPayload::Port(p) => serde_json::to_value(p)?,
        EventPayload::Host(p) => serde_json::to_value(p)?,
        EventPayload::PktIn(p) => serde_json::to_value(p)?,
        EventPayload::PktOut(p) => serde_json::to_value(p)?,
        EventPayload::Flow(p) => serde_json::to_value(p)?,
        EventPayload::Resource(p) => serde_json::to_value(p)?,
        EventPayload::Traffic(p) => serde_json::to_value(p)?,
        EventPayload::Log(msg) => json!({ "msg": msg }),
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject),
    }
}

/// Decode the payload fields of `record` as `kind`. Unrelated keys are
/// ignored and missing ones default to zero.
pub fn decode_payload(kind: PayloadKind, record: &Map<String, Value>) -> Result<EventPayload, CodecError> {
    let value = Value::Object(record.clone());
    Ok(match kind {
        PayloadKind::Raw => EventPayload::Raw(serde_json::from_value(value)?),
        PayloadKind::Switch => EventPayload::Switch(serde_json::from_value(value)?),
        PayloadKind::Port => EventPayload::Port(serde_json::from_value(value)?),
        PayloadKind::Host => EventPayload::Host(serde_json::from_value(value)?),
        PayloadKind::PktIn => EventPayload::PktIn(serde_json::from_value(value)?),
        PayloadKind::PktOut => EventPayload::PktOut(serde_json::from_value(value)?),
        PayloadKind::Flow => EventPayload::Flow(serde_json::from_value(value)?),
        PayloadKind::Resource => EventPayload::Resource(serde_json::from_value(value)?),
        PayloadKind::Traffic => EventPayload::Traffic(serde_json::from_value(value)?),
        PayloadKind::Log => EventPayload::Log(serde_json::from_value::<LogMsg>(value)?.msg),
    })
}

fn parse_object(line: &str) -> Result<Map<String, Value>, CodecError> {
    match serde_json::from_str::<Value>(line.trim())? {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject),
    }
}

fn int_field(map: &Map<String, Value>, key: &'static str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

/// Encode an event record.
pub fn encode_event<K: EventKind>(
    publisher: u32,
    event: K,
    payload: &EventPayload,
) -> Result<String, CodecError> {
    let mut map = payload_fields(payload)?;
    map.insert("id".into(), json!(publisher));
    map.insert("type".into(), json!(event.id()));
    Ok(Value::Object(map).to_string())
}

/// Decode an event record. Zero publisher ids and unknown types are
/// rejected.
pub fn decode_event<K: EventKind>(line: &str) -> Result<EventRecord<K>, CodecError> {
    let map = parse_object(line)?;

    let publisher = map
        .get("id")
        .and_then(Value::as_u64)
        .ok_or(CodecError::MissingField("id"))?;
    if publisher == 0 {
        return Err(CodecError::ZeroId);
    }
    let publisher = u32::try_from(publisher).map_err(|_| CodecError::MissingField("id"))?;

    let raw_type = map
        .get("type")
        .and_then(Value::as_u64)
        .ok_or(CodecError::MissingField("type"))?;
    let event = u16::try_from(raw_type)
        .ok()
        .and_then(K::from_id)
        .ok_or(CodecError::UnknownEvent(raw_type))?;

    let payload = decode_payload(event.payload_kind(), &map)?;
    Ok(EventRecord {
        publisher,
        event,
        payload,
    })
}

/// Encode a reply record: the (possibly modified) payload plus `return`.
/// Without a payload only `return` is sent.
pub fn encode_reply<K: EventKind>(
    publisher: u32,
    event: K,
    payload: Option<&EventPayload>,
    ret: i32,
) -> Result<String, CodecError> {
    let mut map = match payload {
        Some(payload) => {
            let mut map = payload_fields(payload)?;
            map.insert("id".into(), json!(publisher));
            map.insert("type".into(), json!(event.id()));
            map
        }
        None => Map::new(),
    };
    map.insert("return".into(), json!(ret));
    Ok(Value::Object(map).to_string())
}

/// Reply carrying only a failure code.
#[must_use]
pub fn encode_failure() -> String {
    json!({ "return": -1 }).to_string()
}

/// Decode a reply. Returns the `return` code (0 if absent) and the payload
/// decoded as `kind`.
pub fn decode_reply(kind: PayloadKind, line: &str) -> Result<(i32, EventPayload), CodecError> {
    let map = parse_object(line)?;
    let ret = int_field(&map, "return").unwrap_or(0) as i32;
    let payload = decode_payload(kind, &map)?;
    Ok((ret, payload))
}

/// Whether a line is a handshake record.
#[must_use]
pub fn is_handshake(line: &str) -> bool {
    line.trim_start().starts_with(HANDSHAKE_PREFIX)
}

pub fn encode_handshake(handshake: &Handshake) -> Result<String, CodecError> {
    Ok(format!("{HANDSHAKE_PREFIX}{}", serde_json::to_string(handshake)?))
}

pub fn decode_handshake(line: &str) -> Result<Handshake, HandshakeError> {
    let body = line
        .trim()
        .strip_prefix(HANDSHAKE_PREFIX)
        .ok_or(HandshakeError::Malformed)?;
    serde_json::from_str(body).map_err(|_| HandshakeError::Malformed)
}

#[must_use]
pub fn encode_handshake_reply(accepted: bool) -> String {
    let ret = if accepted { 0 } else { -1 };
    format!("{HANDSHAKE_PREFIX}{}", json!({ "return": ret }))
}

pub fn decode_handshake_reply(line: &str) -> Result<i32, CodecError> {
    let body = line
        .trim()
        .strip_prefix(HANDSHAKE_PREFIX)
        .ok_or(CodecError::NotAnObject)?;
    let map = parse_object(body)?;
    Ok(int_field(&map, "return").unwrap_or(0) as i32)
}
