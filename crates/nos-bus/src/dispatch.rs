//! # Dispatch Loops
//!
//! Both loops walk the registry order for the event type on the caller's
//! thread and share one envelope across deliveries.
//!
//! ## Notify
//!
//! ```text
//! for each subscriber:
//!     skip unless activated
//!     remember it if Security-Extended (guaranteed subscriber)
//!     skip if its policies exclude the payload
//!     deliver; stop on veto
//!     redeliver to the guaranteed subscriber (unless it is this one)
//! ```
//!
//! ## Request-Response
//!
//! Every activated subscriber gets the mutable view, no policy filter.
//!
//! A veto is a non-zero return from a subscriber holding Execute on the
//! event. Transport failures are never vetoes: the remote subscriber is
//! deactivated and the delivery reports -1. A call cut short because the
//! endpoint was released (deactivation, reconnect) also reports -1 but
//! leaves the subscriber's state to whoever released it.

use crate::codec;
use crate::envelope::{Envelope, EventView};
use crate::error::TransportError;
use crate::odp;
use crate::registry::{Registry, Subscriber};
use crate::transport::{Connector, RemoteEndpoint};
use nos_types::{EventKind, Permission, Role};
use std::sync::Arc;
use tracing::{debug, warn};

/// Code reported for a failed remote delivery.
pub const TRANSPORT_FAILURE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Notify,
    RequestResponse,
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    code: i32,
    veto: bool,
}

/// Push or round trip. `None` for a push.
fn exchange(
    endpoint: &mut dyn RemoteEndpoint,
    record: &str,
    round_trip: bool,
) -> Result<Option<String>, TransportError> {
    if round_trip {
        endpoint.request(record).map(Some)
    } else {
        endpoint.push(record).map(|()| None)
    }
}

fn remote_call<K: EventKind>(
    sub: &Subscriber<K>,
    env: &mut Envelope<K>,
    connector: &dyn Connector,
    round_trip: bool,
    copy_back: bool,
) -> Result<i32, TransportError> {
    let event = env.event();
    let record = codec::encode_event(env.publisher(), event, &env.payload)?;

    let mut lease =
        sub.lease_endpoint(|| connector.connect(&sub.name, sub.push_addr(), sub.req_addr()))?;
    let result = exchange(lease.endpoint()?, &record, round_trip);
    let reply = match result {
        Ok(reply) => reply,
        Err(_) if lease.is_released() => return Err(TransportError::Released),
        Err(e) => return Err(e),
    };
    drop(lease);
    let Some(reply) = reply else {
        return Ok(0);
    };

    let (ret, payload) = codec::decode_reply(event.payload_kind(), &reply)?;
    if copy_back {
        env.payload = payload;
    }
    Ok(ret)
}

fn deliver<K: EventKind>(
    sub: &Subscriber<K>,
    env: &mut Envelope<K>,
    connector: &dyn Connector,
    mode: Mode,
) -> Delivery {
    let event = env.event();
    let perm = sub.inbound_perm(event).unwrap_or(Permission::NONE);
    let writable = mode == Mode::RequestResponse || perm.can_write();

    sub.count(event);

    let code = match sub.handler() {
        Some(handler) => {
            let code = if writable {
                handler.handle(EventView::Writable(env))
            } else {
                handler.handle(EventView::ReadOnly(env))
            };
            if writable && mode == Mode::Notify {
                env.header.checksum = 0;
            }
            code
        }
        None => {
            let round_trip = writable || perm.can_execute();
            match remote_call(sub, env, connector, round_trip, writable) {
                Ok(code) => code,
                Err(TransportError::Released) => {
                    debug!(
                        subscriber = %sub.name,
                        event = %event,
                        "[{}] Remote delivery aborted, endpoint released",
                        K::CLASS.tag()
                    );
                    return Delivery {
                        code: TRANSPORT_FAILURE,
                        veto: false,
                    };
                }
                Err(e) => {
                    warn!(
                        subscriber = %sub.name,
                        event = %event,
                        error = %e,
                        "[{}] Remote delivery failed, deactivating",
                        K::CLASS.tag()
                    );
                    sub.deactivate();
                    return Delivery {
                        code: TRANSPORT_FAILURE,
                        veto: false,
                    };
                }
            }
        }
    };

    let veto = code != 0 && perm.can_execute();
    debug!(
        subscriber = %sub.name,
        event = %event,
        code,
        veto,
        writable,
        "[{}] delivered",
        K::CLASS.tag()
    );
    Delivery { code, veto }
}

/// Notify Dispatch. Returns the code of the last delivery, 0 if none.
pub fn notify<K: EventKind>(
    registry: &Registry<K>,
    connector: &dyn Connector,
    env: &mut Envelope<K>,
) -> i32 {
    let event = env.event();
    let mut guaranteed: Option<&Arc<Subscriber<K>>> = None;
    let mut last = 0;

    for sub in registry.subscribers_of(event) {
        if !sub.is_activated() {
            continue;
        }
        if sub.role == Role::SecurityV2 {
            guaranteed = Some(sub);
        }
        if !odp::admits(&sub.policies(), &env.payload) {
            continue;
        }

        let delivery = deliver(sub, env, connector, Mode::Notify);
        last = delivery.code;
        if delivery.veto {
            debug!(subscriber = %sub.name, event = %event, "[{}] vetoed", K::CLASS.tag());
            break;
        }

        let Some(g) = guaranteed else { continue };
        if Arc::ptr_eq(g, sub) {
            continue;
        }
        if !g.is_activated() {
            guaranteed = None;
            continue;
        }
        let delivery = deliver(g, env, connector, Mode::Notify);
        last = delivery.code;
        if delivery.veto {
            debug!(subscriber = %g.name, event = %event, "[{}] vetoed", K::CLASS.tag());
            break;
        }
    }
    last
}

/// Request-Response Dispatch. Returns the code of the last delivery, 0 if
/// none.
pub fn request_response<K: EventKind>(
    registry: &Registry<K>,
    connector: &dyn Connector,
    env: &mut Envelope<K>,
) -> i32 {
    let event = env.event();
    let mut last = 0;
    for sub in registry.subscribers_of(event) {
        if !sub.is_activated() {
            continue;
        }
        let delivery = deliver(sub, env, connector, Mode::RequestResponse);
        last = delivery.code;
        if delivery.veto {
            debug!(subscriber = %sub.name, event = %event, "[{}] vetoed", K::CLASS.tag());
            break;
        }
    }
    last
}
