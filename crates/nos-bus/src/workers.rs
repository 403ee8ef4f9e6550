//! # Inbound Workers
//!
//! Two accept loops per engine:
//!
//! - **pull**: remote peers push event records; each one is re-dispatched
//!   and nothing is sent back;
//! - **reply**: remote peers send a handshake or an event record and wait
//!   for exactly one reply record.
//!
//! Each accepted connection is served on its own thread, at most
//! `max_connections` per endpoint. Reads time out every `recv_timeout` so
//! the threads notice engine shutdown; the accept loop joins them before it
//! exits.

use crate::codec;
use crate::engine::EventEngine;
use crate::error::TransportError;
use crate::transport::{decode_line, write_record};
use nos_types::EventKind;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Bind a nonblocking listener on `addr`.
pub(crate) fn bind(addr: &str) -> Result<TcpListener, TransportError> {
    let listener = TcpListener::bind(addr).map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Pull,
    Reply,
}

impl Channel {
    fn label(self) -> &'static str {
        match self {
            Channel::Pull => "pull",
            Channel::Reply => "reply",
        }
    }
}

pub(crate) fn spawn_pull<K: EventKind>(
    engine: Arc<EventEngine<K>>,
    listener: TcpListener,
) -> io::Result<JoinHandle<()>> {
    spawn_acceptor(engine, listener, Channel::Pull)
}

pub(crate) fn spawn_reply<K: EventKind>(
    engine: Arc<EventEngine<K>>,
    listener: TcpListener,
) -> io::Result<JoinHandle<()>> {
    spawn_acceptor(engine, listener, Channel::Reply)
}

fn spawn_acceptor<K: EventKind>(
    engine: Arc<EventEngine<K>>,
    listener: TcpListener,
    channel: Channel,
) -> io::Result<JoinHandle<()>> {
    let local = listener.local_addr()?;
    thread::Builder::new()
        .name(format!("{}-{}", K::CLASS.tag(), channel.label()))
        .spawn(move || {
            info!("[{}] {} endpoint listening on {}", K::CLASS.tag(), channel.label(), local);
            let mut connections: Vec<JoinHandle<()>> = Vec::new();
            while engine.is_running() {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        connections.retain(|c| !c.is_finished());
                        let limit = engine.config().max_connections;
                        if connections.len() >= limit {
                            warn!(
                                "[{}] {} endpoint at {} connections, refusing {}",
                                K::CLASS.tag(),
                                channel.label(),
                                limit,
                                peer
                            );
                            drop(stream);
                            continue;
                        }
                        let worker = Arc::clone(&engine);
                        let spawned = thread::Builder::new()
                            .name(format!("{}-{}-conn", K::CLASS.tag(), channel.label()))
                            .spawn(move || serve(&worker, stream, peer, channel));
                        match spawned {
                            Ok(handle) => connections.push(handle),
                            Err(e) => warn!("[{}] Cannot serve {}: {}", K::CLASS.tag(), peer, e),
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                    Err(e) => {
                        warn!("[{}] {} accept failed: {}", K::CLASS.tag(), channel.label(), e);
                        thread::sleep(ACCEPT_POLL);
                    }
                }
            }
            // Connection threads stop at their next read timeout.
            for handle in connections {
                let _ = handle.join();
            }
            debug!("[{}] {} endpoint closed", K::CLASS.tag(), channel.label());
        })
}

/// Reads newline-terminated records, keeping partial lines across read
/// timeouts. Bytes are only decoded once the line is complete.
struct RecordReader {
    reader: BufReader<TcpStream>,
    pending: Vec<u8>,
}

#[derive(Debug, PartialEq)]
enum Read {
    Record(String),
    Malformed,
    Idle,
    Closed,
}

impl RecordReader {
    fn new(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(stream),
            pending: Vec::new(),
        }
    }

    fn next(&mut self) -> io::Result<Read> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Ok(Read::Closed),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = std::mem::take(&mut self.pending);
                Ok(decode_line(line).map_or(Read::Malformed, Read::Record))
            }
            // EOF in the middle of a record.
            Ok(_) => Ok(Read::Closed),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Read::Idle)
            }
            Err(e) => Err(e),
        }
    }
}

fn serve<K: EventKind>(engine: &EventEngine<K>, stream: TcpStream, peer: SocketAddr, channel: Channel) {
    let setup = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(engine.config().recv_timeout)))
        .and_then(|()| stream.try_clone());
    let mut writer = match setup {
        Ok(writer) => writer,
        Err(e) => {
            warn!("[{}] Cannot configure connection from {}: {}", K::CLASS.tag(), peer, e);
            return;
        }
    };
    debug!("[{}] {} connection from {}", K::CLASS.tag(), channel.label(), peer);

    let mut reader = RecordReader::new(stream);
    while engine.is_running() {
        let line = match reader.next() {
            Ok(Read::Record(line)) => line,
            Ok(Read::Idle) => continue,
            Ok(Read::Closed) => break,
            Ok(Read::Malformed) => {
                debug!("[{}] Dropping non-UTF-8 record from {}", K::CLASS.tag(), peer);
                if let Channel::Reply = channel {
                    if write_record(&mut writer, &codec::encode_failure()).is_err() {
                        break;
                    }
                }
                continue;
            }
            Err(e) => {
                debug!("[{}] Read from {} failed: {}", K::CLASS.tag(), peer, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match channel {
            Channel::Pull => handle_pull(engine, &line),
            Channel::Reply => {
                let reply = handle_request(engine, &line);
                if let Err(e) = write_record(&mut writer, &reply) {
                    debug!("[{}] Reply to {} failed: {}", K::CLASS.tag(), peer, e);
                    break;
                }
            }
        }
    }
    debug!("[{}] {} connection from {} closed", K::CLASS.tag(), channel.label(), peer);
}

/// Re-dispatch a pushed record. Malformed records are dropped.
pub(crate) fn handle_pull<K: EventKind>(engine: &EventEngine<K>, line: &str) {
    let record = match codec::decode_event::<K>(line) {
        Ok(record) => record,
        Err(e) => {
            debug!("[{}] Dropping pushed record: {}", K::CLASS.tag(), e);
            return;
        }
    };
    let (publisher, event) = (record.publisher, record.event);
    if let Err(e) = engine.raise(publisher, event, record.payload) {
        debug!(publisher, event = %event, "[{}] Pushed record not dispatched: {}", K::CLASS.tag(), e);
    }
}

/// Answer one record received on the reply channel.
pub(crate) fn handle_request<K: EventKind>(engine: &EventEngine<K>, line: &str) -> String {
    if codec::is_handshake(line) {
        let accepted = codec::decode_handshake(line)
            .map_err(|e| {
                warn!("[{}] Handshake rejected: {}", K::CLASS.tag(), e);
                e
            })
            .and_then(|hs| engine.handshake(&hs))
            .is_ok();
        return codec::encode_handshake_reply(accepted);
    }

    let record = match codec::decode_event::<K>(line) {
        Ok(record) => record,
        Err(e) => {
            debug!("[{}] Dropping request record: {}", K::CLASS.tag(), e);
            return codec::encode_failure();
        }
    };
    let (publisher, event) = (record.publisher, record.event);
    match engine.dispatch_record(record) {
        Ok((ret, payload)) => codec::encode_reply(publisher, event, Some(&payload), ret)
            .unwrap_or_else(|e| {
                warn!("[{}] Cannot encode reply for {}: {}", K::CLASS.tag(), event, e);
                codec::encode_failure()
            }),
        Err(e) => {
            debug!(publisher, event = %event, "[{}] Request not dispatched: {}", K::CLASS.tag(), e);
            codec::encode_reply::<K>(publisher, event, None, e.code())
                .unwrap_or_else(|_| codec::encode_failure())
        }
    }
}
