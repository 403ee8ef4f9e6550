//! # Remote Transport
//!
//! Remote subscribers are reached over TCP with newline-delimited records.
//! Each remote subscriber exposes two endpoints of its own:
//!
//! - **push**: fire-and-forget records, no reply;
//! - **request**: one record out, one reply record back.
//!
//! The dispatch loop only sees the [`RemoteEndpoint`] port, so tests and
//! alternative transports can be plugged in through a [`Connector`].
//!
//! A request blocks until the peer answers. [`Interrupter`] lets another
//! thread (deactivation, shutdown, a reconnecting peer) cut such a call
//! short by shutting the sockets down underneath it.

use crate::codec::{self, Handshake};
use crate::error::TransportError;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connection to one remote subscriber.
pub trait RemoteEndpoint: Send {
    /// Send a record without waiting for an answer.
    fn push(&mut self, record: &str) -> Result<(), TransportError>;

    /// Send a record and block until the reply record arrives.
    fn request(&mut self, record: &str) -> Result<String, TransportError>;

    /// Handle that aborts I/O in progress on this endpoint, if supported.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

/// Sockets currently open by one [`TcpEndpoint`], as clones.
#[derive(Default)]
struct OpenSockets {
    push: Option<TcpStream>,
    req: Option<TcpStream>,
}

/// Shuts down the sockets of an endpoint from any thread. Blocked reads and
/// writes on them return immediately with an error.
#[derive(Clone, Default)]
pub struct Interrupter(Arc<Mutex<OpenSockets>>);

impl Interrupter {
    pub fn interrupt(&self) {
        let sockets = self.0.lock();
        for stream in sockets.push.iter().chain(sockets.req.iter()) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Whether both handles refer to the same endpoint.
    #[must_use]
    pub fn same(&self, other: &Interrupter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter").finish_non_exhaustive()
    }
}

/// Creates endpoints for remote subscribers on first use.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        name: &str,
        push_addr: Option<&str>,
        req_addr: Option<&str>,
    ) -> Result<Box<dyn RemoteEndpoint>, TransportError>;
}

/// Write one record followed by a newline.
pub fn write_record<W: Write>(writer: &mut W, record: &str) -> Result<(), TransportError> {
    writer.write_all(record.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Turn one raw line into a record: strip the terminator, decode UTF-8.
pub fn decode_line(mut line: Vec<u8>) -> std::io::Result<String> {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    String::from_utf8(line)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Read one record. `Ok(None)` means the peer closed the connection.
pub fn read_record<R: BufRead>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    decode_line(line).map(Some)
}

fn open(addr: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    let connect_err = |source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    };
    let resolved = addr
        .to_socket_addrs()
        .map_err(connect_err)?
        .next()
        .ok_or_else(|| {
            connect_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address did not resolve",
            ))
        })?;
    let stream = TcpStream::connect_timeout(&resolved, timeout).map_err(connect_err)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

struct RequestChannel {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

/// TCP endpoint. Sockets are opened on first use and dropped on error, so
/// the next delivery reconnects.
pub struct TcpEndpoint {
    push_addr: Option<String>,
    req_addr: Option<String>,
    connect_timeout: Duration,
    push: Option<TcpStream>,
    req: Option<RequestChannel>,
    open: Interrupter,
}

impl TcpEndpoint {
    #[must_use]
    pub fn new(push_addr: Option<String>, req_addr: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            push_addr,
            req_addr,
            connect_timeout,
            push: None,
            req: None,
            open: Interrupter::default(),
        }
    }

    fn push_stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        if self.push.is_none() {
            let addr = self.push_addr.as_deref().ok_or(TransportError::NoAddress("push"))?;
            debug!(addr, "opening push channel");
            let stream = open(addr, self.connect_timeout)?;
            self.open.0.lock().push = Some(stream.try_clone()?);
            self.push = Some(stream);
        }
        self.push.as_mut().ok_or(TransportError::Closed)
    }

    fn request_channel(&mut self) -> Result<&mut RequestChannel, TransportError> {
        if self.req.is_none() {
            let addr = self.req_addr.as_deref().ok_or(TransportError::NoAddress("request"))?;
            debug!(addr, "opening request channel");
            let writer = open(addr, self.connect_timeout)?;
            let reader = BufReader::new(writer.try_clone()?);
            self.open.0.lock().req = Some(writer.try_clone()?);
            self.req = Some(RequestChannel { writer, reader });
        }
        self.req.as_mut().ok_or(TransportError::Closed)
    }
}

impl RemoteEndpoint for TcpEndpoint {
    fn push(&mut self, record: &str) -> Result<(), TransportError> {
        let result = self.push_stream().and_then(|s| write_record(s, record));
        if result.is_err() {
            self.push = None;
            self.open.0.lock().push = None;
        }
        result
    }

    fn request(&mut self, record: &str) -> Result<String, TransportError> {
        let result = self.request_channel().and_then(|ch| {
            write_record(&mut ch.writer, record)?;
            read_record(&mut ch.reader)?.ok_or(TransportError::Closed)
        });
        if result.is_err() {
            self.req = None;
            self.open.0.lock().req = None;
        }
        result
    }

    fn interrupter(&self) -> Option<Interrupter> {
        Some(self.open.clone())
    }
}

/// Connector producing [`TcpEndpoint`]s.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Connector for TcpConnector {
    fn connect(
        &self,
        _name: &str,
        push_addr: Option<&str>,
        req_addr: Option<&str>,
    ) -> Result<Box<dyn RemoteEndpoint>, TransportError> {
        Ok(Box::new(TcpEndpoint::new(
            push_addr.map(str::to_string),
            req_addr.map(str::to_string),
            self.connect_timeout,
        )))
    }
}

/// Present `id`/`name` to an engine's reply endpoint. Returns the engine's
/// verdict (0 accepted, -1 refused).
pub fn handshake(reply_addr: &str, id: u32, name: &str, timeout: Duration) -> Result<i32, TransportError> {
    let mut stream = open(reply_addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    let record = codec::encode_handshake(&Handshake {
        id,
        name: name.to_string(),
    })?;
    write_record(&mut stream, &record)?;
    let mut reader = BufReader::new(stream);
    let reply = read_record(&mut reader)?.ok_or(TransportError::Closed)?;
    Ok(codec::decode_handshake_reply(&reply)?)
}
