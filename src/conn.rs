//! Command/response engine over a [`Transport`].
//!
//! Requests go out as CRLF-terminated lines. Responses are found by scanning
//! the receive stream for a [`Marker`]: anything before the marker is
//! unsolicited chatter and is dropped, and anything after the end of the
//! response stays buffered for the next wait.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, trace};
use thiserror::Error;

use crate::error::ProtocolError;
use crate::protocol::{Command, Extent, Marker};
use crate::transport::{RESPONSE_TIMEOUT, Transport};

/// Quiet period after which a text response with no line ending is taken as
/// complete.
pub const LINE_SETTLE: Duration = Duration::from_millis(100);

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Could not reach the device.
    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// No complete response within the allotted time.
    #[error("no response within {timeout:?}")]
    Timeout { timeout: Duration },

    /// Stream closed by the device.
    #[error("connection closed by device")]
    Disconnected,

    /// Response payload could not be decoded, or a request was rejected
    /// before sending.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Command/response engine. Synchronous and single-threaded; every wait is
/// bounded by an explicit deadline.
///
/// # Example
///
/// ```no_run
/// use minispec::protocol::{Command, Marker};
/// use minispec::transport::{SessionConfig, TlsTransport};
/// use minispec::Connection;
///
/// let transport = TlsTransport::connect("192.168.1.40", &SessionConfig::default())?;
/// let mut conn = Connection::new(transport);
/// let resp = conn.request(&Command::GetExposure)?;
/// println!("{}", minispec::protocol::exposure::decode(&resp)?);
/// # Ok::<(), minispec::ConnError>(())
/// ```
pub struct Connection<T: Transport> {
    transport: T,
    /// Received bytes not yet claimed by a response.
    pending: Vec<u8>,
    timeout: Duration,
}

impl<T: Transport> Connection<T> {
    /// Wrap a transport with the default response timeout.
    pub fn new(transport: T) -> Self {
        Self::with_timeout(transport, RESPONSE_TIMEOUT)
    }

    pub fn with_timeout(transport: T, timeout: Duration) -> Self {
        Self { transport, pending: Vec::new(), timeout }
    }

    /// Response timeout used by [`request`](Self::request).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send a command line.
    pub fn send(&mut self, cmd: &Command) -> Result<(), ConnError> {
        debug!("-> {cmd}");
        self.send_raw(&cmd.encode())
    }

    /// Send pre-encoded bytes verbatim.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        self.transport.send(bytes)?;
        Ok(())
    }

    /// Send `cmd` and wait for its response with the connection timeout.
    ///
    /// Commands without a response return an empty vector without waiting.
    pub fn request(&mut self, cmd: &Command) -> Result<Vec<u8>, ConnError> {
        self.send(cmd)?;
        match cmd.response() {
            Some(marker) => self.await_response(Some(marker), marker.buffer_size(), self.timeout),
            None => Ok(Vec::new()),
        }
    }

    /// Wait for a response.
    ///
    /// With `marker == None` the first data received (or already buffered) is
    /// returned as is. With a marker, reads continue until the marker and the
    /// rest of its response ([`Marker::extent`]) have arrived; the returned
    /// bytes start at the marker. Each read asks for at most `buffer_size`
    /// bytes. Both paths fail with [`ConnError::Timeout`] once `timeout` has
    /// elapsed from entry.
    ///
    /// A text response ends at its CR/LF. If the line has no ending, it is
    /// only taken once [`LINE_SETTLE`] passes with nothing more arriving, and
    /// that quiet period must fit before the deadline.
    pub fn await_response(
        &mut self,
        marker: Option<Marker>,
        buffer_size: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, ConnError> {
        let deadline = Instant::now() + timeout;

        let Some(marker) = marker else {
            if !self.pending.is_empty() {
                return Ok(std::mem::take(&mut self.pending));
            }
            return self.read_chunk(buffer_size, deadline, timeout);
        };

        let mut settled = false;
        loop {
            if let Some(resp) = self.take_response(marker, settled) {
                debug!("<- {marker} ({}B)", resp.len());
                return Ok(resp);
            }
            let settle_until = Instant::now() + LINE_SETTLE;
            if self.holds_partial_line(marker) && settle_until < deadline {
                match self.read_chunk(buffer_size, settle_until, timeout) {
                    Ok(chunk) => self.pending.extend_from_slice(&chunk),
                    Err(ConnError::Timeout { .. }) => settled = true,
                    Err(e) => return Err(e),
                }
                continue;
            }
            let chunk = self.read_chunk(buffer_size, deadline, timeout)?;
            self.pending.extend_from_slice(&chunk);
        }
    }

    /// The peer address of the underlying stream.
    pub fn peer_addr(&self) -> Result<SocketAddr, ConnError> {
        Ok(self.transport.peer_addr()?)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the transport. Consumes the connection.
    pub fn close(mut self) -> Result<(), ConnError> {
        self.transport.close()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// One read bounded by the time left until `deadline`.
    fn read_chunk(
        &mut self,
        buffer_size: usize,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Vec<u8>, ConnError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnError::Timeout { timeout });
            }
            match self.transport.recv(buffer_size, remaining) {
                Ok(chunk) if chunk.is_empty() => return Err(ConnError::Disconnected),
                Ok(chunk) => {
                    trace!("read {}B", chunk.len());
                    return Ok(chunk);
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// `pending` starts with `marker` and some unterminated text after it.
    fn holds_partial_line(&self, marker: Marker) -> bool {
        marker.extent() == Extent::Line
            && self.pending.len() > marker.prefix_len()
            && self.pending.starts_with(marker.as_bytes())
    }

    /// Extract a complete `marker` response from `pending`, if one is there.
    ///
    /// Without a match, everything but a possible partial marker at the tail
    /// is discarded. An unterminated line counts as complete only when
    /// `settled`.
    fn take_response(&mut self, marker: Marker, settled: bool) -> Option<Vec<u8>> {
        let needle = marker.as_bytes();
        let Some(start) = find(&self.pending, needle) else {
            let keep = (needle.len() - 1).min(self.pending.len());
            let excess = self.pending.len() - keep;
            if excess > 0 {
                trace!("discarding {excess}B while waiting for {marker}");
                self.pending.drain(..excess);
            }
            return None;
        };
        if start > 0 {
            trace!("discarding {start}B before {marker}");
            self.pending.drain(..start);
        }

        let body = needle.len();
        let (end, consumed) = match marker.extent() {
            Extent::MarkerOnly => (body, body + line_ending_len(&self.pending[body..])),
            Extent::Fixed(n) => {
                if self.pending.len() < body + n {
                    return None;
                }
                (body + n, body + n)
            }
            Extent::Line => match self.pending[body..].iter().position(|&b| b == b'\r' || b == b'\n') {
                Some(eol) => {
                    let end = body + eol;
                    (end, end + line_ending_len(&self.pending[end..]))
                }
                None if settled && self.pending.len() > body => (self.pending.len(), self.pending.len()),
                None => return None,
            },
        };

        let resp = self.pending[..end].to_vec();
        self.pending.drain(..consumed);
        Some(resp)
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of a leading `\r\n`, `\n` or `\r` (0 if none).
fn line_ending_len(data: &[u8]) -> usize {
    match data {
        [b'\r', b'\n', ..] => 2,
        [b'\n', ..] | [b'\r', ..] => 1,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
