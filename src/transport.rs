//! Byte transports underneath a [`Connection`](crate::Connection).
//!
//! [`TlsTransport`] is the real thing: TCP to port 8000 wrapped in TLS.
//! [`MemoryTransport`] replays scripted chunks for exercising the protocol
//! without a device.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, warn};
use native_tls::{HandshakeError, TlsConnector, TlsStream};

use crate::conn::ConnError;

/// Default device command port.
pub const DEFAULT_PORT: u16 = 8000;

/// TCP connect (and TLS handshake) timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on waiting for one response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw send/receive over some byte stream. No protocol knowledge.
pub trait Transport {
    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read at most `max_len` bytes, blocking at most `timeout`.
    ///
    /// Returns `WouldBlock`/`TimedOut` when nothing arrived in time and an
    /// empty vector when the peer closed the stream.
    fn recv(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Close the stream. Not idempotent.
    fn close(&mut self) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`TlsTransport::connect`] and the engine above it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    pub port: u16,
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a single response.
    pub response_timeout: Duration,
    /// Devices ship a self-signed certificate, so verification is off unless
    /// this is cleared.
    pub accept_invalid_certs: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

// ---------------------------------------------------------------------------
// TLS
// ---------------------------------------------------------------------------

/// TLS over TCP to a spectrometer.
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
}

impl TlsTransport {
    /// Resolve `host`, connect with `config.connect_timeout`, and complete the
    /// TLS handshake.
    ///
    /// On failure nothing stays open: the TCP socket is dropped before the
    /// error is returned.
    pub fn connect(host: &str, config: &SessionConfig) -> Result<Self, ConnError> {
        let addrs: Vec<SocketAddr> = (host, config.port)
            .to_socket_addrs()
            .map_err(|source| ConnError::Connect { host: host.to_owned(), port: config.port, source })?
            .collect();

        let mut last_err = None;
        let mut tcp = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, config.connect_timeout) {
                Ok(s) => {
                    tcp = Some(s);
                    break;
                }
                Err(e) => {
                    warn!("connect to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        let tcp = match tcp {
            Some(s) => s,
            None => {
                let source = last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
                });
                return Err(ConnError::Connect { host: host.to_owned(), port: config.port, source });
            }
        };

        // Small request lines, disable Nagle.
        let _ = tcp.set_nodelay(true);
        tcp.set_read_timeout(Some(config.connect_timeout))?;
        tcp.set_write_timeout(Some(config.connect_timeout))?;

        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .danger_accept_invalid_hostnames(config.accept_invalid_certs)
            .build()?;

        let stream = match connector.connect(host, tcp) {
            Ok(s) => s,
            Err(HandshakeError::Failure(e)) => {
                warn!("TLS handshake with {host}:{} failed: {e}", config.port);
                return Err(ConnError::Tls(e));
            }
            Err(HandshakeError::WouldBlock(_)) => {
                warn!("TLS handshake with {host}:{} timed out", config.port);
                return Err(ConnError::Timeout { timeout: config.connect_timeout });
            }
        };
        stream.get_ref().set_write_timeout(None)?;

        info!("connected to {host}:{}", config.port);
        Ok(Self { stream })
    }
}

impl Transport for TlsTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn recv(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        self.stream.get_ref().set_read_timeout(Some(timeout))?;
        let mut buf = vec![0u8; max_len];
        let n = self.stream.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().peer_addr()
    }

    fn close(&mut self) -> io::Result<()> {
        debug!("closing TLS session");
        self.stream.shutdown()?;
        self.stream.get_ref().shutdown(Shutdown::Both)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Scripted transport: `recv` hands out queued chunks in order.
///
/// An empty queue behaves like a silent device (sleeps for the timeout, then
/// `TimedOut`). A queued empty chunk reads as the peer closing the stream.
/// Everything sent is recorded.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    chunks: VecDeque<Vec<u8>>,
    sent: Vec<u8>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk for a future `recv`.
    pub fn push_chunk(&mut self, chunk: impl Into<Vec<u8>>) -> &mut Self {
        self.chunks.push_back(chunk.into());
        self
    }

    /// Queue the end of stream.
    pub fn push_eof(&mut self) -> &mut Self {
        self.chunks.push_back(Vec::new());
        self
    }

    /// All bytes passed to `send` so far.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Sent bytes split into request lines (terminators removed).
    pub fn sent_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.sent)
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"))
        } else {
            Ok(())
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.check_open()?;
        self.sent.extend_from_slice(data);
        Ok(())
    }

    fn recv(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        self.check_open()?;
        let Some(mut chunk) = self.chunks.pop_front() else {
            std::thread::sleep(timeout);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        };
        if chunk.len() > max_len {
            let rest = chunk.split_off(max_len);
            self.chunks.push_front(rest);
        }
        Ok(chunk)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }

    fn close(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
