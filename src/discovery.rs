//! UDP beacon discovery of spectrometers on the local network.
//!
//! Each device periodically broadcasts a short ASCII datagram to port 12345:
//!
//! ```text
//! msp1000<interface>,<serial>
//! ```
//!
//! e.g. `msp1000wlan0,0123456789abcdef`. The marker is part of the first
//! comma field; anything after the second comma is ignored.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info, trace};

/// UDP port devices broadcast their beacons to.
pub const DISCOVERY_PORT: u16 = 12345;

/// Largest beacon datagram read. Longer datagrams are truncated.
pub const BEACON_MAX_LEN: usize = 33;

/// Shortest receive timeout set on the socket; a zero timeout is rejected by
/// the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Literal prefix every beacon starts with.
pub const BEACON_MARKER: &[u8] = b"msp1000";

/// A device announcement parsed from one beacon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Announcement {
    /// Source address of the beacon (device host and its UDP port).
    pub addr: SocketAddr,
    /// Network interface the device is announcing on (typically `wlan0` or `eth0`).
    pub interface: Vec<u8>,
    /// Device serial identifier, byte-for-byte as broadcast.
    pub serial: Vec<u8>,
}

impl Announcement {
    /// Parse a beacon datagram received from `addr`.
    ///
    /// Returns `None` for anything that is not a beacon: missing marker or
    /// fewer than two comma-separated fields.
    pub fn parse(addr: SocketAddr, datagram: &[u8]) -> Option<Self> {
        if !datagram.starts_with(BEACON_MARKER) {
            return None;
        }
        let mut fields = datagram.split(|&b| b == b',');
        let iface = fields.next()?;
        let serial = fields.next()?;
        Some(Self {
            addr,
            interface: iface[BEACON_MARKER.len()..].to_vec(),
            serial: serial.to_vec(),
        })
    }

    /// Interface name as text (lossy).
    pub fn interface_str(&self) -> String {
        String::from_utf8_lossy(&self.interface).into_owned()
    }

    /// Serial identifier as text (lossy).
    pub fn serial_str(&self) -> String {
        String::from_utf8_lossy(&self.serial).into_owned()
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} ({})", self.serial_str(), self.interface_str(), self.addr)
    }
}

/// Discovery timing and port.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveryOptions {
    /// Return as soon as one valid beacon arrives.
    pub find_first: bool,
    /// Upper bound on a single blocking receive. Values under 1 ms are
    /// raised to 1 ms.
    pub socket_timeout: Duration,
    /// Total listening window, measured from the start of the call.
    pub search_window: Duration,
    /// Local UDP port to listen on.
    pub port: u16,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            find_first: false,
            socket_timeout: Duration::from_secs(1),
            search_window: Duration::from_secs(3),
            port: DISCOVERY_PORT,
        }
    }
}

/// Listen for beacons on all interfaces and collect the announcing devices.
///
/// The socket is bound for the duration of the call and closed before
/// returning. An empty set means nothing announced itself within the window.
///
/// # Example
///
/// ```no_run
/// use minispec::discovery::{discover, DiscoveryOptions};
///
/// let found = discover(&DiscoveryOptions { find_first: true, ..Default::default() })?;
/// for dev in &found {
///     println!("{dev}");
/// }
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn discover(opts: &DiscoveryOptions) -> io::Result<HashSet<Announcement>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, opts.port))?;
    debug!("listening for beacons on {}", socket.local_addr()?);
    let found = listen(&socket, opts)?;
    info!("discovery finished: {} device(s)", found.len());
    Ok(found)
}

/// Collect beacons from an already-bound socket.
///
/// Every receive is capped at the time left in the search window, so the
/// call returns no later than `search_window` after entry.
pub fn listen(socket: &UdpSocket, opts: &DiscoveryOptions) -> io::Result<HashSet<Announcement>> {
    let deadline = Instant::now() + opts.search_window;
    let mut found = HashSet::new();
    let mut buf = [0u8; BEACON_MAX_LEN];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let wait = remaining.min(opts.socket_timeout).max(MIN_READ_TIMEOUT);
        socket.set_read_timeout(Some(wait))?;

        let (n, addr) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => return Err(e),
        };

        match Announcement::parse(addr, &buf[..n]) {
            Some(dev) => {
                if found.insert(dev.clone()) {
                    debug!("beacon: {dev}");
                }
                if opts.find_first {
                    break;
                }
            }
            None => trace!("ignoring {n}B datagram from {addr}"),
        }
    }

    Ok(found)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
