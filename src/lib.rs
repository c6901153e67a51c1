pub mod acquisition;
pub mod calibration;
pub mod codec;
pub mod conn;
pub mod device;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod transport;

pub use acquisition::{DarkFrame, RawSpectrum, Spectrum};
pub use calibration::Coefficients;
pub use conn::{ConnError, Connection};
pub use device::Spectrometer;
pub use discovery::{Announcement, DiscoveryOptions, discover};
pub use error::ProtocolError;
pub use protocol::{Command, Marker};
pub use transport::{MemoryTransport, SessionConfig, TlsTransport, Transport};
