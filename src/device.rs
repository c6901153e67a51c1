//! A session with one spectrometer.
//!
//! [`Spectrometer`] owns the [`Connection`], the cached calibration and the
//! optional dark frame, and drives the request sequences:
//!
//! - acquisition: `take_spectrum` → `spectrum_complete`, then
//!   `get_spectrum` → `spectrum:` + raw frame
//! - calibration: `get_calibration` → `calibration:`; `set_cal` is always
//!   followed by a read-back so the cache holds the device's values
//! - exposure: `get_exposure` → `exposure:`; `set_exposure` is followed by a
//!   read-back

use std::net::SocketAddr;

use log::{debug, info};

use crate::acquisition::{DarkFrame, RawSpectrum, Spectrum};
use crate::calibration::Coefficients;
use crate::conn::{ConnError, Connection};
use crate::error::ProtocolError;
use crate::protocol::{self, Command};
use crate::transport::{SessionConfig, TlsTransport, Transport};

/// An open session with a spectrometer.
///
/// Dropping or [`close`](Self::close)-ing the session releases the socket.
/// Not internally synchronized: one caller at a time.
///
/// # Example
///
/// ```no_run
/// use minispec::Spectrometer;
///
/// let mut spec = Spectrometer::open("192.168.1.40")?;
/// spec.update_calibration()?;
/// let wavelengths = spec.wavelengths();
/// let counts = spec.spectrum()?;
/// for (nm, v) in wavelengths.iter().zip(counts.iter()).step_by(500) {
///     println!("{nm:7.2} nm  {v:8.1}");
/// }
/// spec.close()?;
/// # Ok::<(), minispec::ConnError>(())
/// ```
pub struct Spectrometer<T: Transport = TlsTransport> {
    conn: Connection<T>,
    calibration: Coefficients,
    dark: Option<DarkFrame>,
}

impl Spectrometer<TlsTransport> {
    /// Connect to `host` on the default port with default settings.
    pub fn open(host: &str) -> Result<Self, ConnError> {
        Self::open_with(host, &SessionConfig::default())
    }

    /// Connect to `host` with explicit settings.
    pub fn open_with(host: &str, config: &SessionConfig) -> Result<Self, ConnError> {
        let transport = TlsTransport::connect(host, config)?;
        Ok(Self::from_connection(Connection::with_timeout(transport, config.response_timeout)))
    }
}

impl<T: Transport> Spectrometer<T> {
    /// Start a session over an existing connection. Calibration starts as the
    /// identity mapping and no dark frame is set.
    pub fn from_connection(conn: Connection<T>) -> Self {
        Self { conn, calibration: Coefficients::IDENTITY, dark: None }
    }

    /// Close the session.
    pub fn close(self) -> Result<(), ConnError> {
        info!("closing session");
        self.conn.close()
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, ConnError> {
        self.conn.peer_addr()
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection<T> {
        &mut self.conn
    }

    // -----------------------------------------------------------------------
    // Exposure
    // -----------------------------------------------------------------------

    /// Current exposure time in milliseconds.
    pub fn exposure(&mut self) -> Result<u32, ConnError> {
        let resp = self.conn.request(&Command::GetExposure)?;
        Ok(protocol::exposure::decode(&resp)?)
    }

    /// Set the exposure time and return the value the device reports back.
    pub fn set_exposure(&mut self, ms: u32) -> Result<u32, ConnError> {
        self.conn.send(&Command::SetExposure(ms))?;
        let actual = self.exposure()?;
        debug!("exposure set to {actual} ms (requested {ms})");
        Ok(actual)
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    /// Trigger an exposure and read back the raw detector frame.
    pub fn raw_spectrum(&mut self) -> Result<RawSpectrum, ConnError> {
        self.conn.request(&Command::TakeSpectrum)?;
        let resp = self.conn.request(&Command::GetSpectrum)?;
        let raw = protocol::spectrum::decode(&resp)?;
        debug!("raw spectrum: bias {:.1}", raw.bias());
        Ok(raw)
    }

    /// Acquire a spectrum with bias and (if set) dark frame subtracted.
    pub fn spectrum(&mut self) -> Result<Spectrum, ConnError> {
        let raw = self.raw_spectrum()?;
        Ok(raw.process(self.dark.as_ref()))
    }

    // -----------------------------------------------------------------------
    // Dark frame
    // -----------------------------------------------------------------------

    /// Install a dark frame, replacing any previous one.
    ///
    /// Anything other than exactly `PIXELS` values is rejected and the
    /// current dark frame is left as it was.
    pub fn set_dark(&mut self, values: Vec<f64>) -> Result<(), ProtocolError> {
        self.dark = Some(DarkFrame::new(values)?);
        Ok(())
    }

    /// Install an already-validated dark frame.
    pub fn set_dark_frame(&mut self, dark: DarkFrame) {
        self.dark = Some(dark);
    }

    pub fn clear_dark(&mut self) {
        self.dark = None;
    }

    pub fn dark(&self) -> Option<&DarkFrame> {
        self.dark.as_ref()
    }

    /// Acquire a bias-corrected spectrum (ignoring any current dark frame) and
    /// install it as the dark frame. Cover the input optics first.
    pub fn capture_dark(&mut self) -> Result<&DarkFrame, ConnError> {
        let raw = self.raw_spectrum()?;
        let dark = self.dark.insert(DarkFrame::from(raw.process(None)));
        info!("dark frame captured");
        Ok(&*dark)
    }

    // -----------------------------------------------------------------------
    // Calibration
    // -----------------------------------------------------------------------

    /// Read the calibration from the device and cache it.
    pub fn update_calibration(&mut self) -> Result<Coefficients, ConnError> {
        let resp = self.conn.request(&Command::GetCalibration)?;
        let coefficients = protocol::calibration::decode(&resp)?;
        debug!("calibration: {coefficients:?}");
        self.calibration = coefficients;
        Ok(coefficients)
    }

    /// Write new coefficients, then re-read them from the device.
    ///
    /// The returned (and cached) values are what the device reports, which
    /// may differ from `coefficients` by device-side rounding. Non-finite
    /// values are rejected without contacting the device.
    pub fn set_calibration(&mut self, coefficients: Coefficients) -> Result<Coefficients, ConnError> {
        coefficients.validate()?;
        self.conn.send(&Command::SetCalibration(coefficients))?;
        self.update_calibration()
    }

    /// Cached coefficients. No device traffic.
    pub fn calibration(&self) -> Coefficients {
        self.calibration
    }

    /// Wavelength in nm of a pixel of a processed spectrum.
    pub fn pixel_to_wavelength(&self, pixel: f64) -> f64 {
        self.calibration.wavelength(pixel)
    }

    /// Wavelength axis matching [`spectrum`](Self::spectrum), one entry per
    /// pixel. Call again after the calibration changes.
    pub fn wavelengths(&self) -> Vec<f64> {
        self.calibration.wavelengths()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::acquisition::{BIAS, OPTICAL, PIXELS, RAW_PIXELS};
    use crate::protocol::spectrum;
    use crate::transport::MemoryTransport;

    fn session(t: MemoryTransport) -> Spectrometer<MemoryTransport> {
        Spectrometer::from_connection(Connection::with_timeout(t, Duration::from_millis(50)))
    }

    fn frame_wire(bias: u16, signal: u16) -> Vec<u8> {
        let mut samples = vec![0u16; RAW_PIXELS];
        samples[BIAS].fill(bias);
        samples[OPTICAL].fill(signal);
        spectrum::encode(&samples)
    }

    fn acquisition(t: &mut MemoryTransport, bias: u16, signal: u16) {
        t.push_chunk(b"spectrum_complete\r\n".to_vec());
        t.push_chunk(frame_wire(bias, signal));
    }

    #[test]
    fn starts_with_identity_calibration() {
        let s = session(MemoryTransport::new());
        assert_eq!(s.calibration(), Coefficients::IDENTITY);
        assert_eq!(s.pixel_to_wavelength(17.0), 17.0);
        assert!(s.dark().is_none());
    }

    #[test]
    fn spectrum_sequence() {
        let mut t = MemoryTransport::new();
        acquisition(&mut t, 100, 150);
        let mut s = session(t);

        let spectrum = s.spectrum().unwrap();
        assert_eq!(spectrum.len(), PIXELS);
        assert!(spectrum.iter().all(|&v| v == 50.0));
        assert_eq!(s.connection().transport().sent_lines(), vec!["take_spectrum", "get_spectrum"]);
    }

    #[test]
    fn dark_applied_to_later_spectra() {
        let mut t = MemoryTransport::new();
        acquisition(&mut t, 100, 150);
        acquisition(&mut t, 100, 150);
        let mut s = session(t);

        s.set_dark(vec![10.0; PIXELS]).unwrap();
        assert!(s.spectrum().unwrap().iter().all(|&v| v == 40.0));
        assert!(s.spectrum().unwrap().iter().all(|&v| v == 40.0));
    }

    #[test]
    fn bad_dark_rejected_and_previous_kept() {
        let mut s = session(MemoryTransport::new());
        s.set_dark(vec![1.0; PIXELS]).unwrap();
        assert!(matches!(
            s.set_dark(vec![0.0; 100]),
            Err(ProtocolError::DarkFrameLength { got: 100, .. })
        ));
        assert_eq!(s.dark().unwrap().values()[0], 1.0);
        s.clear_dark();
        assert!(s.dark().is_none());
    }

    #[test]
    fn capture_dark_ignores_current_dark() {
        let mut t = MemoryTransport::new();
        acquisition(&mut t, 100, 110);
        acquisition(&mut t, 100, 150);
        let mut s = session(t);
        s.set_dark(vec![5.0; PIXELS]).unwrap();

        let dark = s.capture_dark().unwrap();
        assert!(dark.values().iter().all(|&v| v == 10.0));
        assert!(s.spectrum().unwrap().iter().all(|&v| v == 40.0));
    }

    #[test]
    fn spectrum_times_out_without_completion() {
        let mut s = session(MemoryTransport::new());
        assert!(matches!(s.spectrum(), Err(ConnError::Timeout { .. })));
    }

    #[test]
    fn update_calibration_caches() {
        let mut t = MemoryTransport::new();
        t.push_chunk(b"calibration:1e-9,-2e-5,0.2,340\r\n".to_vec());
        let mut s = session(t);

        let c = s.update_calibration().unwrap();
        assert_eq!(c, Coefficients::new(1e-9, -2e-5, 0.2, 340.0));
        assert_eq!(s.calibration(), c);
        assert_eq!(s.wavelengths()[0], 340.0);
        assert_eq!(s.wavelengths().len(), PIXELS);
    }

    #[test]
    fn set_calibration_returns_device_values() {
        let mut t = MemoryTransport::new();
        // Device rounds the linear term.
        t.push_chunk(b"calibration:0,0,0.25,300\r\n".to_vec());
        let mut s = session(t);

        let echoed = s.set_calibration(Coefficients::new(0.0, 0.0, 0.2500001, 300.0)).unwrap();
        assert_eq!(echoed.linear, 0.25);
        assert_eq!(s.calibration(), echoed);
        assert_eq!(
            s.connection().transport().sent_lines(),
            vec!["set_cal0,0,0.2500001,300", "get_calibration"]
        );
    }

    #[test]
    fn set_calibration_rejects_nan_before_sending() {
        let mut s = session(MemoryTransport::new());
        let err = s.set_calibration(Coefficients::new(f64::NAN, 0.0, 1.0, 0.0)).unwrap_err();
        assert!(matches!(err, ConnError::Protocol(ProtocolError::NonFiniteCoefficient { index: 0, .. })));
        assert!(s.connection().transport().sent().is_empty());
        assert_eq!(s.calibration(), Coefficients::IDENTITY);
    }

    #[test]
    fn set_exposure_reads_back() {
        let mut t = MemoryTransport::new();
        t.push_chunk(b"exposure:20\r\n".to_vec());
        let mut s = session(t);

        assert_eq!(s.set_exposure(20).unwrap(), 20);
        assert_eq!(s.connection().transport().sent_lines(), vec!["set_exposure20", "get_exposure"]);
    }

    #[test]
    fn short_spectrum_payload_is_an_error() {
        let mut t = MemoryTransport::new();
        t.push_chunk(b"spectrum_complete\r\n".to_vec());
        let mut wire = frame_wire(100, 150);
        wire.truncate(wire.len() - 2);
        t.push_chunk(wire);
        let mut s = session(t);
        // The engine keeps waiting for the missing bytes until the deadline.
        assert!(matches!(s.raw_spectrum(), Err(ConnError::Timeout { .. })));
    }

    #[test]
    fn close_releases_transport() {
        let s = session(MemoryTransport::new());
        assert!(s.close().is_ok());
    }
}
