//! Command encoding and response markers.
//!
//! - [`Command`]: ASCII requests we send, each terminated by `\r\n`
//! - [`Marker`]: the magic strings that identify a response in the byte
//!   stream, and how far each response extends past its marker
//!
//! Per-response payload decoders live in the submodules.
//!
//! | Command           | Marker              | Payload                                  |
//! |-------------------|---------------------|------------------------------------------|
//! | `get_exposure`    | `exposure:`         | ASCII integer (ms)                       |
//! | `take_spectrum`   | `spectrum_complete` | none                                     |
//! | `get_spectrum`    | `spectrum:`         | 3694 × u16 little-endian                 |
//! | `get_calibration` | `calibration:`      | comma-separated ASCII floats, first 4 used |
//!
//! `set_exposure` and `set_cal` have no response of their own; callers read
//! the value back with the matching `get_*` command.

pub mod calibration;
pub mod exposure;
pub mod spectrum;

use std::fmt;

use crate::acquisition::RAW_PIXELS;
use crate::calibration::Coefficients;
use crate::error::{ProtocolError, Result};

/// Request line terminator.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Default receive size for a single read.
pub const RESPONSE_BUFFER: usize = 1024;

/// Receive size for the spectrum response (marker + full payload, plus slack).
pub const SPECTRUM_BUFFER: usize = 7398;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A request we send to the spectrometer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetExposure,
    /// Exposure time in milliseconds.
    SetExposure(u32),
    /// Trigger an exposure. Completion is signalled by `spectrum_complete`.
    TakeSpectrum,
    /// Fetch the last exposure's raw frame.
    GetSpectrum,
    GetCalibration,
    SetCalibration(Coefficients),
}

impl Command {
    /// Command keyword as sent on the wire (without arguments).
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::GetExposure => "get_exposure",
            Command::SetExposure(_) => "set_exposure",
            Command::TakeSpectrum => "take_spectrum",
            Command::GetSpectrum => "get_spectrum",
            Command::GetCalibration => "get_calibration",
            Command::SetCalibration(_) => "set_cal",
        }
    }

    /// Marker of the response this command elicits, if any.
    pub fn response(&self) -> Option<Marker> {
        match self {
            Command::GetExposure => Some(Marker::Exposure),
            Command::TakeSpectrum => Some(Marker::SpectrumComplete),
            Command::GetSpectrum => Some(Marker::Spectrum),
            Command::GetCalibration => Some(Marker::Calibration),
            Command::SetExposure(_) | Command::SetCalibration(_) => None,
        }
    }

    /// Encode as a CRLF-terminated ASCII line.
    pub fn encode(&self) -> Vec<u8> {
        let mut line = self.keyword().to_owned();
        match self {
            Command::SetExposure(ms) => line.push_str(&ms.to_string()),
            Command::SetCalibration(c) => {
                let [c1, c2, c3, c4] = c.to_wire_order();
                line.push_str(&format!("{c1},{c2},{c3},{c4}"));
            }
            _ => {}
        }
        let mut wire = line.into_bytes();
        wire.extend_from_slice(TERMINATOR);
        wire
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wire = self.encode();
        let line = &wire[..wire.len() - TERMINATOR.len()];
        write!(f, "{}", String::from_utf8_lossy(line))
    }
}

// ---------------------------------------------------------------------------
// Marker
// ---------------------------------------------------------------------------

/// Where a response ends, relative to the end of its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// The marker alone is the response.
    MarkerOnly,
    /// Text up to the next CR/LF. A line with no ending is only complete once
    /// the stream has gone quiet (see [`crate::conn::LINE_SETTLE`]).
    Line,
    /// Exactly this many bytes follow the marker.
    Fixed(usize),
}

/// Magic string identifying a response in the receive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Exposure,
    SpectrumComplete,
    Spectrum,
    Calibration,
}

impl Marker {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Marker::Exposure => b"exposure:",
            Marker::SpectrumComplete => b"spectrum_complete",
            Marker::Spectrum => b"spectrum:",
            Marker::Calibration => b"calibration:",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Marker::Exposure => "exposure:",
            Marker::SpectrumComplete => "spectrum_complete",
            Marker::Spectrum => "spectrum:",
            Marker::Calibration => "calibration:",
        }
    }

    /// Number of bytes stripped before the payload.
    pub fn prefix_len(self) -> usize {
        self.as_bytes().len()
    }

    pub fn extent(self) -> Extent {
        match self {
            Marker::Exposure | Marker::Calibration => Extent::Line,
            Marker::SpectrumComplete => Extent::MarkerOnly,
            Marker::Spectrum => Extent::Fixed(RAW_PIXELS * 2),
        }
    }

    /// Per-read receive size suited to this response.
    pub fn buffer_size(self) -> usize {
        match self {
            Marker::Spectrum => SPECTRUM_BUFFER,
            _ => RESPONSE_BUFFER,
        }
    }

    /// Strip this marker from the front of `response`, returning the payload.
    pub fn strip(self, response: &[u8]) -> Result<&[u8]> {
        response.strip_prefix(self.as_bytes()).ok_or_else(|| ProtocolError::MissingMarker {
            marker: self.as_str(),
            raw: response.iter().take(16).copied().collect(),
        })
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_commands() {
        assert_eq!(Command::GetExposure.encode(), b"get_exposure\r\n");
        assert_eq!(Command::TakeSpectrum.encode(), b"take_spectrum\r\n");
        assert_eq!(Command::GetSpectrum.encode(), b"get_spectrum\r\n");
        assert_eq!(Command::GetCalibration.encode(), b"get_calibration\r\n");
    }

    #[test]
    fn set_exposure_appends_integer() {
        assert_eq!(Command::SetExposure(250).encode(), b"set_exposure250\r\n");
    }

    #[test]
    fn set_cal_is_cubic_first() {
        let cmd = Command::SetCalibration(Coefficients::new(0.5, -0.25, 2.0, 340.0));
        assert_eq!(cmd.encode(), b"set_cal0.5,-0.25,2,340\r\n");
    }

    #[test]
    fn display_omits_terminator() {
        assert_eq!(Command::SetExposure(7).to_string(), "set_exposure7");
    }

    #[test]
    fn marker_prefix_lengths() {
        assert_eq!(Marker::Exposure.prefix_len(), 9);
        assert_eq!(Marker::Spectrum.prefix_len(), 9);
        assert_eq!(Marker::Calibration.prefix_len(), 12);
        for m in [Marker::Exposure, Marker::SpectrumComplete, Marker::Spectrum, Marker::Calibration] {
            assert_eq!(m.as_str().as_bytes(), m.as_bytes());
        }
    }

    #[test]
    fn spectrum_buffer_holds_full_response() {
        let Extent::Fixed(n) = Marker::Spectrum.extent() else {
            panic!("spectrum response must be fixed-size");
        };
        assert!(SPECTRUM_BUFFER >= Marker::Spectrum.prefix_len() + n);
    }

    #[test]
    fn strip_requires_marker() {
        assert_eq!(Marker::Exposure.strip(b"exposure:12").unwrap(), b"12");
        assert!(matches!(
            Marker::Exposure.strip(b"xexposure:12"),
            Err(ProtocolError::MissingMarker { .. })
        ));
    }
}
