//! Spectrum buffers and raw → processed conversion.
//!
//! The detector (a TCD1304 linear CCD) reads out 3694 pixels per frame. Only
//! pixels `32..3680` are exposed to light; pixels `17..30` are shielded and
//! measure the electrical bias, which is subtracted from every optical pixel.

use std::ops::Range;

use crate::error::{ProtocolError, Result};

/// Samples per raw detector frame, guard pixels included.
pub const RAW_PIXELS: usize = 3694;

/// Optical pixels in a processed spectrum.
pub const PIXELS: usize = 3648;

/// Raw pixel window that carries the optical signal.
pub const OPTICAL: Range<usize> = 32..3680;

/// Raw pixel window of light-shielded pixels used for bias estimation.
pub const BIAS: Range<usize> = 17..30;

/// One raw detector frame: exactly [`RAW_PIXELS`] unsigned 16-bit counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpectrum {
    samples: Vec<u16>,
}

impl RawSpectrum {
    /// Wrap a sample vector, rejecting any length other than [`RAW_PIXELS`].
    pub fn from_samples(samples: Vec<u16>) -> Result<Self> {
        if samples.len() != RAW_PIXELS {
            return Err(ProtocolError::payload_length("RawSpectrum", RAW_PIXELS, samples.len()));
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Optical pixels, `OPTICAL` window of the frame.
    pub fn optical(&self) -> &[u16] {
        &self.samples[OPTICAL]
    }

    /// Mean of the shielded guard pixels (CCD bias).
    pub fn bias(&self) -> f64 {
        let guard = &self.samples[BIAS];
        guard.iter().map(|&s| f64::from(s)).sum::<f64>() / guard.len() as f64
    }

    /// Subtract bias and, if given, a dark frame.
    ///
    /// Values are not clamped and may go negative.
    pub fn process(&self, dark: Option<&DarkFrame>) -> Spectrum {
        let bias = self.bias();
        let mut values: Vec<f64> = self.optical().iter().map(|&s| f64::from(s) - bias).collect();
        if let Some(dark) = dark {
            for (v, d) in values.iter_mut().zip(dark.values()) {
                *v -= d;
            }
        }
        Spectrum { values }
    }

    pub fn into_samples(self) -> Vec<u16> {
        self.samples
    }
}

/// A bias-corrected spectrum of exactly [`PIXELS`] values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Spectrum {
    values: Vec<f64>,
}

impl Spectrum {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

impl std::ops::Deref for Spectrum {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.values
    }
}

/// Fixed-pattern background subtracted from every processed spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct DarkFrame {
    values: Vec<f64>,
}

impl DarkFrame {
    /// Rejects any length other than [`PIXELS`].
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() != PIXELS {
            return Err(ProtocolError::DarkFrameLength { expected: PIXELS, got: values.len() });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl From<Spectrum> for DarkFrame {
    fn from(spectrum: Spectrum) -> Self {
        Self { values: spectrum.values }
    }
}

impl TryFrom<Vec<f64>> for DarkFrame {
    type Error = ProtocolError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(values)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Guard band at `bias`, optical band at `signal`, everything else at 0xFFFF.
    fn frame(bias: u16, signal: u16) -> RawSpectrum {
        let mut samples = vec![0xFFFF; RAW_PIXELS];
        samples[BIAS].fill(bias);
        samples[OPTICAL].fill(signal);
        RawSpectrum::from_samples(samples).unwrap()
    }

    #[test]
    fn windows_have_expected_sizes() {
        assert_eq!(OPTICAL.len(), PIXELS);
        assert_eq!(BIAS.len(), 13);
    }

    #[test]
    fn raw_length_enforced() {
        assert!(RawSpectrum::from_samples(vec![0; RAW_PIXELS - 1]).is_err());
        assert!(RawSpectrum::from_samples(vec![0; RAW_PIXELS + 1]).is_err());
    }

    #[test]
    fn bias_subtracted() {
        let spectrum = frame(100, 150).process(None);
        assert_eq!(spectrum.len(), PIXELS);
        assert!(spectrum.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn dark_subtracted() {
        let dark = DarkFrame::new(vec![10.0; PIXELS]).unwrap();
        let spectrum = frame(100, 150).process(Some(&dark));
        assert_eq!(spectrum.len(), PIXELS);
        assert!(spectrum.iter().all(|&v| v == 40.0));
    }

    #[test]
    fn bias_is_a_mean() {
        let mut samples = vec![0u16; RAW_PIXELS];
        // 13 guard pixels: twelve at 90, one at 220 → mean 100.
        samples[BIAS].fill(90);
        samples[BIAS.start] = 220;
        samples[OPTICAL].fill(100);
        let raw = RawSpectrum::from_samples(samples).unwrap();
        assert!((raw.bias() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn values_may_go_negative() {
        let spectrum = frame(500, 100).process(None);
        assert!(spectrum.iter().all(|&v| v == -400.0));
    }

    #[test]
    fn guard_and_edge_pixels_excluded() {
        let mut samples = vec![0u16; RAW_PIXELS];
        samples[OPTICAL.start - 1] = 9999;
        samples[OPTICAL.end] = 9999;
        samples[30] = 9999;
        samples[31] = 9999;
        let spectrum = RawSpectrum::from_samples(samples).unwrap().process(None);
        assert!(spectrum.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dark_frame_length_enforced() {
        assert!(matches!(
            DarkFrame::new(vec![0.0; PIXELS - 1]),
            Err(ProtocolError::DarkFrameLength { expected: PIXELS, got: 3647 })
        ));
        assert!(DarkFrame::try_from(vec![0.0; RAW_PIXELS]).is_err());
    }

    #[test]
    fn dark_from_spectrum() {
        let dark = DarkFrame::from(frame(100, 110).process(None));
        let spectrum = frame(100, 150).process(Some(&dark));
        assert!(spectrum.iter().all(|&v| v == 40.0));
    }
}
