//! Raw spectrum response (`spectrum:` + 3694 little-endian u16 samples).

use crate::acquisition::{RAW_PIXELS, RawSpectrum};
use crate::codec;
use crate::error::Result;
use crate::protocol::Marker;

/// Decode a `spectrum:` response into a raw frame.
///
/// A payload shorter than `RAW_PIXELS` samples is an error. Bytes past the
/// last sample are ignored.
pub fn decode(response: &[u8]) -> Result<RawSpectrum> {
    let payload = Marker::Spectrum.strip(response)?;
    let samples = codec::read_uint16_le_array(payload, RAW_PIXELS, "spectrum")
        .map_err(|e| e.with_raw(payload))?;
    RawSpectrum::from_samples(samples)
}

/// Encode samples the way the device sends them.
pub fn encode(samples: &[u16]) -> Vec<u8> {
    let mut wire = Marker::Spectrum.as_bytes().to_vec();
    wire.reserve(samples.len() * 2);
    for &s in samples {
        codec::write_uint16_le(&mut wire, s);
    }
    wire
}
