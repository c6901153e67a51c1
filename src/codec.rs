//! Field codecs for the spectrometer command protocol.
//!
//! Requests and most responses are ASCII. The only binary field is the
//! spectrum payload: an array of little-endian unsigned 16-bit samples.

use crate::error::{ProtocolError, Result};

// ---------------------------------------------------------------------------
// Binary
// ---------------------------------------------------------------------------

/// Read exactly `count` little-endian u16 samples from the front of `data`.
///
/// Trailing bytes past `count * 2` are ignored; a short buffer is an error.
pub fn read_uint16_le_array(data: &[u8], count: usize, what: &'static str) -> Result<Vec<u16>> {
    let need = count * 2;
    if data.len() < need {
        return Err(ProtocolError::payload_length(what, need, data.len()));
    }
    Ok(data[..need]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Append a little-endian unsigned 16-bit integer.
pub fn write_uint16_le(buf: &mut Vec<u8>, val: u16) {
    buf.extend_from_slice(&val.to_le_bytes());
}

// ---------------------------------------------------------------------------
// ASCII
// ---------------------------------------------------------------------------

/// Parse an ASCII decimal integer, tolerating surrounding whitespace.
pub fn parse_int(field: &[u8]) -> Result<i64> {
    let text = ascii_trim(field);
    text.parse::<i64>()
        .map_err(|_| ProtocolError::InvalidInteger { field: text.to_owned() })
}

/// Parse an ASCII float, tolerating surrounding whitespace.
pub fn parse_float(field: &[u8]) -> Result<f64> {
    let text = ascii_trim(field);
    text.parse::<f64>()
        .map_err(|_| ProtocolError::InvalidFloat { field: text.to_owned() })
}

/// Split comma-separated ASCII fields.
pub fn split_fields(data: &[u8]) -> Vec<&[u8]> {
    data.split(|&b| b == b',').collect()
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn ascii_trim(field: &[u8]) -> &str {
    // Non-UTF-8 input becomes "" and fails the numeric parse.
    std::str::from_utf8(field).unwrap_or("").trim_matches(|c: char| {
        c.is_ascii_whitespace() || c == '\0'
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
