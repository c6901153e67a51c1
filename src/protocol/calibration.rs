//! Calibration response (`calibration:<c1>,<c2>,<c3>,<c4>[,...]`).
//!
//! Coefficients arrive cubic first; extra trailing fields are ignored.

use crate::calibration::Coefficients;
use crate::codec;
use crate::error::{ProtocolError, Result};
use crate::protocol::Marker;

/// Decode a `calibration:` response.
pub fn decode(response: &[u8]) -> Result<Coefficients> {
    let payload = Marker::Calibration.strip(response)?;
    let fields = codec::split_fields(payload);
    if fields.len() < 4 {
        return Err(ProtocolError::TooFewFields { what: "calibration", need: 4, got: fields.len() });
    }
    let mut c = [0.0; 4];
    for (slot, field) in c.iter_mut().zip(&fields) {
        *slot = codec::parse_float(field)?;
    }
    Ok(Coefficients::from_wire_order(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_fields() {
        let c = decode(b"calibration:1e-9,-2.5e-5,0.2,340.5").unwrap();
        assert_eq!(c, Coefficients::new(1e-9, -2.5e-5, 0.2, 340.5));
    }

    #[test]
    fn extra_fields_ignored() {
        let c = decode(b"calibration:0,0,1,300,42,junk\r\n").unwrap();
        assert_eq!(c.constant, 300.0);
        assert_eq!(c.linear, 1.0);
    }

    #[test]
    fn line_ending_on_last_field() {
        let c = decode(b"calibration:0,0,1,300\r\n").unwrap();
        assert_eq!(c.constant, 300.0);
    }

    #[test]
    fn too_few_fields() {
        assert!(matches!(
            decode(b"calibration:0,0,1"),
            Err(ProtocolError::TooFewFields { need: 4, got: 3, .. })
        ));
    }

    #[test]
    fn non_numeric_field() {
        assert!(matches!(
            decode(b"calibration:0,abc,1,300"),
            Err(ProtocolError::InvalidFloat { .. })
        ));
    }
}
