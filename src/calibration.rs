//! Pixel → wavelength calibration.
//!
//! The device stores a cubic polynomial and reports its coefficients
//! highest-order first (`c1` = x³ … `c4` = x⁰). Wavelengths are in nanometres:
//!
//! ```text
//! λ(i) = c4 + c3·i + c2·i² + c1·i³
//! ```

use crate::acquisition::PIXELS;
use crate::error::{ProtocolError, Result};

/// Cubic calibration polynomial.
///
/// Fields are named by order so the wire ordering (cubic first) and the
/// evaluation ordering (constant first) cannot be confused.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coefficients {
    /// x³ coefficient (`c1` on the wire).
    pub cubic: f64,
    /// x² coefficient (`c2` on the wire).
    pub quadratic: f64,
    /// x¹ coefficient (`c3` on the wire).
    pub linear: f64,
    /// x⁰ coefficient (`c4` on the wire), the wavelength of pixel 0.
    pub constant: f64,
}

impl Coefficients {
    pub const fn new(cubic: f64, quadratic: f64, linear: f64, constant: f64) -> Self {
        Self { cubic, quadratic, linear, constant }
    }

    /// Identity mapping: wavelength == pixel index. In effect until the
    /// device calibration has been read.
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 1.0, 0.0);

    /// Build from device order `[c1, c2, c3, c4]` (cubic first).
    pub fn from_wire_order(c: [f64; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }

    /// Device order `[c1, c2, c3, c4]` (cubic first).
    pub fn to_wire_order(&self) -> [f64; 4] {
        [self.cubic, self.quadratic, self.linear, self.constant]
    }

    /// Reject NaN and infinite coefficients.
    pub fn validate(&self) -> Result<()> {
        for (index, value) in self.to_wire_order().into_iter().enumerate() {
            if !value.is_finite() {
                return Err(ProtocolError::NonFiniteCoefficient { index, value });
            }
        }
        Ok(())
    }

    /// Wavelength in nm for a (possibly fractional) pixel index.
    pub fn wavelength(&self, pixel: f64) -> f64 {
        let terms = [self.constant, self.linear, self.quadratic, self.cubic];
        terms
            .iter()
            .enumerate()
            .map(|(power, c)| c * pixel.powi(power as i32))
            .sum()
    }

    /// Wavelength axis for a processed spectrum, pixels `0..PIXELS`.
    ///
    /// Computed fresh on each call; it does not follow later calibration
    /// changes.
    pub fn wavelengths(&self) -> Vec<f64> {
        (0..PIXELS).map(|i| self.wavelength(i as f64)).collect()
    }
}

impl Default for Coefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn default_is_identity() {
        let c = Coefficients::default();
        assert_eq!(c.wavelength(0.0), 0.0);
        assert_eq!(c.wavelength(1234.0), 1234.0);
    }

    #[test]
    fn constant_term_is_last_on_the_wire() {
        // c1 = cubic ... c4 = constant.
        let c = Coefficients::from_wire_order([1e-9, -2e-5, 0.25, 340.0]);
        assert_eq!(c.constant, 340.0);
        assert_eq!(c.cubic, 1e-9);
        assert_eq!(c.wavelength(0.0), 340.0);
        assert_eq!(c.to_wire_order(), [1e-9, -2e-5, 0.25, 340.0]);
    }

    #[test]
    fn each_order_lands_on_its_power() {
        let x = 10.0;
        assert!(close(Coefficients::new(1.0, 0.0, 0.0, 0.0).wavelength(x), 1000.0));
        assert!(close(Coefficients::new(0.0, 1.0, 0.0, 0.0).wavelength(x), 100.0));
        assert!(close(Coefficients::new(0.0, 0.0, 1.0, 0.0).wavelength(x), 10.0));
        assert!(close(Coefficients::new(0.0, 0.0, 0.0, 1.0).wavelength(x), 1.0));
    }

    #[test]
    fn wavelengths_match_polynomial() {
        let c = Coefficients::new(3e-10, -1.2e-5, 0.21, 338.5);
        let axis = c.wavelengths();
        assert_eq!(axis.len(), PIXELS);
        for (i, &w) in axis.iter().enumerate() {
            let x = i as f64;
            let expected = c.constant + c.linear * x + c.quadratic * x * x + c.cubic * x * x * x;
            assert!(close(w, expected), "pixel {i}: {w} != {expected}");
        }
    }

    #[test]
    fn validate_rejects_non_finite() {
        assert!(Coefficients::new(0.0, 0.0, 1.0, 300.0).validate().is_ok());
        assert!(matches!(
            Coefficients::new(0.0, f64::NAN, 1.0, 300.0).validate(),
            Err(ProtocolError::NonFiniteCoefficient { index: 1, .. })
        ));
        assert!(Coefficients::new(0.0, 0.0, 1.0, f64::INFINITY).validate().is_err());
    }
}
