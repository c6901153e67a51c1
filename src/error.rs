use thiserror::Error;

/// Errors arising from response payload parsing and request validation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("response does not start with marker {marker:?}{}", format_raw_suffix(raw))]
    MissingMarker {
        marker: &'static str,
        /// Leading response bytes for debug context.
        raw: Vec<u8>,
    },

    #[error("unexpected payload length for {what}: expected {expected} bytes, got {got}{}", format_raw_suffix(raw))]
    PayloadLength {
        what: &'static str,
        expected: usize,
        got: usize,
        /// Leading payload bytes for debug context.
        raw: Vec<u8>,
    },

    #[error("invalid integer field {field:?}")]
    InvalidInteger { field: String },

    #[error("invalid float field {field:?}")]
    InvalidFloat { field: String },

    #[error("too few fields for {what}: need {need}, got {got}")]
    TooFewFields {
        what: &'static str,
        need: usize,
        got: usize,
    },

    #[error("calibration coefficient {index} is not finite ({value})")]
    NonFiniteCoefficient { index: usize, value: f64 },

    #[error("dark frame has {got} pixels, expected {expected}")]
    DarkFrameLength { expected: usize, got: usize },
}

impl ProtocolError {
    /// Create a `PayloadLength` error (raw bytes filled in later via `with_raw`).
    pub(crate) fn payload_length(what: &'static str, expected: usize, got: usize) -> Self {
        Self::PayloadLength { what, expected, got, raw: Vec::new() }
    }

    /// Attach raw response bytes to decode-phase errors for diagnostics.
    pub fn with_raw(self, payload: &[u8]) -> Self {
        match self {
            Self::PayloadLength { what, expected, got, .. } => {
                Self::PayloadLength { what, expected, got, raw: payload.to_vec() }
            }
            Self::MissingMarker { marker, .. } => {
                Self::MissingMarker { marker, raw: payload.to_vec() }
            }
            other => other,
        }
    }
}

/// Format raw bytes as a suffix like " | 73 70 65 ..." (empty if no bytes).
fn format_raw_suffix(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let limit = 16;
    let hex: String = raw.iter().take(limit).map(|b| format!("{b:02X}")).collect();
    let ellipsis = if raw.len() > limit { "..." } else { "" };
    format!(" | {hex}{ellipsis}")
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_suffix_truncates() {
        let raw: Vec<u8> = (0u8..20).collect();
        let msg = ProtocolError::payload_length("spectrum", 7388, 20).with_raw(&raw).to_string();
        assert!(msg.ends_with("..."), "{msg}");
        assert!(msg.contains("expected 7388 bytes, got 20"), "{msg}");
    }

    #[test]
    fn raw_suffix_empty() {
        let msg = ProtocolError::payload_length("spectrum", 7388, 0).to_string();
        assert!(!msg.contains('|'), "{msg}");
    }
}
