//! Exposure time response (`exposure:<ms>`).

use crate::codec;
use crate::error::{ProtocolError, Result};
use crate::protocol::Marker;

/// Decode an `exposure:` response into milliseconds.
pub fn decode(response: &[u8]) -> Result<u32> {
    let payload = Marker::Exposure.strip(response)?;
    let ms = codec::parse_int(payload)?;
    u32::try_from(ms).map_err(|_| ProtocolError::InvalidInteger { field: ms.to_string() })
}
