use serde_json::Value;

use crate::error::DecodeError;

/// Parse a raw payload as UTF-8 JSON into a generic value.
///
/// No schema checks happen here; handlers validate the shape they need.
pub fn decode(payload: &[u8]) -> Result<Value, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}
