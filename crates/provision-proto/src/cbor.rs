//! CBOR helpers.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CodecError;

/// Encode a value to CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegistrationBody;

    #[test]
    fn truncated_input_fails() {
        let result: Result<RegistrationBody, _> = decode(&[0xa1, 0x66]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }
}
