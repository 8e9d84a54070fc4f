//! CBOR wire codec helpers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Result type for protocol codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire bodies.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A value could not be encoded to CBOR.
    #[error("encode error: {0}")]
    Encode(String),

    /// A wire body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Encodes a protocol value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a protocol value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_model::{Note, Page, RecordId};

    #[test]
    fn note_roundtrip() {
        let note = Note::new(RecordId::new(), vec![Page::default()]);
        let bytes = to_cbor(&note).unwrap();
        let back: Note = from_cbor(&bytes).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn garbage_bytes_fail_decode() {
        let result: ProtocolResult<Note> = from_cbor(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
