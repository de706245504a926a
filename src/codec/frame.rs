//! Value codec
//!
//! Encoding and decoding of [`Value`]s to the text stored in `keyValue`.
//!
//! ## Frame Format
//! ```text
//! ┌─────────────┬──────────┬──────────────────────────┐
//! │ Version (1) │ CRC (4)  │   bincode(Value) body    │
//! └─────────────┴──────────┴──────────────────────────┘
//! ```
//! The whole frame is then base64 (standard alphabet) encoded, so the
//! stored text never contains quote or delimiter characters.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::{Buf, BufMut, BytesMut};

use super::Value;
use crate::error::{Result, StorxError};

/// Current frame version byte
pub const FRAME_VERSION: u8 = 1;

/// Header size: 1 byte version + 4 bytes CRC32
pub const FRAME_HEADER_SIZE: usize = 5;

/// Encode a value to its stored text form
pub fn encode_value(value: &Value) -> Result<String> {
    let body = bincode::serialize(value)?;
    let crc = crc32fast::hash(&body);

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.put_u8(FRAME_VERSION);
    frame.put_u32(crc);
    frame.put_slice(&body);

    Ok(BASE64.encode(&frame))
}

/// Decode stored text back into a value
///
/// Fails if the text is not base64, the frame version is unknown, or the
/// checksum does not match the body.
pub fn decode_value(encoded: &str) -> Result<Value> {
    let raw = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| StorxError::Serialization(format!("invalid base64: {}", e)))?;

    if raw.len() < FRAME_HEADER_SIZE {
        return Err(StorxError::Serialization(format!(
            "Incomplete frame: expected at least {} bytes, got {}",
            FRAME_HEADER_SIZE,
            raw.len()
        )));
    }

    let mut buf = &raw[..];
    let version = buf.get_u8();
    if version != FRAME_VERSION {
        return Err(StorxError::Serialization(format!(
            "Unknown frame version: {}",
            version
        )));
    }

    let expected_crc = buf.get_u32();
    let actual_crc = crc32fast::hash(buf);
    if expected_crc != actual_crc {
        return Err(StorxError::Serialization(format!(
            "CRC mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    Ok(bincode::deserialize(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_encoded_text_is_plain_ascii() {
        let value = Value::Text("it's a \"quoted\"; DROP TABLE main; --".into());
        let encoded = encode_value(&value).unwrap();

        assert!(encoded
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='));
        assert_eq!(decode_value(&encoded).unwrap(), value);
    }

    #[test]
    fn test_nested_value() {
        let mut inner = BTreeMap::new();
        inner.insert("ping".to_string(), Value::from("pong"));
        let value = Value::Seq(vec![
            Value::Map(inner),
            Value::Seq(vec![]),
            Value::Map(BTreeMap::new()),
            Value::Null,
            Value::Float(-101.1),
        ]);

        let decoded = decode_value(&encode_value(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_detects_flipped_bit() {
        let encoded = encode_value(&Value::Int(500)).unwrap();
        let mut raw = BASE64.decode(encoded).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        let err = decode_value(&BASE64.encode(raw)).unwrap_err();
        assert!(err.to_string().contains("CRC mismatch"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_value("not base64 at all!").is_err());
        assert!(decode_value("AAA=").is_err());
        assert!(decode_value("").is_err());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let encoded = encode_value(&Value::Bool(true)).unwrap();
        let mut raw = BASE64.decode(encoded).unwrap();
        raw[0] = 9;

        let err = decode_value(&BASE64.encode(raw)).unwrap_err();
        assert!(err.to_string().contains("frame version"));
    }
}
