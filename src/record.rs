//! On-disk record format
//!
//! A store file is a 1-byte signature followed by records laid out
//! back-to-back with no padding:
//!
//! ```text
//! [key_len: u32 BE][value_len: u32 BE][key_bytes][value_bytes]
//! ```
//!
//! End of records is implicit: end-of-file, a short meta block, or a meta
//! block whose key or value length is zero (the sentinel). Because of the
//! sentinel, no valid record may carry a zero-length key or value.

use bytes::{Buf, BufMut};
use serde_json::Value;

use crate::error::{PackError, Result};

/// Header signature: the first byte of every valid store file (decimal 181)
pub const SIGNATURE: u8 = 0xB5;

/// Size of the file header (just the signature byte)
pub const HEADER_SIZE: u64 = 1;

/// Size of the meta block preceding each record's key/value bytes
pub const META_SIZE: usize = 8;

/// The two length fields at the start of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    pub key_len: u32,
    pub value_len: u32,
}

impl RecordMeta {
    /// Parse a meta block from its 8-byte encoding
    pub fn parse(buf: [u8; META_SIZE]) -> Self {
        let mut buf = &buf[..];
        Self {
            key_len: buf.get_u32(),
            value_len: buf.get_u32(),
        }
    }

    /// True if this meta block is the end-of-records sentinel rather than
    /// a real record (a zero key or value length can never be valid).
    pub fn is_sentinel(&self) -> bool {
        self.key_len == 0 || self.value_len == 0
    }

    /// Total on-disk size of the record this meta block describes,
    /// including the meta block itself.
    pub fn record_len(&self) -> u64 {
        META_SIZE as u64 + self.key_len as u64 + self.value_len as u64
    }
}

/// Reject keys the format cannot represent
///
/// A zero-length key would read back as the end-of-records sentinel, and
/// the meta block caps key length at `u32::MAX` bytes.
pub fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(PackError::InvalidRecord(
            "zero-length key collides with the end-of-records sentinel".to_string(),
        ));
    }
    if u32::try_from(key.len()).is_err() {
        return Err(PackError::InvalidRecord(format!(
            "key length {} exceeds the format's u32 limit",
            key.len()
        )));
    }
    Ok(())
}

/// Append a fully encoded record (meta block, key, value bytes) to `buf`
///
/// Lengths that do not fit the u32 meta fields are rejected rather than
/// silently truncated into a corrupt record.
pub fn encode_record(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<()> {
    let key_len = u32::try_from(key.len()).map_err(|_| {
        PackError::InvalidRecord(format!(
            "key length {} exceeds the format's u32 limit",
            key.len()
        ))
    })?;
    let value_len = u32::try_from(value.len()).map_err(|_| {
        PackError::InvalidRecord(format!(
            "value length {} exceeds the format's u32 limit",
            value.len()
        ))
    })?;

    buf.put_u32(key_len);
    buf.put_u32(value_len);
    buf.put_slice(key);
    buf.put_slice(value);
    Ok(())
}

/// Encode a value to its on-disk JSON bytes
///
/// Rejects anything that would encode to zero bytes, since an empty value
/// is indistinguishable from the end-of-records sentinel. JSON never
/// produces empty output (`null` is four bytes), so this guard is only a
/// backstop against a future encoding swap.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| PackError::CorruptValue(e.to_string()))?;
    if bytes.is_empty() {
        return Err(PackError::InvalidRecord(
            "value encoded to zero bytes".to_string(),
        ));
    }
    Ok(bytes)
}

/// Decode a value from its on-disk JSON bytes
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| PackError::CorruptValue(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_round_trip() {
        let mut buf = Vec::new();
        encode_record(&mut buf, b"key", b"value").unwrap();

        let meta = RecordMeta::parse(buf[..META_SIZE].try_into().unwrap());
        assert_eq!(meta.key_len, 3);
        assert_eq!(meta.value_len, 5);
        assert!(!meta.is_sentinel());
        assert_eq!(meta.record_len(), buf.len() as u64);
        assert_eq!(&buf[META_SIZE..META_SIZE + 3], b"key");
        assert_eq!(&buf[META_SIZE + 3..], b"value");
    }

    #[test]
    fn test_meta_is_big_endian() {
        let mut buf = Vec::new();
        encode_record(&mut buf, b"k", b"vv").unwrap();

        assert_eq!(&buf[..META_SIZE], &[0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_check_key_rejects_empty() {
        assert!(matches!(
            check_key(b""),
            Err(PackError::InvalidRecord(_))
        ));
        assert!(check_key(b"k").is_ok());
    }

    #[test]
    fn test_zero_length_is_sentinel() {
        let zero_key = RecordMeta { key_len: 0, value_len: 7 };
        let zero_value = RecordMeta { key_len: 7, value_len: 0 };
        let both = RecordMeta { key_len: 0, value_len: 0 };

        assert!(zero_key.is_sentinel());
        assert!(zero_value.is_sentinel());
        assert!(both.is_sentinel());
    }

    #[test]
    fn test_value_round_trip() {
        let value = json!({"name": "flatpack", "count": 3, "tags": ["a", "b"]});
        let bytes = encode_value(&value).unwrap();
        assert_eq!(decode_value(&bytes).unwrap(), value);
    }

    #[test]
    fn test_null_encodes_non_empty() {
        let bytes = encode_value(&Value::Null).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(decode_value(&bytes).unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_garbage_is_corrupt_value() {
        let result = decode_value(b"{not json");
        assert!(matches!(result, Err(PackError::CorruptValue(_))));
    }
}
