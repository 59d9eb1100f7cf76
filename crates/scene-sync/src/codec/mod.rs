//! Property codec: typed values to/from the name → blob property set.
//!
//! Every encoding is little-endian and fixed-width:
//! - `i32` → 4 bytes
//! - `string` → UTF-8 bytes, no length prefix (length is the blob length)
//! - numeric arrays → concatenated fixed-width elements in order
//! - raw bytes → the blob itself
//!
//! Composite payloads (mesh, bitmap) are several named sub-properties inside
//! the same property set, so the property set is the single normalized
//! representation for both simple and composite payloads.

pub mod bitmap;
pub mod format;
pub mod mesh;

pub use bitmap::{BitmapCodec, BitmapPayload};
pub use format::{FormatTable, PixelFormat};
pub use mesh::{MeshCodec, MeshPayload};

use crate::entity::PropertySet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Missing property: {0}")]
    MissingProperty(String),

    #[error("Malformed property '{key}': {reason}")]
    MalformedProperty { key: String, reason: String },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

fn malformed(key: &str, reason: impl Into<String>) -> CodecError {
    CodecError::MalformedProperty {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Existence check without decoding. Used to treat partially populated
/// payloads (e.g. an image-less mesh) as valid.
pub fn contains(set: &PropertySet, key: &str) -> bool {
    set.contains_key(key)
}

fn blob<'a>(set: &'a PropertySet, key: &str) -> Result<&'a [u8]> {
    set.get(key)
        .map(Vec::as_slice)
        .ok_or_else(|| CodecError::MissingProperty(key.to_string()))
}

pub fn put_i32(set: &mut PropertySet, key: &str, value: i32) {
    set.insert(key.to_string(), value.to_le_bytes().to_vec());
}

pub fn get_i32(set: &PropertySet, key: &str) -> Result<i32> {
    let bytes = blob(set, key)?;
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| malformed(key, format!("expected 4 bytes, got {}", bytes.len())))?;
    Ok(i32::from_le_bytes(arr))
}

pub fn put_string(set: &mut PropertySet, key: &str, value: &str) {
    set.insert(key.to_string(), value.as_bytes().to_vec());
}

pub fn get_string(set: &PropertySet, key: &str) -> Result<String> {
    let bytes = blob(set, key)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed(key, "not valid UTF-8"))
}

pub fn put_f32s(set: &mut PropertySet, key: &str, values: &[f32]) {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    set.insert(key.to_string(), bytes);
}

pub fn get_f32s(set: &PropertySet, key: &str) -> Result<Vec<f32>> {
    let bytes = blob(set, key)?;
    if bytes.len() % 4 != 0 {
        return Err(malformed(
            key,
            format!("length {} is not a multiple of 4", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

pub fn put_i32s(set: &mut PropertySet, key: &str, values: &[i32]) {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    set.insert(key.to_string(), bytes);
}

pub fn get_i32s(set: &PropertySet, key: &str) -> Result<Vec<i32>> {
    let bytes = blob(set, key)?;
    if bytes.len() % 4 != 0 {
        return Err(malformed(
            key,
            format!("length {} is not a multiple of 4", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

pub fn put_bytes(set: &mut PropertySet, key: &str, value: &[u8]) {
    set.insert(key.to_string(), value.to_vec());
}

pub fn get_bytes(set: &PropertySet, key: &str) -> Result<Vec<u8>> {
    blob(set, key).map(<[u8]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_round_trip() {
        let mut set = PropertySet::new();
        put_i32(&mut set, "Width", 2);
        assert_eq!(set["Width"], vec![2, 0, 0, 0]);
        assert_eq!(get_i32(&set, "Width").unwrap(), 2);
    }

    #[test]
    fn test_i32_negative_is_little_endian() {
        let mut set = PropertySet::new();
        put_i32(&mut set, "Offset", -1);
        assert_eq!(set["Offset"], vec![0xff, 0xff, 0xff, 0xff]);
        assert_eq!(get_i32(&set, "Offset").unwrap(), -1);
    }

    #[test]
    fn test_string_has_no_length_prefix() {
        let mut set = PropertySet::new();
        put_string(&mut set, "Format", "RGB");
        assert_eq!(set["Format"], b"RGB".to_vec());
        assert_eq!(get_string(&set, "Format").unwrap(), "RGB");
    }

    #[test]
    fn test_f32_array_concatenates_elements() {
        let mut set = PropertySet::new();
        put_f32s(&mut set, "Vertices", &[1.0, 2.0]);
        assert_eq!(set["Vertices"].len(), 8);

        let mut expected = 1.0f32.to_le_bytes().to_vec();
        expected.extend_from_slice(&2.0f32.to_le_bytes());
        assert_eq!(set["Vertices"], expected);

        assert_eq!(get_f32s(&set, "Vertices").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_missing_property() {
        let set = PropertySet::new();
        assert!(matches!(
            get_i32(&set, "Width"),
            Err(CodecError::MissingProperty(_))
        ));
        assert!(!contains(&set, "Width"));
    }

    #[test]
    fn test_malformed_length() {
        let mut set = PropertySet::new();
        set.insert("Vertices".into(), vec![0, 1, 2]); // not a multiple of 4
        assert!(matches!(
            get_f32s(&set, "Vertices"),
            Err(CodecError::MalformedProperty { .. })
        ));
        assert!(matches!(
            get_i32(&set, "Vertices"),
            Err(CodecError::MalformedProperty { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut set = PropertySet::new();
        set.insert("Format".into(), vec![0xff, 0xfe]);
        assert!(matches!(
            get_string(&set, "Format"),
            Err(CodecError::MalformedProperty { .. })
        ));
    }

    #[test]
    fn test_empty_arrays_round_trip() {
        let mut set = PropertySet::new();
        put_f32s(&mut set, "Uv", &[]);
        put_i32s(&mut set, "Indices", &[]);
        assert_eq!(get_f32s(&set, "Uv").unwrap(), Vec::<f32>::new());
        assert_eq!(get_i32s(&set, "Indices").unwrap(), Vec::<i32>::new());
    }
}
