//! Bitmap composite codec.
//!
//! A bitmap payload is four named sub-properties inside a property set:
//! `Width` (i32), `Height` (i32), `Format` (string name from the configured
//! [`FormatTable`]) and `Pixels` (raw bytes). A property set is classified as
//! a bitmap payload by the presence of the `Pixels` sentinel key.

use super::format::{FormatTable, PixelFormat};
use super::{CodecError, Result, contains, get_bytes, get_i32, get_string, put_bytes, put_i32, put_string};
use crate::entity::PropertySet;

pub const KEY_WIDTH: &str = "Width";
pub const KEY_HEIGHT: &str = "Height";
pub const KEY_FORMAT: &str = "Format";
pub const KEY_PIXELS: &str = "Pixels";

/// A decoded bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapPayload {
    pub width: i32,
    pub height: i32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

/// Encodes/decodes [`BitmapPayload`]s against a configured format table.
#[derive(Debug, Clone)]
pub struct BitmapCodec {
    formats: FormatTable,
}

impl BitmapCodec {
    pub fn new(formats: FormatTable) -> Self {
        Self { formats }
    }

    /// Whether this property set carries a bitmap payload.
    pub fn recognizes(set: &PropertySet) -> bool {
        contains(set, KEY_PIXELS)
    }

    /// Write the bitmap's four sub-properties into `set`.
    ///
    /// Fails with [`CodecError::UnsupportedFormat`] if the format is outside
    /// the configured table, and rejects a pixel buffer whose length does not
    /// match `width * height * bytes_per_pixel`.
    pub fn encode(&self, bitmap: &BitmapPayload, set: &mut PropertySet) -> Result<()> {
        let name = self.formats.name_for(bitmap.format)?;
        let expected = expected_len(bitmap.width, bitmap.height, bitmap.format);
        if bitmap.pixels.len() != expected {
            return Err(CodecError::MalformedProperty {
                key: KEY_PIXELS.to_string(),
                reason: format!("expected {} bytes, got {}", expected, bitmap.pixels.len()),
            });
        }

        put_i32(set, KEY_WIDTH, bitmap.width);
        put_i32(set, KEY_HEIGHT, bitmap.height);
        put_string(set, KEY_FORMAT, name);
        put_bytes(set, KEY_PIXELS, &bitmap.pixels);
        Ok(())
    }

    /// Decode a bitmap payload from `set`.
    ///
    /// Returns `Ok(None)` if the set is not a bitmap payload (no `Pixels`
    /// sentinel) — unrecognized payloads are tolerated, not errors, so
    /// forward-compatible extra properties never break an older client.
    pub fn decode(&self, set: &PropertySet) -> Result<Option<BitmapPayload>> {
        if !Self::recognizes(set) {
            return Ok(None);
        }

        let width = get_i32(set, KEY_WIDTH)?;
        let height = get_i32(set, KEY_HEIGHT)?;
        let format = self.formats.format_for(&get_string(set, KEY_FORMAT)?)?;
        let pixels = get_bytes(set, KEY_PIXELS)?;

        let expected = expected_len(width, height, format);
        if pixels.len() != expected {
            return Err(CodecError::MalformedProperty {
                key: KEY_PIXELS.to_string(),
                reason: format!("expected {} bytes, got {}", expected, pixels.len()),
            });
        }

        Ok(Some(BitmapPayload {
            width,
            height,
            format,
            pixels,
        }))
    }
}

impl Default for BitmapCodec {
    fn default() -> Self {
        Self::new(FormatTable::default())
    }
}

fn expected_len(width: i32, height: i32, format: PixelFormat) -> usize {
    width.max(0) as usize * height.max(0) as usize * format.bytes_per_pixel()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario: width=2, height=1, RGB, 6 pixel bytes.
    fn sample() -> BitmapPayload {
        BitmapPayload {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb,
            pixels: vec![10, 20, 30, 40, 50, 60],
        }
    }

    #[test]
    fn test_encode_produces_expected_blobs() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        codec.encode(&sample(), &mut set).unwrap();

        assert_eq!(set[KEY_WIDTH], vec![2, 0, 0, 0]);
        assert_eq!(set[KEY_HEIGHT], vec![1, 0, 0, 0]);
        assert_eq!(set[KEY_FORMAT], b"RGB".to_vec());
        assert_eq!(set[KEY_PIXELS], vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_decode_reproduces_inputs() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        codec.encode(&sample(), &mut set).unwrap();

        let decoded = codec.decode(&set).unwrap().unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_ignores_non_bitmap_payload() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        set.insert("SomethingElse".into(), vec![1, 2, 3]);
        assert!(codec.decode(&set).unwrap().is_none());
    }

    #[test]
    fn test_decode_tolerates_extra_keys() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        codec.encode(&sample(), &mut set).unwrap();
        set.insert("FutureExtension".into(), vec![0xAA]);

        let decoded = codec.decode(&set).unwrap().unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_unknown_format_name_fails() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        codec.encode(&sample(), &mut set).unwrap();
        set.insert(KEY_FORMAT.into(), b"YUV420".to_vec());

        assert!(matches!(
            codec.decode(&set),
            Err(CodecError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_pixel_length_mismatch_is_malformed() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        codec.encode(&sample(), &mut set).unwrap();
        set.insert(KEY_PIXELS.into(), vec![1, 2, 3]); // 2x1 RGB needs 6

        assert!(matches!(
            codec.decode(&set),
            Err(CodecError::MalformedProperty { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_wrong_pixel_count() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        let mut bitmap = sample();
        bitmap.pixels.pop();

        assert!(matches!(
            codec.encode(&bitmap, &mut set),
            Err(CodecError::MalformedProperty { .. })
        ));
    }

    #[test]
    fn test_missing_width_is_missing_property() {
        let codec = BitmapCodec::default();
        let mut set = PropertySet::new();
        codec.encode(&sample(), &mut set).unwrap();
        set.remove(KEY_WIDTH);

        assert!(matches!(
            codec.decode(&set),
            Err(CodecError::MissingProperty(_))
        ));
    }
}
