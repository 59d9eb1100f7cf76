//! Pixel format names for the bitmap codec.
//!
//! Formats are never sent as numeric enums on the wire; they travel as short
//! canonical name strings ("RGB", "RGBA", ...) translated through a
//! configurable name ↔ format table supplied at codec construction.

use super::{CodecError, Result};
use std::collections::HashMap;

/// A pixel memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Rgba,
    Argb,
    Bgra,
    Gray,
}

impl PixelFormat {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba | PixelFormat::Argb | PixelFormat::Bgra => 4,
            PixelFormat::Gray => 1,
        }
    }
}

/// Configurable name ↔ format translation table.
///
/// Deployments that only ever exchange a subset of formats construct the
/// table with exactly that subset; an unrecognized name or format fails with
/// [`CodecError::UnsupportedFormat`].
#[derive(Debug, Clone)]
pub struct FormatTable {
    by_name: HashMap<String, PixelFormat>,
    by_format: HashMap<PixelFormat, String>,
}

impl FormatTable {
    /// An empty table. Every translation fails until entries are added.
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
            by_format: HashMap::new(),
        }
    }

    /// Register a name ↔ format pair. Later entries win on collision.
    pub fn with(mut self, name: &str, format: PixelFormat) -> Self {
        self.by_name.insert(name.to_string(), format);
        self.by_format.insert(format, name.to_string());
        self
    }

    /// Translate a wire name into a format.
    pub fn format_for(&self, name: &str) -> Result<PixelFormat> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::UnsupportedFormat(name.to_string()))
    }

    /// Translate a format into its wire name.
    pub fn name_for(&self, format: PixelFormat) -> Result<&str> {
        self.by_format
            .get(&format)
            .map(String::as_str)
            .ok_or_else(|| CodecError::UnsupportedFormat(format!("{format:?}")))
    }
}

impl Default for FormatTable {
    /// The canonical table covering the formats exchanged in practice.
    fn default() -> Self {
        Self::empty()
            .with("RGB", PixelFormat::Rgb)
            .with("RGBA", PixelFormat::Rgba)
            .with("ARGB", PixelFormat::Argb)
    }
}
