//! Mesh composite codec.
//!
//! The base schema is `Primitive` (string), `Vertices` (f32 array, three per
//! vertex, flattened) and `Indices` (i32 array). Optional extensions are
//! included only when present, so an untextured mesh pays nothing for them:
//! `Uv` (f32 array, two per vertex) and an embedded texture carried as the
//! four bitmap sub-properties. A property set is classified as a mesh payload
//! by the presence of the `Primitive` sentinel key.

use super::bitmap::{BitmapCodec, BitmapPayload};
use super::{Result, contains, get_f32s, get_i32s, get_string, put_f32s, put_i32s, put_string};
use crate::entity::PropertySet;

pub const KEY_PRIMITIVE: &str = "Primitive";
pub const KEY_VERTICES: &str = "Vertices";
pub const KEY_INDICES: &str = "Indices";
pub const KEY_UV: &str = "Uv";

/// A decoded mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPayload {
    /// Primitive kind, e.g. "Triangles" or "Lines".
    pub primitive: String,
    /// Flattened vertex positions, three components per vertex.
    pub vertices: Vec<f32>,
    pub indices: Vec<i32>,
    /// Flattened texture coordinates, two components per vertex.
    pub uv: Option<Vec<f32>>,
    /// Embedded diffuse texture.
    pub texture: Option<BitmapPayload>,
}

/// Encodes/decodes [`MeshPayload`]s; embedded textures go through the
/// contained bitmap codec.
#[derive(Debug, Clone, Default)]
pub struct MeshCodec {
    bitmaps: BitmapCodec,
}

impl MeshCodec {
    pub fn new(bitmaps: BitmapCodec) -> Self {
        Self { bitmaps }
    }

    /// Whether this property set carries a mesh payload.
    pub fn recognizes(set: &PropertySet) -> bool {
        contains(set, KEY_PRIMITIVE)
    }

    pub fn encode(&self, mesh: &MeshPayload, set: &mut PropertySet) -> Result<()> {
        put_string(set, KEY_PRIMITIVE, &mesh.primitive);
        put_f32s(set, KEY_VERTICES, &mesh.vertices);
        put_i32s(set, KEY_INDICES, &mesh.indices);

        if let Some(uv) = &mesh.uv {
            put_f32s(set, KEY_UV, uv);
        }
        if let Some(texture) = &mesh.texture {
            self.bitmaps.encode(texture, set)?;
        }
        Ok(())
    }

    /// Decode a mesh payload from `set`.
    ///
    /// Returns `Ok(None)` if the set is not a mesh payload (no `Primitive`
    /// sentinel). Optional extensions are read only when their keys are
    /// present; extra unrecognized keys are ignored.
    pub fn decode(&self, set: &PropertySet) -> Result<Option<MeshPayload>> {
        if !Self::recognizes(set) {
            return Ok(None);
        }

        let primitive = get_string(set, KEY_PRIMITIVE)?;
        let vertices = get_f32s(set, KEY_VERTICES)?;
        let indices = get_i32s(set, KEY_INDICES)?;

        let uv = if contains(set, KEY_UV) {
            Some(get_f32s(set, KEY_UV)?)
        } else {
            None
        };

        let texture = self.bitmaps.decode(set)?;

        Ok(Some(MeshPayload {
            primitive,
            vertices,
            indices,
            uv,
            texture,
        }))
    }
}
