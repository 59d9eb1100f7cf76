//! Wire records and spatial math for replicated world objects.
//!
//! Every replicated entity travels as an [`EntityRecord`]: a globally unique
//! name, a spatial frame (position / rotation / scale), a type tag naming the
//! property schema, and a flat property set (name → binary blob). Rotation is
//! carried as Euler angles in degrees and converted to/from a quaternion
//! locally.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flat property representation: property name → opaque byte blob.
///
/// Keys are unique, order is irrelevant. The structure of each blob is owned
/// by the codec for the entity's type tag.
pub type PropertySet = HashMap<String, Vec<u8>>;

/// A 3-component vector (position, scale, or Euler rotation in degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion.
///
/// The wire format carries rotations as Euler degrees; this is the local
/// representation for code that needs to compose rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Build a quaternion from XYZ Euler angles in degrees.
    pub fn from_euler_degrees(euler: Vec3) -> Self {
        let (hx, hy, hz) = (
            euler.x.to_radians() * 0.5,
            euler.y.to_radians() * 0.5,
            euler.z.to_radians() * 0.5,
        );
        let (sx, cx) = hx.sin_cos();
        let (sy, cy) = hy.sin_cos();
        let (sz, cz) = hz.sin_cos();

        Quat {
            x: sx * cy * cz - cx * sy * sz,
            y: cx * sy * cz + sx * cy * sz,
            z: cx * cy * sz - sx * sy * cz,
            w: cx * cy * cz + sx * sy * sz,
        }
    }

    /// Convert back to XYZ Euler angles in degrees.
    ///
    /// The pitch term is clamped so accumulated floating point error near the
    /// poles cannot push `asin` out of domain.
    pub fn to_euler_degrees(&self) -> Vec3 {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);

        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

        Vec3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }
}

/// The spatial frame of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in degrees (wire representation).
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// The rotation as a quaternion.
    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler_degrees(self.rotation)
    }
}

/// Full record for an entity as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Globally unique, human-readable entity name.
    pub name: String,
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
    /// Type tag selecting the property schema (e.g. "Mesh", "Bitmap").
    pub kind: String,
    /// Property name → binary blob.
    pub properties: PropertySet,
}

impl EntityRecord {
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// The record without its name, for update calls that carry the name
    /// out-of-band.
    pub fn to_update(&self) -> UpdateRecord {
        UpdateRecord {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            kind: self.kind.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Update record: an [`EntityRecord`] minus the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub kind: String,
    pub properties: PropertySet,
}

/// Self-contained transform notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRecord {
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl TransformRecord {
    pub fn new(name: &str, transform: Transform) -> Self {
        Self {
            name: name.to_string(),
            position: transform.position,
            rotation: transform.rotation,
            scale: transform.scale,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}
