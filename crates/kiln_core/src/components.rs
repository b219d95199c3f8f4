//! Stock components
//!
//! Records the render, lighting and editor layers attach to entities.
//! `Transform` is plain data and persists as raw bytes; `Material` and `Tag`
//! own strings and carry their own stream encoding.

use crate::define_component;
use crate::ecs::{Component, SerializableComponent};
use crate::stream::{ReadStream, StreamError, WriteStream};
use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};

/// Position, orientation (XYZ Euler angles in radians) and scale.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

define_component!(Transform, 1, "Transform", pod);

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    /// Local-to-parent matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation(), self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Surface parameters consumed by the shading pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub albedo: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Asset path of the albedo texture, if any.
    pub texture: Option<String>,
}

define_component!(Material, 2, "Material", custom);

impl Material {
    pub fn from_albedo(albedo: Vec4) -> Self {
        Self {
            albedo,
            ..Self::default()
        }
    }

    pub fn with_texture(mut self, path: impl Into<String>) -> Self {
        self.texture = Some(path.into());
        self
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            texture: None,
        }
    }
}

impl SerializableComponent for Material {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), StreamError> {
        for channel in self.albedo.to_array() {
            out.write_f32_le(channel)?;
        }
        out.write_f32_le(self.metallic)?;
        out.write_f32_le(self.roughness)?;
        match &self.texture {
            Some(path) => {
                out.write_u8(1)?;
                out.write_str(path)
            }
            None => out.write_u8(0),
        }
    }

    fn deserialize(input: &mut &[u8]) -> Result<Self, StreamError> {
        let mut albedo = [0.0; 4];
        for channel in &mut albedo {
            *channel = input.read_f32_le()?;
        }
        let metallic = input.read_f32_le()?;
        let roughness = input.read_f32_le()?;
        let texture = match input.read_u8()? {
            0 => None,
            _ => Some(input.read_string()?),
        };
        Ok(Self {
            albedo: Vec4::from_array(albedo),
            metallic,
            roughness,
            texture,
        })
    }
}

/// Human-readable entity name shown by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tag {
    pub name: String,
}

define_component!(Tag, 3, "Tag", custom);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SerializableComponent for Tag {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), StreamError> {
        out.write_str(&self.name)
    }

    fn deserialize(input: &mut &[u8]) -> Result<Self, StreamError> {
        Ok(Self {
            name: input.read_string()?,
        })
    }
}

/// Register the stock components and their serializers.
///
/// Scenes register types lazily; call this before reading a stream that may
/// contain stock components not yet used by the process.
pub fn register_builtin() {
    Transform::ensure_registered();
    Material::ensure_registered();
    Tag::ensure_registered();
}
