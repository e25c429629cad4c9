//! Uniform values stored on effects.

use super::{SamplerObject, Texture2D};
use crate::backend::NativeUniform;

/// Value of a shader uniform.
#[derive(Debug, Clone)]
pub enum UniformValue {
    Ints(Vec<i32>),
    UInts(Vec<u32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    /// Column-major 4x4 matrix.
    Mat4([f32; 16]),
    /// A texture sampled through a texture unit, with an optional sampler
    /// object overriding the texture's sampling state.
    Texture {
        texture: Texture2D,
        sampler: Option<SamplerObject>,
    },
}

impl UniformValue {
    /// Native payload for non-texture values.
    pub(crate) fn as_native(&self) -> Option<NativeUniform<'_>> {
        match self {
            Self::Ints(v) => Some(NativeUniform::Ints(v)),
            Self::UInts(v) => Some(NativeUniform::UInts(v)),
            Self::Floats(v) => Some(NativeUniform::Floats(v)),
            Self::Doubles(v) => Some(NativeUniform::Doubles(v)),
            Self::Mat4(m) => Some(NativeUniform::Mat4(m)),
            Self::Texture { .. } => None,
        }
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Ints(vec![value])
    }
}

impl From<u32> for UniformValue {
    fn from(value: u32) -> Self {
        Self::UInts(vec![value])
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Floats(vec![value])
    }
}

impl From<f64> for UniformValue {
    fn from(value: f64) -> Self {
        Self::Doubles(vec![value])
    }
}

impl<const N: usize> From<[f32; N]> for UniformValue {
    fn from(value: [f32; N]) -> Self {
        Self::Floats(value.to_vec())
    }
}

impl From<Texture2D> for UniformValue {
    fn from(texture: Texture2D) -> Self {
        Self::Texture {
            texture,
            sampler: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct UniformEntry {
    pub(crate) name: String,
    pub(crate) value: UniformValue,
    /// Cached native location; `None` until first pushed.
    pub(crate) location: Option<i32>,
    /// Texture unit assigned to a texture uniform.
    pub(crate) unit: Option<u32>,
    pub(crate) dirty: bool,
}

/// Uniform values of one effect, in first-set order.
#[derive(Debug, Default)]
pub(crate) struct UniformSet {
    entries: Vec<UniformEntry>,
}

impl UniformSet {
    pub(crate) fn set(&mut self, name: &str, value: UniformValue) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.value = value;
                entry.dirty = true;
            }
            None => self.entries.push(UniformEntry {
                name: name.to_string(),
                value,
                location: None,
                unit: None,
                dirty: true,
            }),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&UniformValue> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut UniformEntry> {
        self.entries.iter_mut()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.entries.iter().any(|e| e.dirty)
    }

    pub(crate) fn forget_locations(&mut self) {
        for entry in &mut self.entries {
            entry.location = None;
            entry.dirty = true;
        }
    }
}
