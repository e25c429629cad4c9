//! Shader and effect resources.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Bindable, ResourceCore, UniformSet, UniformValue, impl_resource};
use crate::backend::NativeHandle;
use crate::device::Device;
use crate::types::{ColorMask, DepthFunc, DstFactor, ShaderStage, SrcFactor};
use crate::uid::ResourceKind;

/// A compiled shader stage.
#[derive(Clone)]
pub struct ShaderProgram {
    inner: Arc<ShaderInner>,
}

struct ShaderInner {
    core: ResourceCore,
    stage: ShaderStage,
}

impl ShaderProgram {
    pub(crate) fn new(device: &Arc<Device>, stage: ShaderStage) -> Self {
        Self {
            inner: Arc::new(ShaderInner {
                core: ResourceCore::new(device, ResourceKind::Shader, NativeHandle::NONE),
                stage,
            }),
        }
    }

    pub(crate) fn attach(&self, shader: NativeHandle) {
        self.inner.core.set_handle(shader);
    }

    pub fn stage(&self) -> ShaderStage {
        self.inner.stage
    }
}

impl_resource!(ShaderProgram);

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("stage", &self.inner.stage)
            .finish()
    }
}

/// Pipeline state applied together with an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectData {
    pub depth_test: bool,
    pub depth_func: DepthFunc,
    pub depth_mask: bool,
    pub color_mask: ColorMask,
    pub stencil_test: bool,
    pub stencil_mask: u32,
    pub src_factor: SrcFactor,
    pub dst_factor: DstFactor,
    pub blend: bool,
}

impl Default for EffectData {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_func: DepthFunc::default(),
            depth_mask: true,
            color_mask: ColorMask::ALL,
            stencil_test: false,
            stencil_mask: u32::MAX,
            src_factor: SrcFactor::default(),
            dst_factor: DstFactor::default(),
            blend: false,
        }
    }
}

/// A linked program together with its pipeline state.
///
/// Changes to the effect's [`EffectData`] take effect the next time the
/// effect is applied with [`RenderContext::apply`](crate::RenderContext::apply).
/// To change state immediately use the [`RenderState`](crate::RenderState)
/// setters instead.
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    core: ResourceCore,
    data: Mutex<EffectData>,
    uniforms: Mutex<UniformSet>,
}

impl Effect {
    pub(crate) fn new(device: &Arc<Device>) -> Self {
        Self {
            inner: Arc::new(EffectInner {
                core: ResourceCore::new(device, ResourceKind::Program, NativeHandle::NONE),
                data: Mutex::new(EffectData::default()),
                uniforms: Mutex::new(UniformSet::default()),
            }),
        }
    }

    /// Attach a linked program. Uniform locations of a previous program are
    /// dropped and every uniform is pushed again.
    pub(crate) fn attach(&self, program: NativeHandle) {
        self.inner.core.set_handle(program);
        self.inner.uniforms.lock().forget_locations();
    }

    /// Set a uniform value.
    ///
    /// The value is pushed to the driver on the next draw that uses this
    /// effect.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) {
        self.inner.uniforms.lock().set(name, value.into());
    }

    /// Get the last value set for a uniform.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.inner.uniforms.lock().get(name).cloned()
    }

    pub(crate) fn uniforms(&self) -> &Mutex<UniformSet> {
        &self.inner.uniforms
    }

    /// Get a snapshot of the effect's pipeline state.
    pub fn data(&self) -> EffectData {
        *self.inner.data.lock()
    }

    /// Replace the effect's pipeline state.
    pub fn set_data(&self, data: EffectData) {
        *self.inner.data.lock() = data;
    }

    pub fn depth_test(&self) -> bool {
        self.inner.data.lock().depth_test
    }

    pub fn set_depth_test(&self, enabled: bool) {
        self.inner.data.lock().depth_test = enabled;
    }

    pub fn depth_func(&self) -> DepthFunc {
        self.inner.data.lock().depth_func
    }

    pub fn set_depth_func(&self, func: DepthFunc) {
        self.inner.data.lock().depth_func = func;
    }

    pub fn depth_mask(&self) -> bool {
        self.inner.data.lock().depth_mask
    }

    pub fn set_depth_mask(&self, enabled: bool) {
        self.inner.data.lock().depth_mask = enabled;
    }

    pub fn color_mask(&self) -> ColorMask {
        self.inner.data.lock().color_mask
    }

    pub fn set_color_mask(&self, mask: ColorMask) {
        self.inner.data.lock().color_mask = mask;
    }

    pub fn stencil_test(&self) -> bool {
        self.inner.data.lock().stencil_test
    }

    pub fn set_stencil_test(&self, enabled: bool) {
        self.inner.data.lock().stencil_test = enabled;
    }

    pub fn set_stencil_mask(&self, mask: u32) {
        self.inner.data.lock().stencil_mask = mask;
    }

    pub fn set_blend_func(&self, src: SrcFactor, dst: DstFactor) {
        let mut data = self.inner.data.lock();
        data.src_factor = src;
        data.dst_factor = dst;
    }

    pub fn blend(&self) -> bool {
        self.inner.data.lock().blend
    }

    pub fn set_blend(&self, enabled: bool) {
        self.inner.data.lock().blend = enabled;
    }
}

impl_resource!(Effect);

impl Bindable for Effect {}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("data", &*self.inner.data.lock())
            .finish()
    }
}

static_assertions::assert_impl_all!(ShaderProgram: Send, Sync);
static_assertions::assert_impl_all!(Effect: Send, Sync);
