//! Render state recorded on a deferred context.
//!
//! [`DeferredRenderState`] mirrors the setters and draws of
//! [`RenderState`]. Nothing reaches the driver while recording; each call
//! records a command that the consumer replays through its own
//! [`RenderState`], so the bind cache elides redundant calls at replay.
//! Recorded frames can be replayed repeatedly with
//! `execute_commands(context, false)`.

use super::command::{Command, CommandKind};
use super::DeferredContext;
use crate::context::{RenderState, check_draw_range, check_texture_unit};
use crate::error::GlError;
use crate::resources::{
    Effect, Framebuffer, IndexBuffer, SamplerObject, Texture2D, UniformValue, VertexBuffer,
};
use crate::types::{ClearFlags, ColorMask, DepthFunc, DstFactor, Rect, SrcFactor};

/// A render state change or draw recorded for replay.
#[derive(Debug)]
pub(crate) enum StateCommand {
    Apply(Effect),
    BindVertexBuffer(Option<VertexBuffer>),
    BindIndexBuffer(Option<IndexBuffer>),
    BindTexture {
        unit: u32,
        texture: Option<Texture2D>,
    },
    BindSampler {
        unit: u32,
        sampler: Option<SamplerObject>,
    },
    BindEffect(Option<Effect>),
    SetFramebuffer(Option<Framebuffer>),
    SetUniform {
        name: String,
        value: UniformValue,
    },
    DepthTest(bool),
    DepthFunc(DepthFunc),
    DepthMask(bool),
    ColorMask(ColorMask),
    StencilTest(bool),
    StencilMask(u32),
    Blend(bool),
    BlendFunc(SrcFactor, DstFactor),
    Viewport(Rect),
    Clear(ClearFlags),
    Draw {
        buffer: VertexBuffer,
        start: usize,
        count: usize,
    },
    DrawIndexed {
        buffer: VertexBuffer,
        indices: IndexBuffer,
        start: usize,
        count: usize,
    },
}

impl StateCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Apply(_) => "Apply",
            Self::BindVertexBuffer(_) => "BindVertexBuffer",
            Self::BindIndexBuffer(_) => "BindIndexBuffer",
            Self::BindTexture { .. } => "BindTexture",
            Self::BindSampler { .. } => "BindSampler",
            Self::BindEffect(_) => "BindEffect",
            Self::SetFramebuffer(_) => "SetFramebuffer",
            Self::SetUniform { .. } => "SetUniform",
            Self::DepthTest(_) => "SetDepthTest",
            Self::DepthFunc(_) => "SetDepthFunc",
            Self::DepthMask(_) => "SetDepthMask",
            Self::ColorMask(_) => "SetColorMask",
            Self::StencilTest(_) => "SetStencilTest",
            Self::StencilMask(_) => "SetStencilMask",
            Self::Blend(_) => "SetBlend",
            Self::BlendFunc(..) => "SetBlendFunc",
            Self::Viewport(_) => "SetViewport",
            Self::Clear(_) => "Clear",
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
        }
    }

    pub(crate) fn execute(&self, state: &mut RenderState) -> Result<(), GlError> {
        match self {
            Self::Apply(effect) => state.apply(effect),
            Self::BindVertexBuffer(buffer) => state.bind_vertex_buffer(buffer.as_ref()),
            Self::BindIndexBuffer(buffer) => state.bind_index_buffer(buffer.as_ref()),
            Self::BindTexture { unit, texture } => state.bind_texture(*unit, texture.as_ref()),
            Self::BindSampler { unit, sampler } => state.bind_sampler(*unit, sampler.as_ref()),
            Self::BindEffect(effect) => state.bind_effect(effect.as_ref()),
            Self::SetFramebuffer(framebuffer) => state.set_framebuffer(framebuffer.as_ref()),
            Self::SetUniform { name, value } => state.set_uniform(name, value.clone()),
            Self::DepthTest(enabled) => state.set_depth_test(*enabled),
            Self::DepthFunc(func) => state.set_depth_func(*func),
            Self::DepthMask(enabled) => state.set_depth_mask(*enabled),
            Self::ColorMask(mask) => state.set_color_mask(*mask),
            Self::StencilTest(enabled) => state.set_stencil_test(*enabled),
            Self::StencilMask(mask) => state.set_stencil_mask(*mask),
            Self::Blend(enabled) => state.set_blend(*enabled),
            Self::BlendFunc(src, dst) => state.set_blend_func(*src, *dst),
            Self::Viewport(viewport) => state.set_viewport(*viewport),
            Self::Clear(flags) => state.clear(*flags),
            Self::Draw {
                buffer,
                start,
                count,
            } => state.draw_range(buffer, *start, *count),
            Self::DrawIndexed {
                buffer,
                indices,
                start,
                count,
            } => state.draw_indexed_range(buffer, indices, *start, *count),
        }
    }
}

/// Render state of a [`DeferredContext`].
///
/// Obtained from [`DeferredContext::apply`] or [`DeferredContext::state`].
/// Texture units and draw ranges are validated while recording; everything
/// else is checked by the consumer's [`RenderState`] at replay.
pub struct DeferredRenderState<'a> {
    context: &'a mut DeferredContext,
    max_texture_units: u32,
}

impl<'a> DeferredRenderState<'a> {
    pub(crate) fn new(context: &'a mut DeferredContext) -> Self {
        let max_texture_units = context.device.capabilities().max_texture_units;
        Self {
            context,
            max_texture_units,
        }
    }

    fn record(&mut self, command: StateCommand) {
        self.context.push(Command::new(CommandKind::State(command)));
    }

    pub(crate) fn record_apply(&mut self, effect: &Effect) {
        self.record(StateCommand::Apply(effect.clone()));
    }

    pub fn bind_vertex_buffer(&mut self, buffer: Option<&VertexBuffer>) -> Result<(), GlError> {
        self.record(StateCommand::BindVertexBuffer(buffer.cloned()));
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: Option<&IndexBuffer>) -> Result<(), GlError> {
        self.record(StateCommand::BindIndexBuffer(buffer.cloned()));
        Ok(())
    }

    /// Record binding `texture` to texture unit `unit`.
    ///
    /// # Errors
    ///
    /// Returns a state error if `unit` is out of range for the device.
    pub fn bind_texture(&mut self, unit: u32, texture: Option<&Texture2D>) -> Result<(), GlError> {
        check_texture_unit(unit, self.max_texture_units, "DeferredRenderState::bind_texture")?;
        self.record(StateCommand::BindTexture {
            unit,
            texture: texture.cloned(),
        });
        Ok(())
    }

    pub fn bind_sampler(
        &mut self,
        unit: u32,
        sampler: Option<&SamplerObject>,
    ) -> Result<(), GlError> {
        check_texture_unit(unit, self.max_texture_units, "DeferredRenderState::bind_sampler")?;
        self.record(StateCommand::BindSampler {
            unit,
            sampler: sampler.cloned(),
        });
        Ok(())
    }

    pub fn bind_effect(&mut self, effect: Option<&Effect>) -> Result<(), GlError> {
        self.record(StateCommand::BindEffect(effect.cloned()));
        Ok(())
    }

    pub fn set_framebuffer(&mut self, framebuffer: Option<&Framebuffer>) -> Result<(), GlError> {
        self.record(StateCommand::SetFramebuffer(framebuffer.cloned()));
        Ok(())
    }

    /// Record setting a uniform of the effect in use at replay.
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), GlError> {
        self.record(StateCommand::SetUniform {
            name: name.to_string(),
            value: value.into(),
        });
        Ok(())
    }

    pub fn set_depth_test(&mut self, enabled: bool) -> Result<(), GlError> {
        self.record(StateCommand::DepthTest(enabled));
        Ok(())
    }

    pub fn set_depth_func(&mut self, func: DepthFunc) -> Result<(), GlError> {
        self.record(StateCommand::DepthFunc(func));
        Ok(())
    }

    pub fn set_depth_mask(&mut self, enabled: bool) -> Result<(), GlError> {
        self.record(StateCommand::DepthMask(enabled));
        Ok(())
    }

    pub fn set_color_mask(&mut self, mask: ColorMask) -> Result<(), GlError> {
        self.record(StateCommand::ColorMask(mask));
        Ok(())
    }

    pub fn set_stencil_test(&mut self, enabled: bool) -> Result<(), GlError> {
        self.record(StateCommand::StencilTest(enabled));
        Ok(())
    }

    pub fn set_stencil_mask(&mut self, mask: u32) -> Result<(), GlError> {
        self.record(StateCommand::StencilMask(mask));
        Ok(())
    }

    pub fn set_blend(&mut self, enabled: bool) -> Result<(), GlError> {
        self.record(StateCommand::Blend(enabled));
        Ok(())
    }

    pub fn set_blend_func(&mut self, src: SrcFactor, dst: DstFactor) -> Result<(), GlError> {
        self.record(StateCommand::BlendFunc(src, dst));
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Rect) -> Result<(), GlError> {
        self.record(StateCommand::Viewport(viewport));
        Ok(())
    }

    pub fn clear(&mut self, flags: ClearFlags) -> Result<(), GlError> {
        self.record(StateCommand::Clear(flags));
        Ok(())
    }

    pub fn draw(&mut self, buffer: &VertexBuffer) -> Result<(), GlError> {
        self.draw_range(buffer, 0, buffer.vertex_count())
    }

    /// Record drawing `count` vertices of `buffer` starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the range exceeds the buffer.
    pub fn draw_range(
        &mut self,
        buffer: &VertexBuffer,
        start: usize,
        count: usize,
    ) -> Result<(), GlError> {
        check_draw_range(
            start,
            count,
            buffer.vertex_count(),
            "vertices",
            "DeferredRenderState::draw_range",
        )?;
        self.record(StateCommand::Draw {
            buffer: buffer.clone(),
            start,
            count,
        });
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        buffer: &VertexBuffer,
        indices: &IndexBuffer,
    ) -> Result<(), GlError> {
        self.draw_indexed_range(buffer, indices, 0, indices.index_count())
    }

    pub fn draw_indexed_range(
        &mut self,
        buffer: &VertexBuffer,
        indices: &IndexBuffer,
        start: usize,
        count: usize,
    ) -> Result<(), GlError> {
        check_draw_range(
            start,
            count,
            indices.index_count(),
            "indices",
            "DeferredRenderState::draw_indexed_range",
        )?;
        self.record(StateCommand::DrawIndexed {
            buffer: buffer.clone(),
            indices: indices.clone(),
            start,
            count,
        });
        Ok(())
    }
}

impl std::fmt::Debug for DeferredRenderState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredRenderState")
            .field("recorded", &self.context.recorded())
            .field("max_texture_units", &self.max_texture_units)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingDriver;
    use crate::config::DeviceParameters;
    use crate::device::Device;
    use crate::error::ErrorKind;
    use crate::types::{BufferUsage, PositionVertex, PrimitiveType};
    use std::sync::Arc;

    fn create_test_device() -> (Arc<RecordingDriver>, Arc<Device>) {
        let driver = Arc::new(RecordingDriver::new().with_max_texture_units(4));
        let device = Device::new(driver.clone(), DeviceParameters::default()).unwrap();
        (driver, device)
    }

    #[test]
    fn test_recording_does_not_touch_driver() {
        let (driver, device) = create_test_device();
        let mut deferred = device.create_deferred_context();
        let mut state = deferred.state();
        state.set_viewport(Rect::new(0, 0, 8, 8)).unwrap();
        state.set_blend(true).unwrap();
        state.clear(ClearFlags::COLOR).unwrap();

        assert_eq!(deferred.recorded(), 3);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_invalid_input_is_rejected_while_recording() {
        let (_driver, device) = create_test_device();
        let mut deferred = device.create_deferred_context();
        let buffer = deferred
            .create_vertex_buffer(
                &[PositionVertex::new(0.0, 0.0, 0.0); 3],
                PrimitiveType::Triangles,
                BufferUsage::Static,
            )
            .unwrap();

        let mut state = deferred.state();
        let err = state.bind_texture(4, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        let err = state.draw_range(&buffer, 2, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(deferred.recorded(), 1);
    }
}
