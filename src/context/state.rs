//! Render state cache.
//!
//! [`RenderState`] remembers, by UID, what is bound to every pipeline slot
//! and the value of every scalar pipeline toggle. A setter that asks for
//! what is already bound issues no native call. Otherwise the native call
//! is made first and the cache is updated only if it succeeded, so the cache
//! always matches the driver even when a call fails.
//!
//! Each bound slot also holds a strong reference to its resource. Binding a
//! different resource releases the previous one.

use std::sync::Arc;

use crate::backend::{Driver, NativeHandle, NativeUniform, conversion};
use crate::device::Device;
use crate::error::{DriverResultExt, ErrorKind, GlError};
use crate::resources::{
    Bindable, Effect, Framebuffer, IndexBuffer, Resource, SamplerObject, Texture2D, UniformValue,
    VertexBuffer,
};
use crate::types::{ClearFlags, ColorMask, DepthFunc, DstFactor, Rect, SrcFactor};
use crate::uid::{ResourceKind, Uid};

/// One cached pipeline slot.
#[derive(Debug)]
struct BoundSlot<T> {
    resource: Option<T>,
}

impl<T: Bindable> BoundSlot<T> {
    fn empty() -> Self {
        Self { resource: None }
    }

    fn uid(&self) -> Uid {
        self.resource.as_ref().map_or(Uid::NONE, Resource::uid)
    }

    fn replace(&mut self, resource: Option<&T>) {
        self.resource = resource.cloned();
    }

    fn forget(&mut self, uid: Uid) -> bool {
        if self.uid() != uid {
            return false;
        }
        self.resource = None;
        true
    }
}

/// Native handle of a resource about to be bound.
///
/// Binding a resource whose native object does not exist yet would silently
/// unbind the slot on the driver side.
fn bind_handle<T: Resource>(
    resource: Option<&T>,
    operation: &'static str,
) -> Result<NativeHandle, GlError> {
    match resource {
        None => Ok(NativeHandle::NONE),
        Some(resource) if resource.is_created() => Ok(resource.native_handle()),
        Some(resource) => Err(GlError::state(
            operation,
            format!(
                "{:?} {} has no native object yet; execute its creation command first",
                resource.kind(),
                resource.uid()
            ),
        )),
    }
}

pub(crate) fn check_texture_unit(
    unit: u32,
    max_texture_units: u32,
    operation: &'static str,
) -> Result<(), GlError> {
    if unit >= max_texture_units {
        return Err(GlError::state(
            operation,
            format!(
                "You are trying to bind to texture unit {unit} but the hardware supports only {max_texture_units} units"
            ),
        ));
    }
    Ok(())
}

/// Check that `count` elements from `start` lie within `total`.
pub(crate) fn check_draw_range(
    start: usize,
    count: usize,
    total: usize,
    what: &str,
    operation: &'static str,
) -> Result<(), GlError> {
    if start.checked_add(count).is_none_or(|end| end > total) {
        return Err(GlError::state(
            operation,
            format!("cannot draw {count} {what} from {start} when buffer holds {total}"),
        ));
    }
    Ok(())
}

/// Cached pipeline state of the immediate context.
///
/// Obtained from [`RenderContext::apply`](crate::RenderContext::apply) or
/// [`RenderContext::state`](crate::RenderContext::state).
pub struct RenderState {
    device: Arc<Device>,
    max_texture_units: u32,

    vertex_buffer: BoundSlot<VertexBuffer>,
    index_buffer: BoundSlot<IndexBuffer>,
    textures: Vec<BoundSlot<Texture2D>>,
    samplers: Vec<BoundSlot<SamplerObject>>,
    effect: BoundSlot<Effect>,
    framebuffer: BoundSlot<Framebuffer>,

    active_texture: u32,
    next_active_texture: u32,

    depth_test: bool,
    depth_func: DepthFunc,
    depth_mask: bool,
    color_mask: ColorMask,
    stencil_test: bool,
    stencil_mask: u32,
    blend: bool,
    blend_func: (SrcFactor, DstFactor),
    viewport: Option<Rect>,

    apply_uniforms: bool,
}

impl RenderState {
    pub(crate) fn new(device: Arc<Device>) -> Self {
        let max_texture_units = device.capabilities().max_texture_units;
        Self {
            device,
            max_texture_units,
            vertex_buffer: BoundSlot::empty(),
            index_buffer: BoundSlot::empty(),
            textures: (0..max_texture_units).map(|_| BoundSlot::empty()).collect(),
            samplers: (0..max_texture_units).map(|_| BoundSlot::empty()).collect(),
            effect: BoundSlot::empty(),
            framebuffer: BoundSlot::empty(),
            active_texture: 0,
            next_active_texture: 0,
            depth_test: false,
            depth_func: DepthFunc::Less,
            depth_mask: true,
            color_mask: ColorMask::ALL,
            stencil_test: false,
            stencil_mask: u32::MAX,
            blend: false,
            blend_func: (SrcFactor::One, DstFactor::Zero),
            viewport: None,
            apply_uniforms: false,
        }
    }

    fn driver(&self) -> &Arc<dyn Driver> {
        self.device.driver()
    }

    fn cache_hit(&self, slot: &str, uid: Uid) {
        if self.device.debug_mode() {
            log::trace!("RenderState: {slot} already bound to {uid}, skipping");
        }
    }

    /// Number of texture units tracked.
    pub fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Bind the vertex array of `buffer`, or unbind with `None`.
    pub fn bind_vertex_buffer(&mut self, buffer: Option<&VertexBuffer>) -> Result<(), GlError> {
        const OP: &str = "RenderState::bind_vertex_buffer";
        let uid = buffer.map_or(Uid::NONE, Resource::uid);
        if self.vertex_buffer.uid() == uid {
            self.cache_hit("vertex buffer", uid);
            return Ok(());
        }
        bind_handle(buffer, OP)?;
        let vertex_array = buffer.map_or(NativeHandle::NONE, VertexBuffer::vertex_array);
        self.driver()
            .bind_vertex_array(vertex_array)
            .or_gl(ErrorKind::State, OP, "Could not bind vertex array")?;
        self.vertex_buffer.replace(buffer);
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: Option<&IndexBuffer>) -> Result<(), GlError> {
        const OP: &str = "RenderState::bind_index_buffer";
        let uid = buffer.map_or(Uid::NONE, Resource::uid);
        if self.index_buffer.uid() == uid {
            self.cache_hit("index buffer", uid);
            return Ok(());
        }
        let handle = bind_handle(buffer, OP)?;
        self.driver()
            .bind_index_buffer(handle)
            .or_gl(ErrorKind::State, OP, "Could not bind index buffer")?;
        self.index_buffer.replace(buffer);
        Ok(())
    }

    /// Select the active texture unit.
    pub fn set_active_texture(&mut self, unit: u32) -> Result<(), GlError> {
        const OP: &str = "RenderState::set_active_texture";
        check_texture_unit(unit, self.max_texture_units, OP)?;
        if self.active_texture == unit {
            return Ok(());
        }
        self.driver()
            .active_texture(unit)
            .or_gl(ErrorKind::State, OP, "Could not change active texture")?;
        self.active_texture = unit;
        Ok(())
    }

    /// Currently active texture unit.
    pub fn active_texture(&self) -> u32 {
        self.active_texture
    }

    /// Bind `texture` to texture unit `unit`.
    ///
    /// # Errors
    ///
    /// Returns a state error if `unit` is not below
    /// [`max_texture_units`](Self::max_texture_units).
    pub fn bind_texture(&mut self, unit: u32, texture: Option<&Texture2D>) -> Result<(), GlError> {
        const OP: &str = "RenderState::bind_texture";
        check_texture_unit(unit, self.max_texture_units, OP)?;
        let uid = texture.map_or(Uid::NONE, Resource::uid);
        if self.textures[unit as usize].uid() == uid {
            self.cache_hit("texture unit", uid);
            return Ok(());
        }
        let handle = bind_handle(texture, OP)?;
        self.set_active_texture(unit)?;
        self.driver()
            .bind_texture(conversion::TEXTURE_2D, handle)
            .or_gl(ErrorKind::State, OP, "Could not bind texture")?;
        self.textures[unit as usize].replace(texture);
        Ok(())
    }

    /// Bind `sampler` to texture unit `unit`.
    pub fn bind_sampler(
        &mut self,
        unit: u32,
        sampler: Option<&SamplerObject>,
    ) -> Result<(), GlError> {
        const OP: &str = "RenderState::bind_sampler";
        check_texture_unit(unit, self.max_texture_units, OP)?;
        let uid = sampler.map_or(Uid::NONE, Resource::uid);
        if self.samplers[unit as usize].uid() == uid {
            self.cache_hit("sampler unit", uid);
            return Ok(());
        }
        let handle = bind_handle(sampler, OP)?;
        self.driver()
            .bind_sampler(unit, handle)
            .or_gl(ErrorKind::State, OP, "Could not bind sampler object")?;
        self.samplers[unit as usize].replace(sampler);
        Ok(())
    }

    /// Use the program of `effect` without applying its pipeline data.
    pub fn bind_effect(&mut self, effect: Option<&Effect>) -> Result<(), GlError> {
        const OP: &str = "RenderState::bind_effect";
        let uid = effect.map_or(Uid::NONE, Resource::uid);
        if self.effect.uid() == uid {
            self.cache_hit("effect", uid);
            return Ok(());
        }
        let handle = bind_handle(effect, OP)?;
        self.driver()
            .use_program(handle)
            .or_gl(ErrorKind::State, OP, "Could not use program")?;
        self.effect.replace(effect);
        Ok(())
    }

    /// Render into `framebuffer`, or into the default framebuffer with `None`.
    pub fn set_framebuffer(&mut self, framebuffer: Option<&Framebuffer>) -> Result<(), GlError> {
        const OP: &str = "RenderState::set_framebuffer";
        let uid = framebuffer.map_or(Uid::NONE, Resource::uid);
        if self.framebuffer.uid() == uid {
            self.cache_hit("framebuffer", uid);
            return Ok(());
        }
        let handle = bind_handle(framebuffer, OP)?;
        self.driver()
            .bind_framebuffer(handle)
            .or_gl(ErrorKind::State, OP, "Could not bind framebuffer")?;
        self.framebuffer.replace(framebuffer);
        match framebuffer.map(Framebuffer::draw_buffer_count) {
            Some(0) => self
                .driver()
                .disable_color_buffers()
                .or_gl(ErrorKind::State, OP, "Could not disable color buffers")?,
            Some(count) => self
                .driver()
                .draw_buffers(count)
                .or_gl(ErrorKind::State, OP, "Could not set draw buffers")?,
            None => {}
        }
        Ok(())
    }

    /// Drop every cached binding of the resource `uid` of `kind`.
    ///
    /// Called when the native object behind a resource is replaced. The
    /// driver unbinds a deleted object, so the slots become empty.
    pub(crate) fn forget(&mut self, kind: ResourceKind, uid: Uid) {
        let forgotten = match kind {
            ResourceKind::VertexBuffer => self.vertex_buffer.forget(uid),
            ResourceKind::IndexBuffer => self.index_buffer.forget(uid),
            ResourceKind::Texture => self
                .textures
                .iter_mut()
                .fold(false, |any, slot| slot.forget(uid) | any),
            ResourceKind::Sampler => self
                .samplers
                .iter_mut()
                .fold(false, |any, slot| slot.forget(uid) | any),
            ResourceKind::Program => self.effect.forget(uid),
            ResourceKind::Framebuffer => self.framebuffer.forget(uid),
            ResourceKind::Shader => false,
        };
        if forgotten {
            log::debug!("RenderState: dropped bindings of replaced {kind:?} {uid}");
        }
    }

    /// UID of the bound vertex buffer.
    pub fn vertex_buffer_uid(&self) -> Uid {
        self.vertex_buffer.uid()
    }

    pub fn index_buffer_uid(&self) -> Uid {
        self.index_buffer.uid()
    }

    /// UID of the texture bound to `unit`, or `Uid::NONE` for an unknown unit.
    pub fn texture_uid(&self, unit: u32) -> Uid {
        self.textures.get(unit as usize).map_or(Uid::NONE, BoundSlot::uid)
    }

    pub fn sampler_uid(&self, unit: u32) -> Uid {
        self.samplers.get(unit as usize).map_or(Uid::NONE, BoundSlot::uid)
    }

    pub fn effect_uid(&self) -> Uid {
        self.effect.uid()
    }

    pub fn framebuffer_uid(&self) -> Uid {
        self.framebuffer.uid()
    }

    /// The effect currently in use.
    pub fn effect(&self) -> Option<&Effect> {
        self.effect.resource.as_ref()
    }

    // ------------------------------------------------------------------
    // Scalar pipeline state
    // ------------------------------------------------------------------

    fn set_capability(
        &self,
        capability: u32,
        enabled: bool,
        operation: &'static str,
    ) -> Result<(), GlError> {
        self.driver()
            .set_capability(capability, enabled)
            .or_gl(ErrorKind::State, operation, "Could not toggle capability")
    }

    pub fn set_depth_test(&mut self, enabled: bool) -> Result<(), GlError> {
        if self.depth_test == enabled {
            return Ok(());
        }
        self.set_capability(conversion::DEPTH_TEST, enabled, "RenderState::set_depth_test")?;
        self.depth_test = enabled;
        Ok(())
    }

    pub fn set_depth_func(&mut self, func: DepthFunc) -> Result<(), GlError> {
        if self.depth_func == func {
            return Ok(());
        }
        self.driver()
            .depth_func(conversion::convert_depth_func(func))
            .or_gl(
                ErrorKind::State,
                "RenderState::set_depth_func",
                "Could not set depth function",
            )?;
        self.depth_func = func;
        Ok(())
    }

    pub fn set_depth_mask(&mut self, enabled: bool) -> Result<(), GlError> {
        if self.depth_mask == enabled {
            return Ok(());
        }
        self.driver().depth_mask(enabled).or_gl(
            ErrorKind::State,
            "RenderState::set_depth_mask",
            "Could not set depth mask",
        )?;
        self.depth_mask = enabled;
        Ok(())
    }

    pub fn set_color_mask(&mut self, mask: ColorMask) -> Result<(), GlError> {
        if self.color_mask == mask {
            return Ok(());
        }
        self.driver()
            .color_mask(
                mask.contains(ColorMask::RED),
                mask.contains(ColorMask::GREEN),
                mask.contains(ColorMask::BLUE),
                mask.contains(ColorMask::ALPHA),
            )
            .or_gl(
                ErrorKind::State,
                "RenderState::set_color_mask",
                "Could not set color mask",
            )?;
        self.color_mask = mask;
        Ok(())
    }

    pub fn set_stencil_test(&mut self, enabled: bool) -> Result<(), GlError> {
        if self.stencil_test == enabled {
            return Ok(());
        }
        self.set_capability(
            conversion::STENCIL_TEST,
            enabled,
            "RenderState::set_stencil_test",
        )?;
        self.stencil_test = enabled;
        Ok(())
    }

    pub fn set_stencil_mask(&mut self, mask: u32) -> Result<(), GlError> {
        if self.stencil_mask == mask {
            return Ok(());
        }
        self.driver().stencil_mask(mask).or_gl(
            ErrorKind::State,
            "RenderState::set_stencil_mask",
            "Could not set stencil mask",
        )?;
        self.stencil_mask = mask;
        Ok(())
    }

    pub fn set_blend(&mut self, enabled: bool) -> Result<(), GlError> {
        if self.blend == enabled {
            return Ok(());
        }
        self.set_capability(conversion::BLEND, enabled, "RenderState::set_blend")?;
        self.blend = enabled;
        Ok(())
    }

    pub fn set_blend_func(&mut self, src: SrcFactor, dst: DstFactor) -> Result<(), GlError> {
        if self.blend_func == (src, dst) {
            return Ok(());
        }
        self.driver()
            .blend_func(
                conversion::convert_src_factor(src),
                conversion::convert_dst_factor(dst),
            )
            .or_gl(
                ErrorKind::State,
                "RenderState::set_blend_func",
                "Could not set blend function",
            )?;
        self.blend_func = (src, dst);
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Rect) -> Result<(), GlError> {
        if self.viewport == Some(viewport) {
            return Ok(());
        }
        self.driver()
            .viewport(viewport.x, viewport.y, viewport.width, viewport.height)
            .or_gl(
                ErrorKind::State,
                "RenderState::set_viewport",
                "Could not set viewport",
            )?;
        self.viewport = Some(viewport);
        Ok(())
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    pub fn depth_func(&self) -> DepthFunc {
        self.depth_func
    }

    pub fn depth_mask(&self) -> bool {
        self.depth_mask
    }

    pub fn color_mask(&self) -> ColorMask {
        self.color_mask
    }

    pub fn stencil_test(&self) -> bool {
        self.stencil_test
    }

    pub fn stencil_mask(&self) -> u32 {
        self.stencil_mask
    }

    pub fn blend(&self) -> bool {
        self.blend
    }

    pub fn blend_func(&self) -> (SrcFactor, DstFactor) {
        self.blend_func
    }

    pub fn viewport(&self) -> Option<Rect> {
        self.viewport
    }

    // ------------------------------------------------------------------
    // Effects and uniforms
    // ------------------------------------------------------------------

    /// Use `effect` and apply its pipeline data.
    ///
    /// Uniforms of the effect are pushed again on the next draw, even when
    /// the effect was already in use.
    pub(crate) fn apply(&mut self, effect: &Effect) -> Result<(), GlError> {
        self.bind_effect(Some(effect))?;
        self.apply_uniforms = true;

        let data = effect.data();
        self.set_depth_test(data.depth_test)?;
        self.set_depth_func(data.depth_func)?;
        self.set_depth_mask(data.depth_mask)?;
        self.set_color_mask(data.color_mask)?;
        self.set_stencil_test(data.stencil_test)?;
        self.set_stencil_mask(data.stencil_mask)?;
        self.set_blend(data.blend)?;
        self.set_blend_func(data.src_factor, data.dst_factor)?;
        Ok(())
    }

    /// Check if uniforms will be pushed on the next draw regardless of
    /// whether they changed.
    pub fn apply_uniforms_pending(&self) -> bool {
        self.apply_uniforms
    }

    /// Set a uniform of the effect in use.
    ///
    /// # Errors
    ///
    /// Returns a state error if no effect is in use.
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), GlError> {
        let Some(effect) = self.effect.resource.as_ref() else {
            return Err(GlError::state(
                "RenderState::set_uniform",
                format!("cannot set uniform `{name}` without an applied effect"),
            ));
        };
        effect.set_uniform(name, value);
        Ok(())
    }

    /// Next texture unit in round robin order.
    fn next_active_texture(&mut self) -> u32 {
        let unit = self.next_active_texture;
        self.next_active_texture = (unit + 1) % self.max_texture_units;
        unit
    }

    /// Push the uniforms of the effect in use.
    ///
    /// Every uniform is pushed after [`apply`](Self::apply); otherwise only
    /// uniforms changed since the last push.
    fn push_uniforms(&mut self) -> Result<(), GlError> {
        const OP: &str = "RenderState::push_uniforms";
        let Some(effect) = self.effect.resource.clone() else {
            return Ok(());
        };
        let push_all = self.apply_uniforms;
        let program = effect.native_handle();

        let mut uniforms = effect.uniforms().lock();
        if !push_all && !uniforms.is_dirty() {
            return Ok(());
        }

        for entry in uniforms.entries_mut() {
            if !push_all && !entry.dirty {
                continue;
            }

            let location = match entry.location {
                Some(location) => location,
                None => {
                    let location = self
                        .driver()
                        .uniform_location(program, &entry.name)
                        .or_gl(ErrorKind::Program, OP, "Could not query uniform location")?;
                    entry.location = Some(location);
                    location
                }
            };
            if location < 0 {
                entry.dirty = false;
                continue;
            }

            match &entry.value {
                UniformValue::Texture { texture, sampler } => {
                    let unit = match entry.unit {
                        Some(unit) => unit,
                        None => {
                            let unit = self.next_active_texture();
                            entry.unit = Some(unit);
                            unit
                        }
                    };
                    self.bind_texture(unit, Some(texture))?;
                    self.bind_sampler(unit, sampler.as_ref())?;
                    self.driver()
                        .set_uniform(location, NativeUniform::Ints(&[unit as i32]))
                        .or_gl(ErrorKind::State, OP, "Could not set sampler uniform")?;
                }
                value => {
                    if let Some(native) = value.as_native() {
                        self.driver()
                            .set_uniform(location, native)
                            .or_gl(ErrorKind::State, OP, "Could not set uniform")?;
                    }
                }
            }
            entry.dirty = false;
        }

        self.apply_uniforms = false;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    /// Clear the buffers selected by `flags`.
    pub fn clear(&mut self, flags: ClearFlags) -> Result<(), GlError> {
        self.driver()
            .clear(conversion::convert_clear_flags(flags))
            .or_gl(ErrorKind::State, "RenderState::clear", "Could not clear")
    }

    /// Draw every vertex of `buffer`.
    pub fn draw(&mut self, buffer: &VertexBuffer) -> Result<(), GlError> {
        self.draw_range(buffer, 0, buffer.vertex_count())
    }

    /// Draw `count` vertices of `buffer` starting at vertex `start`.
    pub fn draw_range(
        &mut self,
        buffer: &VertexBuffer,
        start: usize,
        count: usize,
    ) -> Result<(), GlError> {
        const OP: &str = "RenderState::draw_range";
        check_draw_range(start, count, buffer.vertex_count(), "vertices", OP)?;
        self.bind_vertex_buffer(Some(buffer))?;
        self.push_uniforms()?;
        self.driver()
            .draw_arrays(
                conversion::convert_primitive_type(buffer.primitive_type()),
                start as u32,
                count as u32,
            )
            .or_gl(ErrorKind::State, OP, "Could not draw vertices")
    }

    /// Draw `buffer` using every index of `indices`.
    pub fn draw_indexed(
        &mut self,
        buffer: &VertexBuffer,
        indices: &IndexBuffer,
    ) -> Result<(), GlError> {
        self.draw_indexed_range(buffer, indices, 0, indices.index_count())
    }

    /// Draw `buffer` using `count` indices of `indices` starting at `start`.
    pub fn draw_indexed_range(
        &mut self,
        buffer: &VertexBuffer,
        indices: &IndexBuffer,
        start: usize,
        count: usize,
    ) -> Result<(), GlError> {
        const OP: &str = "RenderState::draw_indexed_range";
        check_draw_range(start, count, indices.index_count(), "indices", OP)?;
        self.bind_vertex_buffer(Some(buffer))?;
        self.bind_index_buffer(Some(indices))?;
        self.push_uniforms()?;
        let index_type = indices.index_type();
        self.driver()
            .draw_elements(
                conversion::convert_primitive_type(buffer.primitive_type()),
                count as u32,
                conversion::convert_index_type(index_type),
                start * index_type.size() as usize,
            )
            .or_gl(ErrorKind::State, OP, "Could not draw indexed vertices")
    }
}

impl std::fmt::Debug for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderState")
            .field("vertex_buffer", &self.vertex_buffer.uid())
            .field("index_buffer", &self.index_buffer.uid())
            .field("effect", &self.effect.uid())
            .field("framebuffer", &self.framebuffer.uid())
            .field("active_texture", &self.active_texture)
            .field("max_texture_units", &self.max_texture_units)
            .finish_non_exhaustive()
    }
}
