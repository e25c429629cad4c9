//! Immediate rendering context.
//!
//! The [`RenderContext`] is owned by the single consumer thread. It creates
//! resources directly on the driver, owns the [`RenderState`] cache and
//! replays command queues recorded by [`DeferredContext`]s.
//!
//! [`DeferredContext`]: crate::DeferredContext

mod state;

pub use state::RenderState;
pub(crate) use state::{check_draw_range, check_texture_unit};

use std::sync::Arc;

use crate::backend::{Driver, NativeHandle, conversion};
use crate::deferred::DeferredQueue;
use crate::device::Device;
use crate::error::{DriverResultExt, ErrorKind, GlError};
use crate::mapping::MappedMemory;
use crate::resources::{
    Effect, Framebuffer, IndexBuffer, Mappable, Resource, SamplerObject, ShaderProgram, Syncable,
    Texture2D, VertexBuffer,
};
use crate::sync::SyncStatus;
use crate::types::{
    BufferUsage, IndexElement, IndexType, MapAccess, PrimitiveType, SamplerDescriptor,
    ShaderStage, Size2d, TextureFormat, Vertex, VertexLayout,
};

/// Validate a map request and return the mapped byte range.
pub(crate) fn map_byte_range<R: Mappable>(
    resource: &R,
    offset: usize,
    length: usize,
    access: MapAccess,
    operation: &'static str,
) -> Result<(usize, usize), GlError> {
    if access == MapAccess::Read {
        return Err(GlError::not_implemented(operation));
    }
    let count = resource.element_count();
    if offset.checked_add(length).is_none_or(|end| end > count) {
        return Err(GlError::state(
            operation,
            format!(
                "cannot map with offset {offset} and length {length} when buffer size is {count}"
            ),
        ));
    }
    let element_size = resource.element_size();
    Ok((offset * element_size, length * element_size))
}

/// Validate the formats of framebuffer attachments.
pub(crate) fn check_attachments(
    color: &[Texture2D],
    depth_stencil: Option<&Texture2D>,
    operation: &'static str,
) -> Result<(), GlError> {
    if color.is_empty() && depth_stencil.is_none() {
        return Err(GlError::resource_creation(
            operation,
            "framebuffer needs at least one attachment",
        ));
    }
    if let Some(texture) = color.iter().find(|texture| texture.format().is_depth()) {
        return Err(GlError::resource_creation(
            operation,
            format!("color attachment {} has depth format {:?}", texture.uid(), texture.format()),
        ));
    }
    if let Some(texture) = depth_stencil
        && !texture.format().is_depth()
    {
        return Err(GlError::resource_creation(
            operation,
            format!("depth attachment {} has color format {:?}", texture.uid(), texture.format()),
        ));
    }
    Ok(())
}

/// Validate a vertex layout and the size of its initial data.
pub(crate) fn check_vertex_data(
    layout: &VertexLayout,
    count: usize,
    data: Option<&[u8]>,
    operation: &'static str,
) -> Result<(), GlError> {
    if layout.attributes.is_empty() || layout.attributes.len() > VertexLayout::MAX_ATTRIBUTES {
        return Err(GlError::resource_creation(
            operation,
            format!(
                "vertex layout must have between 1 and {} attributes, got {}",
                VertexLayout::MAX_ATTRIBUTES,
                layout.attributes.len()
            ),
        ));
    }
    check_data_len(layout.stride as usize * count, data, operation)
}

pub(crate) fn check_data_len(
    expected: usize,
    data: Option<&[u8]>,
    operation: &'static str,
) -> Result<(), GlError> {
    match data {
        Some(data) if data.len() != expected => Err(GlError::resource_creation(
            operation,
            format!(
                "initial data is {} bytes but the resource holds {} bytes",
                data.len(),
                expected
            ),
        )),
        _ => Ok(()),
    }
}

/// The immediate context.
///
/// Created by [`Device::create_render_context`]; at most one exists per
/// device at a time.
///
/// # Example
///
/// ```ignore
/// let mut context = device.create_render_context()?;
/// let triangle = context.create_vertex_buffer(&vertices, PrimitiveType::Triangles, BufferUsage::Static)?;
/// context.apply(&effect)?.draw(&triangle)?;
/// device.end_frame()?;
/// ```
pub struct RenderContext {
    device: Arc<Device>,
    state: RenderState,
}

impl RenderContext {
    pub(crate) fn new(device: Arc<Device>) -> Self {
        let state = RenderState::new(Arc::clone(&device));
        Self { device, state }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn driver(&self) -> &Arc<dyn Driver> {
        self.device.driver()
    }

    /// Get the render state cache.
    pub fn state(&mut self) -> &mut RenderState {
        &mut self.state
    }

    /// Use `effect` and apply its pipeline state.
    ///
    /// The effect's uniforms are pushed again on the next draw.
    pub fn apply(&mut self, effect: &Effect) -> Result<&mut RenderState, GlError> {
        self.state.apply(effect)?;
        Ok(&mut self.state)
    }

    /// Replay the commands flushed to `queue` against this context.
    ///
    /// See [`DeferredQueue::execute_commands`].
    pub fn execute(&mut self, queue: &DeferredQueue, clear: bool) -> Result<(), GlError> {
        queue.execute_commands(self, clear)
    }

    // ------------------------------------------------------------------
    // Resource creation
    // ------------------------------------------------------------------

    /// Create a vertex buffer holding `vertices`.
    pub fn create_vertex_buffer<V: Vertex>(
        &mut self,
        vertices: &[V],
        primitive: PrimitiveType,
        usage: BufferUsage,
    ) -> Result<VertexBuffer, GlError> {
        self.create_vertex_buffer_with_layout(
            V::layout(),
            vertices.len(),
            Some(bytemuck::cast_slice(vertices)),
            primitive,
            usage,
        )
    }

    /// Create a vertex buffer of `count` vertices described by `layout`.
    ///
    /// With `data` of `None` the contents are undefined until written
    /// through [`map_range`](Self::map_range).
    pub fn create_vertex_buffer_with_layout(
        &mut self,
        layout: VertexLayout,
        count: usize,
        data: Option<&[u8]>,
        primitive: PrimitiveType,
        usage: BufferUsage,
    ) -> Result<VertexBuffer, GlError> {
        check_vertex_data(&layout, count, data, "RenderContext::create_vertex_buffer")?;
        let buffer = VertexBuffer::new(
            &self.device,
            layout,
            count,
            primitive,
            usage,
            SyncStatus::Signaled,
        );
        self.realize_vertex_buffer(&buffer, data)?;
        Ok(buffer)
    }

    /// Create an index buffer holding `indices`.
    pub fn create_index_buffer<I: IndexElement>(
        &mut self,
        indices: &[I],
        usage: BufferUsage,
    ) -> Result<IndexBuffer, GlError> {
        self.create_index_buffer_with_type(
            I::INDEX_TYPE,
            indices.len(),
            Some(bytemuck::cast_slice(indices)),
            usage,
        )
    }

    pub fn create_index_buffer_with_type(
        &mut self,
        index_type: IndexType,
        count: usize,
        data: Option<&[u8]>,
        usage: BufferUsage,
    ) -> Result<IndexBuffer, GlError> {
        check_data_len(
            index_type.size() as usize * count,
            data,
            "RenderContext::create_index_buffer",
        )?;
        let buffer = IndexBuffer::new(&self.device, index_type, count, usage, SyncStatus::Signaled);
        self.realize_index_buffer(&buffer, data)?;
        Ok(buffer)
    }

    /// Create a 2D texture, optionally with initial pixel data.
    pub fn create_texture_2d(
        &mut self,
        size: Size2d,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> Result<Texture2D, GlError> {
        check_data_len(
            size.area() as usize * format.bytes_per_pixel() as usize,
            data,
            "RenderContext::create_texture_2d",
        )?;
        let texture = Texture2D::new(&self.device, size, format, SyncStatus::Signaled);
        self.realize_texture_2d(&texture, data)?;
        Ok(texture)
    }

    pub fn create_sampler_object(
        &mut self,
        descriptor: SamplerDescriptor,
    ) -> Result<SamplerObject, GlError> {
        let handle = self
            .driver()
            .create_sampler(&conversion::convert_sampler(&descriptor))
            .or_gl(
                ErrorKind::ResourceCreation,
                "RenderContext::create_sampler_object",
                "Could not create sampler object",
            )?;
        Ok(SamplerObject::new(&self.device, descriptor, handle))
    }

    /// Compile a shader stage.
    pub fn create_shader_program(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderProgram, GlError> {
        let shader = ShaderProgram::new(&self.device, stage);
        self.realize_shader(&shader, source)?;
        Ok(shader)
    }

    /// Link `shaders` into an effect with default pipeline state.
    pub fn create_effect(&mut self, shaders: &[ShaderProgram]) -> Result<Effect, GlError> {
        let effect = Effect::new(&self.device);
        self.realize_effect(&effect, shaders)?;
        Ok(effect)
    }

    pub fn create_framebuffer(
        &mut self,
        color_attachments: &[Texture2D],
        depth_stencil: Option<&Texture2D>,
    ) -> Result<Framebuffer, GlError> {
        check_attachments(color_attachments, depth_stencil, "RenderContext::create_framebuffer")?;
        let framebuffer = Framebuffer::new(
            &self.device,
            color_attachments.to_vec(),
            depth_stencil.cloned(),
        );
        self.realize_framebuffer(&framebuffer)?;
        Ok(framebuffer)
    }

    // ------------------------------------------------------------------
    // Native creation, shared with deferred replay
    // ------------------------------------------------------------------

    /// Run a replayed creation of `resource`.
    ///
    /// Replaying without clearing creates a new native object for a
    /// resource that already has one. The old object is deleted, so its
    /// cached bindings are dropped.
    pub(crate) fn recreate<R: Resource>(
        &mut self,
        resource: &R,
        realize: impl FnOnce(&Self) -> Result<(), GlError>,
    ) -> Result<(), GlError> {
        let replaced = resource.is_created();
        realize(&*self)?;
        if replaced {
            self.state.forget(resource.kind(), resource.uid());
        }
        Ok(())
    }

    pub(crate) fn realize_vertex_buffer(
        &self,
        buffer: &VertexBuffer,
        data: Option<&[u8]>,
    ) -> Result<(), GlError> {
        const OP: &str = "RenderContext::create_vertex_buffer";
        let driver = self.driver();
        let handle = driver
            .create_buffer(
                buffer.byte_size(),
                data,
                conversion::convert_buffer_usage(buffer.usage()),
            )
            .or_gl(ErrorKind::ResourceCreation, OP, "Could not create vertex buffer")?;

        let attributes = conversion::convert_vertex_layout(buffer.layout());
        let vertex_array = match driver.create_vertex_array(handle, &attributes) {
            Ok(vertex_array) => vertex_array,
            Err(e) => {
                if let Err(delete) = driver.delete_buffer(handle) {
                    log::error!("Failed to delete orphaned buffer {}: {}", handle.0, delete);
                }
                return Err(GlError::resource_creation(
                    OP,
                    format!("Could not create vertex array. Reason: {e}"),
                ));
            }
        };

        buffer.attach(handle, vertex_array);
        buffer.sync().signal();
        Ok(())
    }

    pub(crate) fn realize_index_buffer(
        &self,
        buffer: &IndexBuffer,
        data: Option<&[u8]>,
    ) -> Result<(), GlError> {
        let handle = self
            .driver()
            .create_buffer(
                buffer.byte_size(),
                data,
                conversion::convert_buffer_usage(buffer.usage()),
            )
            .or_gl(
                ErrorKind::ResourceCreation,
                "RenderContext::create_index_buffer",
                "Could not create index buffer",
            )?;
        buffer.attach(handle);
        buffer.sync().signal();
        Ok(())
    }

    pub(crate) fn realize_texture_2d(
        &self,
        texture: &Texture2D,
        data: Option<&[u8]>,
    ) -> Result<(), GlError> {
        let handle = self
            .driver()
            .create_texture_2d(
                conversion::convert_texture_format(texture.format()),
                texture.width(),
                texture.height(),
                data,
            )
            .or_gl(
                ErrorKind::ResourceCreation,
                "RenderContext::create_texture_2d",
                "Could not create texture",
            )?;
        texture.attach(handle);
        texture.sync().signal();
        Ok(())
    }

    pub(crate) fn realize_shader(
        &self,
        shader: &ShaderProgram,
        source: &str,
    ) -> Result<(), GlError> {
        let handle = self
            .driver()
            .create_shader(conversion::convert_shader_stage(shader.stage()), source)
            .or_gl(
                ErrorKind::Program,
                "RenderContext::create_shader_program",
                &format!("Could not compile {:?} shader", shader.stage()),
            )?;
        shader.attach(handle);
        Ok(())
    }

    pub(crate) fn realize_effect(
        &self,
        effect: &Effect,
        shaders: &[ShaderProgram],
    ) -> Result<(), GlError> {
        const OP: &str = "RenderContext::create_effect";
        let handles = native_handles(shaders, ErrorKind::Program, OP)?;
        let handle = self
            .driver()
            .create_program(&handles)
            .or_gl(ErrorKind::Program, OP, "Could not link program")?;
        effect.attach(handle);
        Ok(())
    }

    pub(crate) fn realize_framebuffer(&self, framebuffer: &Framebuffer) -> Result<(), GlError> {
        const OP: &str = "RenderContext::create_framebuffer";
        let color = native_handles(framebuffer.color_attachments(), ErrorKind::ResourceCreation, OP)?;
        let depth_stencil = match framebuffer.depth_stencil() {
            Some(texture) => Some(
                native_handles(std::slice::from_ref(texture), ErrorKind::ResourceCreation, OP)?[0],
            ),
            None => None,
        };
        let handle = self
            .driver()
            .create_framebuffer(&color, depth_stencil)
            .or_gl(ErrorKind::ResourceCreation, OP, "Could not create framebuffer")?;
        framebuffer.attach(handle);
        Ok(())
    }

    /// Write staged bytes into the native buffer of `target`.
    pub(crate) fn upload_staged(
        &self,
        target: &dyn Syncable,
        offset: usize,
        data: &[u8],
    ) -> Result<(), GlError> {
        const OP: &str = "RenderContext::upload_staged";
        let buffer = target.native_handle();
        if !buffer.is_some() {
            return Err(GlError::state(
                OP,
                format!(
                    "cannot upload to {:?} {} before its native object exists",
                    target.kind(),
                    target.uid()
                ),
            ));
        }
        self.driver()
            .buffer_sub_data(buffer, offset, data)
            .or_gl(ErrorKind::State, OP, "Could not upload staged range")
    }

    // ------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------

    /// Map `length` elements of `resource` starting at element `offset`.
    ///
    /// The written bytes are uploaded when the mapping is unmapped or
    /// dropped.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` for [`MapAccess::Read`]
    /// - `State` if the range exceeds the resource or the resource has no
    ///   native object yet
    pub fn map_range<R: Mappable>(
        &mut self,
        resource: &R,
        offset: usize,
        length: usize,
        access: MapAccess,
    ) -> Result<ImmediateMapping<'_>, GlError> {
        const OP: &str = "RenderContext::map_range";
        let (byte_offset, byte_len) = map_byte_range(resource, offset, length, access, OP)?;
        let buffer = resource.native_handle();
        if !buffer.is_some() {
            return Err(GlError::state(
                OP,
                format!(
                    "cannot map {:?} {} before its native object exists",
                    resource.kind(),
                    resource.uid()
                ),
            ));
        }
        Ok(ImmediateMapping {
            driver: self.device.driver(),
            buffer,
            byte_offset,
            element_size: resource.element_size(),
            data: vec![0; byte_len],
            uploaded: false,
        })
    }

    /// Map the whole of `resource`.
    pub fn map<R: Mappable>(
        &mut self,
        resource: &R,
        access: MapAccess,
    ) -> Result<ImmediateMapping<'_>, GlError> {
        self.map_range(resource, 0, resource.element_count(), access)
    }
}

fn native_handles<R: Resource>(
    resources: &[R],
    kind: ErrorKind,
    operation: &'static str,
) -> Result<Vec<NativeHandle>, GlError> {
    resources
        .iter()
        .map(|resource| {
            let handle = resource.native_handle();
            if handle.is_some() {
                Ok(handle)
            } else {
                Err(GlError::new(
                    kind,
                    operation,
                    format!(
                        "{:?} {} has no native object yet",
                        resource.kind(),
                        resource.uid()
                    ),
                ))
            }
        })
        .collect()
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.device.release_render_context();
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("device", &self.device)
            .field("state", &self.state)
            .finish()
    }
}

/// A mapped range of a resource on the immediate context.
///
/// Writes are staged on the CPU and uploaded with a single sub-data call on
/// [`unmap`](Self::unmap) or drop.
pub struct ImmediateMapping<'a> {
    driver: &'a Arc<dyn Driver>,
    buffer: NativeHandle,
    byte_offset: usize,
    element_size: usize,
    data: Vec<u8>,
    uploaded: bool,
}

impl ImmediateMapping<'_> {
    /// Upload the written range.
    pub fn unmap(mut self) -> Result<(), GlError> {
        self.upload()
    }

    fn upload(&mut self) -> Result<(), GlError> {
        self.uploaded = true;
        self.driver
            .buffer_sub_data(self.buffer, self.byte_offset, &self.data)
            .or_gl(
                ErrorKind::State,
                "ImmediateMapping::unmap",
                "Could not upload mapped range",
            )
    }
}

impl MappedMemory for ImmediateMapping<'_> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn element_size(&self) -> usize {
        self.element_size
    }

    fn len(&self) -> usize {
        self.data.len() / self.element_size.max(1)
    }
}

impl Drop for ImmediateMapping<'_> {
    fn drop(&mut self) {
        if !self.uploaded
            && let Err(e) = self.upload()
        {
            log::error!("{e}");
        }
    }
}

impl std::fmt::Debug for ImmediateMapping<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmediateMapping")
            .field("buffer", &self.buffer)
            .field("byte_offset", &self.byte_offset)
            .field("len", &self.data.len())
            .finish()
    }
}
