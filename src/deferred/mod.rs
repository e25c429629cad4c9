//! Deferred command recording.
//!
//! A [`DeferredContext`] lets a producer thread create resources and write
//! buffer data without touching the driver. Every operation records a
//! [`Command`]; [`DeferredContext::flush`] hands the recorded commands to
//! the context's [`DeferredQueue`], and the consumer thread replays them with
//! [`DeferredQueue::execute_commands`].
//!
//! ```text
//! producer thread                         consumer thread
//! ---------------                         ---------------
//! create_vertex_buffer()  -> Command
//! map_range() / unmap()   -> Command
//! apply(&effect).draw()   -> Command
//! flush()                 -> DeferredQueue -> execute_commands(&mut RenderContext)
//! ```
//!
//! Resources are returned immediately with a UID but without a native
//! object. Their sync object is signaled once the creation command has been
//! replayed.

mod arena;
mod command;
mod queue;
mod state;

pub use command::{Command, ExecuteFn, ReleaseFn};
pub use queue::DeferredQueue;
pub use state::DeferredRenderState;

use std::sync::Arc;
use std::time::Duration;

use arena::StagingArena;
use command::{CommandKind, UploadTarget};

use crate::context::{
    RenderContext, check_attachments, check_data_len, check_vertex_data, map_byte_range,
};
use crate::device::Device;
use crate::error::GlError;
use crate::mapping::MappedMemory;
use crate::resources::{
    Effect, Framebuffer, IndexBuffer, Mappable, ShaderProgram, Syncable, Texture2D, VertexBuffer,
};
use crate::sync::SyncStatus;
use crate::types::{
    BufferUsage, IndexElement, IndexType, MapAccess, PrimitiveType, ShaderStage, Size2d,
    TextureFormat, Vertex, VertexLayout,
};

/// Handle of a recorded command.
///
/// Valid until the next [`DeferredContext::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    index: usize,
    epoch: u64,
}

/// Command recorder owned by one producer thread.
pub struct DeferredContext {
    device: Arc<Device>,
    queue: Arc<DeferredQueue>,
    recording: Vec<Command>,
    /// Incremented on every flush to invalidate outstanding handles.
    epoch: u64,
    arena: StagingArena,
}

impl DeferredContext {
    pub(crate) fn new(device: Arc<Device>) -> Self {
        let params = device.parameters();
        let recording = Vec::with_capacity(params.command_capacity);
        let arena = StagingArena::new(params.staging_arena_size);
        Self {
            device,
            queue: Arc::new(DeferredQueue::new()),
            recording,
            epoch: 0,
            arena,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Get the queue this context flushes into.
    ///
    /// Hand it to the consumer thread, which replays it with
    /// [`DeferredQueue::execute_commands`].
    pub fn queue(&self) -> Arc<DeferredQueue> {
        Arc::clone(&self.queue)
    }

    /// Number of commands recorded since the last flush.
    pub fn recorded(&self) -> usize {
        self.recording.len()
    }

    fn push(&mut self, command: Command) -> CommandHandle {
        let handle = CommandHandle {
            index: self.recording.len(),
            epoch: self.epoch,
        };
        log::trace!(
            "DeferredContext: recorded {} at {}",
            command.name(),
            handle.index
        );
        self.recording.push(command);
        handle
    }

    /// Record a custom command.
    ///
    /// `execute` runs on the consumer thread each time the command is
    /// replayed. `release` runs exactly once, when the command is dropped
    /// after the flushed set is cleared.
    pub fn add_command<E, R>(&mut self, execute: E, release: R) -> CommandHandle
    where
        E: FnMut(&mut RenderContext) -> Result<(), GlError> + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        self.push(Command::custom(Box::new(execute), Box::new(release)))
    }

    /// Record the use of `effect` with its pipeline state and get the
    /// deferred render state to record draws with.
    pub fn apply(&mut self, effect: &Effect) -> DeferredRenderState<'_> {
        let mut state = DeferredRenderState::new(self);
        state.record_apply(effect);
        state
    }

    /// Get the deferred render state without applying an effect.
    pub fn state(&mut self) -> DeferredRenderState<'_> {
        DeferredRenderState::new(self)
    }

    /// Get a recorded command, or `None` if `handle` predates the last flush.
    pub fn command_mut(&mut self, handle: CommandHandle) -> Option<&mut Command> {
        if handle.epoch != self.epoch {
            return None;
        }
        self.recording.get_mut(handle.index)
    }

    /// Hand every recorded command to the queue.
    ///
    /// Does not execute anything. Flushing again before the consumer
    /// replays appends to the flushed set.
    pub fn flush(&mut self) -> u64 {
        let count = self.recording.len();
        let flushed_epoch = self.queue.submit(&mut self.recording);
        self.epoch += 1;
        if self.recording.capacity() == 0 {
            self.recording
                .reserve(self.device.parameters().command_capacity);
        }
        log::debug!("DeferredContext: flushed {count} commands (epoch {flushed_epoch})");
        flushed_epoch
    }

    /// Flush and block until the consumer has replayed the flushed batch.
    pub fn flush_and_wait(&mut self) {
        let epoch = self.flush();
        self.queue.wait_executed(epoch, None);
    }

    /// Flush and block until the batch is replayed or `timeout` elapses.
    ///
    /// Returns `false` on timeout; the batch stays flushed.
    pub fn flush_and_wait_timeout(&mut self, timeout: Duration) -> bool {
        let epoch = self.flush();
        self.queue.wait_executed(epoch, Some(timeout))
    }

    // ------------------------------------------------------------------
    // Resource creation
    // ------------------------------------------------------------------

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

    /// Record the creation of a vertex buffer.
    ///
    /// `data` is copied into the staging arena.
    pub fn create_vertex_buffer_with_layout(
        &mut self,
        layout: VertexLayout,
        count: usize,
        data: Option<&[u8]>,
        primitive: PrimitiveType,
        usage: BufferUsage,
    ) -> Result<VertexBuffer, GlError> {
        check_vertex_data(&layout, count, data, "DeferredContext::create_vertex_buffer")?;
        let buffer = VertexBuffer::new(
            &self.device,
            layout,
            count,
            primitive,
            usage,
            SyncStatus::Unsignaled,
        );
        let data = data.map(|data| self.arena.stage(data));
        self.push(Command::new(CommandKind::CreateVertexBuffer {
            buffer: buffer.clone(),
            data,
        }));
        Ok(buffer)
    }

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
            "DeferredContext::create_index_buffer",
        )?;
        let buffer = IndexBuffer::new(&self.device, index_type, count, usage, SyncStatus::Unsignaled);
        let data = data.map(|data| self.arena.stage(data));
        self.push(Command::new(CommandKind::CreateIndexBuffer {
            buffer: buffer.clone(),
            data,
        }));
        Ok(buffer)
    }

    pub fn create_texture_2d(
        &mut self,
        size: Size2d,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> Result<Texture2D, GlError> {
        check_data_len(
            size.area() as usize * format.bytes_per_pixel() as usize,
            data,
            "DeferredContext::create_texture_2d",
        )?;
        let texture = Texture2D::new(&self.device, size, format, SyncStatus::Unsignaled);
        let data = data.map(|data| self.arena.stage(data));
        self.push(Command::new(CommandKind::CreateTexture2D {
            texture: texture.clone(),
            data,
        }));
        Ok(texture)
    }

    /// Record the compilation of a shader stage.
    ///
    /// Compile errors surface when the queue is replayed.
    pub fn create_shader_program(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderProgram, GlError> {
        let shader = ShaderProgram::new(&self.device, stage);
        self.push(Command::new(CommandKind::CreateShader {
            shader: shader.clone(),
            source: source.to_string(),
        }));
        Ok(shader)
    }

    pub fn create_effect(&mut self, shaders: &[ShaderProgram]) -> Result<Effect, GlError> {
        let effect = Effect::new(&self.device);
        self.push(Command::new(CommandKind::CreateEffect {
            effect: effect.clone(),
            shaders: shaders.to_vec(),
        }));
        Ok(effect)
    }

    pub fn create_framebuffer(
        &mut self,
        color_attachments: &[Texture2D],
        depth_stencil: Option<&Texture2D>,
    ) -> Result<Framebuffer, GlError> {
        check_attachments(color_attachments, depth_stencil, "DeferredContext::create_framebuffer")?;
        let framebuffer = Framebuffer::new(
            &self.device,
            color_attachments.to_vec(),
            depth_stencil.cloned(),
        );
        self.push(Command::new(CommandKind::CreateFramebuffer {
            framebuffer: framebuffer.clone(),
        }));
        Ok(framebuffer)
    }

    // ------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------

    /// Map `length` elements of `resource` starting at element `offset`.
    ///
    /// Writes go to memory owned by the mapping. An upload command is
    /// recorded immediately; unmapping or dropping the mapping copies the
    /// written bytes into the staging arena and commits the upload. An
    /// upload still mapped at replay is skipped.
    ///
    /// The resource's sync object is reset and signaled again once the
    /// upload has been replayed.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` for [`MapAccess::Read`]
    /// - `State` if the range exceeds the resource
    pub fn map_range<R>(
        &mut self,
        resource: &R,
        offset: usize,
        length: usize,
        access: MapAccess,
    ) -> Result<MappedRange<'_>, GlError>
    where
        R: Mappable + Syncable + Clone + Send + Sync + 'static,
    {
        let (byte_offset, byte_len) = map_byte_range(
            resource,
            offset,
            length,
            access,
            "DeferredContext::map_range",
        )?;
        let target: UploadTarget = Box::new(resource.clone());
        resource.sync().reset();

        let handle = CommandHandle {
            index: self.recording.len(),
            epoch: self.epoch,
        };
        log::trace!(
            "DeferredContext: recorded UploadBuffer of {} bytes at {}",
            byte_len,
            handle.index
        );
        self.recording.push(Command::new(CommandKind::UploadBuffer {
            target,
            offset: byte_offset,
            range: None,
        }));

        Ok(MappedRange {
            bytes: vec![0; byte_len],
            element_size: resource.element_size(),
            arena: &self.arena,
            recording: &mut self.recording,
            handle,
            committed: false,
        })
    }

    /// Map the whole of `resource`.
    pub fn map<R>(&mut self, resource: &R, access: MapAccess) -> Result<MappedRange<'_>, GlError>
    where
        R: Mappable + Syncable + Clone + Send + Sync + 'static,
    {
        self.map_range(resource, 0, resource.element_count(), access)
    }
}

impl Drop for DeferredContext {
    fn drop(&mut self) {
        if !self.recording.is_empty() {
            log::warn!(
                "DeferredContext dropped with {} unflushed commands",
                self.recording.len()
            );
        }
    }
}

impl std::fmt::Debug for DeferredContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredContext")
            .field("recorded", &self.recording.len())
            .field("epoch", &self.epoch)
            .field("arena_used", &self.arena.used())
            .field("arena_capacity", &self.arena.capacity())
            .field("arena_grow_count", &self.arena.grow_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(DeferredContext: Send);

/// A mapped range recorded on a deferred context.
///
/// Writes stay local to the mapping until it is released, so an open
/// mapping never blocks the consumer.
pub struct MappedRange<'a> {
    bytes: Vec<u8>,
    element_size: usize,
    arena: &'a StagingArena,
    recording: &'a mut Vec<Command>,
    handle: CommandHandle,
    committed: bool,
}

impl MappedRange<'_> {
    /// Handle of the upload command recorded for this mapping.
    pub fn command(&self) -> CommandHandle {
        self.handle
    }

    /// Commit the written range for upload.
    pub fn unmap(mut self) {
        self.commit();
    }

    fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        let staged = self.arena.stage(&self.bytes);
        log::trace!(
            "MappedRange: staged {} bytes for command {}",
            staged.len(),
            self.handle.index
        );
        if let Some(command) = self.recording.get_mut(self.handle.index) {
            command.commit(staged);
        }
    }
}

impl MappedMemory for MappedRange<'_> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn element_size(&self) -> usize {
        self.element_size
    }

    fn len(&self) -> usize {
        self.bytes.len() / self.element_size.max(1)
    }
}

impl Drop for MappedRange<'_> {
    fn drop(&mut self) {
        self.commit();
    }
}

impl std::fmt::Debug for MappedRange<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRange")
            .field("handle", &self.handle)
            .field("len", &self.bytes.len())
            .field("committed", &self.committed)
            .finish()
    }
}
