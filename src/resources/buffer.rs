//! Vertex and index buffer resources.

use std::sync::Arc;

use super::{AtomicHandle, Bindable, Mappable, ResourceCore, Syncable, impl_resource};
use crate::backend::NativeHandle;
use crate::device::Device;
use crate::sync::{SyncObject, SyncStatus};
use crate::types::{BufferUsage, IndexType, PrimitiveType, VertexLayout};
use crate::uid::ResourceKind;

/// Vertex data together with its vertex array object.
///
/// Vertex buffers are created by
/// [`RenderContext::create_vertex_buffer`](crate::RenderContext::create_vertex_buffer)
/// or [`DeferredContext::create_vertex_buffer`](crate::DeferredContext::create_vertex_buffer)
/// and are reference-counted.
#[derive(Clone)]
pub struct VertexBuffer {
    inner: Arc<VertexBufferInner>,
}

struct VertexBufferInner {
    core: ResourceCore,
    sync: SyncObject,
    vertex_array: AtomicHandle,
    layout: VertexLayout,
    count: usize,
    primitive: PrimitiveType,
    usage: BufferUsage,
}

impl Drop for VertexBufferInner {
    fn drop(&mut self) {
        let vertex_array = self.vertex_array.get();
        if vertex_array.is_some()
            && let Err(e) = self.core.device().driver().delete_vertex_array(vertex_array)
        {
            log::error!(
                "Failed to delete vertex array {} of buffer {}: {}",
                vertex_array.0,
                self.core.uid(),
                e
            );
        }
    }
}

impl VertexBuffer {
    pub(crate) fn new(
        device: &Arc<Device>,
        layout: VertexLayout,
        count: usize,
        primitive: PrimitiveType,
        usage: BufferUsage,
        status: SyncStatus,
    ) -> Self {
        Self {
            inner: Arc::new(VertexBufferInner {
                core: ResourceCore::new(device, ResourceKind::VertexBuffer, NativeHandle::NONE),
                sync: SyncObject::new(status),
                vertex_array: AtomicHandle::default(),
                layout,
                count,
                primitive,
                usage,
            }),
        }
    }

    /// Attach the native buffer and vertex array once they exist.
    pub(crate) fn attach(&self, buffer: NativeHandle, vertex_array: NativeHandle) {
        let previous = self.inner.vertex_array.replace(vertex_array);
        if previous.is_some()
            && let Err(e) = self.inner.core.device().driver().delete_vertex_array(previous)
        {
            log::error!(
                "Failed to delete vertex array {} of buffer {}: {}",
                previous.0,
                self.inner.core.uid(),
                e
            );
        }
        self.inner.core.set_handle(buffer);
    }

    /// Get the native vertex array object.
    pub fn vertex_array(&self) -> NativeHandle {
        self.inner.vertex_array.get()
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.inner.layout
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.count
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.inner.primitive
    }

    pub fn usage(&self) -> BufferUsage {
        self.inner.usage
    }
}

impl_resource!(VertexBuffer);

impl Bindable for VertexBuffer {}

impl Mappable for VertexBuffer {
    fn element_size(&self) -> usize {
        self.inner.layout.stride as usize
    }

    fn element_count(&self) -> usize {
        self.inner.count
    }
}

impl Syncable for VertexBuffer {
    fn sync(&self) -> &SyncObject {
        &self.inner.sync
    }
}

impl std::fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("vertex_array", &self.inner.vertex_array.get())
            .field("count", &self.inner.count)
            .field("stride", &self.inner.layout.stride)
            .field("primitive", &self.inner.primitive)
            .finish()
    }
}

/// Index data used by indexed draws.
#[derive(Clone)]
pub struct IndexBuffer {
    inner: Arc<IndexBufferInner>,
}

struct IndexBufferInner {
    core: ResourceCore,
    sync: SyncObject,
    index_type: IndexType,
    count: usize,
    usage: BufferUsage,
}

impl IndexBuffer {
    pub(crate) fn new(
        device: &Arc<Device>,
        index_type: IndexType,
        count: usize,
        usage: BufferUsage,
        status: SyncStatus,
    ) -> Self {
        Self {
            inner: Arc::new(IndexBufferInner {
                core: ResourceCore::new(device, ResourceKind::IndexBuffer, NativeHandle::NONE),
                sync: SyncObject::new(status),
                index_type,
                count,
                usage,
            }),
        }
    }

    pub(crate) fn attach(&self, buffer: NativeHandle) {
        self.inner.core.set_handle(buffer);
    }

    pub fn index_type(&self) -> IndexType {
        self.inner.index_type
    }

    pub fn index_count(&self) -> usize {
        self.inner.count
    }

    pub fn usage(&self) -> BufferUsage {
        self.inner.usage
    }
}

impl_resource!(IndexBuffer);

impl Bindable for IndexBuffer {}

impl Mappable for IndexBuffer {
    fn element_size(&self) -> usize {
        self.inner.index_type.size() as usize
    }

    fn element_count(&self) -> usize {
        self.inner.count
    }
}

impl Syncable for IndexBuffer {
    fn sync(&self) -> &SyncObject {
        &self.inner.sync
    }
}

impl std::fmt::Debug for IndexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuffer")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("count", &self.inner.count)
            .field("index_type", &self.inner.index_type)
            .finish()
    }
}

static_assertions::assert_impl_all!(VertexBuffer: Send, Sync);
static_assertions::assert_impl_all!(IndexBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingDriver;
    use crate::config::DeviceParameters;
    use crate::resources::Resource;
    use crate::types::{PositionVertex, Vertex};

    fn create_test_device() -> (Arc<RecordingDriver>, Arc<Device>) {
        let driver = Arc::new(RecordingDriver::new());
        let device = Device::new(driver.clone(), DeviceParameters::default()).unwrap();
        (driver, device)
    }

    #[test]
    fn test_unattached_buffer_deletes_nothing() {
        let (driver, device) = create_test_device();
        let buffer = VertexBuffer::new(
            &device,
            PositionVertex::layout(),
            3,
            PrimitiveType::Triangles,
            BufferUsage::Static,
            SyncStatus::Unsignaled,
        );
        assert!(!buffer.is_created());
        drop(buffer);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_mappable_sizes() {
        let (_driver, device) = create_test_device();
        let buffer = IndexBuffer::new(
            &device,
            IndexType::UnsignedShort,
            6,
            BufferUsage::Dynamic,
            SyncStatus::Signaled,
        );
        assert_eq!(buffer.element_size(), 2);
        assert_eq!(buffer.byte_size(), 12);
        assert!(buffer.sync().is_signaled());
    }

    #[test]
    fn test_clone_shares_uid() {
        let (_driver, device) = create_test_device();
        let buffer = VertexBuffer::new(
            &device,
            PositionVertex::layout(),
            1,
            PrimitiveType::Points,
            BufferUsage::Static,
            SyncStatus::Signaled,
        );
        let clone = buffer.clone();
        assert_eq!(buffer.uid(), clone.uid());
        assert_eq!(buffer.ref_count(), 2);
        let debug = format!("{:?}", clone);
        assert!(debug.contains("VertexBuffer"));
    }
}
