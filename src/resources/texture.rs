//! Texture and sampler resources.

use std::sync::Arc;

use super::{Bindable, ResourceCore, Syncable, impl_resource};
use crate::backend::NativeHandle;
use crate::device::Device;
use crate::sync::{SyncObject, SyncStatus};
use crate::types::{SamplerDescriptor, Size2d, TextureFormat};
use crate::uid::ResourceKind;

/// A 2D texture resource.
///
/// # Example
///
/// ```ignore
/// let texture = context.create_texture_2d(Size2d::new(256, 256), TextureFormat::Rgba8, Some(&pixels))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
#[derive(Clone)]
pub struct Texture2D {
    inner: Arc<Texture2DInner>,
}

struct Texture2DInner {
    core: ResourceCore,
    sync: SyncObject,
    size: Size2d,
    format: TextureFormat,
}

impl Texture2D {
    pub(crate) fn new(
        device: &Arc<Device>,
        size: Size2d,
        format: TextureFormat,
        status: SyncStatus,
    ) -> Self {
        Self {
            inner: Arc::new(Texture2DInner {
                core: ResourceCore::new(device, ResourceKind::Texture, NativeHandle::NONE),
                sync: SyncObject::new(status),
                size,
                format,
            }),
        }
    }

    pub(crate) fn attach(&self, texture: NativeHandle) {
        self.inner.core.set_handle(texture);
    }

    pub fn size(&self) -> Size2d {
        self.inner.size
    }

    pub fn width(&self) -> u32 {
        self.inner.size.width
    }

    pub fn height(&self) -> u32 {
        self.inner.size.height
    }

    pub fn format(&self) -> TextureFormat {
        self.inner.format
    }
}

impl_resource!(Texture2D);

impl Bindable for Texture2D {}

impl Syncable for Texture2D {
    fn sync(&self) -> &SyncObject {
        &self.inner.sync
    }
}

impl std::fmt::Debug for Texture2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture2D")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("size", &self.inner.size)
            .field("format", &self.inner.format)
            .finish()
    }
}

/// Sampler state object, bound per texture unit.
#[derive(Clone)]
pub struct SamplerObject {
    inner: Arc<SamplerInner>,
}

struct SamplerInner {
    core: ResourceCore,
    descriptor: SamplerDescriptor,
}

impl SamplerObject {
    pub(crate) fn new(
        device: &Arc<Device>,
        descriptor: SamplerDescriptor,
        handle: NativeHandle,
    ) -> Self {
        Self {
            inner: Arc::new(SamplerInner {
                core: ResourceCore::new(device, ResourceKind::Sampler, handle),
                descriptor,
            }),
        }
    }

    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.inner.descriptor
    }
}

impl_resource!(SamplerObject);

impl Bindable for SamplerObject {}

impl std::fmt::Debug for SamplerObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerObject")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("descriptor", &self.inner.descriptor)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture2D: Send, Sync);
static_assertions::assert_impl_all!(SamplerObject: Send, Sync);
