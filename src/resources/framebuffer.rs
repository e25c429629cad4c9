//! Framebuffer resource.

use std::sync::Arc;

use super::{Bindable, ResourceCore, impl_resource};
use crate::backend::NativeHandle;
use crate::device::Device;
use crate::resources::Texture2D;
use crate::uid::ResourceKind;

/// A set of render targets.
///
/// The framebuffer keeps its attached textures alive for as long as it
/// exists.
#[derive(Clone)]
pub struct Framebuffer {
    inner: Arc<FramebufferInner>,
}

struct FramebufferInner {
    core: ResourceCore,
    color_attachments: Vec<Texture2D>,
    depth_stencil: Option<Texture2D>,
}

impl Framebuffer {
    pub(crate) fn new(
        device: &Arc<Device>,
        color_attachments: Vec<Texture2D>,
        depth_stencil: Option<Texture2D>,
    ) -> Self {
        Self {
            inner: Arc::new(FramebufferInner {
                core: ResourceCore::new(device, ResourceKind::Framebuffer, NativeHandle::NONE),
                color_attachments,
                depth_stencil,
            }),
        }
    }

    pub(crate) fn attach(&self, framebuffer: NativeHandle) {
        self.inner.core.set_handle(framebuffer);
    }

    pub fn color_attachments(&self) -> &[Texture2D] {
        &self.inner.color_attachments
    }

    pub fn depth_stencil(&self) -> Option<&Texture2D> {
        self.inner.depth_stencil.as_ref()
    }

    /// Number of draw buffers enabled when this framebuffer is bound.
    pub fn draw_buffer_count(&self) -> u32 {
        self.inner.color_attachments.len() as u32
    }
}

impl_resource!(Framebuffer);

impl Bindable for Framebuffer {}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("uid", &self.inner.core.uid())
            .field("handle", &self.inner.core.handle())
            .field("color_attachments", &self.inner.color_attachments.len())
            .field("depth_stencil", &self.inner.depth_stencil.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(Framebuffer: Send, Sync);
