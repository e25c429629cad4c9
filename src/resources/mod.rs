//! Reference-counted driver resources.
//!
//! This module contains the resource handles created by
//! [`RenderContext`](crate::RenderContext) and
//! [`DeferredContext`](crate::DeferredContext):
//! - [`VertexBuffer`] and [`IndexBuffer`] - geometry buffers
//! - [`Texture2D`] - 2D textures
//! - [`SamplerObject`] - sampler state objects
//! - [`ShaderProgram`] and [`Effect`] - shader stages and linked programs
//! - [`Framebuffer`] - render target sets
//!
//! Handles are cheap to clone; every clone is one reference. When the last
//! reference is dropped, on any thread, the native object is deleted through
//! the owning device's driver before the handle's memory is released.
//! Resources recorded on a deferred context exist, with a UID, before their
//! native object does; until their creation command is replayed their native
//! handle is [`NativeHandle::NONE`] and dropping them deletes nothing.

mod buffer;
mod framebuffer;
mod program;
mod texture;
mod uniform;

pub use buffer::{IndexBuffer, VertexBuffer};
pub use framebuffer::Framebuffer;
pub use program::{Effect, EffectData, ShaderProgram};
pub use texture::{SamplerObject, Texture2D};
pub use uniform::UniformValue;

pub(crate) use uniform::UniformSet;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::backend::NativeHandle;
use crate::device::Device;
use crate::sync::{SyncObject, WaitJobControl};
use crate::uid::{ResourceKind, Uid};

/// Common interface of every resource handle.
pub trait Resource {
    /// Identity of this resource within its kind.
    fn uid(&self) -> Uid;

    fn kind(&self) -> ResourceKind;

    /// Current native handle, [`NativeHandle::NONE`] until created.
    fn native_handle(&self) -> NativeHandle;

    /// Number of live references to this resource.
    fn ref_count(&self) -> usize;

    /// Check if the native object exists.
    fn is_created(&self) -> bool {
        self.native_handle().is_some()
    }
}

/// Resources that can be bound to a pipeline slot of the render state.
pub trait Bindable: Resource + Clone {}

/// Resources whose contents can be mapped for writing.
///
/// Mapping ranges are expressed in elements (vertices or indices).
pub trait Mappable: Resource {
    /// Size of one element in bytes.
    fn element_size(&self) -> usize;

    /// Number of elements in the resource.
    fn element_count(&self) -> usize;

    /// Size of the whole resource in bytes.
    fn byte_size(&self) -> usize {
        self.element_size() * self.element_count()
    }
}

/// Resources that coordinate producer writes with consumer reads.
pub trait Syncable: Resource {
    fn sync(&self) -> &SyncObject;

    /// See [`SyncObject::wait_sync_driver`].
    fn wait_sync_driver(&self) {
        self.sync().wait_sync_driver();
    }

    /// See [`SyncObject::wait_sync_client`].
    fn wait_sync_client(&self) {
        self.sync().wait_sync_client();
    }

    /// See [`SyncObject::wait_sync_client_timeout`].
    fn wait_sync_client_timeout(&self, timeout: Duration) -> bool {
        self.sync().wait_sync_client_timeout(timeout)
    }

    /// See [`SyncObject::wait_sync_client_with`].
    fn wait_sync_client_with(
        &self,
        timeout: Duration,
        job: &mut dyn FnMut() -> WaitJobControl,
    ) -> bool {
        self.sync().wait_sync_client_with(timeout, job)
    }
}

/// Native handle slot written by the creating context.
#[derive(Debug, Default)]
pub(crate) struct AtomicHandle(AtomicU32);

impl AtomicHandle {
    pub(crate) fn new(handle: NativeHandle) -> Self {
        Self(AtomicU32::new(handle.0))
    }

    pub(crate) fn get(&self) -> NativeHandle {
        NativeHandle(self.0.load(Ordering::Acquire))
    }

    /// Store `handle` and return the previous one.
    pub(crate) fn replace(&self, handle: NativeHandle) -> NativeHandle {
        NativeHandle(self.0.swap(handle.0, Ordering::AcqRel))
    }
}

/// State shared by every resource kind.
///
/// Dropping the core deletes its native object, if any, through the owning
/// device's driver. Resource types that own additional native objects
/// delete those in their own `Drop`, which runs first.
pub(crate) struct ResourceCore {
    device: Arc<Device>,
    uid: Uid,
    kind: ResourceKind,
    handle: AtomicHandle,
}

impl ResourceCore {
    pub(crate) fn new(device: &Arc<Device>, kind: ResourceKind, handle: NativeHandle) -> Self {
        let uid = device.uids().next(kind);
        log::trace!("Resource {kind:?} {uid}: created (native {})", handle.0);
        Self {
            device: Arc::clone(device),
            uid,
            kind,
            handle: AtomicHandle::new(handle),
        }
    }

    pub(crate) fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub(crate) fn uid(&self) -> Uid {
        self.uid
    }

    pub(crate) fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub(crate) fn handle(&self) -> NativeHandle {
        self.handle.get()
    }

    pub(crate) fn set_handle(&self, handle: NativeHandle) {
        log::trace!(
            "Resource {:?} {}: native object {} attached",
            self.kind,
            self.uid,
            handle.0
        );
        let previous = self.handle.replace(handle);
        if previous.is_some() {
            self.delete_native(previous);
        }
    }

    fn delete_native(&self, handle: NativeHandle) {
        let driver = self.device.driver();
        let result = match self.kind {
            ResourceKind::VertexBuffer | ResourceKind::IndexBuffer => driver.delete_buffer(handle),
            ResourceKind::Texture => driver.delete_texture(handle),
            ResourceKind::Sampler => driver.delete_sampler(handle),
            ResourceKind::Shader => driver.delete_shader(handle),
            ResourceKind::Program => driver.delete_program(handle),
            ResourceKind::Framebuffer => driver.delete_framebuffer(handle),
        };

        match result {
            Ok(()) => log::trace!(
                "Resource {:?} {}: native object {} deleted",
                self.kind,
                self.uid,
                handle.0
            ),
            Err(e) => log::error!(
                "Failed to delete {:?} {} (native {}): {}",
                self.kind,
                self.uid,
                handle.0,
                e
            ),
        }
    }
}

impl Drop for ResourceCore {
    fn drop(&mut self) {
        let handle = self.handle.get();
        if !handle.is_some() {
            log::trace!(
                "Resource {:?} {}: dropped before creation",
                self.kind,
                self.uid
            );
            return;
        }

        self.delete_native(handle);
    }
}

impl std::fmt::Debug for ResourceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCore")
            .field("uid", &self.uid)
            .field("kind", &self.kind)
            .field("handle", &self.handle.get())
            .finish()
    }
}

/// Implements [`Resource`] for a handle type of the form
/// `struct X { inner: Arc<XInner> }` where `XInner` has a `core` field.
macro_rules! impl_resource {
    ($ty:ty) => {
        impl $crate::resources::Resource for $ty {
            fn uid(&self) -> $crate::uid::Uid {
                self.inner.core.uid()
            }

            fn kind(&self) -> $crate::uid::ResourceKind {
                self.inner.core.kind()
            }

            fn native_handle(&self) -> $crate::backend::NativeHandle {
                self.inner.core.handle()
            }

            fn ref_count(&self) -> usize {
                std::sync::Arc::strong_count(&self.inner)
            }
        }
    };
}

pub(crate) use impl_resource;
