//! # RedLilium GL
//!
//! A multithreaded rendering layer over an OpenGL-style driver.
//!
//! One consumer thread owns the immediate [`RenderContext`] and talks to the
//! driver. Any number of producer threads record resource creation and
//! buffer uploads on their own [`DeferredContext`] and flush them to a
//! [`DeferredQueue`], which the consumer replays in recording order.
//!
//! ## Architecture
//!
//! - [`Device`] - Owns the [`Driver`], UID counters and device limits
//! - [`RenderContext`] - Immediate context: creation, mapping, replay
//! - [`RenderState`] - Binding cache that elides redundant native calls
//! - [`DeferredContext`] / [`DeferredQueue`] - Producer-side recording
//! - [`SyncObject`] - Producer/consumer handshake on resources
//! - Resources ([`VertexBuffer`], [`Texture2D`], [`Effect`], ...) -
//!   reference-counted handles deleted natively on last drop
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlilium_gl::*;
//!
//! let device = Device::new(Arc::new(RecordingDriver::new()), DeviceParameters::default())?;
//! let mut context = device.create_render_context()?;
//!
//! let mut loader = device.create_deferred_context();
//! let queue = loader.queue();
//! std::thread::spawn(move || {
//!     let texture = loader.create_texture_2d(Size2d::new(256, 256), TextureFormat::Rgba8, None);
//!     loader.flush();
//! });
//!
//! // Each frame on the consumer thread
//! context.execute(&queue, true)?;
//! device.end_frame()?;
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod deferred;
pub mod device;
pub mod error;
pub mod mapping;
pub mod resources;
pub mod sync;
pub mod types;
pub mod uid;

pub use backend::{Driver, NativeCall, NativeHandle, RecordingDriver};
pub use config::{DeviceFlags, DeviceParameters, Vendor};
pub use context::{ImmediateMapping, RenderContext, RenderState};
pub use deferred::{
    Command, CommandHandle, DeferredContext, DeferredQueue, DeferredRenderState, MappedRange,
};
pub use device::{Device, DeviceCapabilities};
pub use error::{DriverError, ErrorKind, GlError};
pub use mapping::MappedMemory;
pub use resources::{
    Bindable, Effect, EffectData, Framebuffer, IndexBuffer, Mappable, Resource, SamplerObject,
    ShaderProgram, Syncable, Texture2D, UniformValue, VertexBuffer,
};
pub use sync::{SyncObject, SyncStatus, WaitJobControl};
pub use types::*;
pub use uid::{ResourceKind, Uid, UidRegistry};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
///
/// Call once after installing a logger.
pub fn init() {
    log::info!("RedLilium GL v{} initialized", VERSION);
}
