//! Native driver abstraction.
//!
//! Every native call made by this crate goes through the [`Driver`] trait.
//! A driver wraps one native graphics context and exposes its object
//! creation, binding, pipeline toggle, draw and uniform entry points.
//!
//! # Contract
//!
//! - All methods take `&self`; implementations synchronize internally so a
//!   driver can be shared as `Arc<dyn Driver>` between the consumer thread
//!   and producers that drop the last reference to a resource.
//! - Object creation and buffer uploads are direct-state-access: they never
//!   change what is bound to any pipeline slot. Only the `bind_*`, `use_*`
//!   and toggle calls alter bindings.
//! - Every call reports native failures as a [`DriverError`] carrying the
//!   native error code.
//!
//! # Available Drivers
//!
//! - [`RecordingDriver`]: in-process software driver that simulates native
//!   objects and records every call. Used by tests and benches.

pub mod conversion;
pub mod recording;

pub use recording::{NativeCall, RecordingDriver};

use crate::error::DriverError;

/// Raw native enumeration value.
pub type NativeEnum = u32;

/// Name of a native driver object. `0` means "no object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NativeHandle(pub u32);

impl NativeHandle {
    /// The "no object" handle.
    pub const NONE: Self = Self(0);

    /// Check if this handle names an object.
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

/// A vertex attribute translated to native constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeVertexAttribute {
    pub location: u32,
    pub components: u32,
    pub ty: NativeEnum,
    pub normalize: bool,
    pub stride: u32,
    pub offset: u32,
}

/// Sampler parameters translated to native constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSamplerParams {
    pub min_filter: NativeEnum,
    pub mag_filter: NativeEnum,
    pub wrap_s: NativeEnum,
    pub wrap_t: NativeEnum,
    pub wrap_r: NativeEnum,
    pub compare_func: NativeEnum,
    pub compare_mode: NativeEnum,
}

/// Uniform payload handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeUniform<'a> {
    Ints(&'a [i32]),
    UInts(&'a [u32]),
    Floats(&'a [f32]),
    Doubles(&'a [f64]),
    Mat4(&'a [f32; 16]),
}

/// Native graphics driver.
pub trait Driver: Send + Sync + 'static {
    /// Human readable driver name.
    fn name(&self) -> &str;

    /// Raw vendor string reported by the driver.
    fn vendor_string(&self) -> String;

    /// Maximum number of concurrently bound texture units.
    fn max_texture_units(&self) -> u32;

    // Buffers and vertex arrays

    fn create_buffer(
        &self,
        size: usize,
        data: Option<&[u8]>,
        usage: NativeEnum,
    ) -> Result<NativeHandle, DriverError>;

    fn delete_buffer(&self, buffer: NativeHandle) -> Result<(), DriverError>;

    /// Write `data` into `buffer` starting at byte `offset`.
    fn buffer_sub_data(
        &self,
        buffer: NativeHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DriverError>;

    /// Create a vertex array object sourcing `attributes` from `buffer`.
    fn create_vertex_array(
        &self,
        buffer: NativeHandle,
        attributes: &[NativeVertexAttribute],
    ) -> Result<NativeHandle, DriverError>;

    fn delete_vertex_array(&self, vertex_array: NativeHandle) -> Result<(), DriverError>;

    // Textures and samplers

    fn create_texture_2d(
        &self,
        internal_format: NativeEnum,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<NativeHandle, DriverError>;

    fn delete_texture(&self, texture: NativeHandle) -> Result<(), DriverError>;

    fn create_sampler(&self, params: &NativeSamplerParams) -> Result<NativeHandle, DriverError>;

    fn delete_sampler(&self, sampler: NativeHandle) -> Result<(), DriverError>;

    // Shaders, programs and framebuffers

    fn create_shader(&self, stage: NativeEnum, source: &str) -> Result<NativeHandle, DriverError>;

    fn delete_shader(&self, shader: NativeHandle) -> Result<(), DriverError>;

    /// Link `shaders` into a program.
    fn create_program(&self, shaders: &[NativeHandle]) -> Result<NativeHandle, DriverError>;

    fn delete_program(&self, program: NativeHandle) -> Result<(), DriverError>;

    /// Location of a named uniform in `program`, or `-1` if it is not active.
    fn uniform_location(&self, program: NativeHandle, name: &str) -> Result<i32, DriverError>;

    fn create_framebuffer(
        &self,
        color_attachments: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    ) -> Result<NativeHandle, DriverError>;

    fn delete_framebuffer(&self, framebuffer: NativeHandle) -> Result<(), DriverError>;

    // Bindings

    fn bind_vertex_array(&self, vertex_array: NativeHandle) -> Result<(), DriverError>;

    fn bind_index_buffer(&self, buffer: NativeHandle) -> Result<(), DriverError>;

    /// Select the texture unit affected by subsequent texture binds.
    fn active_texture(&self, unit: u32) -> Result<(), DriverError>;

    fn bind_texture(&self, target: NativeEnum, texture: NativeHandle) -> Result<(), DriverError>;

    fn bind_sampler(&self, unit: u32, sampler: NativeHandle) -> Result<(), DriverError>;

    fn use_program(&self, program: NativeHandle) -> Result<(), DriverError>;

    fn bind_framebuffer(&self, framebuffer: NativeHandle) -> Result<(), DriverError>;

    /// Enable the first `count` color attachments of the bound framebuffer.
    fn draw_buffers(&self, count: u32) -> Result<(), DriverError>;

    /// Disable color drawing and reading for the bound framebuffer.
    ///
    /// Used for framebuffers with only a depth attachment.
    fn disable_color_buffers(&self) -> Result<(), DriverError>;

    // Pipeline state

    fn set_capability(&self, capability: NativeEnum, enabled: bool) -> Result<(), DriverError>;

    fn depth_func(&self, func: NativeEnum) -> Result<(), DriverError>;

    fn depth_mask(&self, enabled: bool) -> Result<(), DriverError>;

    fn color_mask(&self, red: bool, green: bool, blue: bool, alpha: bool)
    -> Result<(), DriverError>;

    fn stencil_mask(&self, mask: u32) -> Result<(), DriverError>;

    fn blend_func(&self, src: NativeEnum, dst: NativeEnum) -> Result<(), DriverError>;

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) -> Result<(), DriverError>;

    // Drawing

    fn clear(&self, mask: u32) -> Result<(), DriverError>;

    fn draw_arrays(&self, mode: NativeEnum, first: u32, count: u32) -> Result<(), DriverError>;

    fn draw_elements(
        &self,
        mode: NativeEnum,
        count: u32,
        index_type: NativeEnum,
        offset: usize,
    ) -> Result<(), DriverError>;

    /// Upload a uniform value to the program in use.
    fn set_uniform(&self, location: i32, value: NativeUniform<'_>) -> Result<(), DriverError>;

    /// Present the finished frame.
    fn present(&self) -> Result<(), DriverError>;
}
