//! Recording software driver for testing and development.
//!
//! This driver doesn't talk to any GPU. It simulates native objects in
//! memory, keeps buffer contents so uploads can be inspected, and appends
//! every state-changing call to a log. Deleted handles are reused by later
//! creations, the way native drivers recycle object names.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{Driver, NativeEnum, NativeHandle, NativeSamplerParams, NativeUniform, NativeVertexAttribute};
use crate::error::DriverError;

/// Uniform payload captured by the [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUniform {
    Ints(Vec<i32>),
    UInts(Vec<u32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    Mat4([f32; 16]),
}

impl From<NativeUniform<'_>> for RecordedUniform {
    fn from(value: NativeUniform<'_>) -> Self {
        match value {
            NativeUniform::Ints(v) => Self::Ints(v.to_vec()),
            NativeUniform::UInts(v) => Self::UInts(v.to_vec()),
            NativeUniform::Floats(v) => Self::Floats(v.to_vec()),
            NativeUniform::Doubles(v) => Self::Doubles(v.to_vec()),
            NativeUniform::Mat4(v) => Self::Mat4(*v),
        }
    }
}

/// A native call observed by the [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    CreateBuffer {
        handle: NativeHandle,
        size: usize,
        usage: NativeEnum,
    },
    DeleteBuffer(NativeHandle),
    BufferSubData {
        buffer: NativeHandle,
        offset: usize,
        len: usize,
    },
    CreateVertexArray {
        handle: NativeHandle,
        buffer: NativeHandle,
        attributes: usize,
    },
    DeleteVertexArray(NativeHandle),
    CreateTexture2d {
        handle: NativeHandle,
        internal_format: NativeEnum,
        width: u32,
        height: u32,
    },
    DeleteTexture(NativeHandle),
    CreateSampler(NativeHandle),
    DeleteSampler(NativeHandle),
    CreateShader {
        handle: NativeHandle,
        stage: NativeEnum,
    },
    DeleteShader(NativeHandle),
    CreateProgram {
        handle: NativeHandle,
        shaders: Vec<NativeHandle>,
    },
    DeleteProgram(NativeHandle),
    CreateFramebuffer {
        handle: NativeHandle,
        color_attachments: usize,
        depth_stencil: bool,
    },
    DeleteFramebuffer(NativeHandle),
    BindVertexArray(NativeHandle),
    BindIndexBuffer(NativeHandle),
    ActiveTexture(u32),
    BindTexture {
        target: NativeEnum,
        texture: NativeHandle,
    },
    BindSampler {
        unit: u32,
        sampler: NativeHandle,
    },
    UseProgram(NativeHandle),
    BindFramebuffer(NativeHandle),
    DrawBuffers(u32),
    DisableColorBuffers,
    SetCapability {
        capability: NativeEnum,
        enabled: bool,
    },
    DepthFunc(NativeEnum),
    DepthMask(bool),
    ColorMask([bool; 4]),
    StencilMask(u32),
    BlendFunc {
        src: NativeEnum,
        dst: NativeEnum,
    },
    Viewport {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Clear(u32),
    DrawArrays {
        mode: NativeEnum,
        first: u32,
        count: u32,
    },
    DrawElements {
        mode: NativeEnum,
        count: u32,
        index_type: NativeEnum,
        offset: usize,
    },
    SetUniform {
        location: i32,
        value: RecordedUniform,
    },
    Present,
}

impl NativeCall {
    /// Check if this call changes what is bound to a pipeline slot.
    pub fn is_bind(&self) -> bool {
        matches!(
            self,
            Self::BindVertexArray(_)
                | Self::BindIndexBuffer(_)
                | Self::BindTexture { .. }
                | Self::BindSampler { .. }
                | Self::UseProgram(_)
                | Self::BindFramebuffer(_)
        )
    }
}

#[derive(Debug)]
enum SimObject {
    Buffer(Vec<u8>),
    VertexArray,
    Texture,
    Sampler,
    Shader,
    Program(HashMap<String, i32>),
    Framebuffer,
}

impl SimObject {
    fn same_kind(&self, other: &SimObject) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Default)]
struct DriverState {
    calls: Vec<NativeCall>,
    objects: HashMap<u32, SimObject>,
    free_handles: Vec<u32>,
    next_handle: u32,
    failures: Vec<(&'static str, DriverError)>,
}

impl DriverState {
    fn allocate(&mut self, object: SimObject) -> NativeHandle {
        let id = match self.free_handles.pop() {
            Some(id) => id,
            None => {
                self.next_handle += 1;
                self.next_handle
            }
        };
        self.objects.insert(id, object);
        NativeHandle(id)
    }

    fn release(&mut self, handle: NativeHandle, kind: &SimObject) -> Result<(), DriverError> {
        if !handle.is_some() {
            return Ok(());
        }
        match self.objects.get(&handle.0) {
            Some(object) if object.same_kind(kind) => {
                self.objects.remove(&handle.0);
                self.free_handles.push(handle.0);
                Ok(())
            }
            _ => Err(DriverError::INVALID_VALUE),
        }
    }

    fn check(&self, handle: NativeHandle, kind: &SimObject) -> Result<(), DriverError> {
        if !handle.is_some() {
            return Ok(());
        }
        match self.objects.get(&handle.0) {
            Some(object) if object.same_kind(kind) => Ok(()),
            _ => Err(DriverError::INVALID_OPERATION),
        }
    }
}

/// In-process driver that records every native call.
#[derive(Debug)]
pub struct RecordingDriver {
    vendor: String,
    max_texture_units: u32,
    state: Mutex<DriverState>,
}

impl RecordingDriver {
    /// Default number of texture units reported.
    pub const DEFAULT_MAX_TEXTURE_UNITS: u32 = 16;

    /// Create a new recording driver.
    pub fn new() -> Self {
        Self {
            vendor: "RedLilium Software Rasterizer".to_string(),
            max_texture_units: Self::DEFAULT_MAX_TEXTURE_UNITS,
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Report `units` texture units instead of the default.
    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = units;
        self
    }

    /// Report `vendor` as the driver's vendor string.
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Make the next call named `operation` fail with `error`.
    ///
    /// Names match the [`Driver`] method names, e.g. `"bind_texture"`.
    pub fn fail_next(&self, operation: &'static str, error: DriverError) {
        self.state.lock().failures.push((operation, error));
    }

    /// Get a copy of the call log.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.state.lock().calls.clone()
    }

    /// Take the call log, leaving it empty.
    pub fn take_calls(&self) -> Vec<NativeCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Count logged calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&NativeCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Check if `handle` names a live native object.
    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.state.lock().objects.contains_key(&handle.0)
    }

    /// Number of live native objects.
    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Get the contents of a live buffer.
    pub fn buffer_contents(&self, handle: NativeHandle) -> Option<Vec<u8>> {
        match self.state.lock().objects.get(&handle.0) {
            Some(SimObject::Buffer(data)) => Some(data.clone()),
            _ => None,
        }
    }

    fn call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut DriverState) -> Result<(T, NativeCall), DriverError>,
    ) -> Result<T, DriverError> {
        let mut state = self.state.lock();
        if let Some(index) = state.failures.iter().position(|(op, _)| *op == operation) {
            let (_, error) = state.failures.remove(index);
            log::trace!("RecordingDriver: injected failure in {operation}: {error}");
            return Err(error);
        }
        let (value, call) = f(&mut state)?;
        log::trace!("RecordingDriver: {call:?}");
        state.calls.push(call);
        Ok(value)
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "Recording Driver"
    }

    fn vendor_string(&self) -> String {
        self.vendor.clone()
    }

    fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    fn create_buffer(
        &self,
        size: usize,
        data: Option<&[u8]>,
        usage: NativeEnum,
    ) -> Result<NativeHandle, DriverError> {
        self.call("create_buffer", |state| {
            let mut contents = vec![0u8; size];
            if let Some(data) = data {
                if data.len() > size {
                    return Err(DriverError::INVALID_VALUE);
                }
                contents[..data.len()].copy_from_slice(data);
            }
            let handle = state.allocate(SimObject::Buffer(contents));
            Ok((handle, NativeCall::CreateBuffer { handle, size, usage }))
        })
    }

    fn delete_buffer(&self, buffer: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_buffer", |state| {
            state.release(buffer, &SimObject::Buffer(Vec::new()))?;
            Ok(((), NativeCall::DeleteBuffer(buffer)))
        })
    }

    fn buffer_sub_data(
        &self,
        buffer: NativeHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DriverError> {
        self.call("buffer_sub_data", |state| {
            let Some(SimObject::Buffer(contents)) = state.objects.get_mut(&buffer.0) else {
                return Err(DriverError::INVALID_OPERATION);
            };
            let end = offset
                .checked_add(data.len())
                .ok_or(DriverError::INVALID_VALUE)?;
            if end > contents.len() {
                return Err(DriverError::INVALID_VALUE);
            }
            contents[offset..end].copy_from_slice(data);
            Ok((
                (),
                NativeCall::BufferSubData {
                    buffer,
                    offset,
                    len: data.len(),
                },
            ))
        })
    }

    fn create_vertex_array(
        &self,
        buffer: NativeHandle,
        attributes: &[NativeVertexAttribute],
    ) -> Result<NativeHandle, DriverError> {
        self.call("create_vertex_array", |state| {
            state.check(buffer, &SimObject::Buffer(Vec::new()))?;
            let handle = state.allocate(SimObject::VertexArray);
            Ok((
                handle,
                NativeCall::CreateVertexArray {
                    handle,
                    buffer,
                    attributes: attributes.len(),
                },
            ))
        })
    }

    fn delete_vertex_array(&self, vertex_array: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_vertex_array", |state| {
            state.release(vertex_array, &SimObject::VertexArray)?;
            Ok(((), NativeCall::DeleteVertexArray(vertex_array)))
        })
    }

    fn create_texture_2d(
        &self,
        internal_format: NativeEnum,
        width: u32,
        height: u32,
        _data: Option<&[u8]>,
    ) -> Result<NativeHandle, DriverError> {
        self.call("create_texture_2d", |state| {
            if width == 0 || height == 0 {
                return Err(DriverError::INVALID_VALUE);
            }
            let handle = state.allocate(SimObject::Texture);
            Ok((
                handle,
                NativeCall::CreateTexture2d {
                    handle,
                    internal_format,
                    width,
                    height,
                },
            ))
        })
    }

    fn delete_texture(&self, texture: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_texture", |state| {
            state.release(texture, &SimObject::Texture)?;
            Ok(((), NativeCall::DeleteTexture(texture)))
        })
    }

    fn create_sampler(&self, _params: &NativeSamplerParams) -> Result<NativeHandle, DriverError> {
        self.call("create_sampler", |state| {
            let handle = state.allocate(SimObject::Sampler);
            Ok((handle, NativeCall::CreateSampler(handle)))
        })
    }

    fn delete_sampler(&self, sampler: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_sampler", |state| {
            state.release(sampler, &SimObject::Sampler)?;
            Ok(((), NativeCall::DeleteSampler(sampler)))
        })
    }

    fn create_shader(&self, stage: NativeEnum, source: &str) -> Result<NativeHandle, DriverError> {
        self.call("create_shader", |state| {
            if source.trim().is_empty() {
                return Err(DriverError::INVALID_VALUE);
            }
            let handle = state.allocate(SimObject::Shader);
            Ok((handle, NativeCall::CreateShader { handle, stage }))
        })
    }

    fn delete_shader(&self, shader: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_shader", |state| {
            state.release(shader, &SimObject::Shader)?;
            Ok(((), NativeCall::DeleteShader(shader)))
        })
    }

    fn create_program(&self, shaders: &[NativeHandle]) -> Result<NativeHandle, DriverError> {
        self.call("create_program", |state| {
            if shaders.is_empty() {
                return Err(DriverError::INVALID_OPERATION);
            }
            for shader in shaders {
                state.check(*shader, &SimObject::Shader)?;
            }
            let handle = state.allocate(SimObject::Program(HashMap::new()));
            Ok((
                handle,
                NativeCall::CreateProgram {
                    handle,
                    shaders: shaders.to_vec(),
                },
            ))
        })
    }

    fn delete_program(&self, program: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_program", |state| {
            state.release(program, &SimObject::Program(HashMap::new()))?;
            Ok(((), NativeCall::DeleteProgram(program)))
        })
    }

    fn uniform_location(&self, program: NativeHandle, name: &str) -> Result<i32, DriverError> {
        let mut state = self.state.lock();
        let Some(SimObject::Program(locations)) = state.objects.get_mut(&program.0) else {
            return Err(DriverError::INVALID_OPERATION);
        };
        let next = locations.len() as i32;
        Ok(*locations.entry(name.to_string()).or_insert(next))
    }

    fn create_framebuffer(
        &self,
        color_attachments: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    ) -> Result<NativeHandle, DriverError> {
        self.call("create_framebuffer", |state| {
            for attachment in color_attachments.iter().chain(depth_stencil.iter()) {
                state.check(*attachment, &SimObject::Texture)?;
            }
            let handle = state.allocate(SimObject::Framebuffer);
            Ok((
                handle,
                NativeCall::CreateFramebuffer {
                    handle,
                    color_attachments: color_attachments.len(),
                    depth_stencil: depth_stencil.is_some(),
                },
            ))
        })
    }

    fn delete_framebuffer(&self, framebuffer: NativeHandle) -> Result<(), DriverError> {
        self.call("delete_framebuffer", |state| {
            state.release(framebuffer, &SimObject::Framebuffer)?;
            Ok(((), NativeCall::DeleteFramebuffer(framebuffer)))
        })
    }

    fn bind_vertex_array(&self, vertex_array: NativeHandle) -> Result<(), DriverError> {
        self.call("bind_vertex_array", |state| {
            state.check(vertex_array, &SimObject::VertexArray)?;
            Ok(((), NativeCall::BindVertexArray(vertex_array)))
        })
    }

    fn bind_index_buffer(&self, buffer: NativeHandle) -> Result<(), DriverError> {
        self.call("bind_index_buffer", |state| {
            state.check(buffer, &SimObject::Buffer(Vec::new()))?;
            Ok(((), NativeCall::BindIndexBuffer(buffer)))
        })
    }

    fn active_texture(&self, unit: u32) -> Result<(), DriverError> {
        let max = self.max_texture_units;
        self.call("active_texture", |_| {
            if unit >= max {
                return Err(DriverError::INVALID_ENUM);
            }
            Ok(((), NativeCall::ActiveTexture(unit)))
        })
    }

    fn bind_texture(&self, target: NativeEnum, texture: NativeHandle) -> Result<(), DriverError> {
        self.call("bind_texture", |state| {
            state.check(texture, &SimObject::Texture)?;
            Ok(((), NativeCall::BindTexture { target, texture }))
        })
    }

    fn bind_sampler(&self, unit: u32, sampler: NativeHandle) -> Result<(), DriverError> {
        let max = self.max_texture_units;
        self.call("bind_sampler", |state| {
            if unit >= max {
                return Err(DriverError::INVALID_VALUE);
            }
            state.check(sampler, &SimObject::Sampler)?;
            Ok(((), NativeCall::BindSampler { unit, sampler }))
        })
    }

    fn use_program(&self, program: NativeHandle) -> Result<(), DriverError> {
        self.call("use_program", |state| {
            state.check(program, &SimObject::Program(HashMap::new()))?;
            Ok(((), NativeCall::UseProgram(program)))
        })
    }

    fn bind_framebuffer(&self, framebuffer: NativeHandle) -> Result<(), DriverError> {
        self.call("bind_framebuffer", |state| {
            state.check(framebuffer, &SimObject::Framebuffer)?;
            Ok(((), NativeCall::BindFramebuffer(framebuffer)))
        })
    }

    fn draw_buffers(&self, count: u32) -> Result<(), DriverError> {
        self.call("draw_buffers", |_| Ok(((), NativeCall::DrawBuffers(count))))
    }

    fn disable_color_buffers(&self) -> Result<(), DriverError> {
        self.call("disable_color_buffers", |_| {
            Ok(((), NativeCall::DisableColorBuffers))
        })
    }

    fn set_capability(&self, capability: NativeEnum, enabled: bool) -> Result<(), DriverError> {
        self.call("set_capability", |_| {
            Ok((
                (),
                NativeCall::SetCapability {
                    capability,
                    enabled,
                },
            ))
        })
    }

    fn depth_func(&self, func: NativeEnum) -> Result<(), DriverError> {
        self.call("depth_func", |_| Ok(((), NativeCall::DepthFunc(func))))
    }

    fn depth_mask(&self, enabled: bool) -> Result<(), DriverError> {
        self.call("depth_mask", |_| Ok(((), NativeCall::DepthMask(enabled))))
    }

    fn color_mask(
        &self,
        red: bool,
        green: bool,
        blue: bool,
        alpha: bool,
    ) -> Result<(), DriverError> {
        self.call("color_mask", |_| {
            Ok(((), NativeCall::ColorMask([red, green, blue, alpha])))
        })
    }

    fn stencil_mask(&self, mask: u32) -> Result<(), DriverError> {
        self.call("stencil_mask", |_| Ok(((), NativeCall::StencilMask(mask))))
    }

    fn blend_func(&self, src: NativeEnum, dst: NativeEnum) -> Result<(), DriverError> {
        self.call("blend_func", |_| Ok(((), NativeCall::BlendFunc { src, dst })))
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) -> Result<(), DriverError> {
        self.call("viewport", |_| {
            if width < 0 || height < 0 {
                return Err(DriverError::INVALID_VALUE);
            }
            Ok((
                (),
                NativeCall::Viewport {
                    x,
                    y,
                    width,
                    height,
                },
            ))
        })
    }

    fn clear(&self, mask: u32) -> Result<(), DriverError> {
        self.call("clear", |_| Ok(((), NativeCall::Clear(mask))))
    }

    fn draw_arrays(&self, mode: NativeEnum, first: u32, count: u32) -> Result<(), DriverError> {
        self.call("draw_arrays", |_| {
            Ok(((), NativeCall::DrawArrays { mode, first, count }))
        })
    }

    fn draw_elements(
        &self,
        mode: NativeEnum,
        count: u32,
        index_type: NativeEnum,
        offset: usize,
    ) -> Result<(), DriverError> {
        self.call("draw_elements", |_| {
            Ok((
                (),
                NativeCall::DrawElements {
                    mode,
                    count,
                    index_type,
                    offset,
                },
            ))
        })
    }

    fn set_uniform(&self, location: i32, value: NativeUniform<'_>) -> Result<(), DriverError> {
        self.call("set_uniform", |_| {
            Ok((
                (),
                NativeCall::SetUniform {
                    location,
                    value: value.into(),
                },
            ))
        })
    }

    fn present(&self) -> Result<(), DriverError> {
        self.call("present", |_| Ok(((), NativeCall::Present)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(RecordingDriver: Send, Sync);

    #[test]
    fn test_handles_are_reused_after_delete() {
        let driver = RecordingDriver::new();
        let first = driver.create_buffer(16, None, 0).unwrap();
        driver.delete_buffer(first).unwrap();
        assert!(!driver.is_live(first));

        let second = driver.create_buffer(16, None, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_buffer_sub_data() {
        let driver = RecordingDriver::new();
        let buffer = driver.create_buffer(8, Some(&[1, 2]), 0).unwrap();
        driver.buffer_sub_data(buffer, 4, &[9, 9]).unwrap();
        assert_eq!(
            driver.buffer_contents(buffer).unwrap(),
            vec![1, 2, 0, 0, 9, 9, 0, 0]
        );
        assert_eq!(
            driver.buffer_sub_data(buffer, 7, &[1, 1]),
            Err(DriverError::INVALID_VALUE)
        );
    }

    #[test]
    fn test_bind_deleted_object_fails() {
        let driver = RecordingDriver::new();
        let texture = driver.create_texture_2d(0, 4, 4, None).unwrap();
        driver.delete_texture(texture).unwrap();
        assert_eq!(
            driver.bind_texture(0, texture),
            Err(DriverError::INVALID_OPERATION)
        );
        assert!(driver.bind_texture(0, NativeHandle::NONE).is_ok());
    }

    #[test]
    fn test_failure_injection_is_one_shot() {
        let driver = RecordingDriver::new();
        driver.fail_next("clear", DriverError::OUT_OF_MEMORY);
        assert_eq!(driver.clear(0), Err(DriverError::OUT_OF_MEMORY));
        assert!(driver.clear(0).is_ok());
        assert_eq!(driver.calls(), vec![NativeCall::Clear(0)]);
    }

    #[test]
    fn test_texture_unit_limit() {
        let driver = RecordingDriver::new().with_max_texture_units(2);
        assert!(driver.active_texture(1).is_ok());
        assert_eq!(driver.active_texture(2), Err(DriverError::INVALID_ENUM));
    }
}
