//! Common utilities for integration tests.
//!
//! Every test runs against a [`RecordingDriver`] so that native calls can be
//! counted and inspected.

use std::sync::Arc;

use redlilium_gl::{
    BufferUsage, Device, DeviceFlags, DeviceParameters, NativeCall, PositionVertex, PrimitiveType,
    RecordingDriver, RenderContext, ShaderStage,
};

pub const VERTEX_SOURCE: &str = "#version 330 core\nvoid main() {}";
pub const FRAGMENT_SOURCE: &str = "#version 330 core\nout vec4 color;\nvoid main() {}";

/// Install a test logger. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// A device on top of a recording driver.
pub struct TestContext {
    pub driver: Arc<RecordingDriver>,
    pub device: Arc<Device>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_driver(RecordingDriver::new())
    }

    pub fn with_driver(driver: RecordingDriver) -> Self {
        init_logging();
        let driver = Arc::new(driver);
        let device = Device::new(
            driver.clone(),
            DeviceParameters::new()
                .with_label("test")
                .with_flags(DeviceFlags::DEBUG_MODE),
        )
        .expect("Failed to create device");
        Self { driver, device }
    }

    pub fn render_context(&self) -> RenderContext {
        self.device
            .create_render_context()
            .expect("Failed to create render context")
    }

    /// Number of logged calls that change a binding.
    pub fn bind_calls(&self) -> usize {
        self.driver.count_calls(NativeCall::is_bind)
    }
}

/// A buffer of `count` zeroed position vertices.
#[allow(dead_code)]
pub fn zeroed_vertices(context: &mut RenderContext, count: usize) -> redlilium_gl::VertexBuffer {
    let vertices = vec![PositionVertex::new(0.0, 0.0, 0.0); count];
    context
        .create_vertex_buffer(&vertices, PrimitiveType::Triangles, BufferUsage::Dynamic)
        .expect("Failed to create vertex buffer")
}

/// A linked effect with a trivial vertex and fragment stage.
#[allow(dead_code)]
pub fn simple_effect(context: &mut RenderContext) -> redlilium_gl::Effect {
    let vs = context
        .create_shader_program(ShaderStage::Vertex, VERTEX_SOURCE)
        .expect("Failed to compile vertex shader");
    let fs = context
        .create_shader_program(ShaderStage::Fragment, FRAGMENT_SOURCE)
        .expect("Failed to compile fragment shader");
    context
        .create_effect(&[vs, fs])
        .expect("Failed to link effect")
}
