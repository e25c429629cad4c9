//! Integration tests for the render state cache.

mod common;

use rstest::rstest;

use common::{TestContext, simple_effect, zeroed_vertices};
use redlilium_gl::backend::recording::RecordedUniform;
use redlilium_gl::{
    ColorMask, DepthFunc, DriverError, DstFactor, ErrorKind, NativeCall, RecordingDriver, Rect,
    RenderState, Resource, SamplerDescriptor, Size2d, SrcFactor, TextureFormat, Uid,
};

fn set_uniform_calls(ctx: &TestContext) -> Vec<(i32, RecordedUniform)> {
    ctx.driver
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            NativeCall::SetUniform { location, value } => Some((location, value)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Binding Tests
// ============================================================================

#[rstest]
#[case::same_twice(&[0, 0], 1)]
#[case::alternate(&[0, 1, 0], 3)]
#[case::repeated(&[1, 1, 1, 0, 0], 2)]
fn test_texture_bind_elision(#[case] sequence: &[usize], #[case] expected: usize) {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let textures: Vec<_> = (0..2)
        .map(|_| {
            render
                .create_texture_2d(Size2d::new(1, 1), TextureFormat::Rgba8, None)
                .unwrap()
        })
        .collect();

    for &index in sequence {
        render.state().bind_texture(0, Some(&textures[index])).unwrap();
    }

    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::BindTexture { .. })),
        expected
    );
}

#[test]
fn test_vertex_buffer_bind_elision() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let a = zeroed_vertices(&mut render, 3);
    let b = zeroed_vertices(&mut render, 3);

    let state = render.state();
    state.bind_vertex_buffer(Some(&a)).unwrap();
    state.bind_vertex_buffer(Some(&a)).unwrap();
    assert_eq!(ctx.bind_calls(), 1);

    state.bind_vertex_buffer(Some(&b)).unwrap();
    state.bind_vertex_buffer(Some(&a)).unwrap();
    assert_eq!(ctx.bind_calls(), 3);
    assert_eq!(state.vertex_buffer_uid(), a.uid());

    state.bind_vertex_buffer(None).unwrap();
    assert_eq!(state.vertex_buffer_uid(), Uid::NONE);
    assert_eq!(ctx.bind_calls(), 4);
}

#[test]
fn test_texture_unit_out_of_range() {
    let ctx = TestContext::with_driver(RecordingDriver::new().with_max_texture_units(4));
    let mut render = ctx.render_context();
    let texture = render
        .create_texture_2d(Size2d::new(1, 1), TextureFormat::Rgba8, None)
        .unwrap();
    let sampler = render
        .create_sampler_object(SamplerDescriptor::default())
        .unwrap();

    let state = render.state();
    assert_eq!(state.max_texture_units(), 4);
    let err = state.bind_texture(4, Some(&texture)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    let err = state.bind_sampler(7, Some(&sampler)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    assert_eq!(ctx.bind_calls(), 0);
    assert_eq!(state.texture_uid(4), Uid::NONE);
}

#[test]
fn test_failed_native_bind_leaves_cache_unchanged() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let texture = render
        .create_texture_2d(Size2d::new(1, 1), TextureFormat::Rgba8, None)
        .unwrap();

    ctx.driver.fail_next("bind_texture", DriverError::OUT_OF_MEMORY);
    let state = render.state();
    let err = state.bind_texture(2, Some(&texture)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(state.texture_uid(2), Uid::NONE);
    // The active unit change succeeded and stays cached.
    assert_eq!(state.active_texture(), 2);

    state.bind_texture(2, Some(&texture)).unwrap();
    assert_eq!(state.texture_uid(2), texture.uid());
    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::ActiveTexture(_))),
        1
    );
}

#[test]
fn test_active_texture_is_cached() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let textures: Vec<_> = (0..3)
        .map(|_| {
            render
                .create_texture_2d(Size2d::new(1, 1), TextureFormat::Rgba8, None)
                .unwrap()
        })
        .collect();

    let state = render.state();
    state.bind_texture(1, Some(&textures[0])).unwrap();
    state.bind_texture(1, Some(&textures[1])).unwrap();
    state.bind_texture(5, Some(&textures[2])).unwrap();

    let units: Vec<_> = ctx
        .driver
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            NativeCall::ActiveTexture(unit) => Some(unit),
            _ => None,
        })
        .collect();
    assert_eq!(units, vec![1, 5]);
}

// ============================================================================
// Scalar State Tests
// ============================================================================

#[rstest]
#[case::depth_test(|s: &mut RenderState| s.set_depth_test(true))]
#[case::depth_func(|s: &mut RenderState| s.set_depth_func(DepthFunc::LessEqual))]
#[case::depth_mask(|s: &mut RenderState| s.set_depth_mask(false))]
#[case::color_mask(|s: &mut RenderState| s.set_color_mask(ColorMask::RED | ColorMask::ALPHA))]
#[case::stencil_test(|s: &mut RenderState| s.set_stencil_test(true))]
#[case::stencil_mask(|s: &mut RenderState| s.set_stencil_mask(0xff))]
#[case::blend(|s: &mut RenderState| s.set_blend(true))]
#[case::blend_func(|s: &mut RenderState| s.set_blend_func(SrcFactor::SrcAlpha, DstFactor::OneMinusSrcAlpha))]
#[case::viewport(|s: &mut RenderState| s.set_viewport(Rect::new(0, 0, 800, 600)))]
fn test_scalar_state_elision(
    #[case] set: fn(&mut RenderState) -> Result<(), redlilium_gl::GlError>,
) {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();

    set(render.state()).unwrap();
    set(render.state()).unwrap();
    assert_eq!(ctx.driver.calls().len(), 1);
}

#[rstest]
#[case::depth_mask(|s: &mut RenderState| s.set_depth_mask(true))]
#[case::color_mask(|s: &mut RenderState| s.set_color_mask(ColorMask::ALL))]
#[case::blend(|s: &mut RenderState| s.set_blend(false))]
#[case::blend_func(|s: &mut RenderState| s.set_blend_func(SrcFactor::One, DstFactor::Zero))]
fn test_defaults_need_no_native_call(
    #[case] set: fn(&mut RenderState) -> Result<(), redlilium_gl::GlError>,
) {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    set(render.state()).unwrap();
    assert!(ctx.driver.calls().is_empty());
}

// ============================================================================
// Effect and Uniform Tests
// ============================================================================

#[test]
fn test_apply_applies_effect_data() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let effect = simple_effect(&mut render);
    effect.set_depth_test(true);
    effect.set_depth_func(DepthFunc::Greater);
    effect.set_blend(true);
    effect.set_blend_func(SrcFactor::SrcAlpha, DstFactor::OneMinusSrcAlpha);
    ctx.driver.take_calls();

    let state = render.apply(&effect).unwrap();
    assert!(state.depth_test());
    assert_eq!(state.depth_func(), DepthFunc::Greater);
    assert!(state.blend());
    assert_eq!(state.effect_uid(), effect.uid());
    // use_program, depth test, depth func, blend, blend func
    assert_eq!(ctx.driver.take_calls().len(), 5);

    render.apply(&effect).unwrap();
    assert!(ctx.driver.calls().is_empty());
}

#[test]
fn test_apply_rearms_uniforms() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let effect = simple_effect(&mut render);
    let triangle = zeroed_vertices(&mut render, 3);
    effect.set_uniform("scale", 2.0f32);

    let state = render.apply(&effect).unwrap();
    state.draw(&triangle).unwrap();
    assert_eq!(set_uniform_calls(&ctx).len(), 1);

    // Unchanged uniforms are not pushed again.
    state.draw(&triangle).unwrap();
    assert_eq!(set_uniform_calls(&ctx).len(), 1);

    // Changed uniforms are.
    state.set_uniform("scale", 3.0f32).unwrap();
    state.draw(&triangle).unwrap();
    assert_eq!(set_uniform_calls(&ctx).len(), 2);

    // Applying the same effect again pushes everything on the next draw.
    render.apply(&effect).unwrap().draw(&triangle).unwrap();
    let calls = set_uniform_calls(&ctx);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2], (0, RecordedUniform::Floats(vec![3.0])));
    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::UseProgram(_))),
        1
    );
}

#[test]
fn test_set_uniform_without_effect_fails() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let err = render.state().set_uniform("scale", 1.0f32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn test_texture_uniforms_use_round_robin_units() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let effect = simple_effect(&mut render);
    let triangle = zeroed_vertices(&mut render, 3);
    let albedo = render
        .create_texture_2d(Size2d::new(2, 2), TextureFormat::Rgba8, None)
        .unwrap();
    let normal = render
        .create_texture_2d(Size2d::new(2, 2), TextureFormat::Rgba8, None)
        .unwrap();
    let sampler = render
        .create_sampler_object(SamplerDescriptor::nearest())
        .unwrap();

    effect.set_uniform("albedo", albedo.clone());
    effect.set_uniform(
        "normal",
        redlilium_gl::UniformValue::Texture {
            texture: normal.clone(),
            sampler: Some(sampler.clone()),
        },
    );

    let state = render.apply(&effect).unwrap();
    state.draw(&triangle).unwrap();

    assert_eq!(state.texture_uid(0), albedo.uid());
    assert_eq!(state.texture_uid(1), normal.uid());
    assert_eq!(state.sampler_uid(1), sampler.uid());
    assert_eq!(
        set_uniform_calls(&ctx),
        vec![
            (0, RecordedUniform::Ints(vec![0])),
            (1, RecordedUniform::Ints(vec![1])),
        ]
    );
}

// ============================================================================
// Draw Tests
// ============================================================================

#[test]
fn test_draw_range_validation() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let triangle = zeroed_vertices(&mut render, 3);
    let indices = render
        .create_index_buffer(&[0u16, 1, 2, 2, 1, 0], redlilium_gl::BufferUsage::Static)
        .unwrap();

    let state = render.state();
    let err = state.draw_range(&triangle, 2, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    state.draw_indexed_range(&triangle, &indices, 3, 3).unwrap();
    assert_eq!(
        ctx.driver.count_calls(|c| matches!(
            c,
            NativeCall::DrawElements {
                count: 3,
                offset: 6,
                ..
            }
        )),
        1
    );
}

#[test]
fn test_framebuffer_binding_sets_draw_buffers() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let targets: Vec<_> = (0..3)
        .map(|_| {
            render
                .create_texture_2d(Size2d::new(4, 4), TextureFormat::Rgba16F, None)
                .unwrap()
        })
        .collect();
    let framebuffer = render.create_framebuffer(&targets, None).unwrap();

    let state = render.state();
    state.set_framebuffer(Some(&framebuffer)).unwrap();
    state.set_framebuffer(Some(&framebuffer)).unwrap();
    state.set_framebuffer(None).unwrap();

    assert_eq!(
        ctx.driver.count_calls(|c| *c == NativeCall::DrawBuffers(3)),
        1
    );
    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::BindFramebuffer(_))),
        2
    );
}

#[test]
fn test_depth_only_framebuffer_disables_color_buffers() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let depth = render
        .create_texture_2d(Size2d::new(4, 4), TextureFormat::Depth24Stencil8, None)
        .unwrap();
    let framebuffer = render.create_framebuffer(&[], Some(&depth)).unwrap();
    assert_eq!(framebuffer.draw_buffer_count(), 0);

    render.state().set_framebuffer(Some(&framebuffer)).unwrap();

    assert_eq!(
        ctx.driver
            .count_calls(|c| *c == NativeCall::DisableColorBuffers),
        1
    );
    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::DrawBuffers(_))),
        0
    );
}

#[test]
fn test_device_without_texture_units_is_rejected() {
    let result = redlilium_gl::Device::new(
        std::sync::Arc::new(RecordingDriver::new()),
        redlilium_gl::DeviceParameters::new().with_max_texture_units(0),
    );
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Initialization);
}
