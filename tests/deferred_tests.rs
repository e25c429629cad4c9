//! Integration tests for deferred recording and replay.
//!
//! # Test Categories
//!
//! - **Producer Tests**: Several threads writing disjoint ranges of one buffer
//! - **Loader Tests**: Resources created on a worker thread and waited on
//! - **Replay Tests**: Ordering, release and error behavior of `execute_commands`
//! - **Recorded State Tests**: Render state and draws recorded on a producer

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use rstest::rstest;

use common::{TestContext, zeroed_vertices};
use redlilium_gl::{
    ClearFlags, ErrorKind, GlError, MapAccess, MappedMemory, NativeCall, PositionVertex, Rect,
    Resource, ShaderStage, Size2d, Syncable, TextureFormat, Uid, WaitJobControl,
};

const VERTEX_COUNT: usize = 366;
const SPLIT: usize = 183;

fn vertex_value(frame: u32, index: usize) -> PositionVertex {
    PositionVertex::new(index as f32, frame as f32, 1.0)
}

fn read_vertex(contents: &[u8], index: usize) -> PositionVertex {
    let size = std::mem::size_of::<PositionVertex>();
    bytemuck::pod_read_unaligned(&contents[index * size..(index + 1) * size])
}

// ============================================================================
// Producer Tests
// ============================================================================

/// Two producers write [1, 183) and [183, 366) of one buffer every frame.
///
/// Vertex 0 is never written and must stay zeroed.
#[test]
fn test_two_producers_write_disjoint_ranges() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let buffer = zeroed_vertices(&mut render, VERTEX_COUNT);

    let mut first = ctx.device.create_deferred_context();
    let mut second = ctx.device.create_deferred_context();
    let first_queue = first.queue();
    let second_queue = second.queue();

    for frame in 1..=3u32 {
        thread::scope(|scope| {
            let ranges = [(&mut first, 1, SPLIT - 1), (&mut second, SPLIT, SPLIT)];
            for (producer, offset, length) in ranges {
                let buffer = &buffer;
                scope.spawn(move || {
                    let mut mapping = producer
                        .map_range(buffer, offset, length, MapAccess::Write)
                        .unwrap();
                    for i in 0..length {
                        mapping.write(i, &vertex_value(frame, offset + i)).unwrap();
                    }
                    mapping.unmap();
                    producer.flush();
                });
            }
        });

        render.execute(&first_queue, true).unwrap();
        render.execute(&second_queue, true).unwrap();

        let contents = ctx.driver.buffer_contents(buffer.native_handle()).unwrap();
        assert_eq!(read_vertex(&contents, 0), PositionVertex::new(0.0, 0.0, 0.0));
        for index in 1..VERTEX_COUNT {
            assert_eq!(
                read_vertex(&contents, index),
                vertex_value(frame, index),
                "vertex {index} in frame {frame}"
            );
        }
        ctx.device.end_frame().unwrap();
    }

    let uploads = ctx
        .driver
        .count_calls(|c| matches!(c, NativeCall::BufferSubData { .. }));
    assert_eq!(uploads, 6);
    assert_eq!(ctx.device.frame_count(), 3);
}

/// The consumer replays flushed uploads while the producer holds another
/// mapping of the same context open.
#[test]
fn test_open_mapping_does_not_block_replay() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let buffer = zeroed_vertices(&mut render, 2);

    let mut producer = ctx.device.create_deferred_context();
    let queue = producer.queue();
    let mut mapping = producer.map_range(&buffer, 0, 1, MapAccess::Write).unwrap();
    mapping.write(0, &vertex_value(1, 0)).unwrap();
    mapping.unmap();
    producer.flush();

    let (mapped_tx, mapped_rx) = mpsc::channel();
    let (replayed_tx, replayed_rx) = mpsc::channel();
    let target = buffer.clone();
    let worker = thread::spawn(move || {
        let mut mapping = producer.map_range(&target, 1, 1, MapAccess::Write).unwrap();
        mapped_tx.send(()).unwrap();
        let replayed = replayed_rx.recv_timeout(Duration::from_secs(5)).is_ok();
        mapping.write(0, &vertex_value(1, 1)).unwrap();
        mapping.unmap();
        producer.flush();
        replayed
    });

    mapped_rx.recv().unwrap();
    render.execute(&queue, true).unwrap();
    let _ = replayed_tx.send(());
    assert!(worker.join().unwrap(), "replay waited for the open mapping");

    render.execute(&queue, true).unwrap();
    let contents = ctx.driver.buffer_contents(buffer.native_handle()).unwrap();
    assert_eq!(read_vertex(&contents, 0), vertex_value(1, 0));
    assert_eq!(read_vertex(&contents, 1), vertex_value(1, 1));
}

// ============================================================================
// Loader Tests
// ============================================================================

/// A worker thread creates a texture and blocks in `flush_and_wait` until
/// the consumer has replayed its queue.
#[test]
fn test_texture_loaded_on_worker_thread() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();

    let mut loader = ctx.device.create_deferred_context();
    let queue = loader.queue();
    let worker = thread::spawn(move || {
        let pixels = vec![0x80u8; 8 * 8 * 4];
        let texture = loader
            .create_texture_2d(Size2d::new(8, 8), TextureFormat::Rgba8, Some(&pixels))
            .unwrap();
        loader.flush_and_wait();
        assert!(texture.is_created());
        texture
    });

    while !worker.is_finished() {
        render.execute(&queue, true).unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    let texture = worker.join().unwrap();

    assert!(texture.sync().is_signaled());
    assert!(ctx.driver.is_live(texture.native_handle()));
    assert_eq!(queue.executed_epoch(), queue.flushed_epoch());
}

/// A worker thread waits on the texture's sync object and runs a job while
/// waiting.
#[test]
fn test_worker_waits_on_sync_object() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();

    let mut loader = ctx.device.create_deferred_context();
    let texture = loader
        .create_texture_2d(Size2d::new(4, 4), TextureFormat::R8, None)
        .unwrap();
    loader.flush();
    let queue = loader.queue();

    let waiting = texture.clone();
    let jobs = Arc::new(AtomicUsize::new(0));
    let job_count = jobs.clone();
    let worker = thread::spawn(move || {
        waiting.wait_sync_client_with(Duration::from_secs(10), &mut || {
            job_count.fetch_add(1, Ordering::SeqCst);
            WaitJobControl::Continue
        })
    });

    // Replay only once the worker is known to be waiting.
    while jobs.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    render.execute(&queue, true).unwrap();

    assert!(worker.join().unwrap());
    assert!(texture.is_created());
    // The client wait consumed the signal.
    assert!(!texture.sync().is_signaled());
}

/// `Duration::MAX` waits without bound instead of overflowing the deadline.
#[test]
fn test_unbounded_timeouts() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();

    let mut loader = ctx.device.create_deferred_context();
    let queue = loader.queue();
    let worker = thread::spawn(move || {
        let texture = loader
            .create_texture_2d(Size2d::new(2, 2), TextureFormat::Rgba8, None)
            .unwrap();
        assert!(loader.flush_and_wait_timeout(Duration::MAX));
        assert!(texture.wait_sync_client_timeout(Duration::MAX));
        let signaled = texture.wait_sync_client_with(Duration::MAX, &mut || {
            texture.sync().signal();
            WaitJobControl::Continue
        });
        assert!(signaled);
        texture
    });

    while !worker.is_finished() {
        render.execute(&queue, true).unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    let texture = worker.join().unwrap();
    assert!(texture.is_created());
    assert!(!texture.sync().is_signaled());
}

#[test]
fn test_flush_and_wait_with_nothing_recorded_returns() {
    let ctx = TestContext::new();
    let mut producer = ctx.device.create_deferred_context();
    producer.flush_and_wait();
    assert!(producer.flush_and_wait_timeout(Duration::from_millis(1)));
}

// ============================================================================
// Replay Tests
// ============================================================================

/// Commands run in recording order and are released exactly once.
#[test]
fn test_replay_order_and_single_release() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();

    let order = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicUsize::new(0));
    for i in 0..5 {
        let order = order.clone();
        let released = released.clone();
        producer.add_command(
            move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            },
            move || {
                released.fetch_add(1, Ordering::SeqCst);
            },
        );
    }
    producer.flush();
    assert_eq!(released.load(Ordering::SeqCst), 0);

    render.execute(&producer.queue(), true).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(released.load(Ordering::SeqCst), 5);

    render.execute(&producer.queue(), true).unwrap();
    assert_eq!(order.lock().unwrap().len(), 5);
    assert_eq!(released.load(Ordering::SeqCst), 5);
}

/// Flushing twice before replay appends to the flushed set.
#[test]
fn test_flushes_accumulate() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();
    let queue = producer.queue();

    let order = Arc::new(Mutex::new(Vec::new()));
    for batch in 0..2 {
        for i in 0..3 {
            let order = order.clone();
            producer.add_command(
                move |_| {
                    order.lock().unwrap().push(batch * 10 + i);
                    Ok(())
                },
                || (),
            );
        }
        producer.flush();
    }
    assert_eq!(queue.pending(), 6);
    assert_eq!(queue.flushed_epoch(), 2);

    render.execute(&queue, true).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 10, 11, 12]);
    assert_eq!(queue.executed_epoch(), 2);
}

/// Replaying without clearing reproduces the same native calls.
#[test]
fn test_replay_without_clear_is_repeatable() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();

    producer.add_command(
        |context| {
            let state = context.state();
            state.set_viewport(Rect::new(0, 0, 640, 480))?;
            state.clear(ClearFlags::COLOR | ClearFlags::DEPTH)?;
            state.set_viewport(Rect::new(0, 0, 320, 240))
        },
        || (),
    );
    producer.flush();
    let queue = producer.queue();

    render.execute(&queue, false).unwrap();
    let first = ctx.driver.take_calls();
    render.execute(&queue, false).unwrap();
    let second = ctx.driver.take_calls();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(queue.pending(), 1);
}

#[rstest]
#[case::clear(true, 0)]
#[case::keep(false, 3)]
fn test_failure_aborts_replay(#[case] clear: bool, #[case] pending: usize) {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();

    let executed = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));
    for fail in [false, true, false] {
        let executed = executed.clone();
        let released = released.clone();
        producer.add_command(
            move |_| {
                if fail {
                    return Err(GlError::state("test", "injected failure"));
                }
                executed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            move || {
                released.fetch_add(1, Ordering::SeqCst);
            },
        );
    }
    let epoch = producer.flush();
    let queue = producer.queue();

    let err = render.execute(&queue, clear).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(released.load(Ordering::SeqCst), 3 - pending);
    assert_eq!(queue.pending(), pending);
    assert_eq!(queue.executed_epoch(), epoch);
}

/// Compile errors of deferred shaders surface when the queue is replayed.
#[test]
fn test_deferred_shader_error_surfaces_on_replay() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();

    let shader = producer
        .create_shader_program(ShaderStage::Fragment, "   ")
        .unwrap();
    let effect = producer.create_effect(&[shader.clone()]).unwrap();
    producer.flush();

    let err = render.execute(&producer.queue(), true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Program);
    assert!(!shader.is_created());
    assert!(!effect.is_created());
}

/// A whole pipeline recorded on a producer can be drawn with once replayed.
#[test]
fn test_deferred_pipeline_draws() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();

    let vs = producer
        .create_shader_program(ShaderStage::Vertex, common::VERTEX_SOURCE)
        .unwrap();
    let fs = producer
        .create_shader_program(ShaderStage::Fragment, common::FRAGMENT_SOURCE)
        .unwrap();
    let effect = producer.create_effect(&[vs, fs]).unwrap();
    let vertices = producer
        .create_vertex_buffer(
            &[PositionVertex::new(0.0, 0.0, 0.0); 3],
            redlilium_gl::PrimitiveType::Triangles,
            redlilium_gl::BufferUsage::Static,
        )
        .unwrap();
    let indices = producer
        .create_index_buffer(&[0u16, 1, 2], redlilium_gl::BufferUsage::Static)
        .unwrap();
    let color = producer
        .create_texture_2d(Size2d::new(16, 16), TextureFormat::Rgba8, None)
        .unwrap();
    let framebuffer = producer.create_framebuffer(&[color], None).unwrap();

    // Binding before replay is a state error.
    let err = render
        .state()
        .bind_vertex_buffer(Some(&vertices))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    producer.flush();
    render.execute(&producer.queue(), true).unwrap();

    let state = render.apply(&effect).unwrap();
    state.set_framebuffer(Some(&framebuffer)).unwrap();
    state.draw_indexed(&vertices, &indices).unwrap();

    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::DrawElements { count: 3, .. })),
        1
    );
    assert_eq!(
        ctx.driver.count_calls(|c| *c == NativeCall::DrawBuffers(1)),
        1
    );
}

/// Replaying a creation without clearing replaces the native object and
/// drops its cached binding.
#[test]
fn test_replayed_creation_drops_stale_binding() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();
    let queue = producer.queue();

    let texture = producer
        .create_texture_2d(Size2d::new(2, 2), TextureFormat::Rgba8, None)
        .unwrap();
    producer.flush();

    render.execute(&queue, false).unwrap();
    render.state().bind_texture(0, Some(&texture)).unwrap();
    let first = texture.native_handle();

    render.execute(&queue, false).unwrap();
    assert_eq!(render.state().texture_uid(0), Uid::NONE);
    render.state().bind_texture(0, Some(&texture)).unwrap();

    let bound: Vec<_> = ctx
        .driver
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            NativeCall::BindTexture { texture, .. } => Some(texture),
            _ => None,
        })
        .collect();
    assert_eq!(bound, vec![first, texture.native_handle()]);
    assert!(!ctx.driver.is_live(first));
    assert!(ctx.driver.is_live(texture.native_handle()));
}

/// Framebuffer attachments are validated when the creation is recorded.
#[test]
fn test_deferred_framebuffer_rejects_empty_attachments() {
    let ctx = TestContext::new();
    let mut producer = ctx.device.create_deferred_context();

    let err = producer.create_framebuffer(&[], None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceCreation);
    assert_eq!(producer.recorded(), 0);
}

// ============================================================================
// Recorded State Tests
// ============================================================================

/// A frame recorded on a producer draws through the consumer's state cache
/// and can be replayed again.
#[test]
fn test_recorded_frame_replays_through_cache() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let effect = common::simple_effect(&mut render);
    let vertices = zeroed_vertices(&mut render, 3);
    let texture = render
        .create_texture_2d(Size2d::new(1, 1), TextureFormat::Rgba8, None)
        .unwrap();

    let mut producer = ctx.device.create_deferred_context();
    let queue = producer.queue();
    {
        let mut state = producer.apply(&effect);
        state.set_viewport(Rect::new(0, 0, 64, 64)).unwrap();
        state.clear(ClearFlags::COLOR).unwrap();
        state.set_uniform("albedo", texture.clone()).unwrap();
        state.draw(&vertices).unwrap();
        state.draw_range(&vertices, 1, 2).unwrap();
    }
    assert_eq!(producer.recorded(), 6);
    producer.flush();
    assert!(ctx.driver.calls().is_empty());

    render.execute(&queue, false).unwrap();
    render.execute(&queue, true).unwrap();

    let draws = ctx
        .driver
        .count_calls(|c| matches!(c, NativeCall::DrawArrays { .. }));
    assert_eq!(draws, 4);
    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::UseProgram(_))),
        1
    );
    assert_eq!(
        ctx.driver
            .count_calls(|c| matches!(c, NativeCall::BindTexture { .. })),
        1
    );
    assert_eq!(render.state().effect_uid(), effect.uid());
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_recorded_state_errors_surface_on_replay() {
    let ctx = TestContext::new();
    let mut render = ctx.render_context();
    let mut producer = ctx.device.create_deferred_context();

    producer.state().set_uniform("scale", 2.0f32).unwrap();
    producer.flush();

    let err = render.execute(&producer.queue(), true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}
