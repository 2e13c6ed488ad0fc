//! Render graph integration tests.
//!
//! These run whole frames against the dummy backend and inspect the levels,
//! recorded commands and submissions the graph produces.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use rstest::rstest;

use common::{color_target, storage_buffer, TestContext};
use redlilium_frame_graph::backend::{BackendError, Command};
use redlilium_frame_graph::state::{Subresource, TransitionBarrier};
use redlilium_frame_graph::types::{TextureViewDescriptor, ViewKind};
use redlilium_frame_graph::{
    Buffer, CommandContext, FrameGraphError, QueueType, RenderGraph, RenderGraphRegistry,
    ResourceHandle, ResourceState, Result, Texture,
};

// ============================================================================
// Helpers
// ============================================================================

type PassLog = Arc<Mutex<Vec<String>>>;

fn logging_pass(
    log: &PassLog,
    name: &'static str,
) -> impl FnMut(&RenderGraphRegistry, &mut CommandContext) -> Result<()> + Send + 'static {
    let log = log.clone();
    move |_, _| {
        log.lock().push(name.to_owned());
        Ok(())
    }
}

fn barrier_batches(commands: &[Command]) -> Vec<Vec<TransitionBarrier>> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Barriers(barriers) => Some(barriers.clone()),
            _ => None,
        })
        .collect()
}

fn level_passes(graph: &RenderGraph) -> Vec<Vec<usize>> {
    graph.levels().iter().map(|level| level.passes().to_vec()).collect()
}

// ============================================================================
// Scheduling
// ============================================================================

/// P1 writes T, P2 reads T and writes B, P3 reads B.
#[test]
fn test_three_pass_chain() {
    let test = TestContext::new();
    let device = &test.device;
    let mut graph = RenderGraph::new();

    let t = graph.create::<Texture>(color_target(512, 512).with_label("T"));
    let b = graph.create::<Buffer>(storage_buffer(4096).with_label("B"));
    let log: PassLog = Arc::default();

    graph.add_pass("P1").write(t).execute(logging_pass(&log, "P1"));
    graph.add_pass("P2").read(t).write(b).execute(logging_pass(&log, "P2"));
    graph.add_pass("P3").read(b).execute(logging_pass(&log, "P3"));

    let mut ctx = device.create_context(QueueType::Graphics);
    graph.execute(device, &mut ctx).unwrap();

    assert_eq!(level_passes(&graph), vec![vec![0], vec![1], vec![2]]);
    assert_eq!(*log.lock(), vec!["P1", "P2", "P3"]);

    let texture_id = graph.registry().get::<Texture>(t).id();
    let buffer_id = graph.registry().get::<Buffer>(b).id();

    // First touches are pending; only the in-frame transitions are recorded.
    let batches = barrier_batches(ctx.commands());
    assert_eq!(
        batches,
        vec![
            vec![TransitionBarrier {
                resource: texture_id,
                subresource: Subresource::All,
                before: ResourceState::RENDER_TARGET,
                after: ResourceState::PIXEL_SHADER_RESOURCE,
            }],
            vec![TransitionBarrier {
                resource: buffer_id,
                subresource: Subresource::All,
                before: ResourceState::UNORDERED_ACCESS,
                after: ResourceState::ALL_SHADER_RESOURCE,
            }],
        ]
    );

    // Each barrier batch sits right before the level that needs it.
    let shape: Vec<&str> = ctx
        .commands()
        .iter()
        .map(|command| match command {
            Command::Barriers(_) => "barriers",
            Command::BeginEvent(_) => "begin",
            Command::EndEvent => "end",
            _ => "other",
        })
        .collect();
    assert_eq!(
        shape,
        vec!["begin", "end", "barriers", "begin", "end", "barriers", "begin", "end"]
    );

    device.submit(QueueType::Graphics, &mut [ctx]).unwrap();

    // The texture's initial transition out of COMMON is resolved at submit;
    // the buffer promotes implicitly.
    let submissions = test.backend.take_submissions();
    assert_eq!(submissions.len(), 1);
    let lists = &submissions[0].lists;
    assert_eq!(lists.len(), 2);
    assert!(lists[0].is_barrier_only());
    assert_eq!(
        lists[0].barriers().copied().collect::<Vec<_>>(),
        vec![TransitionBarrier {
            resource: texture_id,
            subresource: Subresource::All,
            before: ResourceState::COMMON,
            after: ResourceState::RENDER_TARGET,
        }]
    );

    let states = device.global_states();
    assert_eq!(
        states.state(texture_id, 0),
        Some(ResourceState::PIXEL_SHADER_RESOURCE)
    );
    assert_eq!(states.state(buffer_id, 0), Some(ResourceState::COMMON));
}

#[test]
fn test_write_after_read_waits_for_readers() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();
    let t = graph.create::<Texture>(color_target(64, 64));

    graph.add_pass("produce").write(t).execute(|_, _| Ok(()));
    graph.add_pass("sample_a").read(t).execute(|_, _| Ok(()));
    graph.add_pass("sample_b").read(t).execute(|_, _| Ok(()));
    graph.add_pass("overwrite").write(t).execute(|_, _| Ok(()));
    graph.add_pass("sample_c").read(t).execute(|_, _| Ok(()));

    graph.setup().unwrap();
    assert_eq!(
        level_passes(&graph),
        vec![vec![0], vec![1, 2], vec![3], vec![4]]
    );

    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    // RT -> SRV, SRV -> RT, RT -> SRV.
    assert_eq!(barrier_batches(ctx.commands()).len(), 3);
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();
}

#[test]
fn test_pass_reading_two_producers_waits_for_both() {
    let _test = TestContext::new();
    let mut graph = RenderGraph::new();
    let albedo = graph.create::<Texture>(color_target(64, 64));
    let normal = graph.create::<Texture>(color_target(64, 64));
    let lit = graph.create::<Texture>(color_target(64, 64));

    graph.add_pass("albedo").write(albedo).execute(|_, _| Ok(()));
    graph.add_pass("normal").read(albedo).write(normal).execute(|_, _| Ok(()));
    graph
        .add_pass("lighting")
        .read(albedo)
        .read(normal)
        .write(lit)
        .execute(|_, _| Ok(()));

    graph.setup().unwrap();
    assert_eq!(level_passes(&graph), vec![vec![0], vec![1], vec![2]]);
}

#[rstest]
#[case::two_readers(2)]
#[case::eight_readers(8)]
fn test_readers_share_one_level(#[case] readers: usize) {
    let _test = TestContext::new();
    let mut graph = RenderGraph::new();
    let t = graph.create::<Texture>(color_target(32, 32));

    graph.add_pass("write").write(t).execute(|_, _| Ok(()));
    for index in 0..readers {
        graph.add_pass(format!("read_{index}")).read(t).execute(|_, _| Ok(()));
    }

    graph.setup().unwrap();
    assert_eq!(graph.levels().len(), 2);
    assert_eq!(graph.levels()[1].passes().len(), readers);
    assert_eq!(graph.levels()[1].reads(), &[t]);
}

#[test]
fn test_independent_passes_share_level() {
    let _test = TestContext::new();
    let mut graph = RenderGraph::new();
    let a = graph.create::<Texture>(color_target(16, 16));
    let b = graph.create::<Texture>(color_target(16, 16));

    graph.add_pass("a").write(a).execute(|_, _| Ok(()));
    graph.add_pass("b").write(b).execute(|_, _| Ok(()));
    graph.add_pass("idle").execute(|_, _| Ok(()));

    graph.setup().unwrap();
    assert_eq!(level_passes(&graph), vec![vec![0, 1, 2]]);
}

#[test]
fn test_untracked_access_orders_without_transitions() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();
    let t = graph.create::<Texture>(color_target(16, 16));

    graph.add_pass("manual").write_untracked(t).execute(|_, _| Ok(()));
    graph.add_pass("sample").read(t).execute(|_, _| Ok(()));

    graph.setup().unwrap();
    assert_eq!(level_passes(&graph), vec![vec![0], vec![1]]);
    assert!(graph.levels()[0].writes().is_empty());
    assert!(graph.passes()[0].is_untracked(t));

    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    assert!(barrier_batches(ctx.commands()).is_empty());
    assert_eq!(ctx.tracker().pending().len(), 1);
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();
}

#[test]
fn test_mixed_tracked_declarations_stay_tracked() {
    let _test = TestContext::new();
    let mut graph = RenderGraph::new();
    let t = graph.create::<Texture>(color_target(16, 16));

    graph.add_pass("both").write_untracked(t).write(t).execute(|_, _| Ok(()));
    assert!(!graph.passes()[0].is_untracked(t));
    graph.setup().unwrap();
    assert_eq!(graph.levels()[0].writes(), &[t]);
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn test_callbacks_resolve_handles() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();
    let t = graph.create::<Texture>(color_target(128, 64).with_label("hdr"));
    let seen = Arc::new(Mutex::new(None));

    let record = seen.clone();
    graph.add_pass("clear").write(t).execute(move |registry, ctx| {
        let texture = registry.get::<Texture>(t);
        let rtv = texture.view(&TextureViewDescriptor::new(ViewKind::RenderTarget))?;
        ctx.clear_render_target(texture.view_handle(rtv), [0.0, 0.0, 0.0, 1.0]);
        *record.lock() = Some((texture.width(), texture.height()));
        Ok(())
    });

    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    assert_eq!(*seen.lock(), Some((128, 64)));
    assert!(ctx
        .commands()
        .iter()
        .any(|command| matches!(command, Command::ClearRenderTarget { .. })));
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();
}

#[test]
fn test_callback_error_stops_execution() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();
    let t = graph.create::<Texture>(color_target(16, 16));
    let log: PassLog = Arc::default();

    graph
        .add_pass("fails")
        .write(t)
        .execute(|_, _| Err(FrameGraphError::Backend(BackendError::DeviceLost)));
    graph.add_pass("after").read(t).execute(logging_pass(&log, "after"));

    let mut ctx = test.device.create_context(QueueType::Graphics);
    let err = graph.execute(&test.device, &mut ctx).unwrap_err();
    assert!(matches!(err, FrameGraphError::Backend(BackendError::DeviceLost)));
    assert!(log.lock().is_empty());

    // The failing pass's debug event was still closed.
    assert_eq!(ctx.commands().last(), Some(&Command::EndEvent));
}

#[test]
fn test_imported_resource_is_transitioned() {
    let test = TestContext::new();
    let backbuffer = test.device.create_texture(color_target(64, 64)).unwrap();

    let mut graph = RenderGraph::new();
    let handle = graph.import(backbuffer.clone());
    assert_eq!(graph.import(backbuffer.clone()), handle);

    graph.add_pass("present").write(handle).execute(|_, _| Ok(()));
    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    assert!(Arc::ptr_eq(graph.registry().get::<Texture>(handle), &backbuffer));
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();

    assert_eq!(
        test.device.global_states().state(backbuffer.id(), 0),
        Some(ResourceState::RENDER_TARGET)
    );
}

// ============================================================================
// Frames
// ============================================================================

fn run_frame(test: &TestContext, graph: &mut RenderGraph, width: u32) -> Arc<Texture> {
    let t = graph.create::<Texture>(color_target(width, width));
    graph.add_pass("draw").write(t).execute(|_, _| Ok(()));

    test.device.begin_frame();
    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();
    test.device.end_frame().unwrap();

    let texture = graph.registry().get::<Texture>(t).clone();
    graph.reset();
    texture
}

#[test]
fn test_realized_resource_is_reused_across_frames() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();

    let first = run_frame(&test, &mut graph, 256);
    let second = run_frame(&test, &mut graph, 256);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(graph.epoch(), 3);
}

#[test]
fn test_changed_descriptor_recreates_resource() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();

    let first = run_frame(&test, &mut graph, 256);
    let second = run_frame(&test, &mut graph, 512);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.width(), 512);

    drop(first);
    test.device.wait_idle().unwrap();
    assert_eq!(test.backend.live_resource_count(), 1);
}

#[test]
#[should_panic(expected = "does not belong to the current frame")]
fn test_stale_handle_rejected_by_pass() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();
    let stale = graph.create::<Texture>(color_target(16, 16));
    graph.add_pass("draw").write(stale).execute(|_, _| Ok(()));
    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();

    graph.reset();
    graph.add_pass("late").read(stale);
}

#[test]
#[should_panic(expected = "stale handle")]
fn test_stale_handle_rejected_by_registry() {
    let test = TestContext::new();
    let mut graph = RenderGraph::new();
    let stale = graph.create::<Texture>(color_target(16, 16));
    graph.add_pass("draw").write(stale).execute(|_, _| Ok(()));
    let mut ctx = test.device.create_context(QueueType::Graphics);
    graph.execute(&test.device, &mut ctx).unwrap();
    test.device.submit(QueueType::Graphics, &mut [ctx]).unwrap();

    graph.reset();
    graph.registry().get::<Texture>(stale);
}

#[test]
#[should_panic(expected = "invalid handle")]
fn test_invalid_handle_rejected() {
    let mut graph = RenderGraph::new();
    graph.add_pass("broken").read(ResourceHandle::INVALID);
}
