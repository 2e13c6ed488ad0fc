//! Descriptor heap and frame lifetime tests.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{color_target, init_logging, TestContext};
use redlilium_frame_graph::types::{BufferDescriptor, BufferUsage, TextureViewDescriptor};
use redlilium_frame_graph::{
    CpuDescriptorHeap, DescriptorHeapType, DummyDevice, FrameGraphConfig, FrameGraphError,
    QueueType, VariableSizeAllocator,
};

#[test]
fn test_allocator_round_trip_coalesces() {
    let mut allocator = VariableSizeAllocator::new(1024);
    let blocks: Vec<_> = [100, 28, 300, 64, 532]
        .iter()
        .map(|&size| allocator.allocate(size, 1).unwrap())
        .collect();
    assert!(allocator.is_full());
    assert!(allocator.allocate(1, 1).is_none());

    for index in [3, 0, 4, 1, 2] {
        allocator.free(blocks[index]);
    }
    assert!(allocator.is_empty());
    assert_eq!(allocator.free_block_count(), 1);
    assert_eq!(allocator.largest_free_block(), 1024);
}

#[test]
fn test_cpu_pool_grows_and_reuses() {
    init_logging();
    let backend = Arc::new(DummyDevice::new());
    let pool = CpuDescriptorHeap::new(backend.clone(), DescriptorHeapType::Rtv, 4).unwrap();

    let first = pool.allocate(3).unwrap();
    let second = pool.allocate(3).unwrap();
    assert_eq!(pool.heap_count(), 2);
    assert_ne!(first.heap(), second.heap());
    assert_eq!(pool.stats().capacity, 8);
    assert_eq!(pool.stats().allocated, 6);

    // Oversized requests get a dedicated heap.
    let large = pool.allocate(10).unwrap();
    assert_eq!(large.count(), 10);
    assert_eq!(pool.heap_count(), 3);

    let first_heap = first.heap();
    drop(first);
    let reused = pool.allocate(2).unwrap();
    assert_eq!(pool.heap_count(), 3);
    assert_eq!(reused.heap(), first_heap);
    assert_eq!(backend.live_heap_count(), 3);
}

#[test]
fn test_texture_views_are_cached() {
    let test = TestContext::new();
    let texture = test.device.create_texture(color_target(64, 64)).unwrap();

    let srv = texture.view(&TextureViewDescriptor::shader_resource()).unwrap();
    let again = texture.view(&TextureViewDescriptor::shader_resource()).unwrap();
    let rtv = texture.view(&TextureViewDescriptor::render_target()).unwrap();
    assert_eq!(srv, again);
    assert_ne!(texture.view_handle(srv), texture.view_handle(rtv));
    assert_eq!(texture.view_count(), 2);
    assert_eq!(test.backend.descriptor_write_count(), 2);

    let rtv_stats = test.device.cpu_heap(DescriptorHeapType::Rtv).stats();
    assert_eq!(rtv_stats.allocated, 1);
    drop(texture);
    assert_eq!(
        test.device.cpu_heap(DescriptorHeapType::Rtv).stats().allocated,
        0
    );
}

fn small_dynamic_config() -> FrameGraphConfig {
    FrameGraphConfig {
        gpu_cbv_srv_uav_dynamic_size: 64,
        dynamic_cbv_srv_uav_chunk_size: 32,
        ..FrameGraphConfig::default()
    }
    .with_frames_in_flight(2)
}

#[test]
fn test_dynamic_descriptors_wait_for_fence() {
    let test = TestContext::manual(small_dynamic_config());
    let device = &test.device;

    let mut ctx = device.create_context(QueueType::Graphics);
    let range = ctx.allocate_dynamic_descriptors(20).unwrap();
    assert_eq!(range.count(), 20);
    ctx.allocate_dynamic_descriptors(20).unwrap();

    // Both chunks of the dynamic region are in use.
    let mut other = device.create_context(QueueType::Graphics);
    let err = other.allocate_dynamic_descriptors(1).unwrap_err();
    assert!(matches!(
        err,
        FrameGraphError::DescriptorHeapExhausted {
            region: "dynamic",
            capacity: 64,
            ..
        }
    ));

    ctx.draw(3, 1);
    device.submit(QueueType::Graphics, &mut [ctx]).unwrap();
    device.end_frame().unwrap();

    // Released by the context, but the GPU has not finished the frame.
    device.begin_frame();
    assert!(other.allocate_dynamic_descriptors(1).is_err());
    let heap = device.gpu_heap(DescriptorHeapType::CbvSrvUav);
    assert_eq!(heap.dynamic_stats().allocated, 64);

    test.backend.complete_pending();
    device.begin_frame();
    assert_eq!(heap.dynamic_stats().allocated, 0);
    other.allocate_dynamic_descriptors(1).unwrap();
}

#[test]
fn test_async_compute_descriptors_wait_for_compute_fence() {
    let config = FrameGraphConfig {
        gpu_cbv_srv_uav_dynamic_size: 256,
        ..FrameGraphConfig::default()
    };
    let test = TestContext::manual(config);
    let device = &test.device;

    let mut compute = device.create_context(QueueType::Compute);
    compute.allocate_dynamic_descriptors(256).unwrap();
    compute.dispatch(1, 1, 1);
    let compute_value = device.submit(QueueType::Compute, &mut [compute]).unwrap();
    let frame_value = device.end_frame().unwrap();

    // Only the graphics queue finishes the frame.
    device.queue(QueueType::Graphics).fence().signal(frame_value);
    device.begin_frame();
    assert!(!device.queue(QueueType::Compute).fence().is_complete(compute_value));
    let mut graphics = device.create_context(QueueType::Graphics);
    assert!(graphics.allocate_dynamic_descriptors(1).is_err());

    device.queue(QueueType::Compute).fence().signal(compute_value);
    device.begin_frame();
    let heap = device.gpu_heap(DescriptorHeapType::CbvSrvUav);
    assert_eq!(heap.dynamic_stats().allocated, 0);
    graphics.allocate_dynamic_descriptors(1).unwrap();
}

#[test]
fn test_retired_resource_waits_for_every_queue() {
    let test = TestContext::manual(FrameGraphConfig::default().with_frames_in_flight(2));
    let device = &test.device;
    let staging = device
        .create_buffer(BufferDescriptor::new(64, BufferUsage::COPY_SRC))
        .unwrap();
    let buffer = device
        .create_buffer(BufferDescriptor::new(64, BufferUsage::STORAGE))
        .unwrap();

    let mut copy = device.create_context(QueueType::Copy);
    copy.copy_buffer(&staging, &buffer);
    let copy_value = device.submit(QueueType::Copy, &mut [copy]).unwrap();
    device.retire(buffer);
    let frame_value = device.end_frame().unwrap();

    device.queue(QueueType::Graphics).fence().signal(frame_value);
    device.begin_frame();
    assert_eq!(test.backend.live_resource_count(), 2);

    device.queue(QueueType::Copy).fence().signal(copy_value);
    device.begin_frame();
    assert_eq!(test.backend.live_resource_count(), 1);
}

#[test]
fn test_retired_resource_outlives_its_frame() {
    let test = TestContext::manual(FrameGraphConfig::default().with_frames_in_flight(2));
    let device = &test.device;

    let texture = device.create_texture(color_target(16, 16)).unwrap();
    device.retire(texture);
    assert_eq!(test.backend.live_resource_count(), 1);

    let sync_point = device.end_frame().unwrap();
    device.begin_frame();
    assert_eq!(test.backend.live_resource_count(), 1);

    device.queue(QueueType::Graphics).fence().signal(sync_point);
    device.begin_frame();
    assert_eq!(test.backend.live_resource_count(), 0);
}

#[test]
fn test_end_frame_blocks_when_ring_wraps() {
    let test = TestContext::manual(FrameGraphConfig::default().with_frames_in_flight(2));
    let device = &test.device;

    let first = device.end_frame().unwrap();
    assert!(!device.queue(QueueType::Graphics).fence().is_complete(first));

    let backend = test.backend.clone();
    let gpu = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        backend.complete_pending();
    });

    // The second frame wraps onto the first frame's slot and must wait for it.
    let start = Instant::now();
    device.end_frame().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert!(device.queue(QueueType::Graphics).fence().is_complete(first));
    gpu.join().unwrap();
}
