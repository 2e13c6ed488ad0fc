//! Common utilities for frame graph integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_frame_graph::types::{
    BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage,
};
use redlilium_frame_graph::{DummyDevice, FrameGraphConfig, RenderDevice};

/// Route `log` output through the test harness; safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device and backend pair used by most tests.
pub struct TestContext {
    pub backend: Arc<DummyDevice>,
    pub device: RenderDevice,
}

impl TestContext {
    /// Device whose fences complete as soon as work is submitted.
    pub fn new() -> Self {
        Self::with_backend(DummyDevice::new(), FrameGraphConfig::default())
    }

    /// Device whose fences only advance on [`DummyDevice::complete_pending`].
    pub fn manual(config: FrameGraphConfig) -> Self {
        Self::with_backend(DummyDevice::manual(), config)
    }

    fn with_backend(backend: DummyDevice, config: FrameGraphConfig) -> Self {
        init_logging();
        let backend = Arc::new(backend);
        let device = RenderDevice::new(backend.clone(), config).expect("failed to create device");
        Self { backend, device }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Let the device's own drop find every queue idle.
        self.backend.complete_pending();
    }
}

/// HDR color target that can be sampled afterwards.
pub fn color_target(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Rgba16Float,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
}

/// Buffer written by compute and read by later passes.
pub fn storage_buffer(size: u64) -> BufferDescriptor {
    BufferDescriptor::new(size, BufferUsage::STORAGE)
}
