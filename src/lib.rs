//! Frame Graph - per-frame GPU work scheduling and resource lifetime management
//!
//! Passes declare read/write intents on opaque resource handles; the graph
//! batches them into dependency levels, realizes the backing resources only
//! when their declared shape changes and records the minimal set of state
//! transitions between levels.
//!
//! # Features
//! - Render graph with FIFO-driven dependency levels
//! - Per-subresource state tracking with uniform/divergent modes
//! - Submission-time barrier resolution with implicit promotion and decay
//! - Descriptor heaps: growable CPU pools, GPU heaps with fence-gated dynamic regions
//! - Retirement ring deferring destruction until the GPU is done with a frame
//! - Backend seam with a recording dummy device and optional Vulkan translation
//!
//! # Example
//!
//! ```ignore
//! let device = RenderDevice::new(Arc::new(DummyDevice::new()), FrameGraphConfig::default())?;
//! let mut graph = RenderGraph::new();
//!
//! let color = graph.create::<Texture>(TextureDescriptor::new_2d(
//!     512,
//!     512,
//!     TextureFormat::Rgba16Float,
//!     TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
//! ));
//! graph
//!     .add_pass("gbuffer")
//!     .write(color)
//!     .execute(move |registry, ctx| {
//!         let texture = registry.get::<Texture>(color);
//!         let rtv = texture.view(&TextureViewDescriptor::render_target())?;
//!         ctx.clear_render_target(texture.view_handle(rtv), [0.0; 4]);
//!         Ok(())
//!     });
//!
//! device.begin_frame();
//! let mut ctx = device.create_context(QueueType::Graphics);
//! graph.execute(&device, &mut ctx)?;
//! device.submit(QueueType::Graphics, &mut [ctx])?;
//! device.end_frame()?;
//! graph.reset();
//! ```

pub mod allocator;
pub mod backend;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod queue;
pub mod render_graph;
pub mod resources;
pub mod retire;
pub mod state;
pub mod types;

pub use allocator::{Allocation, VariableSizeAllocator};
pub use backend::{DummyDevice, Device, Fence};
pub use context::CommandContext;
pub use descriptor::{
    CpuDescriptorHeap, DescriptorHeapAllocation, DescriptorHeapType, GpuDescriptorHeap,
};
pub use device::RenderDevice;
pub use error::{FrameGraphError, Result};
pub use queue::CommandQueue;
pub use render_graph::{RenderGraph, RenderGraphRegistry, ResourceHandle, ResourceType};
pub use resources::{Buffer, DescriptorView, PipelineState, RootSignature, Texture, ViewIndex};
pub use types::{QueueType, ResourceState};

use descriptor::DescriptorHeapType as HeapType;

/// Tunable sizes of the frame graph's heaps and rings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGraphConfig {
    /// Maximum number of frames the CPU may record ahead of the GPU.
    pub max_frames_in_flight: usize,
    /// Descriptors per CPU CBV/SRV/UAV heap.
    pub cpu_cbv_srv_uav_heap_size: u32,
    /// Descriptors per CPU sampler heap.
    pub cpu_sampler_heap_size: u32,
    /// Descriptors per CPU render target view heap.
    pub cpu_rtv_heap_size: u32,
    /// Descriptors per CPU depth-stencil view heap.
    pub cpu_dsv_heap_size: u32,
    /// Static region of the shader-visible CBV/SRV/UAV heap.
    pub gpu_cbv_srv_uav_static_size: u32,
    /// Dynamic region of the shader-visible CBV/SRV/UAV heap.
    pub gpu_cbv_srv_uav_dynamic_size: u32,
    /// Static region of the shader-visible sampler heap.
    pub gpu_sampler_static_size: u32,
    /// Dynamic region of the shader-visible sampler heap.
    pub gpu_sampler_dynamic_size: u32,
    /// CBV/SRV/UAV descriptors a context requests at a time.
    pub dynamic_cbv_srv_uav_chunk_size: u32,
    /// Sampler descriptors a context requests at a time.
    pub dynamic_sampler_chunk_size: u32,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 3,
            cpu_cbv_srv_uav_heap_size: 8192,
            cpu_sampler_heap_size: 2048,
            cpu_rtv_heap_size: 1024,
            cpu_dsv_heap_size: 1024,
            gpu_cbv_srv_uav_static_size: 16384,
            gpu_cbv_srv_uav_dynamic_size: 32768,
            gpu_sampler_static_size: 1024,
            gpu_sampler_dynamic_size: 1024,
            dynamic_cbv_srv_uav_chunk_size: 256,
            dynamic_sampler_chunk_size: 32,
        }
    }
}

impl FrameGraphConfig {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Descriptors per CPU heap of type `ty`.
    pub fn cpu_heap_size(&self, ty: HeapType) -> u32 {
        match ty {
            HeapType::CbvSrvUav => self.cpu_cbv_srv_uav_heap_size,
            HeapType::Sampler => self.cpu_sampler_heap_size,
            HeapType::Rtv => self.cpu_rtv_heap_size,
            HeapType::Dsv => self.cpu_dsv_heap_size,
        }
    }

    /// `(static, dynamic)` region sizes of the shader-visible heap of type `ty`.
    ///
    /// Panics for heap types that cannot be shader visible.
    pub fn gpu_heap_sizes(&self, ty: HeapType) -> (u32, u32) {
        match ty {
            HeapType::CbvSrvUav => (
                self.gpu_cbv_srv_uav_static_size,
                self.gpu_cbv_srv_uav_dynamic_size,
            ),
            HeapType::Sampler => (self.gpu_sampler_static_size, self.gpu_sampler_dynamic_size),
            HeapType::Rtv | HeapType::Dsv => panic!("{:?} heaps are never shader visible", ty),
        }
    }

    /// Descriptors a context requests at a time from the heap of type `ty`.
    pub fn dynamic_chunk_size(&self, ty: HeapType) -> u32 {
        match ty {
            HeapType::Sampler => self.dynamic_sampler_chunk_size,
            _ => self.dynamic_cbv_srv_uav_chunk_size,
        }
    }
}
