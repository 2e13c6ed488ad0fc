//! GPU backend abstraction layer.
//!
//! The frame graph reaches the GPU API only through the object-safe
//! [`Device`] and [`Fence`] traits defined here.
//!
//! # Available Backends
//!
//! - `dummy` (always compiled): records submissions, no GPU required
//! - `vulkan-backend`: translation of tracked states and barriers into Vulkan
//!   structures using ash
//!
//! # Architecture
//!
//! A backend provides:
//! - Resource creation (textures, buffers) as opaque native handles
//! - Descriptor heap creation and descriptor writes
//! - Command list execution per queue
//! - Monotonic fences signaled from queues

pub mod dummy;
mod error;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub use dummy::{DummyDevice, DummyFence, Submission};
pub use error::{BackendError, BackendResult};

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};
use crate::state::{ResourceId, TransitionBarrier};
use crate::types::{
    BufferDescriptor, BufferViewDescriptor, QueueType, TextureDescriptor, TextureViewDescriptor,
};

/// Opaque backend object handle.
pub type NativeHandle = u64;

// ============================================================================
// Descriptor heaps
// ============================================================================

/// Parameters for creating a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    /// Heap type.
    pub ty: DescriptorHeapType,
    /// Number of descriptors.
    pub capacity: u32,
    /// Whether shaders can address the heap.
    pub shader_visible: bool,
}

/// A created descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapInfo {
    /// Native heap handle.
    pub raw: NativeHandle,
    /// Heap type.
    pub ty: DescriptorHeapType,
    /// Number of descriptors.
    pub capacity: u32,
    /// CPU handle of descriptor 0.
    pub cpu_start: CpuDescriptorHandle,
    /// GPU handle of descriptor 0, for shader-visible heaps.
    pub gpu_start: Option<GpuDescriptorHandle>,
    /// Distance between consecutive descriptors.
    pub increment: u32,
}

// ============================================================================
// Command lists
// ============================================================================

/// A recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Batch of transition barriers.
    Barriers(Vec<TransitionBarrier>),
    /// Open a named debug region.
    BeginEvent(String),
    /// Close the innermost debug region.
    EndEvent,
    /// Bind shader-visible descriptor heaps.
    SetDescriptorHeaps(Vec<NativeHandle>),
    /// Clear a render target view.
    ClearRenderTarget {
        view: CpuDescriptorHandle,
        color: [f32; 4],
    },
    /// Clear a depth-stencil view.
    ClearDepthStencil {
        view: CpuDescriptorHandle,
        depth: f32,
        stencil: u8,
    },
    /// Non-indexed draw.
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    /// Compute dispatch.
    Dispatch { x: u32, y: u32, z: u32 },
    /// Whole-resource copy.
    CopyResource { src: ResourceId, dst: ResourceId },
}

/// A closed command list ready for execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    /// Create a command list from recorded commands.
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Command list holding a single barrier batch.
    pub fn from_barriers(barriers: Vec<TransitionBarrier>) -> Self {
        Self {
            commands: vec![Command::Barriers(barriers)],
        }
    }

    /// Recorded commands.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Whether the list contains nothing but barriers.
    pub fn is_barrier_only(&self) -> bool {
        !self.commands.is_empty()
            && self
                .commands
                .iter()
                .all(|command| matches!(command, Command::Barriers(_)))
    }

    /// Every barrier in the list, in recording order.
    pub fn barriers(&self) -> impl Iterator<Item = &TransitionBarrier> + '_ {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Barriers(barriers) => Some(barriers.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A monotonically increasing GPU completion counter.
pub trait Fence: Send + Sync + fmt::Debug {
    /// Last value the GPU has reached (non-blocking).
    fn completed_value(&self) -> u64;

    /// Set the completed value from the CPU side.
    fn signal(&self, value: u64);

    /// Block until the fence reaches `value`.
    fn wait(&self, value: u64) -> BackendResult<()>;

    /// Whether the fence has reached `value`.
    fn is_complete(&self, value: u64) -> bool {
        self.completed_value() >= value
    }
}

/// GPU device operations the frame graph depends on.
pub trait Device: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Create a texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> BackendResult<NativeHandle>;

    /// Create a buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> BackendResult<NativeHandle>;

    /// Destroy a texture or buffer. The GPU must no longer use it.
    fn destroy_resource(&self, raw: NativeHandle);

    /// Create a descriptor heap.
    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc)
        -> BackendResult<DescriptorHeapInfo>;

    /// Destroy a descriptor heap.
    fn destroy_descriptor_heap(&self, raw: NativeHandle);

    /// Write a texture view descriptor into a CPU descriptor slot.
    fn write_texture_view(
        &self,
        texture: NativeHandle,
        view: &TextureViewDescriptor,
        dst: CpuDescriptorHandle,
    );

    /// Write a buffer view descriptor into a CPU descriptor slot.
    fn write_buffer_view(
        &self,
        buffer: NativeHandle,
        view: &BufferViewDescriptor,
        dst: CpuDescriptorHandle,
    );

    /// Create a fence starting at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> BackendResult<Arc<dyn Fence>>;

    /// Execute command lists on a queue, in order.
    fn execute(&self, queue: QueueType, lists: &[CommandList]) -> BackendResult<()>;

    /// Make the queue set `fence` to `value` once all prior work completes.
    fn signal(&self, queue: QueueType, fence: &Arc<dyn Fence>, value: u64) -> BackendResult<()>;
}
