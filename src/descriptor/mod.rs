//! Descriptor heap management.
//!
//! # Architecture
//!
//! ```text
//! VariableSizeAllocator          free-list over [start, start + size)
//!         │
//! DescriptorHeapAllocationManager   one heap (or region of a heap)
//!         │
//!    ┌────┴──────────────────────┐
//! CpuDescriptorHeap          GpuDescriptorHeap
//! (grows: many managers)     (one heap: static region + dynamic region)
//!                                   │
//!                            DynamicSuballocator (per recording context)
//! ```
//!
//! Every range handed out is a [`DescriptorHeapAllocation`]. It is move-only
//! and returns its range to the owning pool when dropped. Static ranges are
//! freed immediately; dynamic ranges go through a fence-gated retirement ring
//! and become reusable only once the GPU has finished the frame that used
//! them.

mod cpu_heap;
mod dynamic;
mod gpu_heap;
mod manager;

pub use cpu_heap::CpuDescriptorHeap;
pub use dynamic::{DynamicDescriptorRange, DynamicSuballocator};
pub use gpu_heap::GpuDescriptorHeap;
pub use manager::DescriptorHeapAllocationManager;

use std::fmt;
use std::ops::Add;
use std::sync::Arc;

use crate::backend::NativeHandle;

/// Descriptor heap type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav,
    /// Samplers.
    Sampler,
    /// Render target views.
    Rtv,
    /// Depth-stencil views.
    Dsv,
}

impl DescriptorHeapType {
    /// All heap types.
    pub const ALL: [DescriptorHeapType; 4] = [Self::CbvSrvUav, Self::Sampler, Self::Rtv, Self::Dsv];

    /// Whether heaps of this type can be bound for shader access.
    pub fn can_be_shader_visible(self) -> bool {
        matches!(self, Self::CbvSrvUav | Self::Sampler)
    }

    /// Index of this type in per-type arrays.
    pub fn index(self) -> usize {
        match self {
            Self::CbvSrvUav => 0,
            Self::Sampler => 1,
            Self::Rtv => 2,
            Self::Dsv => 3,
        }
    }
}

/// CPU address of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    /// Handle `index` descriptors further along the heap.
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + index as u64 * increment as u64)
    }
}

/// GPU address of a descriptor in a shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

impl GpuDescriptorHandle {
    /// Handle `index` descriptors further along the heap.
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + index as u64 * increment as u64)
    }
}

/// Usage statistics of a heap or heap pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorHeapStats {
    /// Total descriptors.
    pub capacity: u32,
    /// Descriptors currently handed out.
    pub allocated: u32,
    /// Highest `allocated` value observed.
    pub peak: u32,
}

impl Add for DescriptorHeapStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            capacity: self.capacity + other.capacity,
            allocated: self.allocated + other.allocated,
            peak: self.peak + other.peak,
        }
    }
}

/// Receives ranges back from dropped [`DescriptorHeapAllocation`]s.
pub(crate) trait DescriptorAllocator: Send + Sync {
    /// Return `count` descriptors starting at heap offset `offset` to the
    /// manager identified by `manager_id`.
    fn free(&self, manager_id: u32, offset: u32, count: u32);
}

// ============================================================================
// DescriptorHeapAllocation
// ============================================================================

/// A contiguous run of descriptors in one heap.
///
/// Move-only; dropping it returns the range to its owner.
pub struct DescriptorHeapAllocation {
    owner: Option<Arc<dyn DescriptorAllocator>>,
    heap: NativeHandle,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    offset: u32,
    count: u32,
    increment: u32,
    manager_id: u32,
}

impl DescriptorHeapAllocation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        owner: Arc<dyn DescriptorAllocator>,
        heap: NativeHandle,
        cpu_start: CpuDescriptorHandle,
        gpu_start: Option<GpuDescriptorHandle>,
        offset: u32,
        count: u32,
        increment: u32,
        manager_id: u32,
    ) -> Self {
        Self {
            owner: Some(owner),
            heap,
            cpu_start,
            gpu_start,
            offset,
            count,
            increment,
            manager_id,
        }
    }

    /// Native handle of the heap this range lives in.
    pub fn heap(&self) -> NativeHandle {
        self.heap
    }

    /// CPU handle of descriptor `index` in the range.
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        assert!(index < self.count, "descriptor {} out of range ({})", index, self.count);
        self.cpu_start.offset(index, self.increment)
    }

    /// GPU handle of descriptor `index`, for shader-visible heaps.
    pub fn gpu_handle(&self, index: u32) -> Option<GpuDescriptorHandle> {
        assert!(index < self.count, "descriptor {} out of range ({})", index, self.count);
        self.gpu_start.map(|start| start.offset(index, self.increment))
    }

    /// Offset of the first descriptor in the heap.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of descriptors.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Distance between consecutive descriptors.
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Identifier of the manager the range belongs to.
    pub fn manager_id(&self) -> u32 {
        self.manager_id
    }

    /// Whether the range is shader visible.
    pub fn is_shader_visible(&self) -> bool {
        self.gpu_start.is_some()
    }
}

impl fmt::Debug for DescriptorHeapAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHeapAllocation")
            .field("heap", &self.heap)
            .field("offset", &self.offset)
            .field("count", &self.count)
            .field("manager_id", &self.manager_id)
            .field("shader_visible", &self.is_shader_visible())
            .finish()
    }
}

impl Drop for DescriptorHeapAllocation {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.free(self.manager_id, self.offset, self.count);
        }
    }
}

static_assertions::assert_impl_all!(DescriptorHeapAllocation: Send, Sync);
static_assertions::assert_not_impl_any!(DescriptorHeapAllocation: Clone);
