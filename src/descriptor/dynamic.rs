//! Per-context linear suballocation of dynamic descriptors.

use super::{CpuDescriptorHandle, DescriptorHeapAllocation, GpuDescriptorHandle, GpuDescriptorHeap};
use crate::error::Result;

/// A non-owning run of shader-visible descriptors valid until the owning
/// suballocator releases its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicDescriptorRange {
    cpu_start: CpuDescriptorHandle,
    gpu_start: GpuDescriptorHandle,
    count: u32,
    increment: u32,
}

impl DynamicDescriptorRange {
    /// CPU handle of descriptor `index`, for writing.
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        assert!(index < self.count, "descriptor {} out of range ({})", index, self.count);
        self.cpu_start.offset(index, self.increment)
    }

    /// GPU handle of descriptor `index`, for binding.
    pub fn gpu_handle(&self, index: u32) -> GpuDescriptorHandle {
        assert!(index < self.count, "descriptor {} out of range ({})", index, self.count);
        self.gpu_start.offset(index, self.increment)
    }

    /// Number of descriptors.
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Linearly suballocates descriptors from chunks of a GPU heap's dynamic
/// region.
///
/// Requests larger than the chunk size get a dedicated chunk. Every chunk is
/// released at once by [`release_allocations`](Self::release_allocations),
/// called when the owning context is submitted; the GPU heap then keeps the
/// ranges until the frame's fence completes.
#[derive(Debug)]
pub struct DynamicSuballocator {
    heap: GpuDescriptorHeap,
    chunk_size: u32,
    chunks: Vec<DescriptorHeapAllocation>,
    dedicated: Vec<DescriptorHeapAllocation>,
    /// Descriptors used in the last chunk.
    cursor: u32,
    allocated: u32,
}

impl DynamicSuballocator {
    /// Create a suballocator requesting `chunk_size` descriptors at a time.
    pub fn new(heap: GpuDescriptorHeap, chunk_size: u32) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            heap,
            chunk_size,
            chunks: Vec::new(),
            dedicated: Vec::new(),
            cursor: 0,
            allocated: 0,
        }
    }

    /// The GPU heap chunks come from.
    pub fn heap(&self) -> &GpuDescriptorHeap {
        &self.heap
    }

    /// Allocate `count` contiguous shader-visible descriptors.
    pub fn allocate(&mut self, count: u32) -> Result<DynamicDescriptorRange> {
        assert!(count > 0, "descriptor count must be non-zero");

        if count > self.chunk_size {
            let chunk = self.heap.allocate_dynamic(count)?;
            let range = range_in(&chunk, 0, count);
            self.dedicated.push(chunk);
            self.allocated += count;
            return Ok(range);
        }

        let fits = self
            .chunks
            .last()
            .is_some_and(|chunk| self.cursor + count <= chunk.count());
        if !fits {
            self.chunks.push(self.heap.allocate_dynamic(self.chunk_size)?);
            self.cursor = 0;
        }
        let start = self.cursor;
        self.cursor += count;
        self.allocated += count;

        let chunk = &self.chunks[self.chunks.len() - 1];
        Ok(range_in(chunk, start, count))
    }

    /// Release every chunk back to the GPU heap.
    pub fn release_allocations(&mut self) {
        if self.allocated > 0 {
            log::trace!(
                "Releasing {} dynamic descriptors in {} chunks",
                self.allocated,
                self.chunks.len() + self.dedicated.len()
            );
        }
        self.chunks.clear();
        self.dedicated.clear();
        self.cursor = 0;
        self.allocated = 0;
    }

    /// Descriptors handed out since the last release.
    pub fn allocated_count(&self) -> u32 {
        self.allocated
    }

    /// Number of chunks currently held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len() + self.dedicated.len()
    }
}

fn range_in(chunk: &DescriptorHeapAllocation, start: u32, count: u32) -> DynamicDescriptorRange {
    DynamicDescriptorRange {
        cpu_start: chunk.cpu_handle(start),
        gpu_start: chunk
            .gpu_handle(start)
            .unwrap_or(GpuDescriptorHandle(0)),
        count,
        increment: chunk.increment(),
    }
}
