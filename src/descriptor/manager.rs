//! Free-list management of one descriptor heap region.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{DescriptorAllocator, DescriptorHeapAllocation, DescriptorHeapStats};
use crate::allocator::{Allocation, VariableSizeAllocator};
use crate::backend::DescriptorHeapInfo;

#[derive(Debug)]
struct ManagerState {
    allocator: VariableSizeAllocator,
    peak: u32,
}

/// Hands out contiguous descriptor runs from `[region_start, region_start + region_size)`
/// of one heap.
///
/// Does not own the heap: several managers may share one (the static and
/// dynamic regions of a shader-visible heap).
#[derive(Debug)]
pub struct DescriptorHeapAllocationManager {
    id: u32,
    heap: DescriptorHeapInfo,
    region_start: u32,
    region_size: u32,
    state: Mutex<ManagerState>,
}

impl DescriptorHeapAllocationManager {
    /// Create a manager for a region of `heap`.
    pub fn new(id: u32, heap: DescriptorHeapInfo, region_start: u32, region_size: u32) -> Self {
        assert!(
            region_start as u64 + region_size as u64 <= heap.capacity as u64,
            "region [{}, {}) exceeds heap capacity {}",
            region_start,
            region_start as u64 + region_size as u64,
            heap.capacity
        );
        Self {
            id,
            heap,
            region_start,
            region_size,
            state: Mutex::new(ManagerState {
                allocator: VariableSizeAllocator::new(region_size as u64),
                peak: 0,
            }),
        }
    }

    /// Manager identifier stored in its allocations.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The heap this manager allocates from.
    pub fn heap(&self) -> &DescriptorHeapInfo {
        &self.heap
    }

    /// Number of descriptors in the region.
    pub fn region_size(&self) -> u32 {
        self.region_size
    }

    /// Number of free descriptors (possibly fragmented).
    pub fn free_count(&self) -> u32 {
        self.state.lock().allocator.free_size() as u32
    }

    /// Allocate `count` contiguous descriptors; `None` if the region has no
    /// run that large.
    pub(crate) fn allocate(
        &self,
        count: u32,
        owner: &Arc<dyn DescriptorAllocator>,
    ) -> Option<DescriptorHeapAllocation> {
        let allocation = {
            let mut state = self.state.lock();
            let allocation = state.allocator.allocate(count as u64, 1)?;
            let used = state.allocator.used_size() as u32;
            state.peak = state.peak.max(used);
            allocation
        };

        let offset = self.region_start + allocation.offset as u32;
        Some(DescriptorHeapAllocation::new(
            Arc::clone(owner),
            self.heap.raw,
            self.heap.cpu_start.offset(offset, self.heap.increment),
            self.heap
                .gpu_start
                .map(|start| start.offset(offset, self.heap.increment)),
            offset,
            count,
            self.heap.increment,
            self.id,
        ))
    }

    /// Return a range given by heap offset.
    pub(crate) fn free(&self, offset: u32, count: u32) {
        assert!(
            offset >= self.region_start && offset + count <= self.region_start + self.region_size,
            "range [{}, {}) does not belong to manager {}",
            offset,
            offset + count,
            self.id
        );
        self.state.lock().allocator.free(Allocation {
            offset: (offset - self.region_start) as u64,
            size: count as u64,
        });
    }

    /// Usage statistics.
    pub fn stats(&self) -> DescriptorHeapStats {
        let state = self.state.lock();
        DescriptorHeapStats {
            capacity: self.region_size,
            allocated: state.allocator.used_size() as u32,
            peak: state.peak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};

    struct Returner(Mutex<Vec<(u32, u32, u32)>>);

    impl DescriptorAllocator for Returner {
        fn free(&self, manager_id: u32, offset: u32, count: u32) {
            self.0.lock().push((manager_id, offset, count));
        }
    }

    fn heap(capacity: u32) -> DescriptorHeapInfo {
        DescriptorHeapInfo {
            raw: 7,
            ty: DescriptorHeapType::CbvSrvUav,
            capacity,
            cpu_start: CpuDescriptorHandle(1 << 20),
            gpu_start: Some(GpuDescriptorHandle(1 << 30)),
            increment: 32,
        }
    }

    #[test]
    fn test_region_offsets() {
        let manager = DescriptorHeapAllocationManager::new(1, heap(64), 16, 48);
        let returner = Arc::new(Returner(Mutex::new(Vec::new())));
        let owner: Arc<dyn DescriptorAllocator> = returner.clone();

        let allocation = manager.allocate(4, &owner).unwrap();
        assert_eq!(allocation.offset(), 16);
        assert_eq!(
            allocation.cpu_handle(1),
            CpuDescriptorHandle((1 << 20) + 17 * 32)
        );
        assert_eq!(
            allocation.gpu_handle(0),
            Some(GpuDescriptorHandle((1 << 30) + 16 * 32))
        );
        assert_eq!(manager.stats().allocated, 4);

        drop(allocation);
        assert_eq!(returner.0.lock().as_slice(), &[(1, 16, 4)]);
    }

    #[test]
    fn test_exhaustion_and_peak() {
        let manager = DescriptorHeapAllocationManager::new(0, heap(8), 0, 8);
        let owner: Arc<dyn DescriptorAllocator> = Arc::new(Returner(Mutex::new(Vec::new())));

        let a = manager.allocate(6, &owner).unwrap();
        assert!(manager.allocate(3, &owner).is_none());
        manager.free(a.offset(), a.count());
        std::mem::forget(a);

        assert_eq!(manager.free_count(), 8);
        assert_eq!(manager.stats().peak, 6);
    }

    #[test]
    #[should_panic(expected = "exceeds heap capacity")]
    fn test_region_outside_heap_panics() {
        DescriptorHeapAllocationManager::new(0, heap(8), 4, 8);
    }
}
