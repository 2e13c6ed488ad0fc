//! Growable pool of CPU-only descriptor heaps.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    DescriptorAllocator, DescriptorHeapAllocation, DescriptorHeapAllocationManager,
    DescriptorHeapStats, DescriptorHeapType,
};
use crate::backend::{DescriptorHeapDesc, Device};
use crate::error::{FrameGraphError, Result};

struct CpuHeapState {
    managers: Vec<DescriptorHeapAllocationManager>,
    /// Indices of managers believed to have free descriptors.
    available: BTreeSet<usize>,
}

struct CpuHeapShared {
    device: Arc<dyn Device>,
    ty: DescriptorHeapType,
    heap_size: u32,
    state: Mutex<CpuHeapState>,
}

impl CpuHeapShared {
    fn create_manager(&self, id: usize, size: u32) -> Result<DescriptorHeapAllocationManager> {
        let heap = self.device.create_descriptor_heap(&DescriptorHeapDesc {
            ty: self.ty,
            capacity: size,
            shader_visible: false,
        })?;
        Ok(DescriptorHeapAllocationManager::new(id as u32, heap, 0, size))
    }
}

impl DescriptorAllocator for CpuHeapShared {
    fn free(&self, manager_id: u32, offset: u32, count: u32) {
        let mut state = self.state.lock();
        state.managers[manager_id as usize].free(offset, count);
        state.available.insert(manager_id as usize);
    }
}

impl Drop for CpuHeapShared {
    fn drop(&mut self) {
        for manager in &self.state.get_mut().managers {
            self.device.destroy_descriptor_heap(manager.heap().raw);
        }
    }
}

/// Pool of CPU-visible descriptor heaps of one type.
///
/// Allocation tries the managers known to have room first and creates a new
/// backing heap when none fits. Cloning yields another handle to the same
/// pool.
#[derive(Clone)]
pub struct CpuDescriptorHeap {
    shared: Arc<CpuHeapShared>,
}

impl CpuDescriptorHeap {
    /// Create a pool whose backing heaps hold `heap_size` descriptors each.
    pub fn new(device: Arc<dyn Device>, ty: DescriptorHeapType, heap_size: u32) -> Result<Self> {
        assert!(heap_size > 0, "descriptor heap size must be non-zero");
        let shared = CpuHeapShared {
            device,
            ty,
            heap_size,
            state: Mutex::new(CpuHeapState {
                managers: Vec::new(),
                available: BTreeSet::new(),
            }),
        };
        let first = shared.create_manager(0, heap_size)?;
        {
            let mut state = shared.state.lock();
            state.managers.push(first);
            state.available.insert(0);
        }
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Heap type.
    pub fn ty(&self) -> DescriptorHeapType {
        self.shared.ty
    }

    /// Allocate `count` contiguous descriptors, growing the pool if needed.
    pub fn allocate(&self, count: u32) -> Result<DescriptorHeapAllocation> {
        assert!(count > 0, "descriptor count must be non-zero");
        let owner: Arc<dyn DescriptorAllocator> = self.shared.clone();
        let mut state = self.shared.state.lock();

        let candidates: Vec<usize> = state.available.iter().copied().collect();
        for index in candidates {
            let manager = &state.managers[index];
            if let Some(allocation) = manager.allocate(count, &owner) {
                if manager.free_count() == 0 {
                    state.available.remove(&index);
                }
                return Ok(allocation);
            }
        }

        let index = state.managers.len();
        let size = self.shared.heap_size.max(count);
        let manager = self.shared.create_manager(index, size)?;
        log::info!(
            "{:?} CPU descriptor pool grew to {} heaps ({} descriptors in the new heap)",
            self.shared.ty,
            index + 1,
            size
        );
        let allocation = manager.allocate(count, &owner).ok_or(
            FrameGraphError::DescriptorHeapExhausted {
                heap: self.shared.ty,
                region: "cpu",
                requested: count,
                capacity: size,
            },
        )?;
        if manager.free_count() > 0 {
            state.available.insert(index);
        }
        state.managers.push(manager);
        Ok(allocation)
    }

    /// Number of backing heaps.
    pub fn heap_count(&self) -> usize {
        self.shared.state.lock().managers.len()
    }

    /// Usage statistics summed over every backing heap.
    pub fn stats(&self) -> DescriptorHeapStats {
        self.shared
            .state
            .lock()
            .managers
            .iter()
            .map(DescriptorHeapAllocationManager::stats)
            .fold(DescriptorHeapStats::default(), |total, stats| total + stats)
    }
}

impl fmt::Debug for CpuDescriptorHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuDescriptorHeap")
            .field("ty", &self.shared.ty)
            .field("heap_size", &self.shared.heap_size)
            .field("heap_count", &self.heap_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(CpuDescriptorHeap: Send, Sync);
