//! Shader-visible descriptor heap split into static and dynamic regions.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    DescriptorAllocator, DescriptorHeapAllocation, DescriptorHeapAllocationManager,
    DescriptorHeapStats, DescriptorHeapType,
};
use crate::backend::{DescriptorHeapDesc, Device, NativeHandle};
use crate::error::{FrameGraphError, Result};
use crate::retire::{RetirementRing, SyncPoint};

const STATIC_MANAGER_ID: u32 = 0;
const DYNAMIC_MANAGER_ID: u32 = 1;

/// A dynamic range waiting for its frame's fence.
#[derive(Debug, Clone, Copy)]
struct StaleRange {
    offset: u32,
    count: u32,
}

struct GpuHeapShared {
    device: Arc<dyn Device>,
    ty: DescriptorHeapType,
    raw: NativeHandle,
    static_region: DescriptorHeapAllocationManager,
    dynamic_region: DescriptorHeapAllocationManager,
    stale: Mutex<RetirementRing<StaleRange>>,
}

impl DescriptorAllocator for GpuHeapShared {
    fn free(&self, manager_id: u32, offset: u32, count: u32) {
        match manager_id {
            STATIC_MANAGER_ID => self.static_region.free(offset, count),
            DYNAMIC_MANAGER_ID => self.stale.lock().retire(StaleRange { offset, count }),
            other => panic!("unknown GPU descriptor heap manager {}", other),
        }
    }
}

impl Drop for GpuHeapShared {
    fn drop(&mut self) {
        self.device.destroy_descriptor_heap(self.raw);
    }
}

/// One shader-visible descriptor heap.
///
/// The first `static_size` descriptors hold persistent views freed
/// individually. The remaining `dynamic_size` descriptors are handed out per
/// frame (usually in chunks through a
/// [`DynamicSuballocator`](super::DynamicSuballocator)); freed dynamic ranges
/// only return to the free list once the fence value of the frame they were
/// freed in has completed. Cloning yields another handle to the same heap.
#[derive(Clone)]
pub struct GpuDescriptorHeap {
    shared: Arc<GpuHeapShared>,
}

impl GpuDescriptorHeap {
    /// Create a shader-visible heap.
    pub fn new(
        device: Arc<dyn Device>,
        ty: DescriptorHeapType,
        static_size: u32,
        dynamic_size: u32,
        frames_in_flight: usize,
    ) -> Result<Self> {
        assert!(
            ty.can_be_shader_visible(),
            "{:?} descriptor heaps cannot be shader visible",
            ty
        );
        let heap = device.create_descriptor_heap(&DescriptorHeapDesc {
            ty,
            capacity: static_size + dynamic_size,
            shader_visible: true,
        })?;
        log::debug!(
            "Created {:?} GPU descriptor heap: {} static + {} dynamic descriptors",
            ty,
            static_size,
            dynamic_size
        );
        Ok(Self {
            shared: Arc::new(GpuHeapShared {
                device,
                ty,
                raw: heap.raw,
                static_region: DescriptorHeapAllocationManager::new(
                    STATIC_MANAGER_ID,
                    heap,
                    0,
                    static_size,
                ),
                dynamic_region: DescriptorHeapAllocationManager::new(
                    DYNAMIC_MANAGER_ID,
                    heap,
                    static_size,
                    dynamic_size,
                ),
                stale: Mutex::new(RetirementRing::new(frames_in_flight)),
            }),
        })
    }

    /// Heap type.
    pub fn ty(&self) -> DescriptorHeapType {
        self.shared.ty
    }

    /// Native heap handle, for binding.
    pub fn raw(&self) -> NativeHandle {
        self.shared.raw
    }

    fn owner(&self) -> Arc<dyn DescriptorAllocator> {
        self.shared.clone()
    }

    /// Allocate persistent descriptors from the static region.
    pub fn allocate(&self, count: u32) -> Result<DescriptorHeapAllocation> {
        assert!(count > 0, "descriptor count must be non-zero");
        let region = &self.shared.static_region;
        region
            .allocate(count, &self.owner())
            .ok_or(FrameGraphError::DescriptorHeapExhausted {
                heap: self.shared.ty,
                region: "static",
                requested: count,
                capacity: region.region_size(),
            })
    }

    /// Allocate frame-scoped descriptors from the dynamic region.
    ///
    /// The range is retired when dropped and reused only after the frame's
    /// fence completes.
    pub fn allocate_dynamic(&self, count: u32) -> Result<DescriptorHeapAllocation> {
        assert!(count > 0, "descriptor count must be non-zero");
        let region = &self.shared.dynamic_region;
        region
            .allocate(count, &self.owner())
            .ok_or(FrameGraphError::DescriptorHeapExhausted {
                heap: self.shared.ty,
                region: "dynamic",
                requested: count,
                capacity: region.region_size(),
            })
    }

    /// Seal the dynamic ranges freed this frame with the frame's sync point.
    ///
    /// Returns the sync point of an older frame that still shares the next
    /// slot, if any. Ranges freed from now on are not released by it.
    pub fn end_frame(&self, sync_point: SyncPoint) -> Option<SyncPoint> {
        self.shared.stale.lock().end_frame(sync_point)
    }

    /// Return dynamic ranges whose sync point has been reached on every
    /// queue to the free list. Returns the number of descriptors reclaimed.
    pub fn reclaim(&self, completed: &SyncPoint) -> u32 {
        let released = self.shared.stale.lock().reclaim(completed);
        self.release(released)
    }

    /// Return every retired dynamic range; the GPU must be idle.
    pub(crate) fn reclaim_all(&self) -> u32 {
        let released = self.shared.stale.lock().drain();
        self.release(released)
    }

    fn release(&self, ranges: Vec<StaleRange>) -> u32 {
        let mut reclaimed = 0;
        for range in ranges {
            self.shared.dynamic_region.free(range.offset, range.count);
            reclaimed += range.count;
        }
        if reclaimed > 0 {
            log::trace!(
                "{:?} GPU descriptor heap reclaimed {} dynamic descriptors",
                self.shared.ty,
                reclaimed
            );
        }
        reclaimed
    }

    /// Usage statistics of the static region.
    pub fn static_stats(&self) -> DescriptorHeapStats {
        self.shared.static_region.stats()
    }

    /// Usage statistics of the dynamic region, including ranges still
    /// waiting for their fence.
    pub fn dynamic_stats(&self) -> DescriptorHeapStats {
        self.shared.dynamic_region.stats()
    }
}

impl fmt::Debug for GpuDescriptorHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuDescriptorHeap")
            .field("ty", &self.shared.ty)
            .field("raw", &self.shared.raw)
            .field("static", &self.static_stats())
            .field("dynamic", &self.dynamic_stats())
            .finish()
    }
}

static_assertions::assert_impl_all!(GpuDescriptorHeap: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Device, DummyDevice, Fence};
    use crate::types::QueueType;

    fn heap(static_size: u32, dynamic_size: u32) -> GpuDescriptorHeap {
        let device = Arc::new(DummyDevice::new());
        GpuDescriptorHeap::new(
            device,
            DescriptorHeapType::CbvSrvUav,
            static_size,
            dynamic_size,
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_static_and_dynamic_regions_are_disjoint() {
        let heap = heap(4, 4);
        let persistent = heap.allocate(4).unwrap();
        let dynamic = heap.allocate_dynamic(4).unwrap();

        assert_eq!(persistent.offset(), 0);
        assert_eq!(dynamic.offset(), 4);
        assert!(dynamic.gpu_handle(0).is_some());
    }

    #[test]
    fn test_static_exhaustion_is_an_error() {
        let heap = heap(2, 2);
        let _a = heap.allocate(2).unwrap();
        let result = heap.allocate(1);
        assert!(matches!(
            result,
            Err(FrameGraphError::DescriptorHeapExhausted { region: "static", .. })
        ));
    }

    #[test]
    fn test_static_free_is_immediate() {
        let heap = heap(2, 2);
        drop(heap.allocate(2).unwrap());
        assert!(heap.allocate(2).is_ok());
    }

    #[test]
    fn test_dynamic_reuse_is_fence_gated() {
        let device = Arc::new(DummyDevice::manual());
        let fence = device.create_fence(0).unwrap();
        let heap =
            GpuDescriptorHeap::new(device.clone(), DescriptorHeapType::CbvSrvUav, 0, 4, 2)
                .unwrap();

        drop(heap.allocate_dynamic(4).unwrap());
        assert_eq!(heap.end_frame(SyncPoint::graphics(1)), None);
        device.signal(QueueType::Graphics, &fence, 1).unwrap();

        // The GPU has not reached value 1 yet.
        let completed = SyncPoint::graphics(fence.completed_value());
        assert_eq!(heap.reclaim(&completed), 0);
        assert!(heap.allocate_dynamic(1).is_err());

        device.complete_pending();
        let completed = SyncPoint::graphics(fence.completed_value());
        assert_eq!(heap.reclaim(&completed), 4);
        assert!(heap.allocate_dynamic(4).is_ok());
    }

    #[test]
    fn test_dynamic_reuse_waits_for_every_queue() {
        let heap = heap(0, 4);
        drop(heap.allocate_dynamic(4).unwrap());
        heap.end_frame(SyncPoint::graphics(1).with(QueueType::Compute, 1));

        assert_eq!(heap.reclaim(&SyncPoint::graphics(1)), 0);
        assert_eq!(heap.dynamic_stats().allocated, 4);

        let completed = SyncPoint::graphics(1).with(QueueType::Compute, 1);
        assert_eq!(heap.reclaim(&completed), 4);
    }

    #[test]
    fn test_range_freed_after_wrap_is_not_released_early() {
        let heap = heap(0, 4);
        drop(heap.allocate_dynamic(2).unwrap());
        heap.end_frame(SyncPoint::graphics(1));
        assert_eq!(
            heap.end_frame(SyncPoint::graphics(2)),
            Some(SyncPoint::graphics(1))
        );

        // Freed into the slot frame 0 still occupies.
        drop(heap.allocate_dynamic(2).unwrap());
        assert_eq!(heap.reclaim(&SyncPoint::graphics(1)), 2);
        assert_eq!(heap.dynamic_stats().allocated, 2);
    }

    #[test]
    fn test_heap_destroyed_after_last_allocation() {
        let device = Arc::new(DummyDevice::new());
        let heap =
            GpuDescriptorHeap::new(device.clone(), DescriptorHeapType::Sampler, 2, 2, 2).unwrap();
        let allocation = heap.allocate(1).unwrap();
        drop(heap);
        assert_eq!(device.live_heap_count(), 1);
        drop(allocation);
        assert_eq!(device.live_heap_count(), 0);
    }
}
