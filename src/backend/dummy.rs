//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out native
//! handles from a counter, records every submission for inspection and
//! completes fences either immediately (auto-complete mode) or only when the
//! test says so ([`DummyDevice::complete_pending`] / [`Fence::signal`]).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{
    BackendError, BackendResult, CommandList, DescriptorHeapDesc, DescriptorHeapInfo, Device,
    Fence, NativeHandle,
};
use crate::descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};
use crate::types::{
    BufferDescriptor, BufferViewDescriptor, QueueType, TextureDescriptor, TextureViewDescriptor,
};

/// How long [`DummyFence::wait`] blocks before reporting a timeout.
const FENCE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Address space reserved per descriptor heap so handles never overlap.
const HEAP_ADDRESS_STRIDE: u64 = 1 << 32;

// ============================================================================
// DummyFence
// ============================================================================

/// CPU-side fence used by the dummy backend.
#[derive(Debug, Default)]
pub struct DummyFence {
    value: Mutex<u64>,
    reached: Condvar,
}

impl DummyFence {
    /// Create a fence starting at `initial_value`.
    pub fn new(initial_value: u64) -> Self {
        Self {
            value: Mutex::new(initial_value),
            reached: Condvar::new(),
        }
    }
}

impl Fence for DummyFence {
    fn completed_value(&self) -> u64 {
        *self.value.lock()
    }

    fn signal(&self, value: u64) {
        let mut current = self.value.lock();
        if value > *current {
            *current = value;
            self.reached.notify_all();
        }
    }

    fn wait(&self, value: u64) -> BackendResult<()> {
        let mut current = self.value.lock();
        while *current < value {
            let timed_out = self.reached.wait_for(&mut current, FENCE_WAIT_TIMEOUT).timed_out();
            if timed_out && *current < value {
                return Err(BackendError::FenceTimeout(value));
            }
        }
        Ok(())
    }
}

// ============================================================================
// DummyDevice
// ============================================================================

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Queue the lists were executed on.
    pub queue: QueueType,
    /// Executed command lists, in order.
    pub lists: Vec<CommandList>,
}

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    auto_complete: bool,
    next_handle: AtomicU64,
    live_resources: AtomicUsize,
    live_heaps: AtomicUsize,
    descriptor_writes: AtomicUsize,
    submissions: Mutex<Vec<Submission>>,
    pending_signals: Mutex<Vec<(Arc<dyn Fence>, u64)>>,
}

impl DummyDevice {
    /// Create a device whose queues complete work immediately.
    pub fn new() -> Self {
        Self::with_auto_complete(true)
    }

    /// Create a device whose fences only advance on
    /// [`complete_pending`](Self::complete_pending) or an explicit CPU signal.
    pub fn manual() -> Self {
        Self::with_auto_complete(false)
    }

    fn with_auto_complete(auto_complete: bool) -> Self {
        Self {
            auto_complete,
            next_handle: AtomicU64::new(1),
            live_resources: AtomicUsize::new(0),
            live_heaps: AtomicUsize::new(0),
            descriptor_writes: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            pending_signals: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the GPU finishing all submitted work.
    pub fn complete_pending(&self) {
        let signals = std::mem::take(&mut *self.pending_signals.lock());
        for (fence, value) in signals {
            fence.signal(value);
        }
    }

    /// Every submission recorded so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Take and clear the recorded submissions.
    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut *self.submissions.lock())
    }

    /// Number of textures and buffers currently alive.
    pub fn live_resource_count(&self) -> usize {
        self.live_resources.load(Ordering::Acquire)
    }

    /// Number of descriptor heaps currently alive.
    pub fn live_heap_count(&self) -> usize {
        self.live_heaps.load(Ordering::Acquire)
    }

    /// Number of descriptors written so far.
    pub fn descriptor_write_count(&self) -> usize {
        self.descriptor_writes.load(Ordering::Acquire)
    }

    fn allocate_handle(&self) -> NativeHandle {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for DummyDevice {
    fn name(&self) -> &str {
        "Dummy Backend"
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> BackendResult<NativeHandle> {
        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth_or_array_layers
        );
        self.live_resources.fetch_add(1, Ordering::AcqRel);
        Ok(self.allocate_handle())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> BackendResult<NativeHandle> {
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        if descriptor.size == 0 {
            return Err(BackendError::BufferCreationFailed(
                "buffer size must be non-zero".to_string(),
            ));
        }
        self.live_resources.fetch_add(1, Ordering::AcqRel);
        Ok(self.allocate_handle())
    }

    fn destroy_resource(&self, raw: NativeHandle) {
        log::trace!("DummyDevice: destroying resource {}", raw);
        self.live_resources.fetch_sub(1, Ordering::AcqRel);
    }

    fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> BackendResult<DescriptorHeapInfo> {
        if desc.shader_visible && !desc.ty.can_be_shader_visible() {
            return Err(BackendError::DescriptorHeapCreationFailed(format!(
                "{:?} heaps cannot be shader visible",
                desc.ty
            )));
        }
        let raw = self.allocate_handle();
        let base = raw * HEAP_ADDRESS_STRIDE;
        let increment = match desc.ty {
            DescriptorHeapType::CbvSrvUav => 32,
            DescriptorHeapType::Sampler => 16,
            DescriptorHeapType::Rtv | DescriptorHeapType::Dsv => 8,
        };
        log::trace!(
            "DummyDevice: creating {:?} descriptor heap ({} descriptors, shader visible: {})",
            desc.ty,
            desc.capacity,
            desc.shader_visible
        );
        self.live_heaps.fetch_add(1, Ordering::AcqRel);
        Ok(DescriptorHeapInfo {
            raw,
            ty: desc.ty,
            capacity: desc.capacity,
            cpu_start: CpuDescriptorHandle(base),
            gpu_start: desc.shader_visible.then_some(GpuDescriptorHandle(base)),
            increment,
        })
    }

    fn destroy_descriptor_heap(&self, raw: NativeHandle) {
        log::trace!("DummyDevice: destroying descriptor heap {}", raw);
        self.live_heaps.fetch_sub(1, Ordering::AcqRel);
    }

    fn write_texture_view(
        &self,
        texture: NativeHandle,
        view: &TextureViewDescriptor,
        dst: CpuDescriptorHandle,
    ) {
        log::trace!("DummyDevice: {:?} of texture {} at {:?}", view.kind, texture, dst);
        self.descriptor_writes.fetch_add(1, Ordering::AcqRel);
    }

    fn write_buffer_view(
        &self,
        buffer: NativeHandle,
        view: &BufferViewDescriptor,
        dst: CpuDescriptorHandle,
    ) {
        log::trace!("DummyDevice: {:?} of buffer {} at {:?}", view.kind, buffer, dst);
        self.descriptor_writes.fetch_add(1, Ordering::AcqRel);
    }

    fn create_fence(&self, initial_value: u64) -> BackendResult<Arc<dyn Fence>> {
        Ok(Arc::new(DummyFence::new(initial_value)))
    }

    fn execute(&self, queue: QueueType, lists: &[CommandList]) -> BackendResult<()> {
        log::trace!(
            "DummyDevice: executing {} command lists on {:?} queue",
            lists.len(),
            queue
        );
        self.submissions.lock().push(Submission {
            queue,
            lists: lists.to_vec(),
        });
        Ok(())
    }

    fn signal(&self, queue: QueueType, fence: &Arc<dyn Fence>, value: u64) -> BackendResult<()> {
        log::trace!("DummyDevice: {:?} queue signals fence to {}", queue, value);
        if self.auto_complete {
            fence.signal(value);
        } else {
            self.pending_signals.lock().push((Arc::clone(fence), value));
        }
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyDevice: Send, Sync);
