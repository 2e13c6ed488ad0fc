//! Render device.
//!
//! The [`RenderDevice`] owns everything that outlives a frame: the backend,
//! the global resource state table, the descriptor heaps, the command queues
//! and the retirement ring deferring destruction of objects the GPU may still
//! be using.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::Device;
use crate::context::CommandContext;
use crate::descriptor::{
    CpuDescriptorHeap, DescriptorHeapType, DynamicSuballocator, GpuDescriptorHeap,
};
use crate::error::Result;
use crate::queue::CommandQueue;
use crate::resources::{Buffer, DescriptorView, Texture, ViewTarget};
use crate::retire::{RetirementRing, SyncPoint};
use crate::state::{GlobalStateTable, ResourceId};
use crate::types::{
    BufferDescriptor, BufferViewDescriptor, QueueType, TextureDescriptor, TextureViewDescriptor,
    ViewKind,
};
use crate::FrameGraphConfig;

/// An object kept alive until the GPU finishes the frame it was retired in.
type Retired = Box<dyn Any + Send + Sync>;

/// Device state shared with every resource it creates.
pub(crate) struct DeviceShared {
    pub(crate) backend: Arc<dyn Device>,
    pub(crate) states: Arc<GlobalStateTable>,
    cpu_heaps: Vec<CpuDescriptorHeap>,
    next_resource_id: AtomicU64,
}

impl DeviceShared {
    pub(crate) fn cpu_heap(&self, ty: DescriptorHeapType) -> &CpuDescriptorHeap {
        &self.cpu_heaps[ty.index()]
    }

    pub(crate) fn next_resource_id(&self) -> ResourceId {
        ResourceId(self.next_resource_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// The frame graph's view of a GPU device.
///
/// # Frame lifecycle
///
/// ```text
/// begin_frame()            reclaim whatever the GPU has finished with
///   create_context(..)     record
///   submit(..)             resolve barriers, execute, signal
/// end_frame()              seal the frame with a fence value; block only if
///                          the CPU is max_frames_in_flight frames ahead
/// ```
///
/// A frame is complete once every queue has reached the fence value it had
/// signaled when the frame ended.
///
/// # Thread Safety
///
/// `RenderDevice` is `Send + Sync`. Contexts can be created and recorded on
/// worker threads; submission serializes on the global state table.
///
/// # Example
///
/// ```ignore
/// let device = RenderDevice::new(Arc::new(DummyDevice::new()), FrameGraphConfig::default())?;
/// let buffer = device.create_buffer(BufferDescriptor::new(1024, BufferUsage::STORAGE))?;
///
/// device.begin_frame();
/// let mut ctx = device.create_context(QueueType::Compute);
/// ctx.transition_buffer(&buffer, ResourceState::UNORDERED_ACCESS);
/// ctx.dispatch(8, 1, 1);
/// device.submit(QueueType::Compute, &mut [ctx])?;
/// device.end_frame()?;
/// ```
pub struct RenderDevice {
    shared: Arc<DeviceShared>,
    config: FrameGraphConfig,
    gpu_views: GpuDescriptorHeap,
    gpu_samplers: GpuDescriptorHeap,
    queues: Vec<CommandQueue>,
    retired: Mutex<RetirementRing<Retired>>,
}

impl RenderDevice {
    /// Create a render device on top of a backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor heap or fence cannot be created.
    pub fn new(backend: Arc<dyn Device>, config: FrameGraphConfig) -> Result<Self> {
        assert!(
            config.max_frames_in_flight > 0,
            "at least one frame in flight is required"
        );
        let states = Arc::new(GlobalStateTable::new());

        let cpu_heaps = DescriptorHeapType::ALL
            .iter()
            .map(|&ty| CpuDescriptorHeap::new(backend.clone(), ty, config.cpu_heap_size(ty)))
            .collect::<Result<Vec<_>>>()?;

        let gpu_heap = |ty: DescriptorHeapType| {
            let (static_size, dynamic_size) = config.gpu_heap_sizes(ty);
            GpuDescriptorHeap::new(
                backend.clone(),
                ty,
                static_size,
                dynamic_size,
                config.max_frames_in_flight,
            )
        };
        let gpu_views = gpu_heap(DescriptorHeapType::CbvSrvUav)?;
        let gpu_samplers = gpu_heap(DescriptorHeapType::Sampler)?;

        let queues = QueueType::ALL
            .iter()
            .map(|&ty| CommandQueue::new(ty, backend.clone(), states.clone()))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Created render device on {} backend ({} frames in flight)",
            backend.name(),
            config.max_frames_in_flight
        );

        Ok(Self {
            shared: Arc::new(DeviceShared {
                backend,
                states,
                cpu_heaps,
                next_resource_id: AtomicU64::new(1),
            }),
            retired: Mutex::new(RetirementRing::new(config.max_frames_in_flight)),
            config,
            gpu_views,
            gpu_samplers,
            queues,
        })
    }

    /// The backend this device drives.
    pub fn backend(&self) -> &Arc<dyn Device> {
        &self.shared.backend
    }

    /// The configuration the device was created with.
    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    /// The authoritative per-subresource state table.
    pub fn global_states(&self) -> &Arc<GlobalStateTable> {
        &self.shared.states
    }

    /// CPU descriptor pool of type `ty`.
    pub fn cpu_heap(&self, ty: DescriptorHeapType) -> &CpuDescriptorHeap {
        self.shared.cpu_heap(ty)
    }

    /// Shader-visible heap of type `ty`.
    ///
    /// Panics for heap types that cannot be shader visible.
    pub fn gpu_heap(&self, ty: DescriptorHeapType) -> &GpuDescriptorHeap {
        match ty {
            DescriptorHeapType::CbvSrvUav => &self.gpu_views,
            DescriptorHeapType::Sampler => &self.gpu_samplers,
            DescriptorHeapType::Rtv | DescriptorHeapType::Dsv => {
                panic!("{:?} heaps are never shader visible", ty)
            }
        }
    }

    /// The command queue of type `ty`.
    pub fn queue(&self, ty: QueueType) -> &CommandQueue {
        &self.queues[ty.index()]
    }

    /// Number of frames ended so far.
    pub fn frame_number(&self) -> u64 {
        self.retired.lock().frame_number()
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    /// Create a texture registered in the common state.
    pub fn create_texture(&self, descriptor: TextureDescriptor) -> Result<Arc<Texture>> {
        let texture = Texture::new(self.shared.clone(), descriptor)?;
        log::debug!(
            "Created texture {:?} {:?} ({}x{}, {:?})",
            texture.id(),
            texture.label(),
            texture.width(),
            texture.height(),
            texture.format()
        );
        Ok(Arc::new(texture))
    }

    /// Create a buffer registered in the common state.
    pub fn create_buffer(&self, descriptor: BufferDescriptor) -> Result<Arc<Buffer>> {
        let buffer = Buffer::new(self.shared.clone(), descriptor)?;
        log::debug!(
            "Created buffer {:?} {:?} ({} bytes)",
            buffer.id(),
            buffer.label(),
            buffer.size()
        );
        Ok(Arc::new(buffer))
    }

    /// Write a persistent shader-visible view of a texture.
    ///
    /// Only shader resource and unordered access views can be shader visible.
    pub fn create_texture_view(
        &self,
        texture: &Arc<Texture>,
        desc: &TextureViewDescriptor,
    ) -> Result<Arc<DescriptorView>> {
        assert_shader_visible(desc.kind);
        texture.validate_view(desc);
        let allocation = self.gpu_views.allocate(1)?;
        self.shared
            .backend
            .write_texture_view(texture.raw(), desc, allocation.cpu_handle(0));
        Ok(Arc::new(DescriptorView::new(
            allocation,
            desc.kind,
            ViewTarget::Texture(texture.clone()),
        )))
    }

    /// Write a persistent shader-visible view of a buffer.
    pub fn create_buffer_view(
        &self,
        buffer: &Arc<Buffer>,
        desc: &BufferViewDescriptor,
    ) -> Result<Arc<DescriptorView>> {
        assert_shader_visible(desc.kind);
        buffer.validate_view(desc);
        let allocation = self.gpu_views.allocate(1)?;
        self.shared
            .backend
            .write_buffer_view(buffer.raw(), desc, allocation.cpu_handle(0));
        Ok(Arc::new(DescriptorView::new(
            allocation,
            desc.kind,
            ViewTarget::Buffer(buffer.clone()),
        )))
    }

    /// Keep `object` alive until the GPU finishes the current frame.
    pub fn retire<T: Any + Send + Sync>(&self, object: T) {
        self.retired.lock().retire(Box::new(object));
    }

    // ------------------------------------------------------------------------
    // Recording and submission
    // ------------------------------------------------------------------------

    /// Create a recording context for a queue.
    pub fn create_context(&self, queue: QueueType) -> CommandContext {
        CommandContext::new(
            queue,
            DynamicSuballocator::new(
                self.gpu_views.clone(),
                self.config.dynamic_chunk_size(DescriptorHeapType::CbvSrvUav),
            ),
            DynamicSuballocator::new(
                self.gpu_samplers.clone(),
                self.config.dynamic_chunk_size(DescriptorHeapType::Sampler),
            ),
        )
    }

    /// Submit contexts to a queue; returns the fence value signaled after
    /// them.
    pub fn submit(&self, queue: QueueType, contexts: &mut [CommandContext]) -> Result<u64> {
        self.queue(queue).submit(contexts)
    }

    // ------------------------------------------------------------------------
    // Frame lifecycle
    // ------------------------------------------------------------------------

    /// Release retired objects and descriptors the GPU has finished with.
    /// Never blocks.
    pub fn begin_frame(&self) {
        self.reclaim(&self.completed());
    }

    /// Seal the frame and advance the retirement ring.
    ///
    /// Signals the graphics queue to mark the end of the frame. The frame's
    /// sync point records that value together with the last value signaled
    /// on the compute and copy queues, so objects and dynamic descriptors
    /// released during the frame wait for every queue that may still use
    /// them. Blocks when the next retirement slot still belongs to a frame
    /// the GPU has not finished, i.e. when the CPU is `max_frames_in_flight`
    /// frames ahead. Returns the graphics fence value of the frame.
    pub fn end_frame(&self) -> Result<u64> {
        let frame_value = self.queue(QueueType::Graphics).signal()?;
        let sync_point = [QueueType::Compute, QueueType::Copy]
            .into_iter()
            .fold(SyncPoint::graphics(frame_value), |sync, ty| {
                sync.with(ty, self.queue(ty).last_signaled())
            });

        let outstanding = [
            self.gpu_views.end_frame(sync_point),
            self.gpu_samplers.end_frame(sync_point),
            self.retired.lock().end_frame(sync_point),
        ]
        .into_iter()
        .flatten()
        .reduce(SyncPoint::merge);

        if let Some(wait_for) = outstanding {
            for (ty, value) in wait_for.queues() {
                let queue = self.queue(ty);
                if !queue.fence().is_complete(value) {
                    log::debug!(
                        "Frame {} waits for {:?} fence value {} (completed {})",
                        frame_value,
                        ty,
                        value,
                        queue.completed_value()
                    );
                    queue.fence().wait(value)?;
                }
            }
        }
        self.reclaim(&self.completed());
        Ok(frame_value)
    }

    /// Block until every queue is idle and release everything retired.
    pub fn wait_idle(&self) -> Result<()> {
        for queue in &self.queues {
            queue.wait_idle()?;
        }
        let released = self.retired.lock().drain();
        drop(released);
        self.gpu_views.reclaim_all();
        self.gpu_samplers.reclaim_all();
        Ok(())
    }

    /// Completed fence value of every queue.
    fn completed(&self) -> SyncPoint {
        self.queues.iter().fold(SyncPoint::new(), |sync, queue| {
            sync.with(queue.ty(), queue.completed_value())
        })
    }

    fn reclaim(&self, completed: &SyncPoint) {
        // Objects are dropped outside the lock: dropping a texture may retire
        // descriptors through other locks.
        let released = self.retired.lock().reclaim(completed);
        if !released.is_empty() {
            log::trace!("Released {} retired objects", released.len());
        }
        drop(released);
        self.gpu_views.reclaim(completed);
        self.gpu_samplers.reclaim(completed);
    }
}

fn assert_shader_visible(kind: ViewKind) {
    assert!(
        matches!(
            kind,
            ViewKind::ShaderResource | ViewKind::UnorderedAccess | ViewKind::ConstantBuffer
        ),
        "{:?} views cannot be shader visible",
        kind
    );
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::error!("Failed to wait for the GPU while dropping the render device: {}", err);
        }
    }
}

impl std::fmt::Debug for RenderDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDevice")
            .field("backend", &self.shared.backend.name())
            .field("frame", &self.frame_number())
            .field("resources", &self.shared.states.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyDevice, Fence};
    use crate::types::{BufferUsage, ResourceState, TextureFormat, TextureUsage};

    fn manual_device(frames: usize) -> (Arc<DummyDevice>, RenderDevice) {
        let backend = Arc::new(DummyDevice::manual());
        let device = RenderDevice::new(
            backend.clone(),
            FrameGraphConfig::default().with_frames_in_flight(frames),
        )
        .unwrap();
        (backend, device)
    }

    #[test]
    fn test_creates_heaps_and_queues() {
        let backend = Arc::new(DummyDevice::new());
        let device = RenderDevice::new(backend.clone(), FrameGraphConfig::default()).unwrap();
        // Four CPU pools plus two shader-visible heaps.
        assert_eq!(backend.live_heap_count(), 6);
        assert_eq!(device.queue(QueueType::Copy).ty(), QueueType::Copy);
        assert_eq!(
            device.gpu_heap(DescriptorHeapType::Sampler).static_stats().capacity,
            1024
        );
    }

    #[test]
    fn test_resource_ids_are_unique() {
        let backend = Arc::new(DummyDevice::new());
        let device = RenderDevice::new(backend, FrameGraphConfig::default()).unwrap();
        let a = device
            .create_buffer(BufferDescriptor::new(16, BufferUsage::UNIFORM))
            .unwrap();
        let b = device
            .create_buffer(BufferDescriptor::new(16, BufferUsage::UNIFORM))
            .unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(device.global_states().len(), 2);
    }

    #[test]
    fn test_retired_object_released_after_fence() {
        let (backend, device) = manual_device(2);
        let buffer = device
            .create_buffer(BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        device.retire(buffer);

        device.begin_frame();
        device.end_frame().unwrap();
        assert_eq!(backend.live_resource_count(), 1);

        backend.complete_pending();
        device.begin_frame();
        assert_eq!(backend.live_resource_count(), 0);
    }

    #[test]
    fn test_shader_visible_texture_view() {
        let backend = Arc::new(DummyDevice::new());
        let device = RenderDevice::new(backend, FrameGraphConfig::default()).unwrap();
        let texture = device
            .create_texture(TextureDescriptor::new_2d(
                32,
                32,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING,
            ))
            .unwrap();
        let view = device
            .create_texture_view(&texture, &TextureViewDescriptor::shader_resource())
            .unwrap();
        assert_ne!(view.gpu_handle().0, 0);
        assert_eq!(device.gpu_views.static_stats().allocated, 1);

        drop(view);
        assert_eq!(device.gpu_views.static_stats().allocated, 0);
    }

    #[test]
    fn test_submit_signals_queue_fence() {
        let backend = Arc::new(DummyDevice::new());
        let device = RenderDevice::new(backend.clone(), FrameGraphConfig::default()).unwrap();
        let buffer = device
            .create_buffer(BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();

        let mut ctx = device.create_context(QueueType::Compute);
        ctx.transition_buffer(&buffer, ResourceState::UNORDERED_ACCESS);
        ctx.dispatch(1, 1, 1);
        let value = device.submit(QueueType::Compute, &mut [ctx]).unwrap();

        assert_eq!(value, 1);
        assert!(device.queue(QueueType::Compute).fence().is_complete(value));
        assert_eq!(backend.submissions().len(), 1);
    }

    #[test]
    fn test_wait_idle_drains_everything() {
        let (backend, device) = manual_device(3);
        let buffer = device
            .create_buffer(BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        device.retire(buffer);
        device.end_frame().unwrap();
        assert_eq!(backend.live_resource_count(), 1);

        let completer = {
            let backend = backend.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                backend.complete_pending();
            })
        };
        device.wait_idle().unwrap();
        completer.join().unwrap();
        assert_eq!(backend.live_resource_count(), 0);
    }
}
