//! GPU buffer resource.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{view_heap_type, ViewCache, ViewIndex};
use crate::backend::NativeHandle;
use crate::descriptor::CpuDescriptorHandle;
use crate::device::DeviceShared;
use crate::error::Result;
use crate::state::{ResourceId, TrackingInfo};
use crate::types::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ResourceState, ViewKind};

/// A GPU buffer.
///
/// Buffers are tracked as a single subresource and always take part in
/// implicit promotion from (and decay to) the common state.
pub struct Buffer {
    shared: Arc<DeviceShared>,
    id: ResourceId,
    raw: NativeHandle,
    descriptor: BufferDescriptor,
    views: Mutex<ViewCache<BufferViewDescriptor>>,
}

impl Buffer {
    pub(crate) fn new(shared: Arc<DeviceShared>, descriptor: BufferDescriptor) -> Result<Self> {
        let raw = shared.backend.create_buffer(&descriptor)?;
        let id = shared.next_resource_id();
        shared
            .states
            .register(TrackingInfo::buffer(id), ResourceState::COMMON);
        Ok(Self {
            shared,
            id,
            raw,
            descriptor,
            views: Mutex::new(ViewCache::new()),
        })
    }

    /// Tracking identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Native resource handle.
    pub fn raw(&self) -> NativeHandle {
        self.raw
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the debug label.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Tracking record for state transitions.
    pub fn tracking_info(&self) -> TrackingInfo {
        TrackingInfo::buffer(self.id)
    }

    /// Index of the view described by `desc`, creating it on first request.
    pub fn view(&self, desc: &BufferViewDescriptor) -> Result<ViewIndex> {
        self.validate_view(desc);
        self.views.lock().get_or_create(*desc, || {
            let allocation = self.shared.cpu_heap(view_heap_type(desc.kind)).allocate(1)?;
            self.shared
                .backend
                .write_buffer_view(self.raw, desc, allocation.cpu_handle(0));
            Ok(allocation)
        })
    }

    /// CPU descriptor handle of a view returned by [`view`](Self::view).
    pub fn view_handle(&self, index: ViewIndex) -> CpuDescriptorHandle {
        self.views.lock().handle(index)
    }

    pub(crate) fn validate_view(&self, desc: &BufferViewDescriptor) {
        let usage = self.descriptor.usage;
        let allowed = match desc.kind {
            ViewKind::ConstantBuffer => usage.contains(BufferUsage::UNIFORM),
            ViewKind::ShaderResource | ViewKind::UnorderedAccess => {
                usage.contains(BufferUsage::STORAGE)
            }
            ViewKind::RenderTarget | ViewKind::DepthStencil => false,
        };
        assert!(
            allowed,
            "{:?} view is not permitted on buffer {:?} ({:?})",
            desc.kind, self.descriptor.label, usage
        );
        let size = desc
            .size
            .unwrap_or(self.descriptor.size.saturating_sub(desc.offset));
        let end = desc.offset + size;
        assert!(
            end <= self.descriptor.size,
            "view range {}..{} outside buffer of {} bytes",
            desc.offset,
            end,
            self.descriptor.size
        );
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        *self.views.get_mut() = ViewCache::new();
        self.shared.backend.destroy_resource(self.raw);
        self.shared.states.unregister(self.id);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("label", &self.descriptor.label)
            .field("size", &self.descriptor.size)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);
