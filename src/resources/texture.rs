//! GPU texture resource.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{view_heap_type, ViewCache, ViewIndex};
use crate::backend::NativeHandle;
use crate::descriptor::CpuDescriptorHandle;
use crate::device::DeviceShared;
use crate::error::Result;
use crate::state::{ResourceId, TrackingInfo};
use crate::types::{
    ResourceState, TextureDescriptor, TextureFormat, TextureUsage, TextureViewDescriptor,
    ViewKind,
};

/// A GPU texture.
///
/// Textures are created by [`RenderDevice::create_texture`](crate::RenderDevice::create_texture)
/// or realized by the render graph from a [`TextureDescriptor`]. Every
/// texture is registered in the device's global state table in the common
/// state and unregistered when dropped.
///
/// Views are owned by the texture and created on first request:
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(TextureDescriptor::new_2d(
///     1920,
///     1080,
///     TextureFormat::Rgba16Float,
///     TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
/// ))?;
/// let rtv = texture.view(&TextureViewDescriptor::render_target())?;
/// ctx.clear_render_target(texture.view_handle(rtv), [0.0; 4]);
/// ```
pub struct Texture {
    shared: Arc<DeviceShared>,
    id: ResourceId,
    raw: NativeHandle,
    descriptor: TextureDescriptor,
    views: Mutex<ViewCache<TextureViewDescriptor>>,
}

impl Texture {
    pub(crate) fn new(shared: Arc<DeviceShared>, descriptor: TextureDescriptor) -> Result<Self> {
        assert!(
            descriptor.size.width > 0 && descriptor.size.height > 0,
            "texture {:?} has a zero-sized extent",
            descriptor.label
        );
        let raw = shared.backend.create_texture(&descriptor)?;
        let id = shared.next_resource_id();
        let texture = Self {
            shared,
            id,
            raw,
            descriptor,
            views: Mutex::new(ViewCache::new()),
        };
        texture
            .shared
            .states
            .register(texture.tracking_info(), ResourceState::COMMON);
        Ok(texture)
    }

    /// Tracking identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Native resource handle.
    pub fn raw(&self) -> NativeHandle {
        self.raw
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    /// Get the debug label.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Number of independently tracked subresources.
    pub fn subresource_count(&self) -> u32 {
        self.descriptor.subresource_count()
    }

    /// Tracking record for state transitions.
    pub fn tracking_info(&self) -> TrackingInfo {
        TrackingInfo::texture(
            self.id,
            self.descriptor.subresource_count(),
            self.descriptor.is_simultaneous_access(),
        )
    }

    /// Index of the view described by `desc`, creating it on first request.
    ///
    /// Panics if the texture's usage does not permit the view kind or the
    /// range lies outside the texture.
    pub fn view(&self, desc: &TextureViewDescriptor) -> Result<ViewIndex> {
        self.validate_view(desc);
        self.views.lock().get_or_create(*desc, || {
            let allocation = self.shared.cpu_heap(view_heap_type(desc.kind)).allocate(1)?;
            self.shared
                .backend
                .write_texture_view(self.raw, desc, allocation.cpu_handle(0));
            log::trace!("Created {:?} view of texture {:?}", desc.kind, self.id);
            Ok(allocation)
        })
    }

    /// CPU descriptor handle of a view returned by [`view`](Self::view).
    pub fn view_handle(&self, index: ViewIndex) -> CpuDescriptorHandle {
        self.views.lock().handle(index)
    }

    /// Number of views created so far.
    pub fn view_count(&self) -> usize {
        self.views.lock().len()
    }

    pub(crate) fn validate_view(&self, desc: &TextureViewDescriptor) {
        let usage = self.descriptor.usage;
        let depth = self.descriptor.format.is_depth_stencil();
        let allowed = match desc.kind {
            ViewKind::ShaderResource => usage.contains(TextureUsage::TEXTURE_BINDING),
            ViewKind::UnorderedAccess => usage.contains(TextureUsage::STORAGE_BINDING),
            ViewKind::RenderTarget => usage.contains(TextureUsage::RENDER_ATTACHMENT) && !depth,
            ViewKind::DepthStencil => usage.contains(TextureUsage::RENDER_ATTACHMENT) && depth,
            ViewKind::ConstantBuffer => false,
        };
        assert!(
            allowed,
            "{:?} view is not permitted on texture {:?} ({:?}, {:?})",
            desc.kind, self.descriptor.label, self.descriptor.format, usage
        );

        let mips = self.descriptor.mip_level_count.max(1);
        let mip_count = desc
            .mip_level_count
            .unwrap_or(mips - desc.base_mip_level.min(mips));
        let mip_end = desc.base_mip_level + mip_count;
        assert!(
            desc.base_mip_level < mips && mip_end <= mips,
            "mip range {}..{} outside texture with {} mips",
            desc.base_mip_level,
            mip_end,
            mips
        );
        let layers = self.descriptor.array_layer_count();
        let layer_end = desc.base_array_layer
            + desc
                .array_layer_count
                .unwrap_or(layers - desc.base_array_layer.min(layers));
        assert!(
            desc.base_array_layer < layers && layer_end <= layers,
            "array layer range {}..{} outside texture with {} layers",
            desc.base_array_layer,
            layer_end,
            layers
        );
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        *self.views.get_mut() = ViewCache::new();
        self.shared.backend.destroy_resource(self.raw);
        self.shared.states.unregister(self.id);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("label", &self.descriptor.label)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
