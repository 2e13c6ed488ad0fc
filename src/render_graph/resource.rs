//! Resource handles and the objects behind them.

use std::fmt;
use std::sync::Arc;

use crate::resources::{Buffer, DescriptorView, PipelineState, RootSignature, Texture};
use crate::state::TrackingInfo;
use crate::types::{BufferDescriptor, ResourceState, TextureDescriptor};

/// Kind of object a [`ResourceHandle`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceType {
    #[default]
    Unknown,
    Buffer,
    Texture,
    View,
    RootSignature,
    PipelineState,
}

/// Opaque reference to a declared or imported graph resource.
///
/// Declared handles carry the graph's frame epoch as their version and become
/// stale once the graph is reset. Imported handles carry version 0 and stay
/// valid for as long as the import is kept.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    ty: ResourceType,
    imported: bool,
    version: u64,
    id: u32,
}

impl ResourceHandle {
    /// Id sentinel of the invalid handle.
    pub const INVALID_ID: u32 = u32::MAX;

    /// A handle that refers to nothing.
    pub const INVALID: Self = Self {
        ty: ResourceType::Unknown,
        imported: false,
        version: 0,
        id: Self::INVALID_ID,
    };

    pub(crate) fn declared(ty: ResourceType, id: u32, version: u64) -> Self {
        Self {
            ty,
            imported: false,
            version,
            id,
        }
    }

    pub(crate) fn imported(ty: ResourceType, id: u32) -> Self {
        Self {
            ty,
            imported: true,
            version: 0,
            id,
        }
    }

    pub fn ty(&self) -> ResourceType {
        self.ty
    }

    pub fn is_imported(&self) -> bool {
        self.imported
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the handle refers to anything at all.
    pub fn is_valid(&self) -> bool {
        self.ty != ResourceType::Unknown && self.id != Self::INVALID_ID
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "InvalidHandle");
        }
        if self.imported {
            write!(f, "{:?}(imported {})", self.ty, self.id)
        } else {
            write!(f, "{:?}({}.v{})", self.ty, self.id, self.version)
        }
    }
}

/// A concrete object stored in the registry.
#[derive(Debug, Clone)]
pub enum ResourceObject {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
    View(Arc<DescriptorView>),
    RootSignature(Arc<RootSignature>),
    PipelineState(Arc<PipelineState>),
}

impl ResourceObject {
    pub fn ty(&self) -> ResourceType {
        match self {
            ResourceObject::Buffer(_) => ResourceType::Buffer,
            ResourceObject::Texture(_) => ResourceType::Texture,
            ResourceObject::View(_) => ResourceType::View,
            ResourceObject::RootSignature(_) => ResourceType::RootSignature,
            ResourceObject::PipelineState(_) => ResourceType::PipelineState,
        }
    }

    /// Address of the shared allocation, identifying the object.
    pub(crate) fn address(&self) -> usize {
        match self {
            ResourceObject::Buffer(object) => Arc::as_ptr(object) as *const () as usize,
            ResourceObject::Texture(object) => Arc::as_ptr(object) as *const () as usize,
            ResourceObject::View(object) => Arc::as_ptr(object) as *const () as usize,
            ResourceObject::RootSignature(object) => Arc::as_ptr(object) as *const () as usize,
            ResourceObject::PipelineState(object) => Arc::as_ptr(object) as *const () as usize,
        }
    }

    /// Tracking record plus the states a read and a write require, for
    /// objects that take part in state tracking.
    pub(crate) fn access_states(&self) -> Option<(TrackingInfo, ResourceState, ResourceState)> {
        match self {
            ResourceObject::Buffer(buffer) => Some((
                buffer.tracking_info(),
                buffer.descriptor().read_state(),
                buffer.descriptor().write_state(),
            )),
            ResourceObject::Texture(texture) => Some((
                texture.tracking_info(),
                texture.descriptor().read_state(),
                texture.descriptor().write_state(),
            )),
            _ => None,
        }
    }
}

/// Objects that can be stored behind a [`ResourceHandle`].
pub trait GraphResource: Send + Sync + Sized + 'static {
    /// Handle type of this object.
    const TYPE: ResourceType;

    fn wrap(object: Arc<Self>) -> ResourceObject;

    fn unwrap(object: &ResourceObject) -> Option<&Arc<Self>>;
}

macro_rules! impl_graph_resource {
    ($ty:ident) => {
        impl GraphResource for $ty {
            const TYPE: ResourceType = ResourceType::$ty;

            fn wrap(object: Arc<Self>) -> ResourceObject {
                ResourceObject::$ty(object)
            }

            fn unwrap(object: &ResourceObject) -> Option<&Arc<Self>> {
                match object {
                    ResourceObject::$ty(object) => Some(object),
                    _ => None,
                }
            }
        }
    };
}

impl_graph_resource!(Buffer);
impl_graph_resource!(Texture);
impl_graph_resource!(RootSignature);
impl_graph_resource!(PipelineState);

impl GraphResource for DescriptorView {
    const TYPE: ResourceType = ResourceType::View;

    fn wrap(object: Arc<Self>) -> ResourceObject {
        ResourceObject::View(object)
    }

    fn unwrap(object: &ResourceObject) -> Option<&Arc<Self>> {
        match object {
            ResourceObject::View(object) => Some(object),
            _ => None,
        }
    }
}

/// Shape of a resource the graph realizes on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDescriptor {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor),
}

impl ResourceDescriptor {
    pub fn ty(&self) -> ResourceType {
        match self {
            ResourceDescriptor::Texture(_) => ResourceType::Texture,
            ResourceDescriptor::Buffer(_) => ResourceType::Buffer,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ResourceDescriptor::Texture(desc) => desc.label.as_deref(),
            ResourceDescriptor::Buffer(desc) => desc.label.as_deref(),
        }
    }
}

/// Resources the graph can create from a descriptor.
pub trait VirtualResource: GraphResource {
    type Descriptor;

    fn into_descriptor(descriptor: Self::Descriptor) -> ResourceDescriptor;
}

impl VirtualResource for Texture {
    type Descriptor = TextureDescriptor;

    fn into_descriptor(descriptor: TextureDescriptor) -> ResourceDescriptor {
        ResourceDescriptor::Texture(descriptor)
    }
}

impl VirtualResource for Buffer {
    type Descriptor = BufferDescriptor;

    fn into_descriptor(descriptor: BufferDescriptor) -> ResourceDescriptor {
        ResourceDescriptor::Buffer(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_validity() {
        assert!(!ResourceHandle::INVALID.is_valid());
        assert!(!ResourceHandle::default().is_valid());
        assert!(!ResourceHandle::declared(ResourceType::Unknown, 0, 1).is_valid());
        assert!(ResourceHandle::declared(ResourceType::Texture, 0, 1).is_valid());
    }

    #[test]
    fn test_handle_debug() {
        assert_eq!(
            format!("{:?}", ResourceHandle::declared(ResourceType::Texture, 3, 7)),
            "Texture(3.v7)"
        );
        assert_eq!(
            format!("{:?}", ResourceHandle::imported(ResourceType::Buffer, 1)),
            "Buffer(imported 1)"
        );
    }

    #[test]
    fn test_handles_compare_structurally() {
        let a = ResourceHandle::declared(ResourceType::Texture, 2, 1);
        assert_eq!(a, ResourceHandle::declared(ResourceType::Texture, 2, 1));
        assert_ne!(a, ResourceHandle::declared(ResourceType::Texture, 2, 2));
        assert_ne!(a, ResourceHandle::imported(ResourceType::Texture, 2));
    }
}
