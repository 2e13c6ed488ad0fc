//! Resource management
//!
//! Concrete GPU objects behind render graph handles: textures, buffers,
//! shader-visible views, root signatures and pipeline states.

mod buffer;
mod pipeline;
mod texture;
mod view;
mod view_cache;

pub use buffer::*;
pub use pipeline::*;
pub use texture::*;
pub use view::*;
pub use view_cache::ViewIndex;

pub(crate) use view_cache::ViewCache;

use crate::descriptor::DescriptorHeapType;
use crate::types::ViewKind;

/// Heap a view of `kind` is written into.
pub(crate) fn view_heap_type(kind: ViewKind) -> DescriptorHeapType {
    match kind {
        ViewKind::ShaderResource | ViewKind::UnorderedAccess | ViewKind::ConstantBuffer => {
            DescriptorHeapType::CbvSrvUav
        }
        ViewKind::RenderTarget => DescriptorHeapType::Rtv,
        ViewKind::DepthStencil => DescriptorHeapType::Dsv,
    }
}
