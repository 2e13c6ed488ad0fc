//! Common types and descriptors for frame graph resources.
//!
//! This module contains format enums, usage flags, resource states and the
//! descriptor structs virtual resources are declared with.

mod buffer;
mod common;
mod state;
mod texture;
mod view;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{ClearValue, Extent3d, QueueType};
pub use state::ResourceState;
pub use texture::{TextureDescriptor, TextureDimension, TextureFormat, TextureUsage};
pub use view::{BufferViewDescriptor, TextureViewDescriptor, ViewKind};
