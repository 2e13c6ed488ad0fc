//! Render Graph System
//!
//! Passes declare the resources they read and write; the graph batches them
//! into dependency levels, realizes declared resources through the
//! [`RenderGraphRegistry`] and records the barriers each level needs.

mod graph;
mod pass;
mod registry;
mod resource;

pub use graph::{DependencyLevel, RenderGraph};
pub use pass::{Access, PassBuilder, PassCallback, PassHandle, RenderPass};
pub use registry::RenderGraphRegistry;
pub use resource::{
    GraphResource, ResourceDescriptor, ResourceHandle, ResourceObject, ResourceType,
    VirtualResource,
};
