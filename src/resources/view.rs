//! Persistent shader-visible descriptor views.

use std::sync::Arc;

use super::{Buffer, Texture};
use crate::descriptor::{CpuDescriptorHandle, DescriptorHeapAllocation, GpuDescriptorHandle};
use crate::types::ViewKind;

/// The resource a [`DescriptorView`] refers to.
#[derive(Debug, Clone)]
pub enum ViewTarget {
    Texture(Arc<Texture>),
    Buffer(Arc<Buffer>),
}

/// A view written into the static region of a shader-visible heap.
///
/// Unlike the CPU views cached on a texture, a descriptor view can be bound
/// directly. It keeps its target alive and frees its descriptor when dropped.
#[derive(Debug)]
pub struct DescriptorView {
    allocation: DescriptorHeapAllocation,
    kind: ViewKind,
    target: ViewTarget,
}

impl DescriptorView {
    pub(crate) fn new(
        allocation: DescriptorHeapAllocation,
        kind: ViewKind,
        target: ViewTarget,
    ) -> Self {
        Self {
            allocation,
            kind,
            target,
        }
    }

    /// View kind.
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// The viewed resource.
    pub fn target(&self) -> &ViewTarget {
        &self.target
    }

    pub fn cpu_handle(&self) -> CpuDescriptorHandle {
        self.allocation.cpu_handle(0)
    }

    pub fn gpu_handle(&self) -> GpuDescriptorHandle {
        self.allocation
            .gpu_handle(0)
            .unwrap_or(GpuDescriptorHandle(0))
    }

    /// The backing descriptor allocation.
    pub fn allocation(&self) -> &DescriptorHeapAllocation {
        &self.allocation
    }
}

static_assertions::assert_impl_all!(DescriptorView: Send, Sync);
