//! Buffer types and descriptors.

use super::ResourceState;
use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a constant buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be read/written through an unordered access view.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect argument buffer.
        const INDIRECT = 1 << 4;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 5;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// State a pass reading this buffer requires.
    pub fn read_state(&self) -> ResourceState {
        let mut state = ResourceState::PIXEL_SHADER_RESOURCE;
        if self.usage.contains(BufferUsage::STORAGE) {
            state |= ResourceState::NON_PIXEL_SHADER_RESOURCE;
        }
        state
    }

    /// State a pass writing this buffer requires; copy-destination when the
    /// buffer allows no random writes.
    pub fn write_state(&self) -> ResourceState {
        if self.usage.contains(BufferUsage::STORAGE) {
            ResourceState::UNORDERED_ACCESS
        } else {
            ResourceState::COPY_DEST
        }
    }
}
