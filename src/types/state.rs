//! GPU access states tracked per subresource.

use bitflags::bitflags;

bitflags! {
    /// Granular GPU access state of a (sub)resource.
    ///
    /// The empty set is [`ResourceState::COMMON`], the state every resource
    /// starts in and the one buffers and simultaneous-access textures decay to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        /// Read as vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        /// Read as index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// Written as color render target.
        const RENDER_TARGET = 1 << 2;
        /// Read/written through an unordered access view.
        const UNORDERED_ACCESS = 1 << 3;
        /// Written as depth/stencil attachment.
        const DEPTH_WRITE = 1 << 4;
        /// Read-only depth/stencil (depth test without writes).
        const DEPTH_READ = 1 << 5;
        /// Read by any shader stage other than pixel.
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        /// Read by the pixel shader.
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        /// Read as indirect draw/dispatch arguments.
        const INDIRECT_ARGUMENT = 1 << 8;
        /// Destination of a copy.
        const COPY_DEST = 1 << 9;
        /// Source of a copy.
        const COPY_SOURCE = 1 << 10;
        /// Destination of a multisample resolve.
        const RESOLVE_DEST = 1 << 11;
        /// Source of a multisample resolve.
        const RESOLVE_SOURCE = 1 << 12;
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::COMMON
    }
}

impl ResourceState {
    /// Common state: no specific access, usable across queues.
    pub const COMMON: Self = Self::empty();
    /// Presentable state (identical to common).
    pub const PRESENT: Self = Self::empty();
    /// Readable by every shader stage.
    pub const ALL_SHADER_RESOURCE: Self = Self::from_bits_truncate(
        Self::NON_PIXEL_SHADER_RESOURCE.bits() | Self::PIXEL_SHADER_RESOURCE.bits(),
    );

    /// States that only read the resource and may be combined with each other.
    pub const READ_ONLY_MASK: Self = Self::from_bits_truncate(
        Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::DEPTH_READ.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits()
            | Self::RESOLVE_SOURCE.bits(),
    );

    /// States that write the resource.
    pub const WRITE_MASK: Self = Self::from_bits_truncate(
        Self::RENDER_TARGET.bits()
            | Self::UNORDERED_ACCESS.bits()
            | Self::DEPTH_WRITE.bits()
            | Self::COPY_DEST.bits()
            | Self::RESOLVE_DEST.bits(),
    );

    /// Check if this is the common state.
    #[inline]
    pub fn is_common(self) -> bool {
        self.is_empty()
    }

    /// Check if this state only reads the resource.
    #[inline]
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && Self::READ_ONLY_MASK.contains(self)
    }

    /// Check if this state writes the resource.
    #[inline]
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_MASK)
    }

    /// Check whether a resource currently in `self` can be used as `requested`
    /// without a barrier.
    ///
    /// Identical states never need one; a read-only state already containing
    /// every requested read bit doesn't either.
    #[inline]
    pub fn satisfies(self, requested: Self) -> bool {
        self == requested
            || (self.is_read_only() && requested.is_read_only() && self.contains(requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_is_empty() {
        assert!(ResourceState::COMMON.is_common());
        assert_eq!(ResourceState::PRESENT, ResourceState::COMMON);
        assert!(!ResourceState::COMMON.is_read_only());
        assert!(!ResourceState::COMMON.is_write());
    }

    #[test]
    fn test_read_write_classification() {
        assert!(ResourceState::PIXEL_SHADER_RESOURCE.is_read_only());
        assert!(ResourceState::ALL_SHADER_RESOURCE.is_read_only());
        assert!(ResourceState::RENDER_TARGET.is_write());
        assert!(!ResourceState::RENDER_TARGET.is_read_only());
        let mixed = ResourceState::UNORDERED_ACCESS | ResourceState::PIXEL_SHADER_RESOURCE;
        assert!(!mixed.is_read_only());
    }

    #[test]
    fn test_satisfies() {
        let all = ResourceState::ALL_SHADER_RESOURCE;
        assert!(all.satisfies(ResourceState::PIXEL_SHADER_RESOURCE));
        assert!(!ResourceState::PIXEL_SHADER_RESOURCE.satisfies(all));
        assert!(ResourceState::RENDER_TARGET.satisfies(ResourceState::RENDER_TARGET));
        assert!(!ResourceState::RENDER_TARGET.satisfies(ResourceState::PIXEL_SHADER_RESOURCE));
        assert!(!ResourceState::UNORDERED_ACCESS
            .satisfies(ResourceState::UNORDERED_ACCESS | ResourceState::RENDER_TARGET));
    }
}
