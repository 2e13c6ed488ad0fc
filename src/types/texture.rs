//! Texture types and descriptors.

use super::{ClearValue, Extent3d, ResourceState};
use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10A2Unorm,
    /// 11/11/10-bit RGB, float.
    Rg11B10Float,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit depth, float.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth32Float | Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }

    /// Number of planes; depth-stencil formats store stencil in a second plane.
    pub fn plane_count(&self) -> u32 {
        if self.has_stencil() {
            2
        } else {
            1
        }
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Rgb10A2Unorm
            | Self::Rg11B10Float
            | Self::Depth32Float
            | Self::Depth24PlusStencil8 => 4,
            Self::Rgba16Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// One-dimensional texture.
    D1,
    /// Two-dimensional texture (or 2D array).
    #[default]
    D2,
    /// Three-dimensional volume texture.
    D3,
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be written through an unordered access view.
        const STORAGE_BINDING = 1 << 3;
        /// Texture can be used as a render target or depth attachment.
        const RENDER_ATTACHMENT = 1 << 4;
        /// Texture may be accessed from several queues at once and
        /// implicitly promotes from/decays to the common state.
        const SIMULTANEOUS_ACCESS = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a texture.
///
/// Compared by value against the cached descriptor of a graph slot; any field
/// change forces the backing texture to be recreated.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
    /// Optimized clear value.
    pub clear_value: ClearValue,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
            clear_value: ClearValue::None,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the array layer count (2D textures only).
    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.size.depth_or_array_layers = layers;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Set the optimized clear value.
    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = clear_value;
        self
    }

    /// Number of array layers (1 for 3D textures).
    pub fn array_layer_count(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.size.depth_or_array_layers.max(1),
        }
    }

    /// Total number of independently tracked subresources.
    pub fn subresource_count(&self) -> u32 {
        self.mip_level_count.max(1) * self.array_layer_count() * self.format.plane_count()
    }

    /// Flat subresource index, D3D12 style: mips vary fastest, then layers, then planes.
    pub fn subresource_index(&self, mip: u32, layer: u32, plane: u32) -> u32 {
        let mips = self.mip_level_count.max(1);
        mip + layer * mips + plane * mips * self.array_layer_count()
    }

    /// Whether implicit promotion/decay applies to this texture.
    pub fn is_simultaneous_access(&self) -> bool {
        self.usage.contains(TextureUsage::SIMULTANEOUS_ACCESS)
    }

    /// State a pass reading this texture requires.
    ///
    /// Shader-readable, plus non-pixel-readable when the texture allows random
    /// writes (it may be consumed by compute).
    pub fn read_state(&self) -> ResourceState {
        let mut state = ResourceState::PIXEL_SHADER_RESOURCE;
        if self.usage.contains(TextureUsage::STORAGE_BINDING) {
            state |= ResourceState::NON_PIXEL_SHADER_RESOURCE;
        }
        state
    }

    /// State a pass writing this texture requires.
    pub fn write_state(&self) -> ResourceState {
        let mut state = ResourceState::COMMON;
        if self.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            if self.format.is_depth_stencil() {
                state |= ResourceState::DEPTH_WRITE;
            } else {
                state |= ResourceState::RENDER_TARGET;
            }
        }
        if self.usage.contains(TextureUsage::STORAGE_BINDING) {
            state |= ResourceState::UNORDERED_ACCESS;
        }
        if state.is_common() {
            state = ResourceState::COPY_DEST;
        }
        state
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, TextureFormat::default(), TextureUsage::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subresource_count() {
        let desc = TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        )
        .with_mip_levels(4)
        .with_array_layers(6);
        assert_eq!(desc.subresource_count(), 24);
        assert_eq!(desc.subresource_index(1, 2, 0), 9);

        let depth = TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Depth24PlusStencil8,
            TextureUsage::RENDER_ATTACHMENT,
        );
        assert_eq!(depth.subresource_count(), 2);
    }

    #[test]
    fn test_required_states() {
        let color = TextureDescriptor::new_2d(
            512,
            512,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        );
        assert_eq!(color.read_state(), ResourceState::PIXEL_SHADER_RESOURCE);
        assert_eq!(color.write_state(), ResourceState::RENDER_TARGET);

        let depth = TextureDescriptor::new_2d(
            512,
            512,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT,
        );
        assert_eq!(depth.write_state(), ResourceState::DEPTH_WRITE);

        let storage = TextureDescriptor::new_2d(
            512,
            512,
            TextureFormat::Rgba16Float,
            TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING,
        );
        assert_eq!(storage.read_state(), ResourceState::ALL_SHADER_RESOURCE);
        assert_eq!(storage.write_state(), ResourceState::UNORDERED_ACCESS);
    }

    #[test]
    fn test_clear_value_participates_in_equality() {
        let a = TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        );
        let b = a.clone().with_clear_value(ClearValue::color(0.0, 0.0, 0.0, 1.0));
        assert_ne!(a, b);
    }
}
