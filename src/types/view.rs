//! Resource view descriptors.

use super::TextureFormat;

/// Kind of descriptor a view is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Shader resource view (sampled / read-only).
    ShaderResource,
    /// Unordered access view (random read/write).
    UnorderedAccess,
    /// Render target view.
    RenderTarget,
    /// Depth-stencil view.
    DepthStencil,
    /// Constant buffer view (buffers only).
    ConstantBuffer,
}

/// Describes a texture view.
///
/// Used as the key of a texture's view cache, so equal descriptors always map
/// to the same view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    /// View kind.
    pub kind: ViewKind,
    /// Format override; `None` uses the texture's format.
    pub format: Option<TextureFormat>,
    /// First visible mip level.
    pub base_mip_level: u32,
    /// Number of visible mip levels; `None` for all remaining.
    pub mip_level_count: Option<u32>,
    /// First visible array layer.
    pub base_array_layer: u32,
    /// Number of visible array layers; `None` for all remaining.
    pub array_layer_count: Option<u32>,
}

impl TextureViewDescriptor {
    /// View covering the whole texture.
    pub fn new(kind: ViewKind) -> Self {
        Self {
            kind,
            format: None,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        }
    }

    /// Shader resource view of the whole texture.
    pub fn shader_resource() -> Self {
        Self::new(ViewKind::ShaderResource)
    }

    /// Render target view of the first mip.
    pub fn render_target() -> Self {
        Self::new(ViewKind::RenderTarget).with_mips(0, 1)
    }

    /// Depth-stencil view of the first mip.
    pub fn depth_stencil() -> Self {
        Self::new(ViewKind::DepthStencil).with_mips(0, 1)
    }

    /// Unordered access view of one mip.
    pub fn unordered_access(mip: u32) -> Self {
        Self::new(ViewKind::UnorderedAccess).with_mips(mip, 1)
    }

    /// Restrict the view to a mip range.
    pub fn with_mips(mut self, base: u32, count: u32) -> Self {
        self.base_mip_level = base;
        self.mip_level_count = Some(count);
        self
    }

    /// Restrict the view to an array layer range.
    pub fn with_layers(mut self, base: u32, count: u32) -> Self {
        self.base_array_layer = base;
        self.array_layer_count = Some(count);
        self
    }

    /// Override the view format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Describes a buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferViewDescriptor {
    /// View kind.
    pub kind: ViewKind,
    /// Byte offset of the first element.
    pub offset: u64,
    /// Size of the view in bytes; `None` for the rest of the buffer.
    pub size: Option<u64>,
    /// Element stride for structured views; 0 for raw/constant views.
    pub stride: u32,
}

impl BufferViewDescriptor {
    /// Constant buffer view of the whole buffer.
    pub fn constant() -> Self {
        Self {
            kind: ViewKind::ConstantBuffer,
            offset: 0,
            size: None,
            stride: 0,
        }
    }

    /// Structured shader resource view.
    pub fn structured(stride: u32) -> Self {
        Self {
            kind: ViewKind::ShaderResource,
            offset: 0,
            size: None,
            stride,
        }
    }

    /// Structured unordered access view.
    pub fn structured_uav(stride: u32) -> Self {
        Self {
            kind: ViewKind::UnorderedAccess,
            offset: 0,
            size: None,
            stride,
        }
    }
}
