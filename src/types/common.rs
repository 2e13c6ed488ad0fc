//! Common types shared across the frame graph.

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels for 3D textures, array layer count otherwise.
    pub depth_or_array_layers: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: depth,
        }
    }
}

// ============================================================================
// ClearValue
// ============================================================================

/// Optimized clear value baked into a render target or depth buffer.
///
/// Part of the declaration: changing the clear value forces the backing
/// texture to be recreated, as on APIs that bake it at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ClearValue {
    /// No optimized clear value.
    #[default]
    None,
    /// Clear color attachment with RGBA values.
    Color { r: f32, g: f32, b: f32, a: f32 },
    /// Clear depth and stencil attachments.
    DepthStencil { depth: f32, stencil: u8 },
}

impl ClearValue {
    /// Create a color clear value.
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color { r, g, b, a }
    }

    /// Create a depth-stencil clear value.
    pub fn depth_stencil(depth: f32, stencil: u8) -> Self {
        Self::DepthStencil { depth, stencil }
    }
}

// ============================================================================
// QueueType
// ============================================================================

/// Hardware queue a recording context submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    /// Graphics queue (supports everything).
    #[default]
    Graphics,
    /// Asynchronous compute queue.
    Compute,
    /// Copy/transfer queue.
    Copy,
}

impl QueueType {
    /// Number of queue types.
    pub const COUNT: usize = 3;

    /// All queue types, in submission priority order.
    pub const ALL: [QueueType; Self::COUNT] =
        [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    /// Index of this queue type in per-queue arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Copy => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_2d_has_single_layer() {
        let extent = Extent3d::new_2d(512, 256);
        assert_eq!(extent.depth_or_array_layers, 1);
    }

    #[test]
    fn test_queue_indices_are_distinct() {
        let indices: Vec<usize> = QueueType::ALL.iter().map(|q| q.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
