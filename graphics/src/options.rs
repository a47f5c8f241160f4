use crate::{CanvasFactory, TextureCanvas, Vec4};
use std::{fmt, sync::Arc};

/// Renderer configuration. The defaults match what the renderer was tuned
/// against; `tex_size` is clamped to the device's texture limit when the
/// atlas manager is created.
#[derive(Clone)]
pub struct RendererOptions {
    /// Atlas texture edge in pixels.
    pub tex_size: u32,
    /// How many atlases one textured draw call may sample from.
    pub atlases_per_batch: usize,
    /// Instances per draw call.
    pub batch_size: usize,
    /// Normalized background color translucent arrowheads blend against.
    pub bg_color: Vec4,
    /// Allocator for atlas and scratch canvases.
    pub create_texture_canvas: CanvasFactory,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            tex_size: 4096,
            atlases_per_batch: 16,
            batch_size: 16_384,
            bg_color: Vec4::ONE,
            create_texture_canvas: Arc::new(TextureCanvas::new),
        }
    }
}

impl fmt::Debug for RendererOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererOptions")
            .field("tex_size", &self.tex_size)
            .field("atlases_per_batch", &self.atlases_per_batch)
            .field("batch_size", &self.batch_size)
            .field("bg_color", &self.bg_color)
            .finish_non_exhaustive()
    }
}
