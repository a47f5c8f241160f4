mod pipeline;
mod render;
mod vertex;

pub use pipeline::*;
pub use render::*;
pub use vertex::*;

use crate::{Color, Vec2};
use glam::Mat3;

/// How the scene routed an edge. Arrowheads only render on straight edges;
/// curved routing leaves the arrow flags zeroed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EdgeKind {
    #[default]
    Straight,
    Curved,
}

/// Arrowhead at one end of an edge. Position and angle come from the scene's
/// edge geometry; non finite values skip the arrow.
#[derive(Copy, Clone, Debug)]
pub struct ArrowStyle {
    pub position: Vec2,
    pub angle: f32,
    pub color: Color,
}

impl ArrowStyle {
    fn is_finite(&self) -> bool {
        self.position.is_finite() && self.angle.is_finite()
    }
}

/// Everything the batcher reads off one edge element.
#[derive(Clone, Debug)]
pub struct EdgeRenderData {
    pub source: Vec2,
    pub target: Vec2,
    pub line_width: f32,
    pub line_color: Color,
    pub opacity: f32,
    pub kind: EdgeKind,
    pub arrow_scale: f32,
    pub source_arrow: Option<ArrowStyle>,
    pub target_arrow: Option<ArrowStyle>,
}

impl Default for EdgeRenderData {
    fn default() -> Self {
        Self {
            source: Vec2::ZERO,
            target: Vec2::ZERO,
            line_width: 1.0,
            line_color: Color::rgb(0, 0, 0),
            opacity: 1.0,
            kind: EdgeKind::Straight,
            arrow_scale: 1.0,
            source_arrow: None,
            target_arrow: None,
        }
    }
}

/// Arrowhead size derived from the line width, with a floor so hairline
/// edges still get a visible head.
pub fn arrow_width(line_width: f32, arrow_scale: f32) -> f32 {
    (line_width * 2.0).max(3.0) * arrow_scale
}

/// Packs an element index into four normalized color channels, low byte in
/// the red channel. The picking pass echoes these back so hit testing can
/// read the index out of the framebuffer.
pub fn pack_element_index(index: u32) -> [u8; 4] {
    index.to_le_bytes()
}

fn arrow_transform(arrow: &ArrowStyle, size: f32) -> [[f32; 3]; 3] {
    (Mat3::from_translation(arrow.position)
        * Mat3::from_scale(Vec2::splat(size))
        * Mat3::from_angle(arrow.angle))
    .to_cols_array_2d()
}

impl EdgeRenderData {
    /// Folds the edge into one interleaved instance. Arrow fields stay
    /// zeroed unless the edge is straight and the arrow geometry is finite.
    pub(crate) fn to_vertex(&self, element_index: u32) -> EdgeVertex {
        let mut vertex = EdgeVertex {
            index: pack_element_index(element_index),
            source_target: [
                self.source.x,
                self.source.y,
                self.target.x,
                self.target.y,
            ],
            line_width: self.line_width,
            line_color: self.line_color.premultiplied(self.opacity),
            ..Default::default()
        };

        if self.kind == EdgeKind::Straight {
            let size = arrow_width(self.line_width, self.arrow_scale);

            if let Some(arrow) =
                self.source_arrow.filter(ArrowStyle::is_finite)
            {
                vertex.draw_arrows[0] = 1.0;
                vertex.source_arrow_color =
                    arrow.color.premultiplied(self.opacity);
                vertex.source_arrow_transform =
                    arrow_transform(&arrow, size);
            }

            if let Some(arrow) =
                self.target_arrow.filter(ArrowStyle::is_finite)
            {
                vertex.draw_arrows[1] = 1.0;
                vertex.target_arrow_color =
                    arrow.color.premultiplied(self.opacity);
                vertex.target_arrow_transform =
                    arrow_transform(&arrow, size);
            }
        }

        vertex
    }
}
