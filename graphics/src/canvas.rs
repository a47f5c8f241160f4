use crate::GraphicsError;
use glam::Vec2;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// RGBA color with 8 bit channels and straight (non premultiplied) alpha.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Returns the color as premultiplied RGBA, folding the color's own
    /// alpha and `opacity` into the final alpha channel.
    pub fn premultiplied(&self, opacity: f32) -> [f32; 4] {
        let a = (self.a as f32 / 255.0) * opacity;

        [
            self.r as f32 / 255.0 * a,
            self.g as f32 / 255.0 * a,
            self.b as f32 / 255.0 * a,
            a,
        ]
    }
}

/// Factory used to allocate the CPU canvases that atlases and scratch
/// surfaces draw into.
pub type CanvasFactory = Arc<dyn Fn(u32, u32) -> TextureCanvas + Send + Sync>;

/// Current 2D transform. Only translation and scaling compose, which keeps
/// the mapping a diagonal affine and every blit axis aligned.
#[derive(Clone, Copy, Debug)]
struct DrawState {
    offset: Vec2,
    scale: Vec2,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: Vec2::ONE,
        }
    }
}

/// CPU raster surface an [`crate::Atlas`] draws into before uploading to the
/// GPU. Supports a saved state stack of translate/scale transforms, rect
/// fills and nearest neighbor image blits. Blits are deterministic: equal
/// inputs produce byte equal output, and a 1:1 blit at integer offsets is an
/// exact copy.
pub struct TextureCanvas {
    pixels: RgbaImage,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl TextureCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width.max(1), height.max(1)),
            state: DrawState::default(),
            stack: Vec::new(),
        }
    }

    /// Decodes an encoded image (png, jpeg, ..) into a canvas.
    pub fn from_memory(data: &[u8]) -> Result<Self, GraphicsError> {
        Ok(Self {
            pixels: image::load_from_memory(data)?.into_rgba8(),
            state: DrawState::default(),
            stack: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Raw RGBA bytes, row major. This is the layout
    /// [`wgpu::Queue::write_texture`] expects for Rgba8 formats.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.state.offset += self.state.scale * Vec2::new(dx, dy);
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.state.scale *= Vec2::new(sx, sy);
    }

    /// Zeroes every texel. The transform stack is left alone.
    pub fn clear(&mut self) {
        for texel in self.pixels.pixels_mut() {
            *texel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Fills an axis aligned rect, mapped through the current transform and
    /// clipped to the surface.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }

        let origin = self.state.offset + self.state.scale * Vec2::new(x, y);
        let size = self.state.scale * Vec2::new(w, h);
        let src = Rgba([color.r, color.g, color.b, color.a]);
        let (x0, y0, x1, y1) = self.clipped_rect(origin, size);

        for yi in y0..y1 {
            for xi in x0..x1 {
                blend_texel(self.pixels.get_pixel_mut(xi, yi), src);
            }
        }
    }

    /// Blits the `(sx, sy, sw, sh)` region of `src` into the
    /// `(dx, dy, dw, dh)` rect of this canvas, with the destination mapped
    /// through the current transform. Nearest neighbor sampled and source
    /// over composited.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        src: &TextureCanvas,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
        dx: f32,
        dy: f32,
        dw: f32,
        dh: f32,
    ) {
        if sw <= 0.0 || sh <= 0.0 || dw <= 0.0 || dh <= 0.0 {
            return;
        }

        let origin = self.state.offset + self.state.scale * Vec2::new(dx, dy);
        let size = self.state.scale * Vec2::new(dw, dh);
        let (x0, y0, x1, y1) = self.clipped_rect(origin, size);

        let src_w = src.pixels.width() as i64;
        let src_h = src.pixels.height() as i64;
        let su_max = ((sx + sw).ceil() as i64 - 1).clamp(0, src_w - 1);
        let sv_max = ((sy + sh).ceil() as i64 - 1).clamp(0, src_h - 1);
        let su_min = (sx.floor() as i64).clamp(0, su_max);
        let sv_min = (sy.floor() as i64).clamp(0, sv_max);

        for yi in y0..y1 {
            let v = sy + sh * ((yi as f32 + 0.5) - origin.y) / size.y;
            let sv = (v.floor() as i64).clamp(sv_min, sv_max);

            for xi in x0..x1 {
                let u = sx + sw * ((xi as f32 + 0.5) - origin.x) / size.x;
                let su = (u.floor() as i64).clamp(su_min, su_max);
                let texel = *src.pixels.get_pixel(su as u32, sv as u32);

                blend_texel(self.pixels.get_pixel_mut(xi, yi), texel);
            }
        }
    }

    /// Copies out the raw RGBA bytes of a region, row major. Out of bounds
    /// areas are skipped.
    pub fn region_bytes(&self, x: u32, y: u32, w: u32, h: u32) -> Vec<u8> {
        let x1 = (x + w).min(self.pixels.width());
        let y1 = (y + h).min(self.pixels.height());
        let mut bytes =
            Vec::with_capacity((x1.saturating_sub(x) * y1.saturating_sub(y) * 4) as usize);

        for yi in y..y1 {
            for xi in x..x1 {
                bytes.extend_from_slice(&self.pixels.get_pixel(xi, yi).0);
            }
        }

        bytes
    }

    fn clipped_rect(&self, origin: Vec2, size: Vec2) -> (u32, u32, u32, u32) {
        let w = self.pixels.width() as i64;
        let h = self.pixels.height() as i64;
        let x0 = (origin.x.round() as i64).clamp(0, w);
        let y0 = (origin.y.round() as i64).clamp(0, h);
        let x1 = ((origin.x + size.x).round() as i64).clamp(x0, w);
        let y1 = ((origin.y + size.y).round() as i64).clamp(y0, h);

        (x0 as u32, y0 as u32, x1 as u32, y1 as u32)
    }
}

/// Source over compositing in straight alpha, with exact copy fast paths so
/// opaque or onto-transparent blits stay byte identical.
fn blend_texel(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src.0[3] as u32;

    if sa == 255 || dst.0[3] == 0 {
        *dst = src;
        return;
    }

    if sa == 0 {
        return;
    }

    let da = dst.0[3] as u32;
    let out_a = sa + da * (255 - sa) / 255;

    if out_a == 0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }

    for c in 0..3 {
        let sc = src.0[c] as u32;
        let dc = dst.0[c] as u32;
        dst.0[c] = ((sc * sa + dc * da * (255 - sa) / 255) / out_a) as u8;
    }

    dst.0[3] = out_a as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_respects_transform_stack() {
        let mut canvas = TextureCanvas::new(16, 16);

        canvas.save();
        canvas.translate(4.0, 4.0);
        canvas.scale(2.0, 2.0);
        canvas.fill_rect(0.0, 0.0, 2.0, 2.0, Color::rgb(255, 0, 0));
        canvas.restore();

        // (0,0)..(2,2) in local space lands on (4,4)..(8,8).
        assert_eq!(canvas.region_bytes(4, 4, 1, 1), vec![255, 0, 0, 255]);
        assert_eq!(canvas.region_bytes(7, 7, 1, 1), vec![255, 0, 0, 255]);
        assert_eq!(canvas.region_bytes(8, 8, 1, 1), vec![0, 0, 0, 0]);
        assert_eq!(canvas.region_bytes(3, 3, 1, 1), vec![0, 0, 0, 0]);
    }

    #[test]
    fn unscaled_blit_is_an_exact_copy() {
        let mut src = TextureCanvas::new(8, 8);
        src.fill_rect(0.0, 0.0, 8.0, 8.0, Color::rgba(10, 200, 30, 137));
        src.fill_rect(2.0, 2.0, 3.0, 3.0, Color::rgb(0, 0, 255));

        let mut dst = TextureCanvas::new(16, 16);
        dst.draw_image(&src, 0.0, 0.0, 8.0, 8.0, 5.0, 5.0, 8.0, 8.0);

        assert_eq!(dst.region_bytes(5, 5, 8, 8), src.region_bytes(0, 0, 8, 8));
    }

    #[test]
    fn blit_clips_to_the_surface() {
        let mut src = TextureCanvas::new(4, 4);
        src.fill_rect(0.0, 0.0, 4.0, 4.0, Color::rgb(9, 9, 9));

        let mut dst = TextureCanvas::new(8, 8);
        dst.draw_image(&src, 0.0, 0.0, 4.0, 4.0, 6.0, 6.0, 4.0, 4.0);

        assert_eq!(dst.region_bytes(6, 6, 1, 1), vec![9, 9, 9, 255]);
        assert_eq!(dst.region_bytes(7, 7, 1, 1), vec![9, 9, 9, 255]);
    }

    #[test]
    fn clear_zeroes_every_texel() {
        let mut canvas = TextureCanvas::new(4, 4);
        canvas.fill_rect(0.0, 0.0, 4.0, 4.0, Color::rgb(1, 2, 3));
        canvas.clear();

        assert_eq!(canvas.region_bytes(0, 0, 4, 4), vec![0u8; 64]);
    }

    #[test]
    fn decodes_encoded_images() {
        let mut canvas = TextureCanvas::new(3, 2);
        canvas.fill_rect(0.0, 0.0, 3.0, 2.0, Color::rgb(12, 34, 56));

        let mut encoded = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(canvas.pixels.clone())
            .write_to(&mut encoded, image::ImageOutputFormat::Png)
            .unwrap();

        let decoded = TextureCanvas::from_memory(encoded.get_ref()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert_eq!(decoded.region_bytes(0, 0, 3, 2), canvas.region_bytes(0, 0, 3, 2));
    }

    #[test]
    fn premultiply_folds_opacity() {
        let color = Color::rgba(255, 0, 0, 255);
        assert_eq!(color.premultiplied(0.5), [0.5, 0.0, 0.0, 0.5]);

        let translucent = Color::rgba(255, 255, 255, 127);
        let [r, _, _, a] = translucent.premultiplied(1.0);
        assert!((a - 127.0 / 255.0).abs() < 1e-6);
        assert!((r - a).abs() < 1e-6);
    }
}
