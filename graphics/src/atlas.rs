use crate::{
    AIndexMap, CanvasFactory, GpuRenderer, GraphicsError, TextureCanvas,
    TextureGroup, TextureLayout,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

mod collection;
mod manager;

pub use collection::AtlasCollection;
pub use manager::{
    AtlasDebugInfo, AtlasInfo, AtlasManager, InvalidateOptions, RenderType,
};

/// Axis aligned box an element is rasterized from, in element space.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub const fn new(x1: f32, y1: f32, w: f32, h: f32) -> Self {
        Self { x1, y1, w, h }
    }
}

/// Pixel region inside an atlas texture.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct Location {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A texture entry is a pair of locations. The second location is all zero
/// for entries that fit inside one row; for wrapped entries the first
/// location is the tail of one row and the second the head of the next.
pub type TextureOffsets = [Location; 2];

static NEXT_ATLAS_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of an [`Atlas`] for the lifetime of the process. Batches hold
/// these instead of references so collections keep sole ownership.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub(crate) u64);

impl AtlasId {
    fn next() -> Self {
        Self(NEXT_ATLAS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One fixed size square texture partitioned into equal height rows, paired
/// with the CPU canvas its entries are rasterized into. Placement is a
/// single cursor with row wrap; entries are written once and only removed by
/// collection level garbage collection.
pub struct Atlas {
    id: AtlasId,
    /// Square texture edge in pixels.
    tex_size: u32,
    /// Number of equal height rows.
    tex_rows: u32,
    row_height: u32,
    cursor_x: u32,
    cursor_row: u32,
    /// Once locked no further placement is accepted.
    locked: bool,
    /// The CPU canvas has texels the GPU texture has not seen yet.
    dirty: bool,
    entries: AIndexMap<String, TextureOffsets>,
    canvas: Option<TextureCanvas>,
    texture: Option<TextureGroup>,
}

impl Atlas {
    pub fn new(tex_size: u32, tex_rows: u32, factory: &CanvasFactory) -> Self {
        let tex_rows = tex_rows.max(1);

        Self {
            id: AtlasId::next(),
            tex_size,
            tex_rows,
            row_height: tex_size / tex_rows,
            cursor_x: 0,
            cursor_row: 0,
            locked: false,
            dirty: false,
            entries: AIndexMap::default(),
            canvas: Some(factory(tex_size, tex_size)),
            texture: None,
        }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn tex_size(&self) -> u32 {
        self.tex_size
    }

    pub fn row_height(&self) -> u32 {
        self.row_height
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Scale that fits `bb` into a row: fit the height first, refit to the
    /// texture width only when the height fit would overflow it.
    pub fn scale_for(&self, bb: BoundingBox) -> f32 {
        let scale = self.row_height as f32 / bb.h;

        if bb.w * scale > self.tex_size as f32 {
            self.tex_size as f32 / bb.w
        } else {
            scale
        }
    }

    fn scaled_size(&self, bb: BoundingBox) -> (u32, u32) {
        let scale = self.scale_for(bb);
        let tex_w = ((bb.w * scale).round() as u32).clamp(1, self.tex_size);
        let tex_h = ((bb.h * scale).round() as u32).clamp(1, self.row_height);

        (tex_w, tex_h)
    }

    /// Whether an entry rasterized from `bb` could still be placed.
    pub fn can_fit(&self, bb: BoundingBox) -> bool {
        if self.locked || self.cursor_row >= self.tex_rows {
            return false;
        }

        let (tex_w, _) = self.scaled_size(bb);

        if self.cursor_x + tex_w <= self.tex_size {
            true
        } else {
            // Placement would wrap into the next row.
            self.cursor_row < self.tex_rows - 1
        }
    }

    /// Rasterizes a new entry through `paint` and records where it landed.
    /// The callback runs exactly once, inside a saved canvas state set up so
    /// it draws in `bb` coordinates. Wrapped placements paint into `scratch`
    /// first and split the result over two rows.
    ///
    /// The caller keeps keys unique; collections check membership before
    /// delegating here.
    pub fn draw<F>(
        &mut self,
        key: &str,
        bb: BoundingBox,
        scratch: &mut TextureCanvas,
        paint: F,
    ) -> Result<TextureOffsets, GraphicsError>
    where
        F: FnOnce(&mut TextureCanvas, BoundingBox),
    {
        if self.locked {
            return Err(GraphicsError::AtlasLocked);
        }

        if self.cursor_row >= self.tex_rows {
            return Err(GraphicsError::NotEnoughRoom);
        }

        debug_assert!(!self.entries.contains_key(key));

        let scale = self.scale_for(bb);
        let (tex_w, tex_h) = self.scaled_size(bb);

        let offsets = if self.cursor_x + tex_w <= self.tex_size {
            self.place_at_cursor(bb, scale, tex_w, tex_h, paint)
        } else if self.cursor_row >= self.tex_rows - 1 {
            return Err(GraphicsError::NotEnoughRoom);
        } else if self.cursor_x == self.tex_size {
            self.cursor_x = 0;
            self.cursor_row += 1;
            self.place_at_cursor(bb, scale, tex_w, tex_h, paint)
        } else {
            self.place_wrapped(bb, scale, tex_w, tex_h, scratch, paint)
        };

        self.entries.insert(key.to_owned(), offsets);
        self.dirty = true;
        Ok(offsets)
    }

    fn place_at_cursor<F>(
        &mut self,
        bb: BoundingBox,
        scale: f32,
        tex_w: u32,
        tex_h: u32,
        paint: F,
    ) -> TextureOffsets
    where
        F: FnOnce(&mut TextureCanvas, BoundingBox),
    {
        let x = self.cursor_x;
        let y = self.cursor_row * self.row_height;

        if let Some(canvas) = self.canvas.as_mut() {
            canvas.save();
            canvas.translate(x as f32, y as f32);
            canvas.scale(scale, scale);
            canvas.translate(-bb.x1, -bb.y1);
            paint(canvas, bb);
            canvas.restore();
        }

        self.cursor_x += tex_w;

        if self.cursor_x == self.tex_size {
            self.cursor_x = 0;
            self.cursor_row += 1;
        }

        [
            Location {
                x,
                y,
                w: tex_w,
                h: tex_h,
            },
            Location::default(),
        ]
    }

    fn place_wrapped<F>(
        &mut self,
        bb: BoundingBox,
        scale: f32,
        tex_w: u32,
        tex_h: u32,
        scratch: &mut TextureCanvas,
        paint: F,
    ) -> TextureOffsets
    where
        F: FnOnce(&mut TextureCanvas, BoundingBox),
    {
        let first_w = self.tex_size - self.cursor_x;
        let second_w = tex_w - first_w;
        let y = self.cursor_row * self.row_height;

        // Paint once at the scratch origin, then split the result over the
        // tail of this row and the head of the next.
        scratch.clear();
        scratch.save();
        scratch.scale(scale, scale);
        scratch.translate(-bb.x1, -bb.y1);
        paint(scratch, bb);
        scratch.restore();

        if let Some(canvas) = self.canvas.as_mut() {
            canvas.draw_image(
                scratch,
                0.0,
                0.0,
                first_w as f32,
                tex_h as f32,
                self.cursor_x as f32,
                y as f32,
                first_w as f32,
                tex_h as f32,
            );
            canvas.draw_image(
                scratch,
                first_w as f32,
                0.0,
                second_w as f32,
                tex_h as f32,
                0.0,
                (y + self.row_height) as f32,
                second_w as f32,
                tex_h as f32,
            );
        }

        let offsets = [
            Location {
                x: self.cursor_x,
                y,
                w: first_w,
                h: tex_h,
            },
            Location {
                x: 0,
                y: y + self.row_height,
                w: second_w,
                h: tex_h,
            },
        ];

        self.cursor_x = second_w;
        self.cursor_row += 1;
        offsets
    }

    pub fn offsets(&self, key: &str) -> Option<TextureOffsets> {
        self.entries.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn entries(
        &self,
    ) -> impl Iterator<Item = (&str, &TextureOffsets)> {
        self.entries.iter().map(|(key, locs)| (key.as_str(), locs))
    }

    pub fn canvas(&self) -> Option<&TextureCanvas> {
        self.canvas.as_ref()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Lazily creates the GPU texture and uploads the CPU canvas when it has
    /// uncommitted texels. The canvas stays resident until [`Self::dispose`]
    /// so collection GC can repack from it.
    pub fn buffer_if_needed(&mut self, renderer: &GpuRenderer) {
        if self.texture.is_none() {
            let layout = renderer
                .get_layout(TextureLayout)
                .expect("TextureLayout was never created.");

            self.texture = Some(TextureGroup::new(
                renderer,
                self.tex_size,
                self.tex_size,
                &layout,
            ));
        }

        if !self.dirty {
            return;
        }

        if let (Some(texture), Some(canvas)) =
            (self.texture.as_ref(), self.canvas.as_ref())
        {
            texture.upload(
                renderer,
                canvas.as_bytes(),
                self.tex_size,
                self.tex_size,
            );
            self.dirty = false;
        }
    }

    /// Bind group of the GPU texture, present after the first
    /// [`Self::buffer_if_needed`].
    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.texture.as_ref().map(|group| &group.bind_group)
    }

    /// Releases the GPU texture and CPU canvas. The atlas accepts nothing
    /// afterwards.
    pub fn dispose(&mut self) {
        debug!(
            "disposing atlas {:?} with {} entries",
            self.id,
            self.entries.len()
        );
        self.texture = None;
        self.canvas = None;
        self.locked = true;
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> (u32, u32) {
        (self.cursor_x, self.cursor_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use std::sync::Arc;

    fn factory() -> CanvasFactory {
        Arc::new(|w, h| TextureCanvas::new(w, h))
    }

    fn bb(w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x1: 0.0,
            y1: 0.0,
            w,
            h,
        }
    }

    fn scratch_for(atlas: &Atlas) -> TextureCanvas {
        TextureCanvas::new(atlas.tex_size(), atlas.row_height())
    }

    #[test]
    fn places_then_wraps_across_rows() {
        let factory = factory();
        let mut atlas = Atlas::new(100, 2, &factory);
        let mut scratch = scratch_for(&atlas);

        let a = atlas
            .draw("a", bb(80.0, 50.0), &mut scratch, |ctx, bb| {
                ctx.fill_rect(bb.x1, bb.y1, bb.w, bb.h, Color::rgb(255, 0, 0));
            })
            .unwrap();

        assert_eq!(
            a[0],
            Location {
                x: 0,
                y: 0,
                w: 80,
                h: 50
            }
        );
        assert_eq!(a[1].w, 0);
        assert_eq!(atlas.cursor(), (80, 0));

        let b = atlas
            .draw("b", bb(40.0, 50.0), &mut scratch, |ctx, bb| {
                ctx.fill_rect(bb.x1, bb.y1, bb.w, bb.h, Color::rgb(0, 255, 0));
            })
            .unwrap();

        assert_eq!(
            b[0],
            Location {
                x: 80,
                y: 0,
                w: 20,
                h: 50
            }
        );
        assert_eq!(
            b[1],
            Location {
                x: 0,
                y: 50,
                w: 20,
                h: 50
            }
        );
        assert_eq!(atlas.cursor(), (20, 1));
        assert!(atlas.is_dirty());

        // Both halves carry the painted texels.
        let canvas = atlas.canvas().unwrap();
        assert_eq!(canvas.region_bytes(80, 0, 1, 1), vec![0, 255, 0, 255]);
        assert_eq!(canvas.region_bytes(0, 50, 1, 1), vec![0, 255, 0, 255]);
    }

    #[test]
    fn refuses_wrap_on_the_last_row() {
        let factory = factory();
        let mut atlas = Atlas::new(100, 2, &factory);
        let mut scratch = scratch_for(&atlas);

        atlas
            .draw("a", bb(80.0, 50.0), &mut scratch, |_, _| {})
            .unwrap();
        atlas
            .draw("b", bb(40.0, 50.0), &mut scratch, |_, _| {})
            .unwrap();

        // Cursor sits at (20, 1); a full width entry would need another row.
        assert!(!atlas.can_fit(bb(100.0, 50.0)));
        assert!(matches!(
            atlas.draw("c", bb(100.0, 50.0), &mut scratch, |_, _| {}),
            Err(GraphicsError::NotEnoughRoom)
        ));
    }

    #[test]
    fn exact_row_fill_advances_the_cursor() {
        let factory = factory();
        let mut atlas = Atlas::new(100, 4, &factory);
        let mut scratch = scratch_for(&atlas);

        atlas
            .draw("a", bb(100.0, 25.0), &mut scratch, |_, _| {})
            .unwrap();

        assert_eq!(atlas.cursor(), (0, 1));
    }

    #[test]
    fn locked_atlas_rejects_draws() {
        let factory = factory();
        let mut atlas = Atlas::new(100, 2, &factory);
        let mut scratch = scratch_for(&atlas);

        atlas.lock();

        assert!(!atlas.can_fit(bb(10.0, 10.0)));
        assert!(matches!(
            atlas.draw("a", bb(10.0, 10.0), &mut scratch, |_, _| {}),
            Err(GraphicsError::AtlasLocked)
        ));
    }

    #[test]
    fn scale_fits_height_then_refits_width() {
        let factory = factory();
        let atlas = Atlas::new(100, 2, &factory);

        // Height fit alone.
        assert_eq!(atlas.scale_for(bb(10.0, 25.0)), 2.0);
        // Height fit would overflow the width, so the width wins.
        assert_eq!(atlas.scale_for(bb(400.0, 50.0)), 0.25);

        let (w, h) = atlas.scaled_size(bb(400.0, 50.0));
        assert_eq!((w, h), (100, 13));
        assert!(w <= atlas.tex_size() && h <= atlas.row_height());
    }

    #[test]
    fn entries_never_overlap_and_stay_in_bounds() {
        let factory = factory();
        let mut atlas = Atlas::new(64, 4, &factory);
        let mut scratch = scratch_for(&atlas);
        let sizes = [
            (40.0, 16.0),
            (30.0, 16.0),
            (20.0, 16.0),
            (50.0, 16.0),
            (64.0, 16.0),
        ];

        let mut placed = Vec::new();

        for (i, (w, h)) in sizes.iter().enumerate() {
            let key = format!("k{i}");

            if !atlas.can_fit(bb(*w, *h)) {
                break;
            }

            let locs = atlas
                .draw(&key, bb(*w, *h), &mut scratch, |_, _| {})
                .unwrap();

            for loc in locs.iter().filter(|loc| loc.w > 0) {
                assert!(loc.x + loc.w <= 64, "x overflow: {loc:?}");
                assert!(loc.y + loc.h <= 64, "y overflow: {loc:?}");
                placed.push(*loc);
            }
        }

        for (i, a) in placed.iter().enumerate() {
            for b in placed.iter().skip(i + 1) {
                let overlap_x = a.x < b.x + b.w && b.x < a.x + a.w;
                let overlap_y = a.y < b.y + b.h && b.y < a.y + a.h;
                assert!(
                    !(overlap_x && overlap_y),
                    "{a:?} overlaps {b:?}"
                );
            }
        }
    }
}
