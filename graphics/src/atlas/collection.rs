use crate::{
    AHashMap, AHashSet, Atlas, AtlasId, BoundingBox, CanvasFactory,
    GraphicsError, TextureCanvas, TextureOffsets,
};
use log::{debug, warn};

/// Ordered list of atlases for one render type. Placement is append only:
/// entries route to the newest atlas, which is locked the moment something
/// fails to fit and a fresh atlas is opened behind it. Space is reclaimed by
/// mark-and-sweep garbage collection that repacks surviving entries into as
/// few atlases as possible.
pub struct AtlasCollection {
    tex_size: u32,
    tex_rows: u32,
    atlases: Vec<Atlas>,
    key_to_atlas: AHashMap<String, usize>,
    marked_keys: AHashSet<String>,
    /// Memoised wrap surface, sized tex_size x row_height on first use.
    scratch: Option<TextureCanvas>,
    factory: CanvasFactory,
}

impl AtlasCollection {
    pub fn new(tex_size: u32, tex_rows: u32, factory: CanvasFactory) -> Self {
        Self {
            tex_size,
            tex_rows: tex_rows.max(1),
            atlases: Vec::new(),
            key_to_atlas: AHashMap::new(),
            marked_keys: AHashSet::new(),
            scratch: None,
            factory,
        }
    }

    pub fn row_height(&self) -> u32 {
        self.tex_size / self.tex_rows
    }

    pub fn atlas_count(&self) -> usize {
        self.atlases.len()
    }

    pub fn key_count(&self) -> usize {
        self.key_to_atlas.len()
    }

    pub fn marked_key_count(&self) -> usize {
        self.marked_keys.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.key_to_atlas.contains_key(key)
    }

    pub fn atlases(&self) -> impl Iterator<Item = &Atlas> {
        self.atlases.iter()
    }

    pub fn atlas(&self, id: AtlasId) -> Option<&Atlas> {
        self.atlases.iter().find(|atlas| atlas.id() == id)
    }

    pub(crate) fn atlas_mut(&mut self, id: AtlasId) -> Option<&mut Atlas> {
        self.atlases.iter_mut().find(|atlas| atlas.id() == id)
    }

    /// Atlas that owns `key`, if the key was ever drawn.
    pub fn atlas_for_key(&self, key: &str) -> Option<&Atlas> {
        self.key_to_atlas
            .get(key)
            .and_then(|&index| self.atlases.get(index))
    }

    pub fn offsets(&self, key: &str) -> Option<TextureOffsets> {
        self.atlas_for_key(key).and_then(|atlas| atlas.offsets(key))
    }

    /// Rasterizes `key` through `paint` into an atlas with room, opening a
    /// new atlas (and locking the previous one) when the current one cannot
    /// fit the entry. Present keys return their owning atlas without
    /// painting again.
    pub fn draw<F>(
        &mut self,
        key: &str,
        bb: BoundingBox,
        paint: F,
    ) -> Result<&Atlas, GraphicsError>
    where
        F: FnOnce(&mut TextureCanvas, BoundingBox),
    {
        if let Some(&index) = self.key_to_atlas.get(key) {
            return Ok(&self.atlases[index]);
        }

        let needs_new = match self.atlases.last() {
            Some(atlas) => !atlas.can_fit(bb),
            None => true,
        };

        if needs_new {
            if let Some(last) = self.atlases.last_mut() {
                last.lock();
            }

            self.atlases
                .push(Atlas::new(self.tex_size, self.tex_rows, &self.factory));
            debug!("atlas collection grew to {} atlases", self.atlases.len());
        }

        let row_height = self.row_height();
        let index = self.atlases.len() - 1;
        let scratch = {
            let factory = &self.factory;
            let tex_size = self.tex_size;

            self.scratch
                .get_or_insert_with(|| factory(tex_size, row_height))
        };

        self.atlases[index].draw(key, bb, scratch, paint)?;
        self.key_to_atlas.insert(key.to_owned(), index);
        Ok(&self.atlases[index])
    }

    /// Tombstones a key for the next [`Self::gc`]. No eager work happens;
    /// keys that were never drawn are dropped silently at sweep time.
    pub fn mark_key_for_gc(&mut self, key: &str) {
        self.marked_keys.insert(key.to_owned());
    }

    pub fn needs_gc(&self) -> bool {
        !self.marked_keys.is_empty()
    }

    /// Mark-and-sweep compaction. Atlases with no marked keys are retained
    /// untouched; every other atlas has its surviving entries re-drawn into
    /// the tail of the collection (wrapped entries are stitched back
    /// together first) and is then disposed. Costs O(total kept area).
    pub fn gc(&mut self) -> Result<(), GraphicsError> {
        if self.marked_keys.is_empty() {
            return Ok(());
        }

        let old_atlases = std::mem::take(&mut self.atlases);
        self.key_to_atlas.clear();

        let mut sources = Vec::new();
        let (mut kept, mut collected) = (0usize, 0usize);

        for atlas in old_atlases {
            let touched =
                atlas.keys().any(|key| self.marked_keys.contains(key));

            if touched {
                sources.push(atlas);
            } else {
                let index = self.atlases.len();

                for key in atlas.keys() {
                    self.key_to_atlas.insert(key.to_owned(), index);
                }

                self.atlases.push(atlas);
            }
        }

        for source in &sources {
            let Some(source_canvas) = source.canvas() else {
                warn!(
                    "atlas {:?} lost its canvas before gc, dropping {} entries",
                    source.id(),
                    source.entry_count()
                );
                collected += source.entry_count();
                continue;
            };

            for (key, locations) in source.entries() {
                if self.marked_keys.contains(key) {
                    collected += 1;
                    continue;
                }

                kept += 1;
                let [loc1, loc2] = *locations;

                if loc2.w == 0 {
                    let bb = BoundingBox::new(
                        0.0,
                        0.0,
                        loc1.w as f32,
                        loc1.h as f32,
                    );

                    self.draw(key, bb, |ctx, bb| {
                        ctx.draw_image(
                            source_canvas,
                            loc1.x as f32,
                            loc1.y as f32,
                            loc1.w as f32,
                            loc1.h as f32,
                            0.0,
                            0.0,
                            bb.w,
                            bb.h,
                        );
                    })?;
                } else {
                    // Stitch the two halves side by side, then push the
                    // whole image back through the normal placement path.
                    let w = loc1.w + loc2.w;
                    let h = loc1.h;
                    let mut stitch = (self.factory)(w, h);

                    stitch.draw_image(
                        source_canvas,
                        loc1.x as f32,
                        loc1.y as f32,
                        loc1.w as f32,
                        h as f32,
                        0.0,
                        0.0,
                        loc1.w as f32,
                        h as f32,
                    );
                    stitch.draw_image(
                        source_canvas,
                        loc2.x as f32,
                        loc2.y as f32,
                        loc2.w as f32,
                        h as f32,
                        loc1.w as f32,
                        0.0,
                        loc2.w as f32,
                        h as f32,
                    );

                    let bb =
                        BoundingBox::new(0.0, 0.0, w as f32, h as f32);

                    self.draw(key, bb, |ctx, bb| {
                        ctx.draw_image(
                            &stitch, 0.0, 0.0, bb.w, bb.h, 0.0, 0.0, bb.w,
                            bb.h,
                        );
                    })?;
                }
            }
        }

        for mut source in sources {
            source.dispose();
        }

        self.marked_keys.clear();
        debug!(
            "atlas gc kept {kept} keys, collected {collected}, {} atlases remain",
            self.atlases.len()
        );
        Ok(())
    }
}
