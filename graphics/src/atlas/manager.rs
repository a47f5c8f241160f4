use crate::{
    AHashMap, AIndexSet, Atlas, AtlasCollection, AtlasId, BoundingBox,
    CanvasFactory, GpuRenderer, GraphicsError, Location, RendererOptions,
    TextureCanvas, TextureOffsets, Vec2,
};
use glam::Mat3;
use log::debug;

/// Per render type callbacks the manager needs to cache and place elements.
/// A render type is a named class of drawable (node body, node label, ..)
/// sharing one collection and one style keying scheme: equal keys must map
/// to identical texels.
pub trait RenderType<E> {
    /// Style key identifying the rasterized content of the element.
    fn key(&self, ele: &E) -> String;

    /// Stable element identity, used to notice style transitions.
    fn id(&self, ele: &E) -> u64;

    fn bounding_box(&self, ele: &E) -> BoundingBox;

    /// Rasterizes the element. The context is already transformed so the
    /// callback draws in `bb` coordinates.
    fn draw_element(&self, ctx: &mut TextureCanvas, ele: &E, bb: BoundingBox);

    fn rotation(&self, _ele: &E) -> f32 {
        0.0
    }

    fn rotation_point(&self, ele: &E) -> Vec2 {
        let bb = self.bounding_box(ele);

        Vec2::new(bb.x1 + bb.w / 2.0, bb.y1 + bb.h / 2.0)
    }

    fn rotation_offset(&self, ele: &E) -> Vec2 {
        let bb = self.bounding_box(ele);

        Vec2::new(-bb.w / 2.0, -bb.h / 2.0)
    }

    fn padding(&self, _ele: &E) -> f32 {
        0.0
    }
}

struct RenderTypeEntry<E> {
    collection: String,
    delegate: Box<dyn RenderType<E>>,
}

/// Where an element's texture lives for the current batch.
#[derive(Copy, Clone, Debug)]
pub struct AtlasInfo {
    pub atlas: AtlasId,
    /// Index of the atlas within the current batch.
    pub index: usize,
    pub tex1: Location,
    pub tex2: Location,
    pub bb: BoundingBox,
}

/// Options for [`AtlasManager::invalidate`].
pub struct InvalidateOptions<'a, E> {
    /// Texel content changed under a stable key (an image finished loading,
    /// say): mark the current key and collect synchronously.
    pub force_redraw: bool,
    pub filter_ele: Option<&'a dyn Fn(&E) -> bool>,
    pub filter_type: Option<&'a dyn Fn(&str) -> bool>,
}

impl<E> Default for InvalidateOptions<'_, E> {
    fn default() -> Self {
        Self {
            force_redraw: false,
            filter_ele: None,
            filter_type: None,
        }
    }
}

/// Counts [`AtlasManager::get_debug_info`] reports per collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtlasDebugInfo {
    pub collection: String,
    pub atlas_count: usize,
    pub key_count: usize,
    pub marked_key_count: usize,
}

/// Named atlas collections plus the render types that feed them, style
/// transition tracking for incremental eviction, and per frame assembly of
/// the bounded atlas set a single draw call may sample from.
pub struct AtlasManager<E> {
    collections: AHashMap<String, AtlasCollection>,
    render_types: AHashMap<String, RenderTypeEntry<E>>,
    type_and_id_to_key: AHashMap<(String, u64), String>,
    batch_atlases: AIndexSet<AtlasId>,
    max_atlases_per_batch: usize,
    tex_size: u32,
    factory: CanvasFactory,
}

impl<E> AtlasManager<E> {
    pub fn new(renderer: &GpuRenderer, options: &RendererOptions) -> Self {
        let limits = renderer.device().limits();
        let tex_size = options
            .tex_size
            .clamp(256, limits.max_texture_dimension_2d);

        Self {
            collections: AHashMap::new(),
            render_types: AHashMap::new(),
            type_and_id_to_key: AHashMap::new(),
            batch_atlases: AIndexSet::default(),
            max_atlases_per_batch: options.atlases_per_batch.max(1),
            tex_size,
            factory: options.create_texture_canvas.clone(),
        }
    }

    /// Manager without a GPU device behind it, taking the configured
    /// texture size as is. Placement, eviction and batch assembly all run on
    /// the CPU; only texture uploads need a device.
    pub fn headless(options: &RendererOptions) -> Self {
        Self {
            collections: AHashMap::new(),
            render_types: AHashMap::new(),
            type_and_id_to_key: AHashMap::new(),
            batch_atlases: AIndexSet::default(),
            max_atlases_per_batch: options.atlases_per_batch.max(1),
            tex_size: options.tex_size.max(256),
            factory: options.create_texture_canvas.clone(),
        }
    }

    pub fn add_atlas_collection(&mut self, name: &str, tex_rows: u32) {
        self.collections.insert(
            name.to_owned(),
            AtlasCollection::new(self.tex_size, tex_rows, self.factory.clone()),
        );
    }

    /// Registers the callbacks for a render type. The named collection must
    /// already exist.
    pub fn add_render_type(
        &mut self,
        type_name: &str,
        collection: &str,
        delegate: Box<dyn RenderType<E>>,
    ) -> Result<(), GraphicsError> {
        if !self.collections.contains_key(collection) {
            return Err(GraphicsError::UnknownCollection(
                collection.to_owned(),
            ));
        }

        self.render_types.insert(
            type_name.to_owned(),
            RenderTypeEntry {
                collection: collection.to_owned(),
                delegate,
            },
        );
        Ok(())
    }

    pub fn collection(&self, name: &str) -> Option<&AtlasCollection> {
        self.collections.get(name)
    }

    /// Resolves the atlas entry for an element, rasterizing it on a cache
    /// miss, and records the style key under `(type, id)` so later
    /// invalidation can notice the key changing.
    pub fn get_or_create_atlas(
        &mut self,
        ele: &E,
        type_name: &str,
        bb: Option<BoundingBox>,
    ) -> Result<(AtlasId, TextureOffsets, BoundingBox), GraphicsError> {
        let entry = self.render_types.get(type_name).ok_or_else(|| {
            GraphicsError::UnknownRenderType(type_name.to_owned())
        })?;
        let collection =
            self.collections.get_mut(&entry.collection).ok_or_else(|| {
                GraphicsError::UnknownCollection(entry.collection.clone())
            })?;

        let delegate = &entry.delegate;
        let key = delegate.key(ele);
        let bb = bb.unwrap_or_else(|| delegate.bounding_box(ele));

        let atlas = collection
            .draw(&key, bb, |ctx, bb| delegate.draw_element(ctx, ele, bb))?;
        let id = atlas.id();
        let offsets = atlas
            .offsets(&key)
            .ok_or(GraphicsError::NotEnoughRoom)?;

        let map_key = (type_name.to_owned(), delegate.id(ele));

        match self.type_and_id_to_key.get(&map_key) {
            Some(prev) if *prev == key => {}
            _ => {
                self.type_and_id_to_key.insert(map_key, key);
            }
        }

        Ok((id, offsets, bb))
    }

    /// Drops cached textures for elements whose styling changed.
    ///
    /// With `force_redraw` the current key is marked and collected
    /// synchronously, so the very next draw re-rasterizes. Otherwise only
    /// style transitions are detected (the key under `(type, id)` differing
    /// from the element's current key) and the old keys are tombstoned;
    /// the return value says whether a deferred [`Self::gc`] is warranted.
    pub fn invalidate(
        &mut self,
        elements: &[E],
        opts: InvalidateOptions<'_, E>,
    ) -> Result<bool, GraphicsError> {
        let mut deferred = false;

        for ele in elements {
            if let Some(filter) = opts.filter_ele {
                if !filter(ele) {
                    continue;
                }
            }

            for (type_name, entry) in &self.render_types {
                if let Some(filter) = opts.filter_type {
                    if !filter(type_name) {
                        continue;
                    }
                }

                let key = entry.delegate.key(ele);
                let map_key =
                    (type_name.clone(), entry.delegate.id(ele));

                if opts.force_redraw {
                    if let Some(collection) =
                        self.collections.get_mut(&entry.collection)
                    {
                        collection.mark_key_for_gc(&key);
                    }

                    self.type_and_id_to_key.remove(&map_key);
                } else {
                    let changed = match self.type_and_id_to_key.get(&map_key)
                    {
                        Some(prev) => *prev != key,
                        None => false,
                    };

                    if changed {
                        if let Some(prev) =
                            self.type_and_id_to_key.remove(&map_key)
                        {
                            if let Some(collection) =
                                self.collections.get_mut(&entry.collection)
                            {
                                collection.mark_key_for_gc(&prev);
                            }
                        }

                        deferred = true;
                    }
                }
            }
        }

        if opts.force_redraw {
            self.gc()?;
            return Ok(false);
        }

        Ok(deferred)
    }

    /// Sweeps every collection with tombstoned keys.
    pub fn gc(&mut self) -> Result<(), GraphicsError> {
        for collection in self.collections.values_mut() {
            if collection.needs_gc() {
                collection.gc()?;
            }
        }

        Ok(())
    }

    /// Begins assembling the atlases the next draw call will sample from.
    pub fn start_batch(&mut self) {
        self.batch_atlases.clear();
    }

    pub fn batch_len(&self) -> usize {
        self.batch_atlases.len()
    }

    /// True when the batch has room, or it is full but the element's atlas
    /// already participates.
    pub fn can_add_to_current_batch(
        &mut self,
        ele: &E,
        type_name: &str,
    ) -> Result<bool, GraphicsError> {
        if self.batch_atlases.len() < self.max_atlases_per_batch {
            return Ok(true);
        }

        let (id, _, _) = self.get_or_create_atlas(ele, type_name, None)?;

        Ok(self.batch_atlases.contains(&id))
    }

    /// Index of the atlas within the current batch, appending it if there is
    /// room. `None` means the batch is full: flush, start a new batch and
    /// retry.
    pub fn get_atlas_index_for_batch(
        &mut self,
        atlas: AtlasId,
    ) -> Option<usize> {
        if let Some(index) = self.batch_atlases.get_index_of(&atlas) {
            return Some(index);
        }

        if self.batch_atlases.len() < self.max_atlases_per_batch {
            self.batch_atlases.insert(atlas);
            return Some(self.batch_atlases.len() - 1);
        }

        None
    }

    /// Resolves everything a batcher needs to emit instances for an
    /// element: the batch-local atlas index, both texture locations and the
    /// bounding box. `Ok(None)` is the batch-full signal.
    pub fn get_atlas_info(
        &mut self,
        ele: &E,
        type_name: &str,
    ) -> Result<Option<AtlasInfo>, GraphicsError> {
        let (atlas, [tex1, tex2], bb) =
            self.get_or_create_atlas(ele, type_name, None)?;

        Ok(self.get_atlas_index_for_batch(atlas).map(|index| AtlasInfo {
            atlas,
            index,
            tex1,
            tex2,
            bb,
        }))
    }

    /// Atlas participating in the current batch, by batch index.
    pub fn batch_atlas(&self, index: usize) -> Option<&Atlas> {
        let id = *self.batch_atlases.get_index(index)?;

        self.collections
            .values()
            .find_map(|collection| collection.atlas(id))
    }

    /// Uploads every atlas of the current batch that has uncommitted
    /// texels. Call before binding the batch for a textured draw.
    pub fn buffer_batch(&mut self, renderer: &GpuRenderer) {
        for index in 0..self.batch_atlases.len() {
            let Some(id) = self.batch_atlases.get_index(index).copied()
            else {
                continue;
            };

            for collection in self.collections.values_mut() {
                if let Some(atlas) = collection.atlas_mut(id) {
                    atlas.buffer_if_needed(renderer);
                    break;
                }
            }
        }
    }

    /// Writes the model matrix for one textured quad of an element. Wrapped
    /// entries render as two quads (`first` selects the half), each sampling
    /// its own sub rectangle of the same atlas, split at the ratio the wrap
    /// split the texture.
    pub fn set_transform_matrix(
        &self,
        matrix: &mut Mat3,
        ele: &E,
        type_name: &str,
        info: &AtlasInfo,
        first: bool,
    ) -> Result<(), GraphicsError> {
        let entry = self.render_types.get(type_name).ok_or_else(|| {
            GraphicsError::UnknownRenderType(type_name.to_owned())
        })?;
        let delegate = &entry.delegate;

        let mut ratio = if info.tex2.w == 0 {
            1.0
        } else {
            info.tex1.w as f32 / (info.tex1.w + info.tex2.w) as f32
        };

        if !first {
            ratio = 1.0 - ratio;
        }

        let pad = delegate.padding(ele);
        let mut x1 = info.bb.x1 - pad;
        let y1 = info.bb.y1 - pad;
        let w = info.bb.w + 2.0 * pad;
        let h = info.bb.h + 2.0 * pad;

        let adj_w = w * ratio;
        let x_offset = if !first && ratio < 1.0 { w - adj_w } else { 0.0 };
        x1 += x_offset;

        let theta = delegate.rotation(ele);

        *matrix = if theta != 0.0 {
            let point = delegate.rotation_point(ele);
            let offset = delegate.rotation_offset(ele);

            Mat3::from_translation(point)
                * Mat3::from_angle(theta)
                * Mat3::from_translation(Vec2::new(
                    offset.x + x_offset,
                    offset.y,
                ))
                * Mat3::from_scale(Vec2::new(adj_w, h))
        } else {
            Mat3::from_translation(Vec2::new(x1, y1))
                * Mat3::from_scale(Vec2::new(adj_w, h))
        };

        Ok(())
    }

    pub fn get_debug_info(&self) -> Vec<AtlasDebugInfo> {
        let mut info: Vec<_> = self
            .collections
            .iter()
            .map(|(name, collection)| AtlasDebugInfo {
                collection: name.clone(),
                atlas_count: collection.atlas_count(),
                key_count: collection.key_count(),
                marked_key_count: collection.marked_key_count(),
            })
            .collect();

        info.sort_by(|a, b| a.collection.cmp(&b.collection));
        debug!("{info:?}");
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    #[derive(Clone, Copy)]
    struct Node {
        id: u64,
        style: u32,
    }

    struct NodeBody;

    impl RenderType<Node> for NodeBody {
        fn key(&self, ele: &Node) -> String {
            format!("node-{}", ele.style)
        }

        fn id(&self, ele: &Node) -> u64 {
            ele.id
        }

        fn bounding_box(&self, _ele: &Node) -> BoundingBox {
            BoundingBox::new(0.0, 0.0, 64.0, 64.0)
        }

        fn draw_element(
            &self,
            ctx: &mut TextureCanvas,
            ele: &Node,
            bb: BoundingBox,
        ) {
            ctx.fill_rect(
                bb.x1,
                bb.y1,
                bb.w,
                bb.h,
                Color::rgb(ele.style as u8, 0, 0),
            );
        }
    }

    fn manager(atlases_per_batch: usize) -> AtlasManager<Node> {
        let options = RendererOptions {
            tex_size: 256,
            atlases_per_batch,
            ..Default::default()
        };
        let mut manager = AtlasManager::headless(&options);

        // One row per atlas so every element fills a whole atlas.
        manager.add_atlas_collection("node", 1);
        manager
            .add_render_type("node-body", "node", Box::new(NodeBody))
            .unwrap();
        manager
    }

    #[test]
    fn unknown_collection_is_rejected_at_registration() {
        let mut manager = manager(4);

        assert!(matches!(
            manager.add_render_type("label", "labels", Box::new(NodeBody)),
            Err(GraphicsError::UnknownCollection(_))
        ));
    }

    #[test]
    fn batch_respects_the_atlas_cap() {
        let mut manager = manager(1);
        let first = Node { id: 1, style: 1 };
        let second = Node { id: 2, style: 2 };

        manager.start_batch();

        let info = manager.get_atlas_info(&first, "node-body").unwrap();
        assert_eq!(info.unwrap().index, 0);
        assert_eq!(manager.batch_len(), 1);

        // Same atlas, same index; the batch does not grow.
        let again = manager.get_atlas_info(&first, "node-body").unwrap();
        assert_eq!(again.unwrap().index, 0);

        // A second style fills a second atlas, which no longer fits.
        assert!(manager.get_atlas_info(&second, "node-body").unwrap().is_none());
        assert!(manager.can_add_to_current_batch(&first, "node-body").unwrap());
        assert!(!manager.can_add_to_current_batch(&second, "node-body").unwrap());

        // The next batch picks the second atlas up.
        manager.start_batch();
        assert!(manager.get_atlas_info(&second, "node-body").unwrap().is_some());
    }

    #[test]
    fn style_transition_marks_the_old_key() {
        let mut manager = manager(4);
        let before = Node { id: 7, style: 1 };
        let after = Node { id: 7, style: 2 };

        manager.get_or_create_atlas(&before, "node-body", None).unwrap();
        assert_eq!(manager.collection("node").unwrap().key_count(), 1);

        let deferred = manager
            .invalidate(&[after], InvalidateOptions::default())
            .unwrap();

        assert!(deferred);
        assert_eq!(
            manager.collection("node").unwrap().marked_key_count(),
            1
        );

        manager.gc().unwrap();
        assert_eq!(manager.collection("node").unwrap().key_count(), 0);
    }

    #[test]
    fn unchanged_style_defers_nothing() {
        let mut manager = manager(4);
        let node = Node { id: 7, style: 1 };

        manager.get_or_create_atlas(&node, "node-body", None).unwrap();

        let deferred = manager
            .invalidate(&[node], InvalidateOptions::default())
            .unwrap();

        assert!(!deferred);
        assert_eq!(manager.collection("node").unwrap().key_count(), 1);
    }

    #[test]
    fn force_redraw_collects_synchronously() {
        let mut manager = manager(4);
        let node = Node { id: 7, style: 1 };

        manager.get_or_create_atlas(&node, "node-body", None).unwrap();

        let deferred = manager
            .invalidate(
                &[node],
                InvalidateOptions {
                    force_redraw: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!deferred);
        assert_eq!(manager.collection("node").unwrap().key_count(), 0);
        assert_eq!(
            manager.collection("node").unwrap().marked_key_count(),
            0
        );
    }

    #[test]
    fn filters_limit_invalidation() {
        let mut manager = manager(4);
        let before = Node { id: 7, style: 1 };
        let after = Node { id: 7, style: 2 };

        manager.get_or_create_atlas(&before, "node-body", None).unwrap();

        let skip_all = |_: &str| false;
        let deferred = manager
            .invalidate(
                &[after],
                InvalidateOptions {
                    filter_type: Some(&skip_all),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!deferred);
        assert_eq!(
            manager.collection("node").unwrap().marked_key_count(),
            0
        );
    }

    #[test]
    fn debug_info_counts_per_collection() {
        let mut manager = manager(4);
        let node = Node { id: 1, style: 1 };

        manager.start_batch();
        let info = manager
            .get_atlas_info(&node, "node-body")
            .unwrap()
            .unwrap();

        // The batch can hand the atlas back for binding.
        let atlas = manager.batch_atlas(info.index).unwrap();
        assert_eq!(atlas.id(), info.atlas);

        assert_eq!(
            manager.get_debug_info(),
            vec![AtlasDebugInfo {
                collection: "node".to_owned(),
                atlas_count: 1,
                key_count: 1,
                marked_key_count: 0,
            }]
        );
    }

    #[test]
    fn transform_covers_the_bounding_box() {
        let manager = manager(4);
        let info = AtlasInfo {
            atlas: AtlasId(0),
            index: 0,
            tex1: Location { x: 0, y: 0, w: 64, h: 64 },
            tex2: Location::default(),
            bb: BoundingBox::new(10.0, 20.0, 64.0, 64.0),
        };

        let mut matrix = Mat3::IDENTITY;
        manager
            .set_transform_matrix(
                &mut matrix,
                &Node { id: 1, style: 1 },
                "node-body",
                &info,
                true,
            )
            .unwrap();

        let origin = matrix * glam::Vec3::new(0.0, 0.0, 1.0);
        let corner = matrix * glam::Vec3::new(1.0, 1.0, 1.0);

        assert_eq!((origin.x, origin.y), (10.0, 20.0));
        assert_eq!((corner.x, corner.y), (74.0, 84.0));
    }

    #[test]
    fn wrapped_transform_splits_at_the_texture_ratio() {
        let manager = manager(4);
        let info = AtlasInfo {
            atlas: AtlasId(0),
            index: 0,
            tex1: Location { x: 192, y: 0, w: 16, h: 64 },
            tex2: Location { x: 0, y: 64, w: 48, h: 64 },
            bb: BoundingBox::new(0.0, 0.0, 64.0, 64.0),
        };
        let node = Node { id: 1, style: 1 };

        let mut head = Mat3::IDENTITY;
        let mut tail = Mat3::IDENTITY;
        manager
            .set_transform_matrix(&mut head, &node, "node-body", &info, true)
            .unwrap();
        manager
            .set_transform_matrix(&mut tail, &node, "node-body", &info, false)
            .unwrap();

        // tex1 holds a quarter of the texels, so the first quad covers a
        // quarter of the width and the second starts where it ends.
        let head_end = head * glam::Vec3::new(1.0, 0.0, 1.0);
        let tail_start = tail * glam::Vec3::new(0.0, 0.0, 1.0);
        let tail_end = tail * glam::Vec3::new(1.0, 0.0, 1.0);

        assert_eq!(head_end.x, 16.0);
        assert_eq!(tail_start.x, 16.0);
        assert_eq!(tail_end.x, 64.0);
    }
}
