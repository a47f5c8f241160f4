use crate::{
    Buffer, BufferLayout, EdgePickingPipeline, EdgeRenderData,
    EdgeRenderPipeline, EdgeVertex, GpuRenderer, RendererOptions,
    StaticVertexBuffer, System,
};
use glam::Mat4;
use log::trace;

/// Which pass a frame renders into.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RenderTarget {
    #[default]
    Screen,
    /// Offscreen index buffer for mouse hit testing.
    Picking,
}

/// Instance range one draw call covers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeBatch {
    pub start: u32,
    pub end: u32,
}

/// Per frame counters, mostly for debug overlays and tests.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeFrameInfo {
    pub instances: usize,
    pub batches: usize,
}

/// CPU half of the edge pipeline: folds edges into instances and splits
/// them into draw ranges of at most `max_instances`.
pub struct EdgeBatcher {
    instances: Vec<EdgeVertex>,
    batches: Vec<EdgeBatch>,
    batch_start: usize,
    max_instances: usize,
}

impl EdgeBatcher {
    pub fn new(max_instances: usize) -> Self {
        let max_instances = max_instances.max(1);

        Self {
            instances: Vec::with_capacity(max_instances),
            batches: Vec::new(),
            batch_start: 0,
            max_instances,
        }
    }

    /// Drops everything accumulated for the previous frame.
    pub fn reset(&mut self) {
        self.instances.clear();
        self.batches.clear();
        self.batch_start = 0;
    }

    pub fn start_batch(&mut self) {
        self.batch_start = self.instances.len();
    }

    /// Records one edge instance. Hitting the instance cap seals the open
    /// batch so no draw range ever exceeds it.
    pub fn draw(&mut self, edge: &EdgeRenderData, element_index: u32) {
        self.instances.push(edge.to_vertex(element_index));

        if self.instances.len() - self.batch_start >= self.max_instances {
            trace!(
                "edge batch full at {} instances, splitting",
                self.max_instances
            );
            self.end_batch();
        }
    }

    /// Seals the open batch. A no-op while the batch is empty.
    pub fn end_batch(&mut self) {
        let end = self.instances.len();

        if end > self.batch_start {
            self.batches.push(EdgeBatch {
                start: self.batch_start as u32,
                end: end as u32,
            });
            self.batch_start = end;
        }
    }

    pub fn instances(&self) -> &[EdgeVertex] {
        self.instances.as_slice()
    }

    pub fn batches(&self) -> &[EdgeBatch] {
        self.batches.as_slice()
    }

    pub fn frame_info(&self) -> EdgeFrameInfo {
        EdgeFrameInfo {
            instances: self.instances.len(),
            batches: self.batches.len(),
        }
    }
}

/// Instanced edge renderer: one draw call per batch renders every line quad
/// and arrowhead of up to `max_instances` edges.
pub struct EdgeRenderer {
    pub batcher: EdgeBatcher,
    buffer: Buffer<EdgeVertex>,
    static_vertices: StaticVertexBuffer,
    target: RenderTarget,
}

impl EdgeRenderer {
    pub fn new(renderer: &GpuRenderer, options: &RendererOptions) -> Self {
        let max_instances = options.batch_size.max(1);

        Self {
            batcher: EdgeBatcher::new(max_instances),
            buffer: Buffer::new(
                renderer.gpu_device(),
                &EdgeVertex::with_capacity(max_instances).vertexs,
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                Some("edge instance buffer"),
            ),
            static_vertices: StaticVertexBuffer::create_buffer(
                renderer.gpu_device(),
            ),
            target: RenderTarget::Screen,
        }
    }

    /// Resets the frame state, pushes the pan/zoom matrix and picks which
    /// pass the frame renders into.
    pub fn start_frame(
        &mut self,
        renderer: &GpuRenderer,
        system: &mut System,
        pan_zoom: Mat4,
        target: RenderTarget,
    ) {
        system.set_pan_zoom(pan_zoom);
        system.update(renderer);
        self.batcher.reset();
        self.target = target;
    }

    pub fn target(&self) -> RenderTarget {
        self.target
    }

    pub fn start_batch(&mut self) {
        self.batcher.start_batch();
    }

    pub fn draw(&mut self, edge: &EdgeRenderData, element_index: u32) {
        self.batcher.draw(edge, element_index);
    }

    pub fn end_batch(&mut self) {
        self.batcher.end_batch();
    }

    pub fn frame_info(&self) -> EdgeFrameInfo {
        self.batcher.frame_info()
    }

    /// Seals the last batch and uploads the frame's instances, growing the
    /// GPU buffer when a frame outgrows it.
    pub fn finalize(&mut self, renderer: &GpuRenderer) {
        self.end_batch();

        let bytes: &[u8] = bytemuck::cast_slice(self.batcher.instances());

        if bytes.len() > self.buffer.max {
            let capacity = self.batcher.instances().len().next_power_of_two();

            self.buffer = Buffer::new(
                renderer.gpu_device(),
                &EdgeVertex::with_capacity(capacity).vertexs,
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                Some("edge instance buffer"),
            );
        }

        self.buffer.count = self.batcher.instances().len();
        self.buffer.len = bytes.len();
        self.buffer.write(renderer.gpu_device(), bytes, 0);
    }
}

pub trait RenderEdges<'a, 'b>
where
    'b: 'a,
{
    fn render_edges(
        &mut self,
        renderer: &'b GpuRenderer,
        edges: &'b EdgeRenderer,
        system: &'b System,
    );
}

impl<'a, 'b> RenderEdges<'a, 'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn render_edges(
        &mut self,
        renderer: &'b GpuRenderer,
        edges: &'b EdgeRenderer,
        system: &'b System,
    ) {
        if edges.batcher.batches().is_empty() {
            return;
        }

        let pipeline = match edges.target {
            RenderTarget::Screen => renderer.get_pipelines(EdgeRenderPipeline),
            RenderTarget::Picking => {
                renderer.get_pipelines(EdgePickingPipeline)
            }
        };

        let Some(pipeline) = pipeline else {
            return;
        };

        self.set_pipeline(pipeline);
        self.set_bind_group(0, system.bind_group(), &[]);
        self.set_vertex_buffer(0, edges.static_vertices.vertices());
        self.set_vertex_buffer(
            1,
            edges.buffer.buffer_slice(0..edges.buffer.len as u64),
        );

        for batch in edges.batcher.batches() {
            self.draw(
                0..StaticVertexBuffer::vertex_count(),
                batch.start..batch.end,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arrow_width, pack_element_index, ArrowStyle, Color, EdgeKind, Vec2,
    };

    fn edge() -> EdgeRenderData {
        EdgeRenderData {
            source: Vec2::new(0.0, 0.0),
            target: Vec2::new(10.0, 0.0),
            line_width: 2.0,
            line_color: Color::rgb(255, 0, 0),
            ..Default::default()
        }
    }

    #[test]
    fn three_draws_at_cap_two_make_two_batches() {
        let mut batcher = EdgeBatcher::new(2);

        batcher.start_batch();
        batcher.draw(&edge(), 0);
        batcher.draw(&edge(), 1);
        // The second draw hit the cap and sealed implicitly.
        assert_eq!(batcher.batches().len(), 1);

        batcher.draw(&edge(), 2);
        batcher.end_batch();

        assert_eq!(
            batcher.batches(),
            &[EdgeBatch { start: 0, end: 2 }, EdgeBatch { start: 2, end: 3 }]
        );
        assert!(batcher
            .batches()
            .iter()
            .all(|batch| batch.end - batch.start <= 2));
        assert_eq!(
            batcher.frame_info(),
            EdgeFrameInfo {
                instances: 3,
                batches: 2
            }
        );
    }

    #[test]
    fn end_batch_is_idempotent_when_empty() {
        let mut batcher = EdgeBatcher::new(4);

        batcher.start_batch();
        batcher.end_batch();
        batcher.end_batch();

        assert!(batcher.batches().is_empty());

        batcher.draw(&edge(), 0);
        batcher.end_batch();
        batcher.end_batch();

        assert_eq!(batcher.batches().len(), 1);
    }

    #[test]
    fn element_index_packs_low_byte_first() {
        assert_eq!(pack_element_index(0x0102_0304), [4, 3, 2, 1]);

        let vertex = edge().to_vertex(0x0102_0304);
        assert_eq!(vertex.index, [4, 3, 2, 1]);
    }

    #[test]
    fn line_color_is_premultiplied_by_opacity() {
        let mut data = edge();
        data.opacity = 0.5;

        let vertex = data.to_vertex(0);
        assert_eq!(vertex.line_color, [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn arrows_only_render_on_straight_edges() {
        let arrow = ArrowStyle {
            position: Vec2::new(10.0, 0.0),
            angle: 0.0,
            color: Color::rgb(0, 0, 255),
        };

        let mut data = edge();
        data.target_arrow = Some(arrow);
        assert_eq!(data.to_vertex(0).draw_arrows, [0.0, 1.0]);

        data.kind = EdgeKind::Curved;
        assert_eq!(data.to_vertex(0).draw_arrows, [0.0, 0.0]);
    }

    #[test]
    fn non_finite_arrow_geometry_is_skipped() {
        let mut data = edge();
        data.source_arrow = Some(ArrowStyle {
            position: Vec2::new(f32::NAN, 0.0),
            angle: 0.0,
            color: Color::rgb(0, 0, 255),
        });
        data.target_arrow = Some(ArrowStyle {
            position: Vec2::new(10.0, 0.0),
            angle: f32::INFINITY,
            color: Color::rgb(0, 0, 255),
        });

        assert_eq!(data.to_vertex(0).draw_arrows, [0.0, 0.0]);
    }

    #[test]
    fn arrow_transform_places_the_apex_on_the_attachment_point() {
        let mut data = edge();
        data.line_width = 4.0;
        data.target_arrow = Some(ArrowStyle {
            position: Vec2::new(10.0, 0.0),
            angle: std::f32::consts::FRAC_PI_2,
            color: Color::rgb(0, 0, 255),
        });

        let vertex = data.to_vertex(0);
        let matrix = glam::Mat3::from_cols_array_2d(
            &vertex.target_arrow_transform,
        );

        // The apex vertex (0, 0) lands exactly on the arrow position.
        let apex = matrix * glam::Vec3::new(0.0, 0.0, 1.0);
        assert!((apex.x - 10.0).abs() < 1e-5);
        assert!(apex.y.abs() < 1e-5);

        // A base vertex sits arrow_width away, rotated by the angle.
        let size = arrow_width(4.0, 1.0);
        let base = matrix * glam::Vec3::new(0.0, -0.3, 1.0);
        assert!((base.x - (10.0 + 0.3 * size)).abs() < 1e-4);
    }
}
