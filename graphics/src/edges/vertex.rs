use crate::{BufferData, BufferLayout, GpuDevice};
use bytemuck::{Pod, Zeroable};
use std::mem;
use wgpu::util::DeviceExt;

/// Vertex type discriminator matching the edge shader branch.
pub const VERT_LINE: u32 = 0;
pub const VERT_SOURCE_ARROW: u32 = 1;
pub const VERT_TARGET_ARROW: u32 = 2;

/// Per instance attributes for one edge that matches the Shaders Vertex
/// Layout: packed element index, endpoints, premultiplied colors, arrow
/// flags and the two arrow transforms as three column attributes each.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct EdgeVertex {
    pub index: [u8; 4],
    pub source_target: [f32; 4],
    pub line_width: f32,
    pub line_color: [f32; 4],
    pub draw_arrows: [f32; 2],
    pub source_arrow_color: [f32; 4],
    pub target_arrow_color: [f32; 4],
    pub source_arrow_transform: [[f32; 3]; 3],
    pub target_arrow_transform: [[f32; 3]; 3],
}

impl Default for EdgeVertex {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl BufferLayout for EdgeVertex {
    fn attributes() -> Vec<wgpu::VertexAttribute> {
        wgpu::vertex_attr_array![2 => Unorm8x4, 3 => Float32x4, 4 => Float32, 5 => Float32x4, 6 => Float32x2, 7 => Float32x4, 8 => Float32x4, 9 => Float32x3, 10 => Float32x3, 11 => Float32x3, 12 => Float32x3, 13 => Float32x3, 14 => Float32x3]
            .to_vec()
    }

    fn default_buffer() -> BufferData {
        Self::with_capacity(16_384)
    }

    fn with_capacity(capacity: usize) -> BufferData {
        let instance_arr = vec![EdgeVertex::default(); capacity];

        BufferData {
            vertexs: bytemuck::cast_slice(&instance_arr).to_vec(),
        }
    }

    fn stride() -> usize {
        mem::size_of::<EdgeVertex>()
    }
}

/// Static per vertex geometry shared by every edge instance: six line quad
/// vertices plus one triangle per arrowhead, discriminated by vertex type.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct Vertex {
    position: [f32; 2],
    vert_type: u32,
}

const fn vert(x: f32, y: f32, vert_type: u32) -> Vertex {
    Vertex {
        position: [x, y],
        vert_type,
    }
}

const VERTS: [Vertex; 12] = [
    // Line quad spanning x 0..1 along the edge, y half a width either side.
    vert(0.0, -0.5, VERT_LINE),
    vert(1.0, -0.5, VERT_LINE),
    vert(1.0, 0.5, VERT_LINE),
    vert(0.0, -0.5, VERT_LINE),
    vert(1.0, 0.5, VERT_LINE),
    vert(0.0, 0.5, VERT_LINE),
    // Arrowhead triangles with the apex on the attachment point.
    vert(-0.15, -0.3, VERT_SOURCE_ARROW),
    vert(0.15, -0.3, VERT_SOURCE_ARROW),
    vert(0.0, 0.0, VERT_SOURCE_ARROW),
    vert(-0.15, -0.3, VERT_TARGET_ARROW),
    vert(0.15, -0.3, VERT_TARGET_ARROW),
    vert(0.0, 0.0, VERT_TARGET_ARROW),
];

/// StaticVertexBuffer holds the premade vbo shared between every edge
/// instance. One upload at startup, reused by every batch.
pub struct StaticVertexBuffer {
    pub vbo: wgpu::Buffer,
}

impl StaticVertexBuffer {
    pub fn create_buffer(gpu_device: &GpuDevice) -> Self {
        Self {
            vbo: gpu_device.device().create_buffer_init(
                &wgpu::util::BufferInitDescriptor {
                    label: Some("static edge vertex buffer"),
                    contents: bytemuck::cast_slice(&VERTS),
                    usage: wgpu::BufferUsages::VERTEX,
                },
            ),
        }
    }

    pub fn vertex_count() -> u32 {
        VERTS.len() as u32
    }

    //VertexBufferLayout for the static edge geometry.
    pub fn attributes() -> [wgpu::VertexAttribute; 2] {
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Uint32]
    }

    pub fn stride() -> u64 {
        mem::size_of::<Vertex>() as u64
    }

    /// Returns the [`wgpu::BufferSlice`] of vertices.
    pub fn vertices(&self) -> wgpu::BufferSlice {
        self.vbo.slice(..)
    }
}
