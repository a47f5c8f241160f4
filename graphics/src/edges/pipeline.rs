use crate::{
    BufferLayout, EdgeVertex, GpuDevice, LayoutStorage, PipeLineLayout,
    StaticVertexBuffer, SystemLayout,
};
use bytemuck::{Pod, Zeroable};

fn create_edge_pipeline(
    gpu_device: &mut GpuDevice,
    layouts: &mut LayoutStorage,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
    fragment_entry: &str,
    label: &str,
) -> wgpu::RenderPipeline {
    let shader = gpu_device.device().create_shader_module(
        wgpu::ShaderModuleDescriptor {
            label: Some("Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/edgeshader.wgsl").into(),
            ),
        },
    );

    let system_layout = layouts.create_layout(gpu_device, SystemLayout);

    // Create the render pipeline.
    gpu_device.device().create_render_pipeline(
        &wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&gpu_device.device().create_pipeline_layout(
                &wgpu::PipelineLayoutDescriptor {
                    label: Some("edge_render_pipeline_layout"),
                    bind_group_layouts: &[&system_layout],
                    push_constant_ranges: &[],
                },
            )),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vertex"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: StaticVertexBuffer::stride(),
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &StaticVertexBuffer::attributes(),
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: EdgeVertex::stride() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &EdgeVertex::attributes(),
                    },
                ],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        },
    )
}

/// [`crate::EdgeRenderer`] screen pass RenderPipeline Layout. Colors are
/// premultiplied in the instance stream, so the blend is one/one-minus-src.
#[repr(C)]
#[derive(Clone, Copy, Hash, Pod, Zeroable, Debug)]
pub struct EdgeRenderPipeline;

impl PipeLineLayout for EdgeRenderPipeline {
    fn create_layout(
        &self,
        gpu_device: &mut GpuDevice,
        layouts: &mut LayoutStorage,
        surface_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        create_edge_pipeline(
            gpu_device,
            layouts,
            surface_format,
            wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            "fragment",
            "Edge render pipeline",
        )
    }
}

/// Picking pass variant: packed element indices land in an Rgba8 offscreen
/// target with blending replaced, so the framebuffer holds exact indices.
#[repr(C)]
#[derive(Clone, Copy, Hash, Pod, Zeroable, Debug)]
pub struct EdgePickingPipeline;

impl PipeLineLayout for EdgePickingPipeline {
    fn create_layout(
        &self,
        gpu_device: &mut GpuDevice,
        layouts: &mut LayoutStorage,
        _surface_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        create_edge_pipeline(
            gpu_device,
            layouts,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::BlendState::REPLACE,
            "picking_fragment",
            "Edge picking pipeline",
        )
    }
}
