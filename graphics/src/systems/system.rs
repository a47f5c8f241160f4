use crate::{GpuDevice, GpuRenderer, Layout};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, Hash, Pod, Zeroable)]
pub struct SystemLayout;

impl Layout for SystemLayout {
    fn create_layout(
        &self,
        gpu_device: &mut GpuDevice,
    ) -> wgpu::BindGroupLayout {
        gpu_device.device().create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("system_bind_group_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX
                        | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            },
        )
    }
}

/// Global uniforms every pass shares: the pan/zoom matrix elements are
/// positioned by and the background color translucent arrowheads composite
/// against.
pub struct System {
    pan_zoom: Mat4,
    bg_color: Vec4,
    changed: bool,
    global_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl System {
    pub fn new(
        renderer: &mut GpuRenderer,
        pan_zoom: Mat4,
        bg_color: Vec4,
    ) -> Self {
        let mut raw = [0f32; 20];
        raw[..16].copy_from_slice(&AsRef::<[f32; 16]>::as_ref(&pan_zoom)[..]);
        raw[16..20].copy_from_slice(&bg_color.to_array());

        let global_buffer = renderer.device().create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("system buffer"),
                contents: bytemuck::cast_slice(&raw),
                usage: wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::COPY_DST,
            },
        );

        let layout = renderer.create_layout(SystemLayout);

        let bind_group =
            renderer
                .device()
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: global_buffer.as_entire_binding(),
                    }],
                    label: Some("system_bind_group"),
                });

        Self {
            pan_zoom,
            bg_color,
            changed: false,
            global_buffer,
            bind_group,
        }
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn pan_zoom(&self) -> Mat4 {
        self.pan_zoom
    }

    pub fn set_pan_zoom(&mut self, pan_zoom: Mat4) {
        if self.pan_zoom != pan_zoom {
            self.pan_zoom = pan_zoom;
            self.changed = true;
        }
    }

    pub fn bg_color(&self) -> Vec4 {
        self.bg_color
    }

    pub fn set_bg_color(&mut self, bg_color: Vec4) {
        if self.bg_color != bg_color {
            self.bg_color = bg_color;
            self.changed = true;
        }
    }

    /// Pushes pending uniform changes to the GPU.
    pub fn update(&mut self, renderer: &GpuRenderer) {
        if !self.changed {
            return;
        }

        let mut raw = [0f32; 20];
        raw[..16]
            .copy_from_slice(&AsRef::<[f32; 16]>::as_ref(&self.pan_zoom)[..]);
        raw[16..20].copy_from_slice(&self.bg_color.to_array());

        renderer.queue().write_buffer(
            &self.global_buffer,
            0,
            bytemuck::cast_slice(&raw),
        );
        self.changed = false;
    }
}
