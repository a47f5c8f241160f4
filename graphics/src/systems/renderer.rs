use crate::{
    EdgePickingPipeline, EdgeRenderPipeline, GpuDevice, Layout, LayoutStorage,
    PipeLineLayout, PipelineStorage,
};
use std::sync::Arc;

/// Owns the device handles plus the layout and pipeline caches. The caller
/// keeps the window, surface and frame; this type only needs somewhere to
/// create resources and submit uploads.
pub struct GpuRenderer {
    pub(crate) device: GpuDevice,
    pub(crate) layout_storage: LayoutStorage,
    pub(crate) pipeline_storage: PipelineStorage,
}

impl GpuRenderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device: GpuDevice::new(device, queue),
            layout_storage: LayoutStorage::new(),
            pipeline_storage: PipelineStorage::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.device.queue
    }

    pub fn gpu_device(&self) -> &GpuDevice {
        &self.device
    }

    pub fn create_layout<K: Layout>(
        &mut self,
        layout: K,
    ) -> Arc<wgpu::BindGroupLayout> {
        self.layout_storage.create_layout(&mut self.device, layout)
    }

    pub fn get_layout<K: Layout>(
        &self,
        layout: K,
    ) -> Option<Arc<wgpu::BindGroupLayout>> {
        self.layout_storage.get_layout(layout)
    }

    /// Builds every pipeline the renderer draws with. Creating the pipelines
    /// also caches the bind group layouts atlases and uniforms need.
    pub fn create_pipelines(&mut self, surface_format: wgpu::TextureFormat) {
        self.pipeline_storage.create_pipeline(
            &mut self.device,
            &mut self.layout_storage,
            surface_format,
            EdgeRenderPipeline,
        );

        self.pipeline_storage.create_pipeline(
            &mut self.device,
            &mut self.layout_storage,
            surface_format,
            EdgePickingPipeline,
        );
    }

    pub fn get_pipelines<K: PipeLineLayout>(
        &self,
        pipeline: K,
    ) -> Option<&wgpu::RenderPipeline> {
        self.pipeline_storage.get_pipeline(pipeline)
    }
}
