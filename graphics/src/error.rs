use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error(transparent)]
    WGpu(#[from] wgpu::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error("Atlas is locked and can not accept new entries.")]
    AtlasLocked,
    #[error("Atlas has no room left for the requested entry.")]
    NotEnoughRoom,
    #[error("Atlas collection {0} was never registered.")]
    UnknownCollection(String),
    #[error("Render type {0} was never registered.")]
    UnknownRenderType(String),
}
