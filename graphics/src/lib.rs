mod atlas;
mod canvas;
mod edges;
mod error;
mod options;
mod systems;

pub use atlas::*;
pub use canvas::*;
pub use edges::*;
pub use error::*;
pub use glam::{Mat3, Mat4, UVec2, Vec2, Vec3, Vec4};
pub use options::*;
pub use systems::*;

#[cfg(feature = "crate_passthru")]
pub use glam;
#[cfg(feature = "crate_passthru")]
pub use image;
#[cfg(feature = "crate_passthru")]
pub use naga;
#[cfg(feature = "crate_passthru")]
pub use wgpu;
