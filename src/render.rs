//! Renderer boundary
//!
//! The scene hands a renderer a flat, borrowed description of one frame and
//! gets nothing back but pixels. Anything that can draw a `SceneFrame` and
//! read back its drawing surface can sit behind the `Renderer` trait.

use glam::{Mat4, Vec3};
use image::RgbaImage;

use crate::error::RenderError;
use crate::lighting::{LightingRig, ShadowPlane};
use crate::material::MaterialBindings;
use crate::mesh::MeshData;
use crate::scene::Background;

/// One mesh placed in the world with the material table it resolves roles against
#[derive(Debug, Clone, Copy)]
pub struct DrawInstance<'a> {
    pub mesh: &'a MeshData,
    pub materials: &'a MaterialBindings,
    pub model: Mat4,
    pub casts_shadow: bool,
}

/// Everything needed to draw one frame
#[derive(Debug, Clone)]
pub struct SceneFrame<'a> {
    /// Changes whenever geometry, materials, transforms or background change
    pub revision: u64,
    /// Output surface size in pixels
    pub viewport: (u32, u32),
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub lighting: &'a LightingRig,
    pub shadow_plane: &'a ShadowPlane,
    pub background: &'a Background,
    pub instances: Vec<DrawInstance<'a>>,
}

/// Something that turns scene frames into pixels
pub trait Renderer {
    /// Draw the frame into the renderer's drawing surface
    fn render(&mut self, frame: &SceneFrame<'_>) -> Result<(), RenderError>;

    /// Read back the drawing surface as produced by the last `render`
    fn read_pixels(&mut self) -> Result<RgbaImage, RenderError>;
}
