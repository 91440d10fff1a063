//! Surface roles and their materials
//!
//! A book has exactly four semantic surfaces. Roles are a closed enum and the
//! role -> material mapping is a fixed table indexed by role, so every mesh
//! face resolves to exactly one material without any per-mesh material types.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;
use std::sync::Arc;

use image::RgbaImage;

use crate::config::{MaterialConfig, CONFIG};
use crate::error::{AttributeError, LoadError};

/// Semantic region of the book a mesh face and a material are tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceRole {
    Cover,
    Spine,
    Back,
    Pages,
}

impl SurfaceRole {
    pub const ALL: [SurfaceRole; 4] = [
        SurfaceRole::Cover,
        SurfaceRole::Spine,
        SurfaceRole::Back,
        SurfaceRole::Pages,
    ];

    fn index(self) -> usize {
        match self {
            SurfaceRole::Cover => 0,
            SurfaceRole::Spine => 1,
            SurfaceRole::Back => 2,
            SurfaceRole::Pages => 3,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SurfaceRole::Cover => "Cover",
            SurfaceRole::Spine => "Spine",
            SurfaceRole::Back => "Back",
            SurfaceRole::Pages => "Pages",
        }
    }

    fn default_material(self) -> &'static MaterialConfig {
        let materials = &CONFIG.materials;
        match self {
            SurfaceRole::Cover => &materials.cover,
            SurfaceRole::Spine => &materials.spine,
            SurfaceRole::Back => &materials.back,
            SurfaceRole::Pages => &materials.pages,
        }
    }
}

impl fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SurfaceRole::Cover => "cover",
            SurfaceRole::Spine => "spine",
            SurfaceRole::Back => "back",
            SurfaceRole::Pages => "pages",
        })
    }
}

impl FromStr for SurfaceRole {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" => Ok(SurfaceRole::Cover),
            "spine" => Ok(SurfaceRole::Spine),
            "back" => Ok(SurfaceRole::Back),
            "pages" => Ok(SurfaceRole::Pages),
            _ => Err(AttributeError::UnknownRole(s.to_string())),
        }
    }
}

/// One value per surface role
#[derive(Debug, Clone, PartialEq)]
pub struct RoleMap<T>([T; 4]);

impl<T> RoleMap<T> {
    pub fn from_fn(mut f: impl FnMut(SurfaceRole) -> T) -> Self {
        Self(SurfaceRole::ALL.map(&mut f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceRole, &T)> {
        SurfaceRole::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<SurfaceRole> for RoleMap<T> {
    type Output = T;

    fn index(&self, role: SurfaceRole) -> &T {
        &self.0[role.index()]
    }
}

impl<T> IndexMut<SurfaceRole> for RoleMap<T> {
    fn index_mut(&mut self, role: SurfaceRole) -> &mut T {
        &mut self.0[role.index()]
    }
}

/// How the texel values of an image are to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Display-referred, gamma-encoded color (photos, artwork)
    Srgb,
    /// Linear data
    Linear,
}

/// A decoded image ready to be used as a color map
#[derive(Debug, Clone)]
pub struct Texture {
    pub image: Arc<RgbaImage>,
    pub color_space: ColorSpace,
}

impl Texture {
    /// Wrap a decoded image as base-color artwork.
    ///
    /// Loaded artwork is display-referred, so it is always tagged sRGB.
    pub fn from_artwork(image: Arc<RgbaImage>) -> Result<Self, LoadError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(LoadError::EmptyImage { width, height });
        }
        Ok(Self {
            image,
            color_space: ColorSpace::Srgb,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Image width over image height
    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image) && self.color_space == other.color_space
    }
}

/// Surface appearance for one role
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDescriptor {
    /// Base color as 0xRRGGBB
    pub base_color: u32,
    pub roughness: f32,
    pub metalness: f32,
    pub texture: Option<Texture>,
    version: u64,
}

impl MaterialDescriptor {
    pub fn new(base_color: u32, roughness: f32, metalness: f32) -> Self {
        Self {
            base_color,
            roughness: roughness.clamp(0.0, 1.0),
            metalness: metalness.clamp(0.0, 1.0),
            texture: None,
            version: 0,
        }
    }

    pub fn for_role(role: SurfaceRole) -> Self {
        let defaults = role.default_material();
        Self::new(defaults.color, defaults.roughness, defaults.metalness)
    }

    /// Replace the color map. The renderer picks the change up through `version`.
    pub fn set_texture(&mut self, texture: Texture) {
        self.texture = Some(texture);
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        self.version += 1;
    }

    /// Monotonic change counter; differs whenever any field changed
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Role -> material table for one book
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBindings {
    materials: RoleMap<MaterialDescriptor>,
}

impl Default for MaterialBindings {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialBindings {
    pub fn new() -> Self {
        Self {
            materials: RoleMap::from_fn(MaterialDescriptor::for_role),
        }
    }

    pub fn get(&self, role: SurfaceRole) -> &MaterialDescriptor {
        &self.materials[role]
    }

    pub fn get_mut(&mut self, role: SurfaceRole) -> &mut MaterialDescriptor {
        &mut self.materials[role]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceRole, &MaterialDescriptor)> {
        self.materials.iter()
    }

    /// Attach a loaded texture to a role.
    ///
    /// Returns the corrected book width when the role is the cover: the cover
    /// image defines the book's proportions, `width = height * aspect`.
    pub fn apply_texture(&mut self, role: SurfaceRole, texture: Texture, height: f32) -> Option<f32> {
        let corrected_width = match role {
            SurfaceRole::Cover => Some(height * texture.aspect_ratio()),
            _ => None,
        };
        self.materials[role].set_texture(texture);
        corrected_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artwork(width: u32, height: u32) -> Texture {
        Texture::from_artwork(Arc::new(RgbaImage::new(width, height))).unwrap()
    }

    #[test]
    fn every_role_has_a_default_material() {
        let bindings = MaterialBindings::new();
        assert_eq!(bindings.get(SurfaceRole::Cover).base_color, 0xeeeeee);
        assert_eq!(bindings.get(SurfaceRole::Spine).base_color, 0xcccccc);
        assert_eq!(bindings.get(SurfaceRole::Pages).roughness, 0.9);
        assert_eq!(bindings.iter().count(), 4);
        assert!(bindings.iter().all(|(_, m)| m.texture.is_none()));
    }

    #[test]
    fn artwork_is_tagged_srgb() {
        assert_eq!(artwork(4, 2).color_space, ColorSpace::Srgb);
    }

    #[test]
    fn empty_artwork_is_rejected() {
        let result = Texture::from_artwork(Arc::new(RgbaImage::new(0, 10)));
        assert!(matches!(result, Err(LoadError::EmptyImage { width: 0, height: 10 })));
    }

    #[test]
    fn cover_texture_reports_corrected_width() {
        let mut bindings = MaterialBindings::new();
        let width = bindings.apply_texture(SurfaceRole::Cover, artwork(200, 100), 4.5);
        assert_eq!(width, Some(9.0));
        assert!(bindings.get(SurfaceRole::Cover).texture.is_some());
    }

    #[test]
    fn non_cover_texture_keeps_width() {
        let mut bindings = MaterialBindings::new();
        let before = bindings.get(SurfaceRole::Spine).version();
        let width = bindings.apply_texture(SurfaceRole::Spine, artwork(10, 300), 4.5);
        assert_eq!(width, None);
        assert!(bindings.get(SurfaceRole::Spine).version() > before);
    }

    #[test]
    fn role_names_round_trip_through_strings() {
        for role in SurfaceRole::ALL {
            assert_eq!(role.to_string().parse::<SurfaceRole>(), Ok(role));
        }
        assert!("jacket".parse::<SurfaceRole>().is_err());
    }

    #[test]
    fn descriptor_clamps_factors() {
        let material = MaterialDescriptor::new(0, 1.5, -0.2);
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.metalness, 0.0);
    }
}
