//! The live book object
//!
//! Composes the geometry builder and the material table into one disposable
//! object. Any attribute change throws the current primitives away and builds
//! new ones; part count and face mapping differ between formats, so patching
//! in place is never attempted.

use log::{debug, info, warn};

use crate::error::AttributeError;
use crate::geometry::{build_book, validate_dimensions, BookAttributes, BookFormat, MeshPart};
use crate::material::{MaterialBindings, SurfaceRole, Texture};
use crate::mesh::MeshData;
use crate::pose::Transform;

/// Width changes smaller than this do not count as an aspect-ratio change
const WIDTH_EPSILON: f32 = 1e-6;

/// One renderable box: its part description and the mesh built from it
#[derive(Debug, Clone, PartialEq)]
pub struct BookPrimitive {
    pub part: MeshPart,
    pub mesh: MeshData,
}

impl BookPrimitive {
    fn from_part(part: MeshPart) -> Self {
        Self {
            mesh: part.to_mesh(),
            part,
        }
    }
}

/// Frozen copy of a book's renderable state
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub primitives: Vec<BookPrimitive>,
    pub materials: MaterialBindings,
    pub attributes: BookAttributes,
}

/// What applying a texture did to the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureOutcome {
    /// Only the material changed
    MaterialOnly,
    /// The cover changed the book's width and the geometry was rebuilt
    Resized { width: f32 },
    /// The cover's proportions would make the book too narrow; width kept
    ResizeRejected { width: f32 },
}

/// A single book instance
#[derive(Debug)]
pub struct BookModel {
    attributes: BookAttributes,
    materials: MaterialBindings,
    primitives: Vec<BookPrimitive>,
    pub transform: Transform,
    rebuilds: u64,
    disposed_primitives: u64,
}

impl BookModel {
    pub fn new(attributes: BookAttributes) -> Result<Self, AttributeError> {
        attributes.validate()?;
        let mut model = Self {
            attributes,
            materials: MaterialBindings::new(),
            primitives: Vec::new(),
            transform: Transform::IDENTITY,
            rebuilds: 0,
            disposed_primitives: 0,
        };
        model.rebuild()?;
        Ok(model)
    }

    pub fn attributes(&self) -> &BookAttributes {
        &self.attributes
    }

    pub fn materials(&self) -> &MaterialBindings {
        &self.materials
    }

    pub fn primitives(&self) -> &[BookPrimitive] {
        &self.primitives
    }

    pub fn parts(&self) -> Vec<MeshPart> {
        self.primitives.iter().map(|p| p.part).collect()
    }

    /// How many times the geometry has been (re)built, including the first build
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Primitives released by rebuilds and disposal so far
    pub fn disposed_count(&self) -> u64 {
        self.disposed_primitives
    }

    pub fn set_thickness(&mut self, thickness: f32) -> Result<(), AttributeError> {
        validate_dimensions(self.attributes.width, self.attributes.height, thickness)?;
        self.attributes.thickness = thickness;
        self.rebuild()
    }

    /// Switch binding format. Returns whether a rebuild happened.
    pub fn set_format(&mut self, format: BookFormat) -> Result<bool, AttributeError> {
        if self.attributes.format == format {
            return Ok(false);
        }
        self.attributes.format = format;
        self.rebuild()?;
        info!("Book format set to {}", format);
        Ok(true)
    }

    /// Attach a finished texture load to a role.
    ///
    /// A cover texture redefines the width from its aspect ratio and rebuilds
    /// the geometry; other roles only swap the material's map.
    pub fn apply_texture(&mut self, role: SurfaceRole, texture: Texture) -> TextureOutcome {
        let corrected = self
            .materials
            .apply_texture(role, texture, self.attributes.height);

        let Some(width) = corrected else {
            return TextureOutcome::MaterialOnly;
        };
        if (width - self.attributes.width).abs() <= WIDTH_EPSILON {
            return TextureOutcome::MaterialOnly;
        }
        if let Err(e) = validate_dimensions(width, self.attributes.height, self.attributes.thickness) {
            warn!("Cover proportions ignored: {}", e);
            return TextureOutcome::ResizeRejected { width };
        }

        let previous = self.attributes.width;
        self.attributes.width = width;
        if let Err(e) = self.rebuild() {
            self.attributes.width = previous;
            warn!("Cover resize rolled back: {}", e);
            return TextureOutcome::ResizeRejected { width };
        }
        info!("Cover aspect ratio set book width to {:.3}", width);
        TextureOutcome::Resized { width }
    }

    /// Deep copy of the current renderable state, unaffected by later edits
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            primitives: self.primitives.clone(),
            materials: self.materials.clone(),
            attributes: self.attributes,
        }
    }

    /// Release every primitive. The model renders nothing until the next rebuild.
    pub fn dispose(&mut self) {
        self.disposed_primitives += self.primitives.len() as u64;
        self.primitives.clear();
    }

    fn rebuild(&mut self) -> Result<(), AttributeError> {
        // Build first so a failure leaves the current geometry untouched
        let parts = build_book(&self.attributes)?;
        self.dispose();
        self.primitives = parts.into_iter().map(BookPrimitive::from_part).collect();
        self.rebuilds += 1;
        debug!(
            "Rebuilt {} book with {} part(s) ({}x{}x{})",
            self.attributes.format,
            self.primitives.len(),
            self.attributes.width,
            self.attributes.height,
            self.attributes.thickness
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MIN_THICKNESS;
    use image::RgbaImage;
    use std::sync::Arc;

    fn book() -> BookModel {
        BookModel::new(BookAttributes::default()).unwrap()
    }

    fn artwork(width: u32, height: u32) -> Texture {
        Texture::from_artwork(Arc::new(RgbaImage::new(width, height))).unwrap()
    }

    #[test]
    fn new_book_is_built_once() {
        let book = book();
        assert_eq!(book.rebuild_count(), 1);
        assert_eq!(book.primitives().len(), 4);
        assert_eq!(book.disposed_count(), 0);
    }

    #[test]
    fn same_format_is_a_no_op() {
        let mut book = book();
        let before = book.parts();
        assert_eq!(book.set_format(BookFormat::Hardcover), Ok(false));
        assert_eq!(book.set_format(BookFormat::Hardcover), Ok(false));
        assert_eq!(book.rebuild_count(), 1);
        assert_eq!(book.parts(), before);
    }

    #[test]
    fn format_round_trip_restores_geometry() {
        let mut book = book();
        let original = book.primitives().to_vec();
        assert_eq!(book.set_format(BookFormat::Softcover), Ok(true));
        assert_eq!(book.primitives().len(), 1);
        assert_eq!(book.set_format(BookFormat::Hardcover), Ok(true));
        assert_eq!(book.primitives(), &original[..]);
        assert_eq!(book.rebuild_count(), 3);
        // Every rebuild released the previous primitives
        assert_eq!(book.disposed_count(), 4 + 1);
    }

    #[test]
    fn thickness_rebuilds_and_rejects_degenerate_values() {
        let mut book = book();
        book.set_thickness(1.6).unwrap();
        assert_eq!(book.attributes().thickness, 1.6);
        assert_eq!(book.rebuild_count(), 2);

        let err = book.set_thickness(MIN_THICKNESS).unwrap_err();
        assert!(matches!(err, AttributeError::ThicknessTooThin { .. }));
        assert_eq!(book.attributes().thickness, 1.6);
        assert_eq!(book.rebuild_count(), 2);
        assert_eq!(book.primitives().len(), 4);
    }

    #[test]
    fn cover_aspect_ratio_sets_width_with_one_rebuild() {
        let mut book = book();
        let outcome = book.apply_texture(SurfaceRole::Cover, artwork(400, 200));
        assert_eq!(outcome, TextureOutcome::Resized { width: 9.0 });
        assert_eq!(book.attributes().width, 9.0);
        assert_eq!(book.rebuild_count(), 2);
        assert_eq!(book.primitives()[0].part.dimensions.x, 9.0);
    }

    #[test]
    fn cover_with_unchanged_aspect_only_swaps_material() {
        let mut book = book();
        // Default book is 3.0 x 4.5, i.e. 2:3
        let outcome = book.apply_texture(SurfaceRole::Cover, artwork(200, 300));
        assert_eq!(outcome, TextureOutcome::MaterialOnly);
        assert_eq!(book.rebuild_count(), 1);
        assert!(book.materials().get(SurfaceRole::Cover).texture.is_some());
    }

    #[test]
    fn extreme_cover_aspect_keeps_width() {
        let mut book = book();
        let outcome = book.apply_texture(SurfaceRole::Cover, artwork(1, 1000));
        assert!(matches!(outcome, TextureOutcome::ResizeRejected { .. }));
        assert_eq!(book.attributes().width, 3.0);
        assert_eq!(book.rebuild_count(), 1);
        assert!(book.materials().get(SurfaceRole::Cover).texture.is_some());
    }

    #[test]
    fn spine_texture_does_not_rebuild() {
        let mut book = book();
        let outcome = book.apply_texture(SurfaceRole::Spine, artwork(10, 500));
        assert_eq!(outcome, TextureOutcome::MaterialOnly);
        assert_eq!(book.rebuild_count(), 1);
    }

    #[test]
    fn snapshot_is_independent_of_later_edits() {
        let mut book = book();
        let snapshot = book.snapshot();
        book.apply_texture(SurfaceRole::Cover, artwork(400, 200));
        book.set_format(BookFormat::Softcover).unwrap();

        assert_eq!(snapshot.primitives.len(), 4);
        assert_eq!(snapshot.attributes.width, 3.0);
        assert!(snapshot.materials.get(SurfaceRole::Cover).texture.is_none());
    }
}
