//! Parametric book geometry
//!
//! Turns book attributes into a list of axis-aligned parts. Hardcover and
//! softcover books differ in topology: a hardcover is four separate boxes so
//! each surface gets its own lighting response and artwork, a softcover is a
//! single block whose six faces are mapped to roles.

use std::fmt;
use std::str::FromStr;

use glam::Vec3;

use crate::config::CONFIG;
use crate::error::AttributeError;
use crate::material::SurfaceRole;
use crate::mesh::{create_box, MeshData};

/// Thickness of the hardcover boards
pub const COVER_THICKNESS: f32 = 0.08;

/// How far the boards extend past the page block
pub const OVERHANG: f32 = 0.1;

/// Smallest thickness that still leaves a page block between the boards
pub const MIN_THICKNESS: f32 = 2.0 * COVER_THICKNESS;

/// Softcover face table in +X, -X, +Y, -Y, +Z, -Z order
pub const SOFTCOVER_FACE_ROLES: [SurfaceRole; 6] = [
    SurfaceRole::Pages,
    SurfaceRole::Spine,
    SurfaceRole::Pages,
    SurfaceRole::Pages,
    SurfaceRole::Cover,
    SurfaceRole::Back,
];

/// Binding style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BookFormat {
    #[default]
    Hardcover,
    Softcover,
}

impl BookFormat {
    pub fn display_name(&self) -> &'static str {
        match self {
            BookFormat::Hardcover => "Hardcover",
            BookFormat::Softcover => "Softcover",
        }
    }

    pub fn all() -> &'static [BookFormat] {
        &[BookFormat::Hardcover, BookFormat::Softcover]
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookFormat::Hardcover => "hardcover",
            BookFormat::Softcover => "softcover",
        })
    }
}

impl FromStr for BookFormat {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardcover" => Ok(BookFormat::Hardcover),
            "softcover" => Ok(BookFormat::Softcover),
            _ => Err(AttributeError::UnknownFormat(s.to_string())),
        }
    }
}

/// Physical attributes of a book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookAttributes {
    pub width: f32,
    pub height: f32,
    pub thickness: f32,
    pub format: BookFormat,
}

impl Default for BookAttributes {
    fn default() -> Self {
        Self {
            width: CONFIG.book.width,
            height: CONFIG.book.height,
            thickness: CONFIG.book.thickness,
            format: BookFormat::default(),
        }
    }
}

impl BookAttributes {
    /// Check the attributes against the constraints of every format.
    ///
    /// Thickness is held to the hardcover minimum regardless of the current
    /// format, so switching format can never produce a degenerate page block.
    pub fn validate(&self) -> Result<(), AttributeError> {
        validate_dimensions(self.width, self.height, self.thickness)
    }
}

/// Which roles the faces of a part carry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartFaces {
    /// Every face uses the same role
    Uniform(SurfaceRole),
    /// One role per face, +X, -X, +Y, -Y, +Z, -Z
    PerFace([SurfaceRole; 6]),
}

impl PartFaces {
    pub fn face_roles(&self) -> [SurfaceRole; 6] {
        match *self {
            PartFaces::Uniform(role) => [role; 6],
            PartFaces::PerFace(roles) => roles,
        }
    }
}

/// One axis-aligned box of the book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshPart {
    pub faces: PartFaces,
    /// Box size along x, y, z
    pub dimensions: Vec3,
    /// Box center relative to the book origin
    pub position: Vec3,
    pub casts_shadow: bool,
}

impl MeshPart {
    fn solid(role: SurfaceRole, dimensions: Vec3, position: Vec3) -> Self {
        Self {
            faces: PartFaces::Uniform(role),
            dimensions,
            position,
            casts_shadow: true,
        }
    }

    /// The part's role when all faces share one
    pub fn role(&self) -> Option<SurfaceRole> {
        match self.faces {
            PartFaces::Uniform(role) => Some(role),
            PartFaces::PerFace(_) => None,
        }
    }

    pub fn to_mesh(&self) -> MeshData {
        create_box(self.dimensions, self.faces.face_roles())
    }
}

fn check_positive(name: &'static str, value: f32) -> Result<(), AttributeError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AttributeError::NonPositive { name, value })
    }
}

/// Validate raw dimensions so that every part of every format has positive size
pub fn validate_dimensions(width: f32, height: f32, thickness: f32) -> Result<(), AttributeError> {
    check_positive("width", width)?;
    check_positive("height", height)?;
    check_positive("thickness", thickness)?;

    if width <= OVERHANG {
        return Err(AttributeError::TooSmallForPages {
            name: "width",
            value: width,
            minimum: OVERHANG,
        });
    }
    if height <= 2.0 * OVERHANG {
        return Err(AttributeError::TooSmallForPages {
            name: "height",
            value: height,
            minimum: 2.0 * OVERHANG,
        });
    }
    if thickness <= MIN_THICKNESS {
        return Err(AttributeError::ThicknessTooThin {
            thickness,
            minimum: MIN_THICKNESS,
        });
    }
    Ok(())
}

/// Build the parts of a book.
///
/// Degenerate inputs are rejected rather than clamped; the page block never
/// gets zero or negative depth.
pub fn build(
    format: BookFormat,
    width: f32,
    height: f32,
    thickness: f32,
) -> Result<Vec<MeshPart>, AttributeError> {
    validate_dimensions(width, height, thickness)?;

    let parts = match format {
        BookFormat::Hardcover => build_hardcover(width, height, thickness),
        BookFormat::Softcover => build_softcover(width, height, thickness),
    };
    Ok(parts)
}

/// Build the parts for a full set of attributes
pub fn build_book(attributes: &BookAttributes) -> Result<Vec<MeshPart>, AttributeError> {
    build(
        attributes.format,
        attributes.width,
        attributes.height,
        attributes.thickness,
    )
}

fn build_hardcover(width: f32, height: f32, thickness: f32) -> Vec<MeshPart> {
    let c = COVER_THICKNESS;
    let o = OVERHANG;

    let front = MeshPart::solid(
        SurfaceRole::Cover,
        Vec3::new(width, height, c),
        Vec3::new(0.0, 0.0, thickness / 2.0 - c / 2.0),
    );
    let back = MeshPart::solid(
        SurfaceRole::Back,
        Vec3::new(width, height, c),
        Vec3::new(0.0, 0.0, -thickness / 2.0 + c / 2.0),
    );
    // Abuts the left edge of both boards
    let spine = MeshPart::solid(
        SurfaceRole::Spine,
        Vec3::new(c, height, thickness),
        Vec3::new(-width / 2.0 - c / 2.0, 0.0, 0.0),
    );
    // Shifted away from the spine so the page edge shows on the opposite side
    let pages = MeshPart::solid(
        SurfaceRole::Pages,
        Vec3::new(width - o, height - 2.0 * o, thickness - 2.0 * c),
        Vec3::new(o / 2.0, 0.0, 0.0),
    );

    vec![front, back, spine, pages]
}

fn build_softcover(width: f32, height: f32, thickness: f32) -> Vec<MeshPart> {
    vec![MeshPart {
        faces: PartFaces::PerFace(SOFTCOVER_FACE_ROLES),
        dimensions: Vec3::new(width, height, thickness),
        position: Vec3::ZERO,
        casts_shadow: true,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn hardcover(width: f32, height: f32, thickness: f32) -> Vec<MeshPart> {
        build(BookFormat::Hardcover, width, height, thickness).unwrap()
    }

    #[test]
    fn hardcover_has_one_part_per_role() {
        for &(w, h, t) in &[(3.0, 4.5, 0.8), (0.5, 0.5, 0.17), (12.0, 20.0, 5.0)] {
            let parts = hardcover(w, h, t);
            assert_eq!(parts.len(), 4);
            let roles: HashSet<_> = parts.iter().filter_map(MeshPart::role).collect();
            assert_eq!(roles, SurfaceRole::ALL.into_iter().collect());
        }
    }

    #[test]
    fn hardcover_page_block_depth_is_thickness_minus_boards() {
        let parts = hardcover(3.0, 4.5, 0.8);
        let pages = parts
            .iter()
            .find(|p| p.role() == Some(SurfaceRole::Pages))
            .unwrap();
        let expected = 0.8 - 2.0 * COVER_THICKNESS;
        assert!((pages.dimensions.z - expected).abs() < 1e-6);
        assert!(pages.dimensions.z > 0.0);
        assert_eq!(pages.dimensions.x, 3.0 - OVERHANG);
        assert_eq!(pages.dimensions.y, 4.5 - 2.0 * OVERHANG);
        assert_eq!(pages.position, Vec3::new(OVERHANG / 2.0, 0.0, 0.0));
    }

    #[test]
    fn hardcover_boards_sit_flush_with_the_book_faces() {
        let parts = hardcover(3.0, 4.5, 0.8);
        let front = parts[0];
        let back = parts[1];
        let spine = parts[2];
        assert_eq!(front.role(), Some(SurfaceRole::Cover));
        assert!((front.position.z + front.dimensions.z / 2.0 - 0.4).abs() < 1e-6);
        assert!((back.position.z - back.dimensions.z / 2.0 + 0.4).abs() < 1e-6);
        // Spine's right face touches the boards' left edge
        assert!((spine.position.x + spine.dimensions.x / 2.0 + 1.5).abs() < 1e-6);
        assert_eq!(spine.dimensions.z, 0.8);
    }

    #[test]
    fn thin_books_are_rejected() {
        for t in [MIN_THICKNESS, 0.1, 0.0, -1.0] {
            let result = build(BookFormat::Hardcover, 3.0, 4.5, t);
            assert!(result.is_err(), "thickness {t} should be rejected");
        }
        assert!(matches!(
            build(BookFormat::Hardcover, 3.0, 4.5, 0.16),
            Err(AttributeError::ThicknessTooThin { .. })
        ));
    }

    #[test]
    fn non_finite_and_tiny_dimensions_are_rejected() {
        assert!(matches!(
            build(BookFormat::Softcover, f32::NAN, 4.5, 0.8),
            Err(AttributeError::NonPositive { name: "width", .. })
        ));
        assert!(matches!(
            build(BookFormat::Hardcover, 0.05, 4.5, 0.8),
            Err(AttributeError::TooSmallForPages { name: "width", .. })
        ));
        assert!(matches!(
            build(BookFormat::Hardcover, 3.0, 0.2, 0.8),
            Err(AttributeError::TooSmallForPages { name: "height", .. })
        ));
    }

    #[test]
    fn softcover_is_one_block_with_fixed_face_table() {
        let parts = build(BookFormat::Softcover, 3.0, 4.5, 0.8).unwrap();
        assert_eq!(parts.len(), 1);
        let part = parts[0];
        assert_eq!(part.dimensions, Vec3::new(3.0, 4.5, 0.8));
        assert_eq!(part.role(), None);

        let faces = part.faces.face_roles();
        assert_eq!(faces, SOFTCOVER_FACE_ROLES);
        assert_eq!(faces[4], SurfaceRole::Cover);
        assert_eq!(faces[5], SurfaceRole::Back);
        let edges = &faces[..4];
        assert_eq!(edges.iter().filter(|r| **r == SurfaceRole::Pages).count(), 3);
        assert_eq!(edges.iter().filter(|r| **r == SurfaceRole::Spine).count(), 1);
    }

    #[test]
    fn builds_are_deterministic() {
        for format in BookFormat::all() {
            let a = build(*format, 2.7, 4.1, 1.3).unwrap();
            let b = build(*format, 2.7, 4.1, 1.3).unwrap();
            assert_eq!(a, b);
            let meshes_a: Vec<_> = a.iter().map(MeshPart::to_mesh).collect();
            let meshes_b: Vec<_> = b.iter().map(MeshPart::to_mesh).collect();
            assert_eq!(meshes_a, meshes_b);
        }
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("Hardcover".parse::<BookFormat>(), Ok(BookFormat::Hardcover));
        assert_eq!(" softcover ".parse::<BookFormat>(), Ok(BookFormat::Softcover));
        assert!("spiral".parse::<BookFormat>().is_err());
    }

    #[test]
    fn default_attributes_are_valid() {
        let attributes = BookAttributes::default();
        assert_eq!(attributes.format, BookFormat::Hardcover);
        assert!(attributes.validate().is_ok());
        assert_eq!(build_book(&attributes).unwrap().len(), 4);
    }
}
