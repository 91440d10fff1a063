//! Mesh generation module
//!
//! Turns axis-aligned boxes into indexed triangle meshes with normals, UVs
//! and per-face role groups.

use std::ops::Range;

use glam::Vec3;

use crate::material::SurfaceRole;

/// Vertex data structure for 3D rendering
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const ATTRIBS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// A run of indices drawn with the material of one role
#[derive(Debug, Clone, PartialEq)]
pub struct IndexGroup {
    pub indices: Range<u32>,
    pub role: SurfaceRole,
}

/// Mesh data containing vertices, indices and material groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub groups: Vec<IndexGroup>,
}

/// Box faces in the fixed order +X, -X, +Y, -Y, +Z, -Z.
///
/// Each entry is (outward normal, face-right axis, face-up axis) as seen from
/// outside the box; right x up == normal keeps the winding counter-clockwise.
const BOX_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a quad (two triangles) with vertices in counter-clockwise order
    pub fn add_quad(&mut self, v0: Vertex, v1: Vertex, v2: Vertex, v3: Vertex) {
        let base = self.vertices.len() as u16;
        self.vertices.extend_from_slice(&[v0, v1, v2, v3]);
        // Two triangles: 0-1-2 and 0-2-3
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Tag every index added since `start` with a role, extending the
    /// previous group when it has the same role.
    fn close_group(&mut self, start: u32, role: SurfaceRole) {
        let end = self.indices.len() as u32;
        if start == end {
            return;
        }
        match self.groups.last_mut() {
            Some(last) if last.role == role && last.indices.end == start => {
                last.indices.end = end;
            }
            _ => self.groups.push(IndexGroup {
                indices: start..end,
                role,
            }),
        }
    }
}

/// Create a box mesh centered at the origin.
///
/// `face_roles` follows the +X, -X, +Y, -Y, +Z, -Z order. UVs span [0, 1] on
/// every face with v = 0 along the top edge as seen from outside, so artwork
/// appears upright on the cover.
pub fn create_box(dimensions: Vec3, face_roles: [SurfaceRole; 6]) -> MeshData {
    let mut mesh = MeshData::new();
    let half = dimensions / 2.0;

    for ((normal, right, up), role) in BOX_FACES.into_iter().zip(face_roles) {
        let start = mesh.indices.len() as u32;
        let center = normal * half;
        let r = right * half;
        let u = up * half;
        let n = normal.to_array();

        let vertex = |position: Vec3, uv: [f32; 2]| Vertex {
            position: position.to_array(),
            normal: n,
            uv,
        };

        mesh.add_quad(
            vertex(center - r - u, [0.0, 1.0]),
            vertex(center + r - u, [1.0, 1.0]),
            vertex(center + r + u, [1.0, 0.0]),
            vertex(center - r + u, [0.0, 0.0]),
        );
        mesh.close_group(start, role);
    }

    mesh
}
