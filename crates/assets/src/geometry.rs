use glam::{Mat3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Linear RGB color, components in 0..=1.
pub type Color = [f32; 3];

/// Errors from geometry operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("geometry has no vertices")]
    Empty,
    #[error("face {face} references vertex {index} but only {vertex_count} vertices exist")]
    IndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("{uv_sets} uv sets for {faces} faces")]
    UvMismatch { faces: usize, uv_sets: usize },
}

/// A triangle with its shading attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub normal: Vec3,
    /// Either empty or one normal per corner.
    pub vertex_normals: Vec<Vec3>,
    pub color: Color,
    /// Either empty or one color per corner.
    pub vertex_colors: Vec<Color>,
    pub material_index: u32,
    pub centroid: Vec3,
}

impl Face {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self {
            a,
            b,
            c,
            normal: Vec3::ZERO,
            vertex_normals: Vec::new(),
            color: [1.0, 1.0, 1.0],
            vertex_colors: Vec::new(),
            material_index: 0,
            centroid: Vec3::ZERO,
        }
    }

    pub fn indices(&self) -> [u32; 3] {
        [self.a, self.b, self.c]
    }
}

/// Indexed triangle geometry with per-face normals, colors and UVs.
///
/// `face_uvs` is either empty or holds exactly one UV triple per face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Face>,
    pub face_uvs: Vec<[Vec2; 3]>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Axis-aligned box centered on the origin, four vertices per side so that
    /// every side carries its own normals and UVs.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let half = Vec3::new(width, height, depth) * 0.5;
        // (outward normal, u axis, v axis), with u x v == normal
        let sides = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut geo = Geometry::new();
        for (normal, u, v) in sides {
            let center = normal * half;
            let du = u * (u * half).length();
            let dv = v * (v * half).length();
            geo.push_quad(
                [
                    center - du - dv,
                    center + du - dv,
                    center + du + dv,
                    center - du + dv,
                ],
                normal,
            );
        }
        geo
    }

    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&corners);
        let uv = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        for (x, y, z) in [(0usize, 1usize, 2usize), (0, 2, 3)] {
            let mut face = Face::new(base + x as u32, base + y as u32, base + z as u32);
            face.normal = normal;
            face.vertex_normals = vec![normal; 3];
            face.centroid = (corners[x] + corners[y] + corners[z]) / 3.0;
            self.faces.push(face);
            self.face_uvs.push([uv[x], uv[y], uv[z]]);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Check that faces only reference existing vertices and that UVs line up with faces.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let vertex_count = self.vertices.len();
        for (face_idx, face) in self.faces.iter().enumerate() {
            for index in face.indices() {
                if index as usize >= vertex_count {
                    return Err(GeometryError::IndexOutOfRange {
                        face: face_idx,
                        index,
                        vertex_count,
                    });
                }
            }
        }
        if !self.face_uvs.is_empty() && self.face_uvs.len() != self.faces.len() {
            return Err(GeometryError::UvMismatch {
                faces: self.faces.len(),
                uv_sets: self.face_uvs.len(),
            });
        }
        Ok(())
    }

    /// Append `other` to this geometry without dropping any attribute.
    ///
    /// Vertices and centroids go through `transform`; face and vertex normals go
    /// through its normal matrix. Face indices are offset by the vertex count
    /// this geometry had before the call, material indices by
    /// `material_index_offset`.
    pub fn merge(&mut self, other: &Geometry, transform: Option<Mat4>, material_index_offset: u32) {
        let vertex_offset = self.vertices.len() as u32;
        let matrix = transform.filter(|m| *m != Mat4::IDENTITY);
        let normal_matrix = matrix.map(|m| Mat3::from_mat4(m).inverse().transpose());

        let point = |p: Vec3| match matrix {
            Some(m) => m.transform_point3(p),
            None => p,
        };
        let normal = |n: Vec3| match normal_matrix {
            Some(nm) => (nm * n).normalize_or_zero(),
            None => n,
        };

        self.vertices.reserve(other.vertices.len());
        self.vertices.extend(other.vertices.iter().map(|v| point(*v)));

        self.faces.reserve(other.faces.len());
        for face in &other.faces {
            self.faces.push(Face {
                a: face.a + vertex_offset,
                b: face.b + vertex_offset,
                c: face.c + vertex_offset,
                normal: normal(face.normal),
                vertex_normals: face.vertex_normals.iter().map(|n| normal(*n)).collect(),
                color: face.color,
                vertex_colors: face.vertex_colors.clone(),
                material_index: face.material_index + material_index_offset,
                centroid: point(face.centroid),
            });
        }

        self.face_uvs.extend_from_slice(&other.face_uvs);
    }

    /// Axis-aligned bounds as (min, max), `None` when empty.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(min, max), v| (min.min(*v), max.max(*v))),
        )
    }

    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            *v += offset;
        }
        for face in &mut self.faces {
            face.centroid += offset;
        }
    }

    /// Move the geometry so its bounding-box midpoint (rounded to whole units)
    /// sits on the origin. Returns that midpoint, which is where the geometry
    /// must be placed to keep its former world position.
    pub fn recenter(&mut self) -> Result<Vec3, GeometryError> {
        let (min, max) = self.bounding_box().ok_or(GeometryError::Empty)?;
        let origin = ((min + max) * 0.5).round();
        self.translate(-origin);
        Ok(origin)
    }

    /// Flatten into plain arrays for transport or storage. Positions are
    /// quantized to four decimal places; UVs are kept as is.
    pub fn to_flat(&self) -> FlatGeometry {
        FlatGeometry {
            positions: self
                .vertices
                .iter()
                .flat_map(|v| [quantize(v.x), quantize(v.y), quantize(v.z)])
                .collect(),
            indices: self.faces.iter().flat_map(|f| f.indices()).collect(),
            uvs: self
                .face_uvs
                .iter()
                .flat_map(|uv| uv.iter().flat_map(|p| [p.x, p.y]))
                .collect(),
        }
    }
}

fn quantize(v: f32) -> f32 {
    if v.fract() == 0.0 {
        v
    } else {
        (v * 10_000.0).round() / 10_000.0
    }
}

/// Geometry flattened into plain number arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatGeometry {
    /// x, y, z per vertex.
    pub positions: Vec<f32>,
    /// a, b, c per face.
    pub indices: Vec<u32>,
    /// u, v per face corner.
    pub uvs: Vec<f32>,
}

impl FlatGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn face_count(&self) -> usize {
        self.indices.len() / 3
    }
}
