//! CPU-side triangle meshes: OBJ loading and a built-in cube.

use std::collections::HashMap;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use tracing::{debug, warn};

use crate::error::{ResourceError, ResourceResult};

/// Mesh vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl MeshVertex {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            color,
            ..Default::default()
        }
    }

    /// Bitwise identity, used to merge duplicate vertices.
    fn key(&self) -> [u32; 11] {
        bytemuck::cast(*self)
    }
}

/// Vertices plus an optional index list (empty means non-indexed).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Loads every model in an OBJ file into one indexed mesh.
    ///
    /// Faces are triangulated and identical vertices are merged. Missing
    /// vertex colours default to white.
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ignore_lines: true,
                ignore_points: true,
                ..Default::default()
            },
        )?;

        if let Err(e) = materials {
            warn!("Ignoring materials of '{}': {}", path.display(), e);
        }

        let mut builder = MeshBuilder::default();
        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                let position = Vec3::from_slice(&mesh.positions[3 * i..3 * i + 3]);
                let color = mesh
                    .vertex_color
                    .get(3 * i..3 * i + 3)
                    .map_or(Vec3::ONE, Vec3::from_slice);
                let normal = mesh
                    .normals
                    .get(3 * i..3 * i + 3)
                    .map_or(Vec3::ZERO, Vec3::from_slice);
                let uv = mesh
                    .texcoords
                    .get(2 * i..2 * i + 2)
                    .map_or(Vec2::ZERO, Vec2::from_slice);

                builder.push(MeshVertex {
                    position,
                    color,
                    normal,
                    uv,
                });
            }
        }

        let data = builder.build();
        if data.vertices.is_empty() {
            return Err(ResourceError::Empty(path.to_path_buf()));
        }

        debug!(
            "Loaded '{}': {} model(s), {} unique vertices, {} indices",
            path.display(),
            models.len(),
            data.vertices.len(),
            data.indices.len()
        );

        Ok(data)
    }

    /// Unit cube centred on `offset`, 36 non-indexed vertices with one colour
    /// per face.
    pub fn cube(offset: Vec3) -> Self {
        const FACES: [(Vec3, Vec3); 6] = [
            // (outward normal, colour)
            (Vec3::NEG_X, Vec3::new(0.9, 0.9, 0.9)),
            (Vec3::X, Vec3::new(0.8, 0.8, 0.1)),
            (Vec3::NEG_Y, Vec3::new(0.9, 0.6, 0.1)),
            (Vec3::Y, Vec3::new(0.8, 0.1, 0.1)),
            (Vec3::Z, Vec3::new(0.1, 0.1, 0.8)),
            (Vec3::NEG_Z, Vec3::new(0.1, 0.8, 0.1)),
        ];

        let mut vertices = Vec::with_capacity(36);
        for (normal, color) in FACES {
            // Two axes spanning the face.
            let u = if normal.x != 0.0 { Vec3::Y } else { Vec3::X };
            let v = normal.cross(u);
            let center = normal * 0.5;
            let corners = [
                center - u * 0.5 - v * 0.5,
                center + u * 0.5 - v * 0.5,
                center + u * 0.5 + v * 0.5,
                center - u * 0.5 + v * 0.5,
            ];
            for corner in [0, 1, 2, 0, 2, 3] {
                vertices.push(MeshVertex {
                    position: corners[corner] + offset,
                    color,
                    normal,
                    uv: Vec2::ZERO,
                });
            }
        }

        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Accumulates vertices, merging bitwise-identical ones.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    unique: HashMap<[u32; 11], u32>,
}

impl MeshBuilder {
    pub fn push(&mut self, vertex: MeshVertex) {
        let next = self.vertices.len() as u32;
        let index = *self.unique.entry(vertex.key()).or_insert_with(|| {
            self.vertices.push(vertex);
            next
        });
        self.indices.push(index);
    }

    pub fn build(self) -> MeshData {
        MeshData {
            vertices: self.vertices,
            indices: self.indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 44);
        assert_eq!(std::mem::offset_of!(MeshVertex, normal), 24);
        assert_eq!(std::mem::offset_of!(MeshVertex, uv), 36);
    }

    #[test]
    fn test_builder_merges_duplicates() {
        let a = MeshVertex::new(Vec3::ZERO, Vec3::ONE);
        let b = MeshVertex::new(Vec3::X, Vec3::ONE);

        let mut builder = MeshBuilder::default();
        for vertex in [a, b, a, b, a] {
            builder.push(vertex);
        }
        let mesh = builder.build();
        assert_eq!(mesh.vertices, vec![a, b]);
        assert_eq!(mesh.indices, vec![0, 1, 0, 1, 0]);
        assert!(mesh.is_indexed());
    }

    #[test]
    fn test_cube() {
        let offset = Vec3::new(0.0, 0.0, 2.5);
        let cube = MeshData::cube(offset);
        assert_eq!(cube.vertices.len(), 36);
        assert!(!cube.is_indexed());

        for vertex in &cube.vertices {
            let local = vertex.position - offset;
            assert!(local.abs().max_element() <= 0.5 + 1e-6);
            // Every vertex lies on the face its normal points out of.
            assert!((local.dot(vertex.normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cube_triangles_wind_outwards() {
        let cube = MeshData::cube(Vec3::ZERO);
        for triangle in cube.vertices.chunks_exact(3) {
            let edge1 = triangle[1].position - triangle[0].position;
            let edge2 = triangle[2].position - triangle[0].position;
            assert!(edge1.cross(edge2).dot(triangle[0].normal) > 0.0);
        }
    }

    #[test]
    fn test_load_missing_obj() {
        let result = MeshData::load_obj(Path::new("does/not/exist.obj"));
        assert!(matches!(result, Err(ResourceError::Obj(_))));
    }
}
