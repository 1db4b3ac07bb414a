use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use crate::error::{PhysicsError, Result};

const CONVEXITY_TOLERANCE: f32 = 1e-4;

/// Planar polygon of a convex hull, wound counter-clockwise seen from outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HullFace {
    pub indices: Vec<u32>,
    /// Outward unit normal in the hull's local frame.
    pub normal: Vec3,
}

/// Convex polyhedron in its local (unscaled) frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvexHull {
    vertices: Vec<Vec3>,
    faces: Vec<HullFace>,
    edges: Vec<[u32; 2]>,
}

impl ConvexHull {
    /// Axis-aligned box centred on the origin.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let vertices = (0..8u32)
            .map(|i| {
                Vec3::new(
                    if i & 1 != 0 { half_extents.x } else { -half_extents.x },
                    if i & 2 != 0 { half_extents.y } else { -half_extents.y },
                    if i & 4 != 0 { half_extents.z } else { -half_extents.z },
                )
            })
            .collect();
        let faces = vec![
            vec![1, 3, 7, 5],
            vec![0, 4, 6, 2],
            vec![2, 6, 7, 3],
            vec![0, 1, 5, 4],
            vec![4, 5, 7, 6],
            vec![0, 2, 3, 1],
        ];
        Self::assemble(vertices, faces)
    }

    /// Builds a hull from explicit polygons. Winding is corrected to face
    /// outward; non-convex or degenerate input is rejected.
    pub fn from_faces(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>) -> Result<Self> {
        if vertices.len() < 4 {
            return Err(PhysicsError::InvalidHull(format!(
                "need at least 4 vertices, got {}",
                vertices.len()
            )));
        }
        if faces.len() < 4 {
            return Err(PhysicsError::InvalidHull(format!(
                "need at least 4 faces, got {}",
                faces.len()
            )));
        }
        for (face_idx, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(PhysicsError::InvalidHull(format!(
                    "face {face_idx} has only {} vertices",
                    face.len()
                )));
            }
            if let Some(bad) = face.iter().find(|&&i| i as usize >= vertices.len()) {
                return Err(PhysicsError::InvalidHull(format!(
                    "face {face_idx} references missing vertex {bad}"
                )));
            }
        }

        let hull = Self::assemble(vertices, faces);
        let scale = hull.local_aabb().extent().max_element().max(1.0);

        for (face_idx, face) in hull.faces.iter().enumerate() {
            if face.normal == Vec3::ZERO {
                return Err(PhysicsError::InvalidHull(format!(
                    "face {face_idx} has zero area"
                )));
            }
            let origin = hull.vertices[face.indices[0] as usize];
            let outside = hull
                .vertices
                .iter()
                .any(|v| face.normal.dot(*v - origin) > CONVEXITY_TOLERANCE * scale);
            if outside {
                return Err(PhysicsError::InvalidHull(format!(
                    "vertices lie in front of face {face_idx}; hull is not convex"
                )));
            }
        }

        Ok(hull)
    }

    fn assemble(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>) -> Self {
        let centroid = vertices.iter().copied().sum::<Vec3>() / vertices.len().max(1) as f32;

        let faces: Vec<HullFace> = faces
            .into_iter()
            .map(|mut indices| {
                let mut area_normal = Vec3::ZERO;
                let mut face_center = Vec3::ZERO;
                for k in 0..indices.len() {
                    let a = vertices[indices[k] as usize];
                    let b = vertices[indices[(k + 1) % indices.len()] as usize];
                    area_normal += a.cross(b);
                    face_center += a;
                }
                face_center /= indices.len() as f32;

                let mut normal = area_normal.normalize_or_zero();
                if normal.dot(face_center - centroid) < 0.0 {
                    normal = -normal;
                    indices.reverse();
                }
                HullFace { indices, normal }
            })
            .collect();

        let mut edges: Vec<[u32; 2]> = faces
            .iter()
            .flat_map(|face| {
                let n = face.indices.len();
                (0..n).map(move |k| {
                    let a = face.indices[k];
                    let b = face.indices[(k + 1) % n];
                    [a.min(b), a.max(b)]
                })
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();

        Self {
            vertices,
            faces,
            edges,
        }
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[HullFace] {
        &self.faces
    }

    pub fn edges(&self) -> &[[u32; 2]] {
        &self.edges
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }
}
