//! Triangulated surfaces and nearest-vertex projection.
//!
//! Only vertex positions matter for projection; faces are kept so that hosts
//! can hand over a complete surface, but no interpolation across triangles is
//! performed.

use crate::error::{LocalizeError, Result};
use crate::linalg;
use crate::{Matrix4, Vector3};

/// A surface mesh in model space with its model-to-world matrix.
#[derive(Debug, Clone)]
pub struct Mesh {
    positions: Vec<f32>,
    faces: Vec<[u32; 3]>,
    world_matrix: Matrix4,
    world_inverse: Matrix4,
}

/// Result of [`project_onto_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshProjection {
    /// Winning vertex mapped to world space.
    pub point: Vector3,
    /// Distance to the winning vertex, measured in model space.
    pub distance: f64,
    pub vertex_index: usize,
}

impl Mesh {
    /// # Errors
    ///
    /// [`LocalizeError::ShapeMismatch`] if `positions` is not a multiple of 3,
    /// [`LocalizeError::SingularTransform`] if `world_matrix` is not invertible.
    pub fn new(positions: Vec<f32>, faces: Vec<[u32; 3]>, world_matrix: Matrix4) -> Result<Self> {
        if positions.len() % 3 != 0 {
            return Err(LocalizeError::ShapeMismatch {
                expected: positions.len() - positions.len() % 3,
                found: positions.len(),
            });
        }
        let world_inverse =
            linalg::invert_affine(&world_matrix).ok_or(LocalizeError::SingularTransform)?;
        Ok(Self {
            positions,
            faces,
            world_matrix,
            world_inverse,
        })
    }

    /// Mesh in world space already (identity world matrix).
    pub fn from_vertices(vertices: &[Vector3], faces: Vec<[u32; 3]>) -> Self {
        let positions = vertices
            .iter()
            .flat_map(|v| [v.x as f32, v.y as f32, v.z as f32])
            .collect();
        Self {
            positions,
            faces,
            world_matrix: Matrix4::identity(),
            world_inverse: Matrix4::identity(),
        }
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn world_matrix(&self) -> &Matrix4 {
        &self.world_matrix
    }

    /// Model-space position of vertex `i`.
    #[inline]
    pub fn vertex(&self, i: usize) -> Option<Vector3> {
        let p = self.positions.get(3 * i..3 * i + 3)?;
        Some(Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
    }

    /// World-space position of vertex `i`.
    pub fn world_vertex(&self, i: usize) -> Option<Vector3> {
        self.vertex(i)
            .map(|v| linalg::apply_affine(&self.world_matrix, &v))
    }
}

/// Project a world point onto the nearest vertex of `mesh`.
///
/// The search runs in model space (the point is pulled back through the inverse
/// world matrix). `distance` is the model-space distance and is deliberately
/// not rescaled to world units: callers compare it against millimetre
/// thresholds as is, which is exact only when the world matrix carries no
/// scale.
///
/// Returns `None` for a mesh without vertices.
pub fn project_onto_mesh(world_point: &Vector3, mesh: &Mesh) -> Option<MeshProjection> {
    let local = linalg::apply_affine(&mesh.world_inverse, world_point);

    let mut best_index = None;
    let mut best_d2 = f64::INFINITY;
    for (i, p) in mesh.positions.chunks_exact(3).enumerate() {
        let dx = p[0] as f64 - local.x;
        let dy = p[1] as f64 - local.y;
        let dz = p[2] as f64 - local.z;
        let d2 = dx * dx + dy * dy + dz * dz;
        if d2 < best_d2 {
            best_d2 = d2;
            best_index = Some(i);
        }
    }

    let vertex_index = best_index?;
    Some(MeshProjection {
        point: mesh.world_vertex(vertex_index)?,
        distance: best_d2.sqrt(),
        vertex_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetra() -> Vec<Vector3> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 10.0, 0.0),
            Vector3::new(0.0, 0.0, 10.0),
        ]
    }

    #[test]
    fn test_own_vertex_projects_exactly() {
        let mesh = Mesh::from_vertices(&tetra(), vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]]);
        for (k, v) in tetra().iter().enumerate() {
            let p = project_onto_mesh(v, &mesh).unwrap();
            assert_eq!(p.vertex_index, k);
            assert_eq!(p.distance, 0.0);
            assert_eq!(p.point, *v);
        }
    }

    #[test]
    fn test_nearest_vertex_not_surface() {
        let mesh = Mesh::from_vertices(&tetra(), vec![[1, 2, 3]]);
        // Closest surface point would be on the face; the projector picks a vertex.
        let p = project_onto_mesh(&Vector3::new(4.0, 4.0, 4.0), &mesh).unwrap();
        assert_eq!(p.vertex_index, 0);
        assert!((p.distance - 48.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_translated_world_matrix() {
        let mut m = Matrix4::identity();
        m[(0, 3)] = 100.0;
        let positions = vec![0.0, 0.0, 0.0, 5.0, 0.0, 0.0];
        let mesh = Mesh::new(positions, Vec::new(), m).unwrap();
        let p = project_onto_mesh(&Vector3::new(104.0, 0.0, 0.0), &mesh).unwrap();
        assert_eq!(p.vertex_index, 1);
        assert_eq!(p.point, Vector3::new(105.0, 0.0, 0.0));
        assert!((p.distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_stays_in_model_units() {
        let mut m = Matrix4::identity();
        m[(0, 0)] = 2.0;
        m[(1, 1)] = 2.0;
        m[(2, 2)] = 2.0;
        let mesh = Mesh::new(vec![1.0, 0.0, 0.0], Vec::new(), m).unwrap();
        // World (4, 0, 0) is model (2, 0, 0): one model unit from the vertex,
        // two world units from its world position (2, 0, 0).
        let p = project_onto_mesh(&Vector3::new(4.0, 0.0, 0.0), &mesh).unwrap();
        assert!((p.distance - 1.0).abs() < 1e-12);
        assert!(((p.point - Vector3::new(4.0, 0.0, 0.0)).norm() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = Mesh::from_vertices(&[], Vec::new());
        assert!(project_onto_mesh(&Vector3::new(0.0, 0.0, 0.0), &mesh).is_none());
    }

    #[test]
    fn test_bad_position_length() {
        assert!(Mesh::new(vec![0.0; 7], Vec::new(), Matrix4::identity()).is_err());
    }
}
