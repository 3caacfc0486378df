//! Small affine/vector kit shared by every other module.
//!
//! All transforms are 4×4 homogeneous matrices acting on column vectors,
//! `world = M * [i, j, k, 1]ᵀ`. Points are [`Vector3`](crate::Vector3) in f64.
//!
//! The dense SVD used by rigid registration lives in [`svd`]; distance
//! geometry (trilateration) lives in [`distance_geometry`].

pub mod distance_geometry;
pub mod svd;

pub use distance_geometry::{trilaterate, triangle_apex};
pub use svd::{svd, Svd};

use crate::{Matrix3, Matrix4, Vector3};

/// Apply a homogeneous affine to a point.
///
/// The projective row is honoured, so a matrix with a non-trivial last row
/// still maps correctly; for plain affines the divide is by 1.
#[inline]
pub fn apply_affine(m: &Matrix4, p: &Vector3) -> Vector3 {
    let x = m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)] * p.z + m[(0, 3)];
    let y = m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)] * p.z + m[(1, 3)];
    let z = m[(2, 0)] * p.x + m[(2, 1)] * p.y + m[(2, 2)] * p.z + m[(2, 3)];
    let w = m[(3, 0)] * p.x + m[(3, 1)] * p.y + m[(3, 2)] * p.z + m[(3, 3)];
    if w != 0.0 && w != 1.0 {
        Vector3::new(x / w, y / w, z / w)
    } else {
        Vector3::new(x, y, z)
    }
}

/// Invert an affine. Returns `None` when the matrix is singular.
pub fn invert_affine(m: &Matrix4) -> Option<Matrix4> {
    m.try_inverse()
}

/// `outer ∘ inner`: the transform that applies `inner` first.
#[inline]
pub fn compose(outer: &Matrix4, inner: &Matrix4) -> Matrix4 {
    outer * inner
}

/// Upper-left 3×3 block.
#[inline]
pub fn linear_block(m: &Matrix4) -> Matrix3 {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation column.
#[inline]
pub fn translation(m: &Matrix4) -> Vector3 {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Build an affine from a linear block and a translation.
pub fn affine_from_parts(linear: &Matrix3, t: &Vector3) -> Matrix4 {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
    m[(0, 3)] = t.x;
    m[(1, 3)] = t.y;
    m[(2, 3)] = t.z;
    m
}

/// World-space length of one voxel step along each index axis.
///
/// These are the column norms of the linear block, so oblique or sheared
/// voxel-to-world matrices still report the true step length.
pub fn voxel_spacing(model_to_world: &Matrix4) -> [f64; 3] {
    let l = linear_block(model_to_world);
    [
        l.column(0).norm(),
        l.column(1).norm(),
        l.column(2).norm(),
    ]
}

/// Determinant of a 3×3 matrix (explicit cofactor expansion, no pivoting).
#[inline]
pub fn det3(m: &Matrix3) -> f64 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

/// Round a continuous voxel coordinate to the nearest integer index.
///
/// JavaScript-style `round` (half rounds toward +∞) so that a point exactly
/// between two voxels always picks the upper one regardless of sign.
#[inline]
pub fn round_index(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}
