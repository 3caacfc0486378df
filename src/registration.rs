//! Rigid point-set registration (Kabsch / orthogonal Procrustes).
//!
//! Given paired points `fromᵢ ↔ toᵢ`, find the rotation `R` and translation
//! `t` minimizing `Σ ‖R·fromᵢ + t − toᵢ‖²`. Typical use is mapping stereotactic
//! fiducials from frame space into tkrRAS.
//!
//! 1. Center both sets on their centroids.
//! 2. Build the cross-covariance `H = Σ xᵢ yᵢᵀ`.
//! 3. `H = U·D·Vᵀ` via [`linalg::svd`](crate::linalg::svd).
//! 4. `R = V·Uᵀ`; if `det(R) < 0` the solution is a reflection, which happens
//!    for coplanar input where the smallest singular value is ~0. The right
//!    singular vector of that value is negated and `R` recomputed.
//! 5. `t = centroid_to − R·centroid_from`.

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::{LocalizeError, Result};
use crate::linalg::{self, det3};
use crate::{Matrix3, Matrix4, Vector3};

/// Minimum number of point pairs for a well-posed rigid fit.
pub const MIN_POINTS: usize = 3;

/// A rotation followed by a translation: `p ↦ R·p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: Matrix3,
    pub translation: Vector3,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    #[inline]
    pub fn apply(&self, p: &Vector3) -> Vector3 {
        self.rotation * p + self.translation
    }

    /// Homogeneous 4×4 form.
    pub fn to_matrix4(&self) -> Matrix4 {
        linalg::affine_from_parts(&self.rotation, &self.translation)
    }

    /// The inverse transform (`Rᵀ`, `−Rᵀ·t`).
    pub fn inverse(&self) -> Self {
        let rt = self.rotation.transpose();
        Self {
            rotation: rt,
            translation: -(rt * self.translation),
        }
    }

    /// Root-mean-square residual of the mapped `from` points against `to`.
    ///
    /// Pairs beyond the shorter slice are ignored. Returns 0 for empty input.
    pub fn rms_error(&self, from: &[Vector3], to: &[Vector3]) -> f64 {
        let n = from.len().min(to.len());
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = from
            .iter()
            .zip(to.iter())
            .map(|(f, t)| (self.apply(f) - t).norm_squared())
            .sum();
        (sum / n as f64).sqrt()
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Compute the least-squares rigid transform mapping `from` onto `to`.
///
/// Points are paired by index; when the slices differ in length the extra
/// points of the longer one are ignored.
///
/// # Errors
///
/// [`LocalizeError::InsufficientPoints`] when fewer than three pairs are given.
pub fn register_rigid(from: &[Vector3], to: &[Vector3]) -> Result<RigidTransform> {
    let n = from.len().min(to.len());
    if n < MIN_POINTS {
        return Err(LocalizeError::InsufficientPoints {
            required: MIN_POINTS,
            found: n,
        });
    }
    let from = &from[..n];
    let to = &to[..n];

    let centroid_from = centroid(from);
    let centroid_to = centroid(to);

    let mut h = Matrix3::zeros();
    for (f, t) in from.iter().zip(to.iter()) {
        let x = f - centroid_from;
        let y = t - centroid_to;
        h += x * y.transpose();
    }

    let decomposition = linalg::svd(&DMatrix::from_column_slice(3, 3, h.as_slice()));
    if let Err(e) = decomposition.ensure_converged() {
        debug!("register_rigid: {e}, keeping the best-so-far rotation");
    }
    let u = Matrix3::from_column_slice(decomposition.u.as_slice());
    let mut v = Matrix3::from_column_slice(decomposition.v.as_slice());

    let mut rotation = v * u.transpose();
    if det3(&rotation) < 0.0 {
        debug!(
            "register_rigid: reflection detected (singular values {:?}), flipping last axis",
            decomposition.s.as_slice()
        );
        v.column_mut(2).neg_mut();
        rotation = v * u.transpose();
    }

    let translation = centroid_to - rotation * centroid_from;
    Ok(RigidTransform {
        rotation,
        translation,
    })
}

/// Arithmetic mean of a point set; the origin for an empty set.
pub fn centroid(points: &[Vector3]) -> Vector3 {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p);
    sum / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn sample_points() -> Vec<Vector3> {
        vec![
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 12.0, 1.0),
            Vector3::new(-3.0, 4.0, 9.0),
            Vector3::new(5.0, -6.0, 2.0),
            Vector3::new(1.0, 1.0, -7.0),
        ]
    }

    #[test]
    fn test_recovers_known_transform() {
        let rot = Rotation3::from_euler_angles(0.3, -0.7, 1.9).into_inner();
        let truth = RigidTransform {
            rotation: rot,
            translation: Vector3::new(12.0, -4.5, 30.0),
        };
        let from = sample_points();
        let to: Vec<Vector3> = from.iter().map(|p| truth.apply(p)).collect();

        let fit = register_rigid(&from, &to).unwrap();
        assert!(
            (fit.rotation - truth.rotation).norm() < 1e-6,
            "rotation error {:.3e}",
            (fit.rotation - truth.rotation).norm()
        );
        assert!((fit.translation - truth.translation).norm() < 1e-6);
        assert!(fit.rms_error(&from, &to) < 1e-9);
    }

    #[test]
    fn test_two_points_rejected() {
        let pts = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
        let err = register_rigid(&pts, &pts).unwrap_err();
        assert_eq!(
            err,
            LocalizeError::InsufficientPoints {
                required: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_uses_shorter_slice() {
        let from = sample_points();
        let to = from[..3].to_vec();
        let fit = register_rigid(&from, &to).unwrap();
        assert!((fit.rotation - Matrix3::identity()).norm() < 1e-9);
        assert!(fit.translation.norm() < 1e-9);
    }

    #[test]
    fn test_coplanar_points_give_proper_rotation() {
        // All points in z = 0: H has a zero singular value.
        let from = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(0.0, 3.0, 0.0),
            Vector3::new(4.0, 3.0, 0.0),
        ];
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.6).into_inner();
        let truth = RigidTransform {
            rotation: rot,
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        let to: Vec<Vector3> = from.iter().map(|p| truth.apply(p)).collect();

        let fit = register_rigid(&from, &to).unwrap();
        assert!(det3(&fit.rotation) > 0.0, "reflection not corrected");
        assert!(fit.rms_error(&from, &to) < 1e-9);
    }

    #[test]
    fn test_inverse_and_matrix_form() {
        let t = RigidTransform {
            rotation: Rotation3::from_euler_angles(0.1, 0.2, 0.3).into_inner(),
            translation: Vector3::new(-5.0, 2.0, 8.0),
        };
        let p = Vector3::new(3.0, -1.0, 4.0);
        let back = t.inverse().apply(&t.apply(&p));
        assert!((back - p).norm() < 1e-12);

        let m = t.to_matrix4();
        let via_matrix = linalg::apply_affine(&m, &p);
        assert!((via_matrix - t.apply(&p)).norm() < 1e-12);
    }
}
