//! Nearest matching voxel inside a world-space search box.

use tracing::debug;

use crate::error::{LocalizeError, Result};
use crate::volume::{ValueSelection, Volume};
use crate::Vector3;

/// Outcome of [`closest_voxel`].
///
/// When nothing qualifies `min_distance` is `+∞` and the other fields are
/// meaningless; check [`is_match`](Self::is_match) (or `min_distance.is_finite()`)
/// before using them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestVoxel {
    pub min_distance: f64,
    pub min_distance_ijk: [usize; 3],
    pub min_distance_xyz: Vector3,
}

impl ClosestVoxel {
    fn none() -> Self {
        Self {
            min_distance: f64::INFINITY,
            min_distance_ijk: [0; 3],
            min_distance_xyz: Vector3::zeros(),
        }
    }

    #[inline]
    pub fn is_match(&self) -> bool {
        self.min_distance.is_finite()
    }

    /// `Some(world position)` of the match.
    pub fn position(&self) -> Option<Vector3> {
        self.is_match().then_some(self.min_distance_xyz)
    }

    /// Strict form of [`position`](Self::position).
    pub fn require(&self) -> Result<Vector3> {
        self.position().ok_or(LocalizeError::NoMatch)
    }
}

/// A world-space ball whose voxels are skipped by the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exclusion {
    pub center: Vector3,
    pub radius: f64,
}

/// Find the voxel passing the volume's value selection that is closest (in
/// world space) to `source`.
///
/// The search box is centred on the voxel nearest `source`; its half-width on
/// axis `a` is `ceil(radius / spacingₐ)`, so the box covers the same world
/// extent on every axis even for anisotropic voxels. Voxels whose world
/// centre lies within `exclude.radius` of `exclude.center` are skipped.
/// Ties keep the first voxel in scan order (i fastest). A negative or
/// non-finite `radius` finds nothing.
pub fn closest_voxel(
    volume: &Volume,
    source: &Vector3,
    radius: f64,
    exclude: Option<Exclusion>,
) -> ClosestVoxel {
    closest_voxel_with(volume, &volume.value_selection, source, radius, exclude)
}

/// [`closest_voxel`] with an explicit selection instead of the volume's own.
pub fn closest_voxel_with(
    volume: &Volume,
    selection: &ValueSelection,
    source: &Vector3,
    radius: f64,
    exclude: Option<Exclusion>,
) -> ClosestVoxel {
    let mut best = ClosestVoxel::none();
    if !(radius >= 0.0) || !radius.is_finite() {
        return best;
    }

    let center = volume.world_to_index(source);
    let spacing = volume.spacing();
    let shape = volume.shape();

    let mut lo = [0i64; 3];
    let mut hi = [0i64; 3];
    for a in 0..3 {
        let half = if spacing[a] > 0.0 {
            (radius / spacing[a]).ceil() as i64
        } else {
            0
        };
        lo[a] = center[a].saturating_sub(half).max(0);
        hi[a] = center[a].saturating_add(half).min(shape[a] as i64 - 1);
        if hi[a] < lo[a] {
            debug!(
                "closest_voxel: search box around {:?} lies outside the volume",
                source.as_slice()
            );
            return best;
        }
    }

    let mut best_d2 = f64::INFINITY;
    for k in lo[2]..=hi[2] {
        for j in lo[1]..=hi[1] {
            for i in lo[0]..=hi[0] {
                let (iu, ju, ku) = (i as usize, j as usize, k as usize);
                if !selection.accepts(volume.value(iu, ju, ku)) {
                    continue;
                }
                let xyz = volume.voxel_to_world(&Vector3::new(i as f64, j as f64, k as f64));
                if let Some(ex) = &exclude {
                    if (xyz - ex.center).norm() <= ex.radius {
                        continue;
                    }
                }
                let d2 = (xyz - source).norm_squared();
                if d2 < best_d2 {
                    best_d2 = d2;
                    best.min_distance_ijk = [iu, ju, ku];
                    best.min_distance_xyz = xyz;
                }
            }
        }
    }

    if best_d2.is_finite() {
        best.min_distance = best_d2.sqrt();
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Matrix4;

    fn volume_with(points: &[([usize; 3], f32)], spacing: [f64; 3]) -> Volume {
        let shape = [20, 20, 20];
        let mut data = vec![0.0f32; 8000];
        for &(ijk, v) in points {
            data[ijk[0] + 20 * (ijk[1] + 20 * ijk[2])] = v;
        }
        let mut m = Matrix4::identity();
        for a in 0..3 {
            m[(a, a)] = spacing[a];
        }
        Volume::new(data, shape, m)
            .unwrap()
            .with_selection(ValueSelection::at_least(100.0))
    }

    #[test]
    fn test_finds_nearest() {
        let v = volume_with(&[([10, 10, 12], 500.0), ([10, 10, 15], 500.0)], [1.0; 3]);
        let r = closest_voxel(&v, &Vector3::new(10.0, 10.0, 10.0), 6.0, None);
        assert!(r.is_match());
        assert_eq!(r.min_distance_ijk, [10, 10, 12]);
        assert!((r.min_distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_exclusion_skips_closer_voxel() {
        let v = volume_with(&[([10, 10, 12], 500.0), ([10, 10, 15], 500.0)], [1.0; 3]);
        let ex = Exclusion {
            center: Vector3::new(10.0, 10.0, 12.0),
            radius: 0.5,
        };
        let r = closest_voxel(&v, &Vector3::new(10.0, 10.0, 10.0), 6.0, Some(ex));
        assert_eq!(r.min_distance_ijk, [10, 10, 15]);
        assert!((r.min_distance - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_match_is_infinite() {
        let v = volume_with(&[([2, 2, 2], 500.0)], [1.0; 3]);
        let r = closest_voxel(&v, &Vector3::new(15.0, 15.0, 15.0), 3.0, None);
        assert!(!r.is_match());
        assert!(r.min_distance.is_infinite());
        assert!(r.position().is_none());
        assert_eq!(r.require(), Err(LocalizeError::NoMatch));
    }

    #[test]
    fn test_below_selection_ignored() {
        let v = volume_with(&[([10, 10, 11], 50.0), ([10, 10, 13], 200.0)], [1.0; 3]);
        let r = closest_voxel(&v, &Vector3::new(10.0, 10.0, 10.0), 4.0, None);
        assert_eq!(r.min_distance_ijk, [10, 10, 13]);
    }

    #[test]
    fn test_explicit_selection_overrides_volume() {
        let v = volume_with(&[([10, 10, 11], 50.0), ([10, 10, 13], 200.0)], [1.0; 3]);
        let sel = ValueSelection::at_least(40.0);
        let r = closest_voxel_with(&v, &sel, &Vector3::new(10.0, 10.0, 10.0), 4.0, None);
        assert_eq!(r.min_distance_ijk, [10, 10, 11]);
    }

    #[test]
    fn test_anisotropic_box_is_world_sized() {
        // 0.5 mm along z: a 2 mm radius reaches 4 slices.
        let v = volume_with(&[([10, 10, 14], 500.0)], [1.0, 1.0, 0.5]);
        let source = Vector3::new(10.0, 10.0, 5.0);
        let r = closest_voxel(&v, &source, 2.0, None);
        assert!(r.is_match());
        assert!((r.min_distance - 2.0).abs() < 1e-12);
        assert_eq!(r.min_distance_xyz, Vector3::new(10.0, 10.0, 7.0));
    }

    #[test]
    fn test_far_source_is_no_match() {
        let v = volume_with(&[([10, 10, 10], 500.0)], [1.0; 3]);
        for x in [1e30, -1e30, f64::MAX] {
            let r = closest_voxel(&v, &Vector3::new(x, 0.0, 0.0), 2.0, None);
            assert!(!r.is_match(), "matched from x = {x}");
        }
    }

    #[test]
    fn test_non_finite_radius_is_no_match() {
        let v = volume_with(&[([10, 10, 10], 500.0)], [1.0; 3]);
        let source = Vector3::new(10.0, 10.0, 10.0);
        for radius in [f64::INFINITY, f64::NAN, -1.0] {
            assert!(!closest_voxel(&v, &source, radius, None).is_match());
        }
    }

    #[test]
    fn test_box_outside_volume() {
        let v = volume_with(&[([0, 0, 0], 500.0)], [1.0; 3]);
        let r = closest_voxel(&v, &Vector3::new(-50.0, 0.0, 0.0), 2.0, None);
        assert!(!r.is_match());
    }
}
