//! Sub-voxel centre of a bright CT blob.
//!
//! Electrode contacts show up in post-operative CT as saturated, irregular
//! blobs. Starting from a seed voxel near (but possibly outside) a blob:
//!
//! 1. Threshold the sub-volume into a binary mask (`value >= threshold`).
//!    If the seed is already inside the mask it is returned as is.
//! 2. Repeat up to `max_search_steps` times:
//!    a. Erode the mask. A voxel drops out when it is *pinched* (no in-mask
//!       neighbour on two or more of the three axis pairs) or *asymmetric*
//!       (in-mask neighbour on exactly one side of some axis pair).
//!    b. Move the seed to the nearest surviving voxel inside a fixed window
//!       around it. Stop when the window holds no mask voxel.
//! 3. Refine the final seed to sub-voxel precision with a Gaussian-weighted
//!    centroid of `value - threshold` over a small window.
//!
//! The erosion rule peels one layer per step, so the seed is dragged into the
//! topological core of the blob before the last layer vanishes, even when the
//! blob is elongated or clipped by the sub-volume boundary.

use tracing::debug;

use crate::volume::Volume;
use crate::Vector3;

/// Half-width (voxels) of the window searched for the next seed position.
const SEARCH_HALF_WIDTH: i64 = 3;
/// Half-width (voxels) of the centroid window.
const CENTROID_HALF_WIDTH: i64 = 2;
/// Gaussian σ of the centroid weights, in voxels.
const CENTROID_SIGMA: f64 = 0.3;

/// Refine `seed` (integer index into `sub_volume`) to the blob centre.
///
/// `voxel_density` scales index offsets per axis before distances are
/// compared in the nearest-voxel step (pass the voxel spacing in mm for an
/// anisotropic grid, `[1.0; 3]` for plain index distance).
///
/// Returns fractional index coordinates in the sub-volume. The seed comes
/// back unchanged when it lies outside `shape` or when `sub_volume` does not
/// hold exactly `shape` voxels.
pub fn blob_center(
    sub_volume: &[f32],
    shape: [usize; 3],
    seed: [usize; 3],
    voxel_density: [f64; 3],
    max_search_steps: usize,
    threshold: f32,
) -> Vector3 {
    let n = shape[0] * shape[1] * shape[2];
    let seed_vec = Vector3::new(seed[0] as f64, seed[1] as f64, seed[2] as f64);
    if sub_volume.len() != n {
        debug!(
            "blob_center: buffer holds {} voxels, shape {:?} needs {}",
            sub_volume.len(),
            shape,
            n
        );
        return seed_vec;
    }
    if n == 0 || seed.iter().zip(shape.iter()).any(|(&s, &d)| s >= d) {
        return seed_vec;
    }

    let grid = Grid { shape };
    let mut mask: Vec<bool> = sub_volume.iter().map(|&v| v >= threshold).collect();
    if mask[grid.index(seed)] {
        return seed_vec;
    }

    let mut current = seed;
    let mut steps = 0;
    while steps < max_search_steps {
        mask = grid.erode(&mask);
        steps += 1;
        match grid.nearest_in_mask(&mask, current, voxel_density) {
            Some(next) => current = next,
            None => break,
        }
    }
    debug!(
        "blob_center: seed {:?} -> core {:?} after {} erosion steps",
        seed, current, steps
    );

    grid.weighted_centroid(sub_volume, current, threshold)
}

/// Run [`blob_center`] on the cube of world radius `radius` around `position`
/// and map the result back to world space.
///
/// Returns `None` when the cube falls entirely outside the volume or
/// `radius` is not finite.
pub fn refine_world_position(
    volume: &Volume,
    position: &Vector3,
    radius: f64,
    threshold: f32,
    max_search_steps: usize,
) -> Option<Vector3> {
    if !radius.is_finite() {
        return None;
    }
    let spacing = volume.spacing();
    let center = volume.world_to_index(position);
    let half = [0, 1, 2].map(|a| {
        if spacing[a] > 0.0 {
            (radius / spacing[a]).ceil().max(1.0) as usize
        } else {
            1
        }
    });
    let (sub, dims, lo) = volume.extract_box(center, half)?;

    // Seed clamped into the box; it may sit on the box edge when the position
    // itself is outside the grid.
    let seed = [0, 1, 2].map(|a| {
        let rel = center[a].saturating_sub(lo[a] as i64);
        rel.clamp(0, dims[a] as i64 - 1) as usize
    });

    let local = blob_center(&sub, dims, seed, spacing, max_search_steps, threshold);
    let ijk = local + Vector3::new(lo[0] as f64, lo[1] as f64, lo[2] as f64);
    Some(volume.voxel_to_world(&ijk))
}

struct Grid {
    shape: [usize; 3],
}

impl Grid {
    #[inline]
    fn index(&self, p: [usize; 3]) -> usize {
        p[0] + self.shape[0] * (p[1] + self.shape[1] * p[2])
    }

    #[inline]
    fn offset(&self, p: [usize; 3], axis: usize, delta: i64) -> Option<[usize; 3]> {
        let v = p[axis] as i64 + delta;
        if v < 0 || v >= self.shape[axis] as i64 {
            return None;
        }
        let mut q = p;
        q[axis] = v as usize;
        Some(q)
    }

    /// One erosion pass, evaluated against the unmodified input mask.
    fn erode(&self, mask: &[bool]) -> Vec<bool> {
        let mut out = mask.to_vec();
        for k in 0..self.shape[2] {
            for j in 0..self.shape[1] {
                for i in 0..self.shape[0] {
                    let p = [i, j, k];
                    let idx = self.index(p);
                    if !mask[idx] {
                        continue;
                    }
                    let mut empty_axes = 0;
                    let mut asymmetric = false;
                    for axis in 0..3 {
                        let non_zero = [-1i64, 1]
                            .iter()
                            .filter(|&&d| {
                                self.offset(p, axis, d)
                                    .map(|q| mask[self.index(q)])
                                    .unwrap_or(false)
                            })
                            .count();
                        if non_zero == 0 {
                            empty_axes += 1;
                        } else if non_zero == 1 {
                            asymmetric = true;
                        }
                    }
                    if empty_axes >= 2 || asymmetric {
                        out[idx] = false;
                    }
                }
            }
        }
        out
    }

    /// Closest in-mask voxel to `center` inside the search window, by
    /// density-weighted distance. Ties keep the first voxel in scan order.
    fn nearest_in_mask(
        &self,
        mask: &[bool],
        center: [usize; 3],
        density: [f64; 3],
    ) -> Option<[usize; 3]> {
        let mut best: Option<([usize; 3], f64)> = None;
        for dk in -SEARCH_HALF_WIDTH..=SEARCH_HALF_WIDTH {
            for dj in -SEARCH_HALF_WIDTH..=SEARCH_HALF_WIDTH {
                for di in -SEARCH_HALF_WIDTH..=SEARCH_HALF_WIDTH {
                    let Some(p) = self.shifted(center, [di, dj, dk]) else {
                        continue;
                    };
                    if !mask[self.index(p)] {
                        continue;
                    }
                    let d2 = (di as f64 * density[0]).powi(2)
                        + (dj as f64 * density[1]).powi(2)
                        + (dk as f64 * density[2]).powi(2);
                    if best.map_or(true, |(_, b)| d2 < b) {
                        best = Some((p, d2));
                    }
                }
            }
        }
        best.map(|(p, _)| p)
    }

    fn shifted(&self, p: [usize; 3], d: [i64; 3]) -> Option<[usize; 3]> {
        let mut q = [0usize; 3];
        for a in 0..3 {
            let v = p[a] as i64 + d[a];
            if v < 0 || v >= self.shape[a] as i64 {
                return None;
            }
            q[a] = v as usize;
        }
        Some(q)
    }

    /// `seed + Σ w·offset / Σ|w|` with `w = (value − threshold)·exp(−d²/2σ²)`.
    fn weighted_centroid(&self, values: &[f32], seed: [usize; 3], threshold: f32) -> Vector3 {
        let seed_vec = Vector3::new(seed[0] as f64, seed[1] as f64, seed[2] as f64);
        let two_sigma_sq = 2.0 * CENTROID_SIGMA * CENTROID_SIGMA;
        let mut weighted = Vector3::zeros();
        let mut total = 0.0f64;
        for dk in -CENTROID_HALF_WIDTH..=CENTROID_HALF_WIDTH {
            for dj in -CENTROID_HALF_WIDTH..=CENTROID_HALF_WIDTH {
                for di in -CENTROID_HALF_WIDTH..=CENTROID_HALF_WIDTH {
                    let Some(p) = self.shifted(seed, [di, dj, dk]) else {
                        continue;
                    };
                    let offset = Vector3::new(di as f64, dj as f64, dk as f64);
                    let g = (-offset.norm_squared() / two_sigma_sq).exp();
                    let w = (values[self.index(p)] - threshold) as f64 * g;
                    weighted += offset * w;
                    total += w.abs();
                }
            }
        }
        if total == 0.0 {
            return seed_vec;
        }
        seed_vec + weighted / total
    }
}
