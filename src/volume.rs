//! Read-only intensity / label volumes.
//!
//! A [`Volume`] is a flat buffer (x fastest, then y, then z, then frame) with
//! a voxel-to-world affine. The volume provider owns it; the core only reads.
//! Frame 0 is the one sampled by every search.

use std::collections::HashSet;

use crate::error::{LocalizeError, Result};
use crate::linalg::{self, round_index};
use crate::{Matrix4, Vector3};

/// Which voxel values count as a "hit" for nearest-voxel searches.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSelection {
    /// Values in the closed interval `[lower, upper]`.
    Continuous { lower: f32, upper: f32 },
    /// Values whose rounded integer is a member of the set.
    Discrete(HashSet<i32>),
}

impl ValueSelection {
    /// Everything at or above `lower`.
    pub fn at_least(lower: f32) -> Self {
        ValueSelection::Continuous {
            lower,
            upper: f32::INFINITY,
        }
    }

    pub fn discrete<I: IntoIterator<Item = i32>>(values: I) -> Self {
        ValueSelection::Discrete(values.into_iter().collect())
    }

    #[inline]
    pub fn accepts(&self, value: f32) -> bool {
        match self {
            ValueSelection::Continuous { lower, upper } => value >= *lower && value <= *upper,
            ValueSelection::Discrete(set) => {
                value.is_finite() && set.contains(&(value.round() as i32))
            }
        }
    }

    /// Lower bound of a continuous selection.
    pub fn lower_bound(&self) -> Option<f32> {
        match self {
            ValueSelection::Continuous { lower, .. } => Some(*lower),
            ValueSelection::Discrete(_) => None,
        }
    }
}

impl Default for ValueSelection {
    fn default() -> Self {
        ValueSelection::Continuous {
            lower: f32::NEG_INFINITY,
            upper: f32::INFINITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Volume {
    data: Vec<f32>,
    shape: [usize; 3],
    frames: usize,
    model_to_world: Matrix4,
    world_to_model: Matrix4,
    pub value_selection: ValueSelection,
}

impl Volume {
    /// Wrap a single-frame buffer.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::ShapeMismatch`] if `data.len() != nx·ny·nz`, and
    /// [`LocalizeError::SingularTransform`] if the affine cannot be inverted.
    pub fn new(data: Vec<f32>, shape: [usize; 3], model_to_world: Matrix4) -> Result<Self> {
        Self::with_frames(data, shape, 1, model_to_world)
    }

    /// Wrap a multi-frame buffer (`data.len() == nx·ny·nz·frames`).
    pub fn with_frames(
        data: Vec<f32>,
        shape: [usize; 3],
        frames: usize,
        model_to_world: Matrix4,
    ) -> Result<Self> {
        let expected = shape[0] * shape[1] * shape[2] * frames;
        if data.len() != expected || frames == 0 {
            return Err(LocalizeError::ShapeMismatch {
                expected,
                found: data.len(),
            });
        }
        let world_to_model =
            linalg::invert_affine(&model_to_world).ok_or(LocalizeError::SingularTransform)?;
        Ok(Self {
            data,
            shape,
            frames,
            model_to_world,
            world_to_model,
            value_selection: ValueSelection::default(),
        })
    }

    pub fn with_selection(mut self, selection: ValueSelection) -> Self {
        self.value_selection = selection;
        self
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn model_to_world(&self) -> &Matrix4 {
        &self.model_to_world
    }

    #[inline]
    pub fn world_to_model(&self) -> &Matrix4 {
        &self.world_to_model
    }

    /// World length of one step along each index axis.
    pub fn spacing(&self) -> [f64; 3] {
        linalg::voxel_spacing(&self.model_to_world)
    }

    /// Flat index of `(i, j, k)` in frame 0.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.shape[0] * (j + self.shape[1] * k)
    }

    #[inline]
    pub fn contains(&self, i: i64, j: i64, k: i64) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.shape[0]
            && (j as usize) < self.shape[1]
            && (k as usize) < self.shape[2]
    }

    /// Value at `(i, j, k)` in frame 0. Panics when out of bounds.
    #[inline]
    pub fn value(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data[self.index(i, j, k)]
    }

    /// Value at `(i, j, k)`, or `None` outside the grid.
    pub fn get(&self, i: i64, j: i64, k: i64) -> Option<f32> {
        if self.contains(i, j, k) {
            Some(self.value(i as usize, j as usize, k as usize))
        } else {
            None
        }
    }

    /// Continuous voxel coordinates of a world point.
    #[inline]
    pub fn world_to_voxel(&self, p: &Vector3) -> Vector3 {
        linalg::apply_affine(&self.world_to_model, p)
    }

    /// World position of a (possibly fractional) voxel coordinate.
    #[inline]
    pub fn voxel_to_world(&self, ijk: &Vector3) -> Vector3 {
        linalg::apply_affine(&self.model_to_world, ijk)
    }

    /// Nearest integer voxel of a world point (may lie outside the grid).
    pub fn world_to_index(&self, p: &Vector3) -> [i64; 3] {
        let v = self.world_to_voxel(p);
        [round_index(v.x), round_index(v.y), round_index(v.z)]
    }

    /// Copy out the cube of half-width `half` (per axis) around `center`,
    /// clipped to the grid.
    ///
    /// Returns the buffer, its shape, and the grid index of its first voxel.
    /// `None` when the clipped box is empty.
    pub fn extract_box(
        &self,
        center: [i64; 3],
        half: [usize; 3],
    ) -> Option<(Vec<f32>, [usize; 3], [usize; 3])> {
        let mut lo = [0usize; 3];
        let mut dims = [0usize; 3];
        for a in 0..3 {
            let n = self.shape[a] as i64;
            let half = i64::try_from(half[a]).unwrap_or(i64::MAX);
            let l = center[a].saturating_sub(half).max(0);
            let h = center[a].saturating_add(half).min(n - 1);
            if h < l {
                return None;
            }
            lo[a] = l as usize;
            dims[a] = (h - l + 1) as usize;
        }
        let mut out = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                let start = self.index(lo[0], lo[1] + j, lo[2] + k);
                out.extend_from_slice(&self.data[start..start + dims[0]]);
            }
        }
        Some((out, dims, lo))
    }
}
