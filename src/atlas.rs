//! Anatomical labels from discrete segmentation volumes.
//!
//! [`label_at`] maps a world position to the label of its voxel. When that
//! voxel is background it falls back to a majority vote over the cube of
//! half-width `max_step_size` around it, optionally restricted to preferred
//! value ranges (cortical parcellation indices over generic segmentation
//! indices, for example).

use std::collections::HashMap;

use tracing::debug;

use crate::linalg::round_index;
use crate::volume::Volume;
use crate::Vector3;

/// Default fallback half-width in voxels.
pub const DEFAULT_MAX_STEP_SIZE: f64 = 2.0;

/// An anatomical label: the atlas value and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    pub index: i32,
    pub label: String,
}

impl Label {
    pub fn new(index: i32, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
        }
    }
}

/// Value → label dictionary of one atlas, with the valid value bounds.
///
/// Values outside `[min_color_id, max_color_id]` are treated as background.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<i32, Label>,
    pub min_color_id: i32,
    pub max_color_id: i32,
}

impl LookupTable {
    /// Build from `(value, name)` pairs; the bounds span the given values.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        let entries: HashMap<i32, Label> = entries
            .into_iter()
            .map(|(v, name)| (v, Label::new(v, name)))
            .collect();
        let min_color_id = entries.keys().copied().min().unwrap_or(0);
        let max_color_id = entries.keys().copied().max().unwrap_or(0);
        Self {
            entries,
            min_color_id,
            max_color_id,
        }
    }

    pub fn get(&self, value: i32) -> Option<&Label> {
        self.entries.get(&value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True for values that carry anatomy: non-zero and inside the bounds.
    #[inline]
    pub fn is_foreground(&self, value: i32) -> bool {
        value != 0 && value >= self.min_color_id && value <= self.max_color_id
    }
}

/// Inclusive `[lo, hi]` value range.
pub type ValueRange = (i32, i32);

#[inline]
fn in_ranges(value: i32, ranges: &[ValueRange]) -> bool {
    ranges.iter().any(|&(lo, hi)| value >= lo && value <= hi)
}

/// Label of the atlas voxel at `world_pos`, with neighbourhood fallback.
///
/// 1. World → IJK through the inverse affine, rounded, then clamped to
///    `[max_step_size, shapeₐ − max_step_size − 1]` so the fallback window
///    stays inside the grid.
/// 2. A foreground value at that voxel wins outright.
/// 3. Otherwise every foreground value in the cube of half-width
///    `max_step_size` is tallied (only values inside `preferred_ranges` when
///    given) and the most frequent one wins; ties go to the value met first in
///    scan order.
///
/// Returns `None` when nothing is found or the value is absent from `lut`.
pub fn label_at(
    volume: &Volume,
    lut: &LookupTable,
    world_pos: &Vector3,
    max_step_size: f64,
    preferred_ranges: Option<&[ValueRange]>,
) -> Option<Label> {
    let shape = volume.shape();
    let step = if max_step_size > 0.0 {
        max_step_size.ceil() as i64
    } else {
        0
    };

    let v = volume.world_to_voxel(world_pos);
    let raw = [round_index(v.x), round_index(v.y), round_index(v.z)];
    let mut ijk = [0i64; 3];
    for a in 0..3 {
        let n = shape[a] as i64;
        if n == 0 {
            return None;
        }
        let lo = step.min(n - 1);
        let hi = (n - 1 - step).max(lo);
        ijk[a] = raw[a].clamp(lo, hi);
    }

    let value = volume.get(ijk[0], ijk[1], ijk[2])?.round() as i32;
    if lut.is_foreground(value) {
        return lut.get(value).cloned();
    }
    if step == 0 {
        return None;
    }

    // Tally in first-encounter order so ties resolve by scan order.
    let mut tally: Vec<(i32, usize)> = Vec::new();
    let mut slot: HashMap<i32, usize> = HashMap::new();
    for dk in -step..=step {
        for dj in -step..=step {
            for di in -step..=step {
                let Some(raw_value) = volume.get(ijk[0] + di, ijk[1] + dj, ijk[2] + dk) else {
                    continue;
                };
                let value = raw_value.round() as i32;
                if !lut.is_foreground(value) {
                    continue;
                }
                if let Some(ranges) = preferred_ranges {
                    if !in_ranges(value, ranges) {
                        continue;
                    }
                }
                match slot.get(&value) {
                    Some(&s) => tally[s].1 += 1,
                    None => {
                        slot.insert(value, tally.len());
                        tally.push((value, 1));
                    }
                }
            }
        }
    }

    let mut winner: Option<(i32, usize)> = None;
    for &(value, count) in &tally {
        if winner.map_or(true, |(_, c)| count > c) {
            winner = Some((value, count));
        }
    }
    let (value, count) = winner?;
    debug!(
        "label_at: background at {:?}, majority label {} ({} of {} candidates)",
        ijk,
        value,
        count,
        tally.iter().map(|t| t.1).sum::<usize>()
    );
    lut.get(value).cloned()
}
