//! Lead trajectory estimation.
//!
//! Contacts of a linear lead sit on a straight chord at (roughly) known
//! spacings. Given the last two localized contacts `A` and `B`, new contacts
//! are either placed between them ([`interpolate_between`]) or beyond `B`
//! ([`extrapolate_from`]). Each geometric estimate is snapped to the nearest
//! bright CT voxel within a fraction of the step length when a CT is
//! available; otherwise the estimate itself is kept.

use tracing::debug;

use crate::error::{LocalizeError, Result};
use crate::sampler::{closest_voxel_with, Exclusion};
use crate::volume::{ValueSelection, Volume};
use crate::Vector3;

use super::{ElectrodeContact, Localizer, SubjectResources};

/// Expected contact spacing along a lead.
#[derive(Debug, Clone, PartialEq)]
pub enum Spacing {
    /// `n` equal gaps. Between two contacts that means `n - 1` new contacts;
    /// beyond the last one it means `n` new contacts at the reference gap.
    Uniform(usize),
    /// Explicit gaps in mm, one per new contact (plus the closing gap when
    /// interpolating).
    Strict(Vec<f64>),
}

impl Spacing {
    /// Gaps in schedule units.
    fn gaps(&self) -> Result<Vec<f64>> {
        let gaps = match self {
            Spacing::Uniform(n) => vec![1.0; *n],
            Spacing::Strict(mm) => mm.clone(),
        };
        if gaps.is_empty() {
            return Err(LocalizeError::InvalidSpacing("empty spacing schedule".into()));
        }
        if let Some(bad) = gaps.iter().find(|g| !(g.is_finite() && **g > 0.0)) {
            return Err(LocalizeError::InvalidSpacing(format!(
                "spacing {bad} is not a positive length"
            )));
        }
        Ok(gaps)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Spacing::Strict(_))
    }
}

/// Tolerances of the trajectory voxel search.
#[derive(Debug, Clone)]
pub struct TrajectoryConfig {
    /// Search radius around each estimate as a fraction of its step. Default: 0.2.
    pub match_tolerance: f64,
    /// Radius excluded around the previous contact, as a fraction of the step.
    /// Default: 0.5.
    pub exclude_fraction: f64,
    /// Lower bound on the refine radius handed to new contacts (mm). Default: 0.5.
    pub min_refine_radius: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            match_tolerance: 0.2,
            exclude_fraction: 0.5,
            min_refine_radius: 0.5,
        }
    }
}

/// CT volume and intensity selection to snap estimates to.
#[derive(Debug, Clone, Copy)]
pub struct CtSearch<'v> {
    pub volume: &'v Volume,
    pub selection: &'v ValueSelection,
}

/// Estimated contact positions along a lead.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadEstimate {
    pub positions: Vec<Vector3>,
    /// Whether each position came from a CT voxel (`false`: raw estimate).
    pub matched: Vec<bool>,
    /// Mean absolute difference (mm) between realised and expected gaps.
    pub average_offset: f64,
}

impl LeadEstimate {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn chord(a: &Vector3, b: &Vector3) -> Result<(Vector3, f64)> {
    let d = b - a;
    let length = d.norm();
    if !(length > 0.0) {
        return Err(LocalizeError::InvalidSpacing(
            "reference contacts coincide".into(),
        ));
    }
    Ok((d / length, length))
}

/// Snap `estimate` to the nearest selected voxel within `radius`, skipping the
/// ball around `previous`.
fn snap(
    ct: Option<CtSearch<'_>>,
    estimate: &Vector3,
    previous: &Vector3,
    step: f64,
    config: &TrajectoryConfig,
) -> Option<Vector3> {
    let ct = ct?;
    let radius = config.match_tolerance * step;
    let exclude = Exclusion {
        center: *previous,
        radius: config.exclude_fraction * step,
    };
    let hit = closest_voxel_with(ct.volume, ct.selection, estimate, radius, Some(exclude));
    let matched = hit.require().and_then(|p| {
        if hit.min_distance <= radius {
            Ok(p)
        } else {
            Err(LocalizeError::NoMatch)
        }
    });
    match matched {
        Ok(p) => {
            debug!(
                "trajectory: estimate {:?} -> voxel {:?} ({:.3} mm)",
                estimate.as_slice(),
                p.as_slice(),
                hit.min_distance
            );
            Some(p)
        }
        Err(e) => {
            debug!("trajectory: estimate {:?}: {e}", estimate.as_slice());
            None
        }
    }
}

/// Walk a list of step lengths from `start` along `dir`, snapping each
/// estimate. Returns positions, match flags and the summed gap error.
fn walk(
    start: &Vector3,
    dir: &Vector3,
    steps: &[f64],
    ct: Option<CtSearch<'_>>,
    config: &TrajectoryConfig,
) -> (Vec<Vector3>, Vec<bool>, f64) {
    let mut positions = Vec::with_capacity(steps.len());
    let mut matched = Vec::with_capacity(steps.len());
    let mut previous = *start;
    let mut travelled = 0.0;
    let mut offset_sum = 0.0;
    for &step in steps {
        travelled += step;
        let estimate = start + dir * travelled;
        let snapped = snap(ct, &estimate, &previous, step, config);
        let position = snapped.unwrap_or(estimate);
        offset_sum += ((position - previous).norm() - step).abs();
        positions.push(position);
        matched.push(snapped.is_some());
        previous = position;
    }
    (positions, matched, offset_sum)
}

/// Place new contacts between `a` and `b`.
///
/// The schedule is scaled so that its total equals `|b - a|`. The gap from
/// the last new contact to `b` counts towards `average_offset`.
///
/// # Errors
///
/// [`LocalizeError::InvalidSpacing`] for an empty or non-positive schedule or
/// when `a == b`.
pub fn interpolate_between(
    a: &Vector3,
    b: &Vector3,
    spacing: &Spacing,
    ct: Option<CtSearch<'_>>,
    config: &TrajectoryConfig,
) -> Result<LeadEstimate> {
    let gaps = spacing.gaps()?;
    let (dir, length) = chord(a, b)?;
    let scale = length / gaps.iter().sum::<f64>();
    let steps: Vec<f64> = gaps.iter().map(|g| g * scale).collect();

    let (inner, closing) = steps.split_at(steps.len() - 1);
    let (positions, matched, mut offset_sum) = walk(a, &dir, inner, ct, config);
    let last = positions.last().copied().unwrap_or(*a);
    offset_sum += ((b - last).norm() - closing[0]).abs();

    Ok(LeadEstimate {
        average_offset: offset_sum / steps.len() as f64,
        positions,
        matched,
    })
}

/// Place new contacts beyond `b`, continuing the direction from `a`.
///
/// A uniform schedule repeats the reference gap `|b - a|`; a strict one is
/// used as given in mm.
///
/// # Errors
///
/// Same as [`interpolate_between`].
pub fn extrapolate_from(
    a: &Vector3,
    b: &Vector3,
    spacing: &Spacing,
    ct: Option<CtSearch<'_>>,
    config: &TrajectoryConfig,
) -> Result<LeadEstimate> {
    let gaps = spacing.gaps()?;
    let (dir, length) = chord(a, b)?;
    let unit = if spacing.is_strict() { 1.0 } else { length };
    let steps: Vec<f64> = gaps.iter().map(|g| g * unit).collect();

    let (positions, matched, offset_sum) = walk(b, &dir, &steps, ct, config);
    Ok(LeadEstimate {
        average_offset: offset_sum / steps.len() as f64,
        positions,
        matched,
    })
}

impl<'a, R: SubjectResources + ?Sized> Localizer<'a, R> {
    fn last_two(lead: &[ElectrodeContact]) -> Result<(Vector3, Vector3)> {
        match lead {
            [.., a, b] => Ok((a.position, b.position)),
            _ => Err(LocalizeError::InsufficientPoints {
                required: 2,
                found: lead.len(),
            }),
        }
    }

    fn ct_selection(&self) -> Option<(&'a Volume, ValueSelection)> {
        let volume = self.resources.volume(&self.subject, &self.config.ct_volume)?;
        let selection = match self.config.ct_threshold {
            Some(t) => ValueSelection::at_least(t),
            None => volume.value_selection.clone(),
        };
        Some((volume, selection))
    }

    /// Estimate contacts between the last two contacts of `lead`.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::InsufficientPoints`] with fewer than two contacts, or
    /// any error of [`interpolate_between`].
    pub fn interpolate(&self, lead: &[ElectrodeContact], spacing: &Spacing) -> Result<LeadEstimate> {
        let (a, b) = Self::last_two(lead)?;
        let ct = self.ct_selection();
        let search = ct.as_ref().map(|(volume, selection)| CtSearch {
            volume: *volume,
            selection,
        });
        interpolate_between(&a, &b, spacing, search, &self.config.trajectory)
    }

    /// Estimate contacts beyond the last contact of `lead`.
    ///
    /// # Errors
    ///
    /// As [`interpolate`](Self::interpolate).
    pub fn extrapolate(&self, lead: &[ElectrodeContact], spacing: &Spacing) -> Result<LeadEstimate> {
        let (a, b) = Self::last_two(lead)?;
        let ct = self.ct_selection();
        let search = ct.as_ref().map(|(volume, selection)| CtSearch {
            volume: *volume,
            selection,
        });
        extrapolate_from(&a, &b, spacing, search, &self.config.trajectory)
    }

    /// Localize every estimated position. The spacing error becomes the new
    /// contacts' refine radius (at least `min_refine_radius`).
    pub fn contacts_from_estimate(&self, estimate: &LeadEstimate) -> Vec<ElectrodeContact> {
        let radius = estimate
            .average_offset
            .max(self.config.trajectory.min_refine_radius);
        estimate
            .positions
            .iter()
            .map(|p| {
                let mut contact = self.localize(*p);
                contact.refine_radius = radius;
                contact
            })
            .collect()
    }
}
