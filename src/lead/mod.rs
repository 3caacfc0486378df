//! Electrode-level orchestration.
//!
//! A [`Localizer`] borrows the host's [`SubjectResources`] and a
//! [`LocalizationConfig`] and drives each [`ElectrodeContact`] through
//!
//! ```text
//! Created → ProjectedToLepto → ProjectedToPial → (Refined) → Labeled
//! ```
//!
//! Transitions only happen on explicit calls. Brain-shift correction projects
//! a surface contact onto the smoothed leptomeningeal envelope, moves it by at
//! most `brain_shift_max_threshold` towards that envelope and then snaps the
//! shifted point to the nearest pial vertex. Missing surfaces, volumes or
//! lookup tables never fail an operation: the affected step falls back to the
//! unprojected position or an unknown label.

pub mod contact;
pub mod resources;
pub mod summary;
pub mod trajectory;

pub use contact::{ContactState, ElectrodeContact};
pub use resources::{InMemoryResources, SubjectResources};
pub use summary::{AtlasLabelRecord, ContactSheet, ContactSummary};
pub use trajectory::{
    extrapolate_from, interpolate_between, CtSearch, LeadEstimate, Spacing, TrajectoryConfig,
};

use crate::atlas::{ValueRange, DEFAULT_MAX_STEP_SIZE};

/// Cerebral hemisphere a contact is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    /// Hemisphere from the tkrRAS x coordinate (negative is left).
    pub fn from_tkr_x(x: f64) -> Self {
        if x < 0.0 {
            Hemisphere::Left
        } else {
            Hemisphere::Right
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hemisphere::Left => "left",
            Hemisphere::Right => "right",
        }
    }
}

/// FreeSurfer surfaces used by the projection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    Pial,
    /// `pial-outer-smoothed`: the leptomeningeal envelope.
    PialOuterSmoothed,
    /// `sphere.reg`: template-registered sphere, vertex-aligned with `Pial`.
    SphereReg,
}

/// How brain-shift correction is applied to surface electrodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrainShiftMode {
    /// Never shift.
    #[default]
    Disabled,
    /// Shift only when the contact lies within the threshold of the envelope.
    HardThreshold,
    /// Always shift (by at most the threshold).
    SoftThreshold,
}

/// Depth (sEEG) contacts stay where they are; surface (ECoG) contacts are
/// subject to brain-shift correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElectrodeType {
    #[default]
    Depth,
    Surface,
}

/// An atlas volume to label contacts with.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasSource {
    /// Volume name, also the key in [`ElectrodeContact::atlas_labels`].
    pub name: String,
    /// Values favoured in the background fallback vote. `None` accepts all.
    pub preferred_ranges: Option<Vec<ValueRange>>,
}

impl AtlasSource {
    pub fn new(name: &str, preferred_ranges: Option<Vec<ValueRange>>) -> Self {
        Self {
            name: name.to_string(),
            preferred_ranges,
        }
    }

    /// `aseg`, `aparc+aseg`, `aparc.DKTatlas+aseg`, `aparc.a2009s+aseg`, with
    /// the cortical index ranges of each parcellation preferred.
    pub fn freesurfer_defaults() -> Vec<Self> {
        vec![
            AtlasSource::new("aseg", None),
            AtlasSource::new("aparc+aseg", Some(vec![(1000, 1035), (2000, 2035)])),
            AtlasSource::new(
                "aparc.DKTatlas+aseg",
                Some(vec![(1000, 1035), (2000, 2035)]),
            ),
            AtlasSource::new(
                "aparc.a2009s+aseg",
                Some(vec![(11100, 11175), (12100, 12175)]),
            ),
        ]
    }
}

/// Settings for the localization workflow.
#[derive(Debug, Clone)]
pub struct LocalizationConfig {
    /// Brain-shift gating. Default: `Disabled`.
    pub brain_shift_mode: BrainShiftMode,
    /// Maximum shift toward the leptomeningeal envelope, in mm. Default: 5.0.
    pub brain_shift_max_threshold: f64,
    /// Type given to newly localized contacts. Default: `Depth`.
    pub electrode_type: ElectrodeType,
    /// Name of the post-operative CT volume. Default: `"ct"`.
    pub ct_volume: String,
    /// Intensity threshold for CT searches. When `None`, the CT volume's
    /// continuous lower bound is used. Default: `None`.
    pub ct_threshold: Option<f32>,
    /// Base radius (mm) of the auto-refine passes. Default: 1.0.
    pub adjust_base_radius: f64,
    /// Erosion steps per blob-centre search. Default: 20.
    pub blob_max_search_steps: usize,
    /// Atlases to label with. Default: [`AtlasSource::freesurfer_defaults`].
    pub atlases: Vec<AtlasSource>,
    /// Fallback half-width (voxels) for depth contacts. Default: 2.0.
    pub label_max_step_size: f64,
    /// Largest fallback half-width for shifted surface contacts. Default: 10.0.
    pub surface_label_max_step_size: f64,
    /// Interpolation / extrapolation settings.
    pub trajectory: TrajectoryConfig,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            brain_shift_mode: BrainShiftMode::Disabled,
            brain_shift_max_threshold: 5.0,
            electrode_type: ElectrodeType::Depth,
            ct_volume: "ct".to_string(),
            ct_threshold: None,
            adjust_base_radius: 1.0,
            blob_max_search_steps: 20,
            atlases: AtlasSource::freesurfer_defaults(),
            label_max_step_size: DEFAULT_MAX_STEP_SIZE,
            surface_label_max_step_size: 10.0,
            trajectory: TrajectoryConfig::default(),
        }
    }
}

/// Localization workflow for one subject.
///
/// Holds only a borrow of the resources; contacts are plain values owned by
/// the caller and passed in by `&mut` for every operation.
pub struct Localizer<'a, R: SubjectResources + ?Sized> {
    resources: &'a R,
    subject: String,
    pub config: LocalizationConfig,
}

impl<'a, R: SubjectResources + ?Sized> Localizer<'a, R> {
    pub fn new(resources: &'a R, subject: &str, config: LocalizationConfig) -> Self {
        Self {
            resources,
            subject: subject.to_string(),
            config,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn resources(&self) -> &'a R {
        self.resources
    }
}
