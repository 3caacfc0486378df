//! Electrode contacts and their projection / refinement / labeling steps.

use std::collections::BTreeMap;

use tracing::debug;

use crate::atlas::{self, Label};
use crate::mesh::project_onto_mesh;
use crate::sampler::refine_world_position;
use crate::Vector3;

use super::{
    BrainShiftMode, ElectrodeType, Hemisphere, LocalizationConfig, Localizer, SubjectResources,
    SurfaceType,
};

/// Radius multipliers of the auto-refine passes.
const ADJUST_PASSES: [f64; 3] = [1.0, 2.0, 4.0];
/// Increment (voxels) when widening the label search for shifted contacts.
const LABEL_WIDEN_STEP: f64 = 2.0;

/// Last pipeline step a contact went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContactState {
    Created,
    ProjectedToLepto,
    ProjectedToPial,
    Refined,
    Labeled,
}

/// A localized electrode contact.
///
/// `lepto_position`, `shifted_position` and `pial_position` start out equal to
/// `initial_position` and are rewritten by every projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeContact {
    /// Position the user picked.
    pub initial_position: Vector3,
    /// Current position, after any auto-refine.
    pub position: Vector3,
    /// Nearest vertex of the leptomeningeal envelope.
    pub lepto_position: Vector3,
    /// `position` moved toward `lepto_position` by at most the shift threshold.
    pub shifted_position: Vector3,
    /// Nearest pial vertex to `shifted_position`.
    pub pial_position: Vector3,
    pub pial_vertex_index: Option<usize>,
    /// `sphere.reg` coordinates of the pial vertex (template space).
    pub sphere_position: Option<Vector3>,
    pub distance_to_lepto: f64,
    pub distance_to_shifted: f64,
    pub distance_from_shifted_to_pial: f64,
    pub hemisphere: Hemisphere,
    pub electrode_type: ElectrodeType,
    /// Label per atlas name; `None` when the atlas is missing or unlabeled.
    pub atlas_labels: BTreeMap<String, Option<Label>>,
    pub enabled: bool,
    /// Base radius used by [`Localizer::adjust`] when none is given.
    pub refine_radius: f64,
    state: ContactState,
}

impl ElectrodeContact {
    pub fn new(position: Vector3, electrode_type: ElectrodeType, refine_radius: f64) -> Self {
        Self {
            initial_position: position,
            position,
            lepto_position: position,
            shifted_position: position,
            pial_position: position,
            pial_vertex_index: None,
            sphere_position: None,
            distance_to_lepto: 0.0,
            distance_to_shifted: 0.0,
            distance_from_shifted_to_pial: 0.0,
            hemisphere: Hemisphere::from_tkr_x(position.x),
            electrode_type,
            atlas_labels: BTreeMap::new(),
            enabled: true,
            refine_radius,
            state: ContactState::Created,
        }
    }

    pub fn state(&self) -> ContactState {
        self.state
    }

    pub fn is_surface(&self) -> bool {
        self.electrode_type == ElectrodeType::Surface
    }

    /// Whether brain-shift correction is in effect for this contact.
    pub fn brain_shift_applied(&self, config: &LocalizationConfig) -> bool {
        if !self.is_surface() {
            return false;
        }
        match config.brain_shift_mode {
            BrainShiftMode::Disabled => false,
            BrainShiftMode::SoftThreshold => true,
            BrainShiftMode::HardThreshold => {
                self.distance_to_lepto <= config.brain_shift_max_threshold
            }
        }
    }

    /// Where the contact is shown: the shifted position when brain-shift
    /// correction applies, the current position otherwise.
    pub fn display_position(&self, config: &LocalizationConfig) -> Vector3 {
        if self.brain_shift_applied(config) {
            self.shifted_position
        } else {
            self.position
        }
    }

    /// Label for `atlas`, if one was found.
    pub fn label(&self, atlas: &str) -> Option<&Label> {
        self.atlas_labels.get(atlas).and_then(|l| l.as_ref())
    }

    fn clear_projection(&mut self) {
        self.lepto_position = self.position;
        self.shifted_position = self.position;
        self.pial_position = self.position;
        self.pial_vertex_index = None;
        self.sphere_position = None;
        self.distance_to_lepto = 0.0;
        self.distance_to_shifted = 0.0;
        self.distance_from_shifted_to_pial = 0.0;
    }
}

impl<'a, R: SubjectResources + ?Sized> Localizer<'a, R> {
    /// Create a contact at `position` and run the full pipeline on it
    /// (projection and labels). The hemisphere is taken from the sign of x.
    pub fn localize(&self, position: Vector3) -> ElectrodeContact {
        let mut contact = ElectrodeContact::new(
            position,
            self.config.electrode_type,
            self.config.adjust_base_radius,
        );
        self.update_projection(&mut contact);
        self.compute_labels(&mut contact);
        contact
    }

    /// Project onto the leptomeningeal envelope of the contact's hemisphere.
    ///
    /// Without an envelope mesh the lepto position is the contact itself at
    /// distance 0.
    pub fn project_to_lepto(&self, contact: &mut ElectrodeContact) {
        let mesh = self.resources.require_surface(
            &self.subject,
            contact.hemisphere,
            SurfaceType::PialOuterSmoothed,
        );
        let projection = match mesh {
            Ok(m) => project_onto_mesh(&contact.position, m),
            Err(e) => {
                debug!("project_to_lepto: {e}");
                None
            }
        };
        match projection {
            Some(p) => {
                contact.lepto_position = p.point;
                contact.distance_to_lepto = p.distance;
            }
            None => {
                contact.lepto_position = contact.position;
                contact.distance_to_lepto = 0.0;
            }
        }
        contact.state = ContactState::ProjectedToLepto;
    }

    /// Shift toward the envelope and project the shifted point onto the pial
    /// surface. Also records the `sphere.reg` position of the pial vertex.
    pub fn project_to_pial(&self, contact: &mut ElectrodeContact) {
        let shift = contact
            .distance_to_lepto
            .min(self.config.brain_shift_max_threshold)
            .max(0.0);
        let toward = contact.lepto_position - contact.position;
        let len = toward.norm();
        contact.shifted_position = if len > 0.0 && shift > 0.0 {
            contact.position + toward * (shift / len)
        } else {
            contact.position
        };
        contact.distance_to_shifted = if len > 0.0 { shift } else { 0.0 };

        let pial = self
            .resources
            .surface(&self.subject, contact.hemisphere, SurfaceType::Pial);
        match pial.and_then(|m| project_onto_mesh(&contact.shifted_position, m)) {
            Some(p) => {
                contact.pial_position = p.point;
                contact.pial_vertex_index = Some(p.vertex_index);
                contact.distance_from_shifted_to_pial = p.distance;
                contact.sphere_position = self
                    .resources
                    .surface(&self.subject, contact.hemisphere, SurfaceType::SphereReg)
                    .and_then(|sphere| sphere.vertex(p.vertex_index));
            }
            None => {
                debug!(
                    "project_to_pial: no {:?} pial surface for {}",
                    contact.hemisphere, self.subject
                );
                contact.pial_position = contact.shifted_position;
                contact.pial_vertex_index = None;
                contact.distance_from_shifted_to_pial = 0.0;
                contact.sphere_position = None;
            }
        }
        contact.state = ContactState::ProjectedToPial;
    }

    /// Lepto then pial projection from the current position.
    pub fn update_projection(&self, contact: &mut ElectrodeContact) {
        self.project_to_lepto(contact);
        self.project_to_pial(contact);
    }

    /// Label the contact in every configured atlas.
    ///
    /// Contacts with brain-shift correction in effect are labeled at their
    /// shifted position, widening the fallback window step by step up to
    /// `surface_label_max_step_size` so that the search can reach cortex.
    pub fn compute_labels(&self, contact: &mut ElectrodeContact) {
        let shifted = contact.brain_shift_applied(&self.config);
        let position = contact.display_position(&self.config);
        let first_step = self.config.label_max_step_size;
        let last_step = if shifted {
            self.config.surface_label_max_step_size.max(first_step)
        } else {
            first_step
        };

        let mut labels = BTreeMap::new();
        for spec in &self.config.atlases {
            let volume = self.resources.volume(&self.subject, &spec.name);
            let lut = self.resources.lookup_table(&self.subject, &spec.name);
            let (Some(volume), Some(lut)) = (volume, lut) else {
                debug!("compute_labels: atlas {} unavailable", spec.name);
                labels.insert(spec.name.clone(), None);
                continue;
            };

            let ranges = spec.preferred_ranges.as_deref();
            let mut step = first_step;
            let mut found = atlas::label_at(volume, lut, &position, step, ranges);
            while found.is_none() && step < last_step {
                step = (step + LABEL_WIDEN_STEP).min(last_step);
                found = atlas::label_at(volume, lut, &position, step, ranges);
            }
            labels.insert(spec.name.clone(), found);
        }
        contact.atlas_labels = labels;
        contact.state = ContactState::Labeled;
    }

    /// Auto-refine toward the local CT intensity peak, then re-project and
    /// re-label.
    ///
    /// Runs the blob-centre search three times with radius `1×`, `2×` and `4×`
    /// `base_radius` (or the contact's own `refine_radius`), each pass starting
    /// from the previous result. Returns `false`, leaving the contact
    /// untouched, when no CT volume or threshold is available.
    pub fn adjust(&self, contact: &mut ElectrodeContact, base_radius: Option<f64>) -> bool {
        let ct = match self
            .resources
            .require_volume(&self.subject, &self.config.ct_volume)
        {
            Ok(ct) => ct,
            Err(e) => {
                debug!("adjust: {e}");
                return false;
            }
        };
        let threshold = self
            .config
            .ct_threshold
            .or_else(|| ct.value_selection.lower_bound())
            .filter(|t| t.is_finite());
        let Some(threshold) = threshold else {
            debug!("adjust: no CT threshold configured");
            return false;
        };

        let base = base_radius.unwrap_or(contact.refine_radius);
        let mut position = contact.position;
        for multiplier in ADJUST_PASSES {
            if let Some(p) = refine_world_position(
                ct,
                &position,
                base * multiplier,
                threshold,
                self.config.blob_max_search_steps,
            ) {
                position = p;
            }
        }
        debug!(
            "adjust: {:?} -> {:?} ({:.3} mm)",
            contact.position.as_slice(),
            position.as_slice(),
            (position - contact.position).norm()
        );

        contact.position = position;
        self.update_projection(contact);
        contact.state = ContactState::Refined;
        self.compute_labels(contact);
        true
    }

    /// Return the contact to where it was first localized and re-run the
    /// pipeline.
    pub fn reset(&self, contact: &mut ElectrodeContact) {
        contact.position = contact.initial_position;
        contact.clear_projection();
        contact.atlas_labels.clear();
        contact.state = ContactState::Created;
        self.update_projection(contact);
        self.compute_labels(contact);
    }

    /// Override the hemisphere and re-run projection and labels.
    pub fn set_hemisphere(&self, contact: &mut ElectrodeContact, hemisphere: Hemisphere) {
        contact.hemisphere = hemisphere;
        self.update_projection(contact);
        self.compute_labels(contact);
    }
}
