//! Host-supplied volumes, surfaces, lookup tables and coordinate transforms.
//!
//! Electrode contacts never own any of these. Every operation looks them up
//! by name through [`SubjectResources`] at the moment it needs them, so the
//! host can swap or drop a surface without invalidating contacts.

use std::collections::HashMap;

use crate::atlas::LookupTable;
use crate::error::{LocalizeError, Result};
use crate::mesh::Mesh;
use crate::volume::Volume;
use crate::Matrix4;

use super::{Hemisphere, SurfaceType};

/// Read accessors the localization core needs from the host application.
pub trait SubjectResources {
    /// A volume of `subject` by name (`"ct"`, `"aseg"`, `"aparc+aseg"`, ...).
    fn volume(&self, subject: &str, name: &str) -> Option<&Volume>;

    /// The lookup table belonging to the volume called `volume_name`.
    fn lookup_table(&self, subject: &str, volume_name: &str) -> Option<&LookupTable>;

    fn surface(&self, subject: &str, hemisphere: Hemisphere, surface: SurfaceType)
        -> Option<&Mesh>;

    /// tkrRAS → scanner (T1) RAS.
    fn tkr_to_scanner(&self, _subject: &str) -> Option<Matrix4> {
        None
    }

    /// Scanner RAS → MNI305 (FreeSurfer `talairach.xfm`).
    fn scanner_to_mni305(&self, _subject: &str) -> Option<Matrix4> {
        None
    }

    /// [`volume`](Self::volume), failing with [`LocalizeError::MissingResource`].
    fn require_volume(&self, subject: &str, name: &str) -> Result<&Volume> {
        self.volume(subject, name).ok_or_else(|| {
            LocalizeError::MissingResource(format!("volume {name} of {subject}"))
        })
    }

    /// [`surface`](Self::surface), failing with [`LocalizeError::MissingResource`].
    fn require_surface(
        &self,
        subject: &str,
        hemisphere: Hemisphere,
        surface: SurfaceType,
    ) -> Result<&Mesh> {
        self.surface(subject, hemisphere, surface).ok_or_else(|| {
            LocalizeError::MissingResource(format!(
                "{surface:?} surface ({}) of {subject}",
                hemisphere.as_str()
            ))
        })
    }
}

/// Hash-map backed [`SubjectResources`], for hosts without a scene graph and
/// for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResources {
    volumes: HashMap<(String, String), Volume>,
    lookup_tables: HashMap<(String, String), LookupTable>,
    surfaces: HashMap<(String, Hemisphere, SurfaceType), Mesh>,
    tkr_to_scanner: HashMap<String, Matrix4>,
    scanner_to_mni305: HashMap<String, Matrix4>,
}

impl InMemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_volume(&mut self, subject: &str, name: &str, volume: Volume) -> &mut Self {
        self.volumes
            .insert((subject.to_string(), name.to_string()), volume);
        self
    }

    /// Register an atlas volume together with its lookup table.
    pub fn insert_atlas(
        &mut self,
        subject: &str,
        name: &str,
        volume: Volume,
        lut: LookupTable,
    ) -> &mut Self {
        self.lookup_tables
            .insert((subject.to_string(), name.to_string()), lut);
        self.insert_volume(subject, name, volume)
    }

    pub fn insert_surface(
        &mut self,
        subject: &str,
        hemisphere: Hemisphere,
        surface: SurfaceType,
        mesh: Mesh,
    ) -> &mut Self {
        self.surfaces
            .insert((subject.to_string(), hemisphere, surface), mesh);
        self
    }

    pub fn set_tkr_to_scanner(&mut self, subject: &str, m: Matrix4) -> &mut Self {
        self.tkr_to_scanner.insert(subject.to_string(), m);
        self
    }

    pub fn set_scanner_to_mni305(&mut self, subject: &str, m: Matrix4) -> &mut Self {
        self.scanner_to_mni305.insert(subject.to_string(), m);
        self
    }

    /// Drop a surface; contacts re-projected afterwards degrade gracefully.
    pub fn remove_surface(
        &mut self,
        subject: &str,
        hemisphere: Hemisphere,
        surface: SurfaceType,
    ) -> Option<Mesh> {
        self.surfaces
            .remove(&(subject.to_string(), hemisphere, surface))
    }
}

impl SubjectResources for InMemoryResources {
    fn volume(&self, subject: &str, name: &str) -> Option<&Volume> {
        self.volumes.get(&(subject.to_string(), name.to_string()))
    }

    fn lookup_table(&self, subject: &str, volume_name: &str) -> Option<&LookupTable> {
        self.lookup_tables
            .get(&(subject.to_string(), volume_name.to_string()))
    }

    fn surface(
        &self,
        subject: &str,
        hemisphere: Hemisphere,
        surface: SurfaceType,
    ) -> Option<&Mesh> {
        self.surfaces
            .get(&(subject.to_string(), hemisphere, surface))
    }

    fn tkr_to_scanner(&self, subject: &str) -> Option<Matrix4> {
        self.tkr_to_scanner.get(subject).copied()
    }

    fn scanner_to_mni305(&self, subject: &str) -> Option<Matrix4> {
        self.scanner_to_mni305.get(subject).copied()
    }
}
