//! # ieegloc
//!
//! Geometry engine for localizing implanted **intracranial electrode contacts**.
//!
//! Given a rough 3D pick of a contact (from a CT, an MRI slice or a
//! crosshair), `ieegloc` refines it onto the contact's CT artifact, corrects
//! surface contacts for brain shift by projecting them through the
//! leptomeningeal envelope onto the pial surface, labels the result in
//! FreeSurfer atlases and fills in the remaining contacts of a linear lead.
//!
//! ## Features
//!
//! - **Rigid registration** with Kabsch / SVD, reflection-safe
//! - **Golub–Reinsch SVD** for general m×n matrices, non-convergence flagged instead of fatal
//! - **CT blob refinement** by iterative erosion and Gaussian-weighted centroiding
//! - **Brain-shift correction** through lepto → pial nearest-vertex projection
//! - **Atlas labeling** with majority-vote fallback over a voxel neighbourhood
//! - **Lead trajectories**: interpolation and extrapolation with spacing feedback
//! - **Contact sheets** persisted with [rkyv](https://docs.rs/rkyv)
//!
//! ## Example
//!
//! ```no_run
//! use ieegloc::{InMemoryResources, LocalizationConfig, Localizer, Spacing, Vector3};
//!
//! let resources = InMemoryResources::new();
//! // ... insert the subject's CT, atlases and surfaces ...
//!
//! let localizer = Localizer::new(&resources, "sub-01", LocalizationConfig::default());
//! let mut first = localizer.localize(Vector3::new(-32.0, 10.5, 4.0));
//! localizer.adjust(&mut first, None);
//! let last = localizer.localize(Vector3::new(-62.0, 12.0, 6.0));
//!
//! let lead = vec![first, last];
//! let estimate = localizer.interpolate(&lead, &Spacing::Uniform(9)).unwrap();
//! let contacts = localizer.contacts_from_estimate(&estimate);
//!
//! localizer.sheet(&contacts).save_to_file("sub-01_contacts.rkyv").unwrap();
//! ```
//!
//! ## Coordinate spaces
//!
//! World space is FreeSurfer tkrRAS (mm). Volumes and meshes carry their own
//! model-to-world affines; scanner RAS and MNI305 are only reached through
//! affines supplied by the host via [`SubjectResources`].

pub mod atlas;
pub mod error;
pub mod lead;
pub mod linalg;
pub mod mesh;
pub mod registration;
pub mod sampler;
pub mod volume;

pub use atlas::{label_at, Label, LookupTable};
pub use error::{LocalizeError, Result};
pub use lead::{
    AtlasSource, BrainShiftMode, ContactSheet, ContactSummary, ElectrodeContact, ElectrodeType,
    Hemisphere, InMemoryResources, LeadEstimate, LocalizationConfig, Localizer, Spacing,
    SubjectResources, SurfaceType, TrajectoryConfig,
};
pub use linalg::{svd, Svd};
pub use mesh::{project_onto_mesh, Mesh, MeshProjection};
pub use registration::{register_rigid, RigidTransform};
pub use sampler::{blob_center, closest_voxel, ClosestVoxel, Exclusion};
pub use volume::{ValueSelection, Volume};

// Coordinates are millimetres and feed downstream statistics; f64 throughout.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;
