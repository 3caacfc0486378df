//! Searches over a thresholded intensity volume.
//!
//! - [`closest_voxel`]: nearest voxel passing the volume's value selection,
//!   within a world-space radius and with an optional exclusion ball.
//! - [`blob_center`]: converge a seed voxel onto the sub-voxel centre of a
//!   bright blob (a contact artifact in CT).

pub mod blob_center;
pub mod closest_voxel;

pub use blob_center::{blob_center, refine_world_position};
pub use closest_voxel::{closest_voxel, closest_voxel_with, ClosestVoxel, Exclusion};
