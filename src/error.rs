//! Error taxonomy for the localization core.
//!
//! Only errors that would otherwise corrupt coordinates are raised to the
//! caller (`InsufficientPoints`, `DegenerateTriangle`, `ShapeMismatch`,
//! `InvalidSpacing`, `SingularTransform`). Missing resources, empty voxel
//! searches and SVD non-convergence are absorbed where they happen and turn
//! into a well-defined fallback value; their variants exist so that lower
//! layers can report them when a caller asks for the strict form.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalizeError {
    #[error("insufficient points: {required} required, {found} given")]
    InsufficientPoints { required: usize, found: usize },

    #[error("degenerate triangle: {0}")]
    DegenerateTriangle(String),

    #[error("missing resource: {0}")]
    MissingResource(String),

    #[error("no voxel matched the value selection inside the search radius")]
    NoMatch,

    #[error("SVD did not converge within {iterations} QR sweeps")]
    NonConvergence { iterations: usize },

    #[error("volume buffer holds {found} values, shape requires {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("affine transform is singular")]
    SingularTransform,

    #[error("invalid spacing schedule: {0}")]
    InvalidSpacing(String),
}

pub type Result<T> = std::result::Result<T, LocalizeError>;
