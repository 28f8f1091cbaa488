//! Error taxonomy for compression runs
//!
//! Configuration and persistence errors are fatal and surface to the caller.
//! Numerical degradation (a singular Hessian during reconstruction) is
//! recovered locally with a simpler estimator and recorded in the
//! [`CompressionReport`](crate::pipeline::CompressionReport) instead of
//! appearing here.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CompressError>;

/// Errors surfaced by the compression pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("Invalid bit width: {0} (must be 4, 8, or 16)")]
    InvalidBits(u8),

    #[error("Unknown quantization scheme: {0} (expected one of: W4A16, W4A8, W8A8, W8A16)")]
    UnknownScheme(String),

    #[error("Invalid group size: {0} (must be > 0)")]
    InvalidGroupSize(usize),

    #[error("Invalid smoothing strength: {0} (must be in [0.0, 1.0])")]
    InvalidSmoothingStrength(f32),

    #[error("Invalid sparsity ratio: {0} (must be in [0.0, 1.0))")]
    InvalidSparsityRatio(f32),

    #[error("Invalid N:M sparsity pattern: {n}:{m} (requires 0 < n < m)")]
    InvalidSparsityPattern { n: usize, m: usize },

    #[error("Invalid block size: {0} (must be > 0)")]
    InvalidBlockSize(usize),

    #[error("Invalid damping factor: {0} (must be > 0.0)")]
    InvalidDampingFactor(f32),

    #[error("Invalid selector pattern '{pattern}': {reason}")]
    InvalidSelector { pattern: String, reason: String },

    #[error("Recipe contains no modifiers")]
    EmptyRecipe,

    #[error("Recipe parse error: {0}")]
    RecipeParse(String),

    #[error("Unknown layer '{0}' referenced by recipe")]
    UnknownLayer(String),

    #[error("Calibration failed at sample {sample_index}, layer '{layer}': {reason}")]
    Calibration { sample_index: usize, layer: String, reason: String },

    #[error("Checkpoint persistence failed: {0}")]
    Persistence(String),

    #[error("Checkpoint payload digest mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Checkpoint tensor '{name}' is malformed: {reason}")]
    MalformedCheckpoint { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CompressError {
    fn from(err: serde_json::Error) -> Self {
        CompressError::RecipeParse(err.to_string())
    }
}
