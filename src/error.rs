use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacingError {
    #[error("invalid input: {0}")]
    Domain(String),

    #[error("cannot split {segments} segments into {legs} legs of at least {min_leg_length} segments")]
    InfeasiblePartition {
        segments: usize,
        legs: usize,
        min_leg_length: usize,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("interval [{start}, {end}) contains no segments")]
    NumericalDegeneracy { start: usize, end: usize },

    #[error("solve cancelled with {completed_layers} completed layers")]
    Cancelled { completed_layers: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse GPX file: {0}")]
    Gpx(String),
}

pub type Result<T> = std::result::Result<T, PacingError>;

impl PacingError {
    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        PacingError::Domain(msg.into())
    }
}
