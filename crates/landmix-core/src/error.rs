use thiserror::Error;

/// Errors produced by the land-use mix pipeline.
///
/// Per-item failures (one feature, one cell, one category) are collected into
/// skip-lists by the stage that hit them; only misconfiguration aborts a run.
#[derive(Debug, Error)]
pub enum LumError {
    /// A tag pair matched no classification rule.
    #[error("no category for tag {key}={value}")]
    Unclassifiable { key: String, value: String },

    /// Fewer than two distinct points, or a zero-spread axis, for one category.
    #[error("insufficient data for {category}: {distinct} distinct point(s)")]
    InsufficientData { category: String, distinct: usize },

    /// A phi metric was evaluated on a cell pair summing to zero.
    #[error("division by zero in {metric}")]
    DivisionByZero { metric: String },

    #[error("unknown phi metric `{0}`")]
    UnknownMetric(String),

    #[error("grid shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("invalid grid step: {0}")]
    InvalidStep(String),

    /// The evaluated density vanished everywhere on the grid.
    #[error("density for {category} sums to zero over the grid")]
    EmptyDensity { category: String },

    #[error("cache entry {key} is corrupted: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LumError>;
