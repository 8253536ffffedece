//! Error types for trace loading and PMD estimation.

use thiserror::Error;

/// Errors raised by the estimation engine and the trace loaders.
#[derive(Debug, Error)]
pub enum PmdError {
    /// A numeric parameter is outside its valid domain.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Two index-aligned sequences have different lengths.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Not enough samples to form a trace.
    #[error("insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A trace row that does not parse as `wavelength;intensity`.
    #[error("malformed row at line {line}: '{content}' ({reason})")]
    MalformedRow {
        line: usize,
        content: String,
        reason: String,
    },

    /// Filtering or masking left nothing to analyse.
    #[error("no usable data: {0}")]
    NoUsableData(String),

    /// File extension the loader does not understand.
    #[error("unsupported trace format: .{0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PmdError {
    /// Shorthand for [`PmdError::InvalidParameter`].
    pub fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        PmdError::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Result type for estimation and loading operations.
pub type Result<T> = std::result::Result<T, PmdError>;
