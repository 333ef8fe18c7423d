//! Error types for proteodiff

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum ProteoError {
    #[error("Alignment mismatch: expected {expected}, got {got}")]
    Alignment { expected: String, got: String },

    #[error("Insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("MCAR proportion estimation failed: {reason}")]
    Estimation { reason: String },

    #[error("Degenerate test statistic for protein '{protein_id}': {reason}")]
    DegenerateStatistic { protein_id: String, reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("Computation cancelled before completion")]
    Cancelled,
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ProteoError>;
