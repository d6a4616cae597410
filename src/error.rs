//! Error types for rust_limma

use thiserror::Error;

/// Main error type for limma-voom operations
#[derive(Error, Debug)]
pub enum LimmaError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Invalid annotation table: {reason}")]
    InvalidAnnotation { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid design matrix: {reason}")]
    InvalidDesignMatrix { reason: String },

    #[error("Invalid contrast specification: {reason}")]
    InvalidContrast { reason: String },

    #[error("Normalization failed: {reason}")]
    NormalizationFailed { reason: String },

    #[error("Linear model fit failed for gene {gene_id}: {reason}")]
    FitFailed { gene_id: String, reason: String },

    #[error("Voom transform failed: {reason}")]
    VoomFailed { reason: String },

    #[error("Empirical Bayes moderation failed: {reason}")]
    EbayesFailed { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

/// Result type alias for limma-voom operations
pub type Result<T> = std::result::Result<T, LimmaError>;
