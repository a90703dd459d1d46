use thiserror::Error;

/// Errors that can occur in paraverse-kge.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any work was done.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Training could not produce usable parameters.
    #[error("Training error: {0}")]
    Training(String),
    /// Embedding shapes disagree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected width.
        expected: usize,
        /// Width found.
        actual: usize,
    },
}

/// Result type alias for paraverse-kge.
pub type Result<T> = std::result::Result<T, Error>;
