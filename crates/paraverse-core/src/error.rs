use thiserror::Error;

use crate::IdKind;

/// Errors that can occur in paraverse-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A dataset file could not be parsed.
    #[error("Parse error in {file} line {line}: {message}")]
    Parse {
        /// File being read.
        file: String,
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// An id outside the declared vocabulary.
    #[error("{kind} id {id} out of range (total {total})")]
    IdOutOfRange {
        /// Entity or relation.
        kind: IdKind,
        /// Offending id.
        id: u32,
        /// Vocabulary size.
        total: usize,
    },
    /// Sampling a universe failed.
    #[error("Sampling error: {0}")]
    Sampling(String),
}

/// Result type alias for paraverse-core.
pub type Result<T> = std::result::Result<T, Error>;
