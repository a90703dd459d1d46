use thiserror::Error;

/// Errors that can occur in paraverse.
#[derive(Error, Debug)]
pub enum Error {
    /// A hyperparameter range is empty or malformed.
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    /// A configuration value is unusable.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// The sampler could not produce a universe.
    #[error("Sampling failed: {0}")]
    Sampling(#[source] paraverse_core::Error),
    /// Building or training a universe model failed.
    #[error("Training failed: {0}")]
    Training(#[source] paraverse_kge::Error),
    /// Dataset or id validation error.
    #[error(transparent)]
    Data(#[from] paraverse_core::Error),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Checkpoint encoding error, including required fields that are missing.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A checkpoint decoded but its tables disagree.
    #[error("Corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),
    /// Two ensembles over different vocabularies.
    #[error("Vocabulary mismatch: {ours:?} (entities, relations) vs {theirs:?}")]
    VocabularyMismatch {
        /// This ensemble's vocabulary sizes.
        ours: (usize, usize),
        /// The other ensemble's vocabulary sizes.
        theirs: (usize, usize),
    },
}

/// Result type alias for paraverse.
pub type Result<T> = std::result::Result<T, Error>;
