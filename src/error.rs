//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by quiz operations and dataset loading.
///
/// Storage failures wrap the underlying `rusqlite` error unchanged; the
/// session guarantees its in-memory state is untouched when one is
/// returned. Dataset variants are produced before a session is involved.
#[derive(Debug, Error)]
pub enum QuizError {
    /// A storage transaction failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A dataset file could not be read.
    #[error("failed to read dataset {}: {source}", path.display())]
    DatasetIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Dataset text was not valid JSON.
    #[error("failed to parse dataset: {0}")]
    DatasetParse(#[from] serde_json::Error),

    /// No preset with the given label exists in the registry.
    #[error("unknown preset dataset: {0:?}")]
    UnknownPreset(String),

    /// The chosen match property never occurs in the dataset.
    #[error("match property {0:?} does not occur in the dataset")]
    UnknownMatchProperty(String),
}
