//! Error types for the metadata store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or persisting freshness metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The backing file exists but could not be read.
    #[error("failed to read metadata file {path}: {source}")]
    Read {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a valid metadata document.
    ///
    /// Fatal at startup: running with a silently emptied store would
    /// re-download every category and lose the dedup state.
    #[error(
        "metadata file {path} is corrupt: {source}\n  Suggestion: inspect or remove the file to rebuild state from scratch"
    )]
    Corrupt {
        /// Path of the backing file.
        path: PathBuf,
        /// The JSON decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory mapping could not be flushed to disk.
    #[error("failed to persist metadata to {path}: {source}")]
    PersistenceFailed {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The mapping could not be serialized.
    #[error("failed to serialize metadata: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl MetadataError {
    /// Creates a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a corruption error.
    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }

    /// Creates a persistence error.
    pub fn persistence_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PersistenceFailed {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the store could not be loaded because its file is malformed.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
