//! Post-download processing of fetched category files.
//!
//! The binary hands every freshly fetched file to a [`FileProcessor`]. The
//! shipped [`MarcFileInspector`] only sanity-checks the file; real MARC
//! parsing plugs in behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors produced while processing a downloaded file.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file being processed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file exists but holds no data.
    #[error("{path} is empty")]
    Empty {
        /// The file being processed.
        path: PathBuf,
    },

    /// Processor-specific failure.
    #[error("processing {path} failed: {message}")]
    Failed {
        /// The file being processed.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Consumer of downloaded category files.
///
/// Uses `async_trait` so processors can be held as `Arc<dyn FileProcessor>`.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Processes the file at `path`.
    async fn process(&self, path: &Path) -> Result<(), ProcessError>;
}

/// Checks a downloaded file exists and is non-empty, and logs its size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcFileInspector;

#[async_trait]
impl FileProcessor for MarcFileInspector {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn process(&self, path: &Path) -> Result<(), ProcessError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| ProcessError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if metadata.len() == 0 {
            return Err(ProcessError::Empty {
                path: path.to_path_buf(),
            });
        }

        info!(bytes = metadata.len(), "file ready for processing");
        Ok(())
    }
}
