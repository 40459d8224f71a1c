//! JSON-file backed store of per-category remote modification times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::MetadataError;

/// Name of the backing file created under the store's base path.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Last known remote version of one category's file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileMetadata {
    /// Category identifier this record belongs to.
    pub category: String,
    /// `Last-Modified` of the remote file at the time it was fetched.
    pub last_modified: DateTime<Utc>,
    /// Local time the record was written.
    pub last_checked: DateTime<Utc>,
}

/// Durable category → [`RemoteFileMetadata`] mapping.
///
/// All access goes through one async mutex, which also serializes the full
/// file rewrites, so the store can be shared behind an `Arc` by concurrent
/// downloads without any external locking.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    files: Mutex<BTreeMap<String, RemoteFileMetadata>>,
}

impl MetadataStore {
    /// Opens the store rooted at `base_path`.
    ///
    /// A missing backing file yields an empty store. The directory is not
    /// created until the first update.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Read`] if the file exists but cannot be read,
    /// or [`MetadataError::Corrupt`] if its content is not a valid mapping.
    #[instrument(skip(base_path), fields(base_path = %base_path.display()))]
    pub async fn open(base_path: &Path) -> Result<Self, MetadataError> {
        let path = base_path.join(METADATA_FILE_NAME);

        let files = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<BTreeMap<String, RemoteFileMetadata>>(&raw)
                .map_err(|e| MetadataError::corrupt(path.clone(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no metadata file yet, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(MetadataError::read(path, e)),
        };

        debug!(path = %path.display(), records = files.len(), "metadata store opened");

        Ok(Self {
            path,
            files: Mutex::new(files),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored remote modification time for `category`, if any.
    pub async fn get_last_modified(&self, category: &str) -> Option<DateTime<Utc>> {
        self.files
            .lock()
            .await
            .get(category)
            .map(|record| record.last_modified)
    }

    /// Returns the full record for `category`, if any.
    pub async fn get(&self, category: &str) -> Option<RemoteFileMetadata> {
        self.files.lock().await.get(category).cloned()
    }

    /// Number of categories with a stored record.
    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    /// Returns true when no category has been recorded yet.
    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }

    /// Records `last_modified` for `category` and rewrites the backing file.
    ///
    /// The in-memory mapping is updated before the flush and keeps the new
    /// value even if the flush fails; the next successful flush writes it out.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::PersistenceFailed`] if the file cannot be
    /// written, or [`MetadataError::Serialize`] if the mapping cannot be encoded.
    #[instrument(skip(self, last_modified), fields(category = %category))]
    pub async fn update_last_modified(
        &self,
        category: &str,
        last_modified: DateTime<Utc>,
    ) -> Result<(), MetadataError> {
        let mut files = self.files.lock().await;
        files.insert(
            category.to_string(),
            RemoteFileMetadata {
                category: category.to_string(),
                last_modified,
                last_checked: Utc::now(),
            },
        );

        // Lock is held across the write so rewrites never interleave.
        self.persist(&files).await
    }

    async fn persist(
        &self,
        files: &BTreeMap<String, RemoteFileMetadata>,
    ) -> Result<(), MetadataError> {
        let data = serde_json::to_vec_pretty(files).map_err(MetadataError::Serialize)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MetadataError::persistence_failed(self.path.clone(), e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp_path, &data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(MetadataError::persistence_failed(self.path.clone(), e));
        }
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| MetadataError::persistence_failed(self.path.clone(), e))?;

        debug!(path = %self.path.display(), records = files.len(), "metadata persisted");
        Ok(())
    }
}
