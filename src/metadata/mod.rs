//! Durable per-category freshness state.
//!
//! The [`MetadataStore`] remembers, for every category, the `Last-Modified`
//! timestamp of the most recently fetched remote file. It is backed by a
//! single JSON file under the download directory and is rewritten wholesale
//! on every update.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use harvester_core::metadata::MetadataStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MetadataStore::open(Path::new("./downloads")).await?;
//! store.update_last_modified("VIDEO", Utc::now()).await?;
//! assert!(store.get_last_modified("VIDEO").await.is_some());
//! # Ok(())
//! # }
//! ```

mod error;
mod store;

pub use error::MetadataError;
pub use store::{METADATA_FILE_NAME, MetadataStore, RemoteFileMetadata};
