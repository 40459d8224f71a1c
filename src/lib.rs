//! Harvester Core Library
//!
//! This library keeps a local mirror of the MARC bibliographic exports a
//! national library publishes per material category, downloading a file only
//! when the remote copy is newer than the one recorded locally.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`category`] - The fixed category table and URL construction
//! - [`download`] - Freshness probe, streaming downloads, sweep engine
//! - [`metadata`] - Persistent record of remote modification times
//! - [`monitor`] - Interval polling of the export listing for changes
//! - [`process`] - Post-download file processing hook

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod category;
pub mod download;
pub mod metadata;
pub mod monitor;
pub mod process;

// Re-export commonly used types
pub use category::{
    CATEGORIES, Category, DEFAULT_BASE_URL, MRC_FILE_SUFFIX, find_category, local_file_name,
};
pub use download::{
    DownloadError, DownloadResult, Downloader, DownloaderConfig, DownloaderError, FetchError,
    HttpClient, RetryPolicy, SweepStats,
};
pub use metadata::{MetadataError, MetadataStore, RemoteFileMetadata};
pub use monitor::{ChangeMonitor, ContentFingerprint, FileChangeEvent, MonitorError, MonitorHandle};
pub use process::{FileProcessor, MarcFileInspector, ProcessError};
