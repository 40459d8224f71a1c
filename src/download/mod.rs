//! Freshness-checked downloads of category files.
//!
//! This module checks each category's remote file against the recorded
//! modification time and streams only newer files to disk.
//!
//! # Features
//!
//! - HEAD probe of `Last-Modified` before any transfer
//! - Streaming downloads through a `.part` file and atomic rename
//! - Bounded concurrency shared by every sweep of one [`Downloader`]
//! - Fixed-delay retries that stop promptly on cancellation
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::download::HttpClient;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let token = CancellationToken::new();
//! let file = client
//!     .download_to_path(
//!         "https://example.com/exports/KIT-mrc_new.mrc",
//!         Path::new("./downloads/KIT/KIT-mrc_new.mrc"),
//!         &token,
//!     )
//!     .await?;
//! println!("Downloaded {} bytes", file.bytes_written);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod result;
mod retry;

pub use client::{FetchedPage, HttpClient, StreamedFile, parse_last_modified};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
    MAX_CONCURRENCY, MIN_CONCURRENCY, REQUEST_TIMEOUT_SECS,
};
pub use engine::{Downloader, DownloaderConfig, DownloaderError};
pub use error::{DownloadError, FetchError};
pub use result::{DownloadResult, SweepStats};
pub use retry::{RetryDecision, RetryPolicy, wait_or_cancel};
