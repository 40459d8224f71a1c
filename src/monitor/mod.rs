//! Change monitor for the published export listing.
//!
//! A [`ChangeMonitor`] polls one URL on a fixed interval, hashes the body with
//! SHA-256, and emits a [`FileChangeEvent`] whenever the digest differs from
//! the previous successful poll (and once on the first successful poll).
//! Fingerprints live only in the monitor's memory, so a restart always
//! produces a first-observation event.
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::download::HttpClient;
//! use harvester_core::monitor::ChangeMonitor;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let monitor = ChangeMonitor::new(
//!     HttpClient::new(),
//!     "https://example.com/exports/",
//!     Duration::from_secs(3600),
//! );
//! let mut handle = monitor.start(CancellationToken::new());
//! while let Some(event) = handle.changes.recv().await {
//!     println!("{} changed ({})", event.url, event.fingerprint);
//! }
//! # }
//! ```

mod error;
mod fingerprint;
mod watcher;

pub use error::MonitorError;
pub use fingerprint::ContentFingerprint;
pub use watcher::{ChangeMonitor, FileChangeEvent, MonitorHandle};
