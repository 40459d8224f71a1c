//! Per-category sweep results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::FetchError;

/// Outcome of checking (and possibly fetching) one category in a sweep.
#[derive(Debug)]
pub struct DownloadResult {
    /// Category identifier.
    pub category: String,
    /// URL the category file is published at.
    pub source_url: String,
    /// Path of the current local copy; `None` when the category failed.
    pub local_file_path: Option<PathBuf>,
    /// Why the category failed, if it did.
    pub error: Option<FetchError>,
    /// When work on this category started.
    pub started_at: DateTime<Utc>,
    /// Remote modification time of the local copy.
    pub remote_last_modified: Option<DateTime<Utc>>,
    /// True when a GET actually transferred the body in this sweep.
    pub fetched: bool,
}

impl DownloadResult {
    pub(crate) fn fetched(
        category: &str,
        source_url: &str,
        started_at: DateTime<Utc>,
        path: PathBuf,
        remote_last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            category: category.to_string(),
            source_url: source_url.to_string(),
            local_file_path: Some(path),
            error: None,
            started_at,
            remote_last_modified: Some(remote_last_modified),
            fetched: true,
        }
    }

    pub(crate) fn up_to_date(
        category: &str,
        source_url: &str,
        started_at: DateTime<Utc>,
        path: PathBuf,
        stored_last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            category: category.to_string(),
            source_url: source_url.to_string(),
            local_file_path: Some(path),
            error: None,
            started_at,
            remote_last_modified: Some(stored_last_modified),
            fetched: false,
        }
    }

    pub(crate) fn failed(
        category: &str,
        source_url: &str,
        started_at: DateTime<Utc>,
        error: FetchError,
    ) -> Self {
        Self {
            category: category.to_string(),
            source_url: source_url.to_string(),
            local_file_path: None,
            error: Some(error),
            started_at,
            remote_last_modified: None,
            fetched: false,
        }
    }

    /// Returns true when the category has a current local file.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Counts from a finished sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Categories whose file was transferred.
    pub fetched: usize,
    /// Categories skipped because the local copy was current.
    pub up_to_date: usize,
    /// Categories that failed.
    pub failed: usize,
}

impl SweepStats {
    /// Tallies a set of results.
    #[must_use]
    pub fn from_results(results: &[DownloadResult]) -> Self {
        results.iter().fold(Self::default(), |mut stats, result| {
            if !result.is_success() {
                stats.failed += 1;
            } else if result.fetched {
                stats.fetched += 1;
            } else {
                stats.up_to_date += 1;
            }
            stats
        })
    }

    /// Total number of categories in the sweep.
    #[must_use]
    pub fn total(&self) -> usize {
        self.fetched + self.up_to_date + self.failed
    }
}
