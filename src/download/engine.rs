//! Sweep engine: freshness check plus bounded concurrent fetch with retry.
//!
//! The [`Downloader`] checks every selected category against the
//! [`MetadataStore`], fetches only the ones whose remote file is newer, and
//! records the new remote timestamp once the body is safely on disk.
//!
//! # Concurrency Model
//!
//! - Each category runs in its own Tokio task
//! - A semaphore permit is acquired before any network work starts
//! - Permits are released automatically when the task finishes (RAII)
//! - The semaphore lives on the downloader, so overlapping sweeps share one ceiling
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::download::{Downloader, DownloaderConfig, HttpClient};
//! use harvester_core::metadata::MetadataStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloaderConfig::default();
//! let store = Arc::new(MetadataStore::open(&config.download_path).await?);
//! let downloader = Downloader::new(config, HttpClient::new(), store)?;
//! let results = downloader.download_all(&CancellationToken::new()).await;
//! println!("{} categories checked", results.len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::result::{DownloadResult, SweepStats};
use super::retry::{RetryDecision, RetryPolicy, wait_or_cancel};
use super::{DownloadError, FetchError, HttpClient};
use crate::category::{CATEGORIES, Category, DEFAULT_BASE_URL, find_category, local_file_name};
use crate::metadata::MetadataStore;

/// Error type for downloader construction.
#[derive(Debug, thiserror::Error)]
pub enum DownloaderError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Settings for a [`Downloader`].
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Prefix every category id is appended to.
    pub base_url: String,
    /// Root of the per-category download directories and the metadata file.
    pub download_path: PathBuf,
    /// Ceiling on simultaneous category downloads.
    pub max_concurrent_downloads: usize,
    /// GET attempt budget and delay.
    pub retry_policy: RetryPolicy,
    /// Allow-list of category ids; empty means every category.
    pub selected_categories: Vec<String>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            download_path: PathBuf::from("./downloads"),
            max_concurrent_downloads: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            selected_categories: Vec::new(),
        }
    }
}

/// Checks and fetches category files.
///
/// Cheap to clone; clones share the HTTP client, the metadata store and the
/// concurrency gate.
#[derive(Debug, Clone)]
pub struct Downloader {
    config: Arc<DownloaderConfig>,
    client: HttpClient,
    metadata: Arc<MetadataStore>,
    semaphore: Arc<Semaphore>,
}

impl Downloader {
    /// Creates a downloader.
    ///
    /// # Errors
    ///
    /// Returns [`DownloaderError::InvalidConcurrency`] if
    /// `max_concurrent_downloads` is outside 1-100.
    #[instrument(level = "debug", skip_all)]
    pub fn new(
        config: DownloaderConfig,
        client: HttpClient,
        metadata: Arc<MetadataStore>,
    ) -> Result<Self, DownloaderError> {
        let concurrency = config.max_concurrent_downloads;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(DownloaderError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = config.retry_policy.max_attempts(),
            retry_delay_ms = config.retry_policy.delay().as_millis(),
            base_url = %config.base_url,
            "creating downloader"
        );

        Ok(Self {
            config: Arc::new(config),
            client,
            metadata,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        })
    }

    /// Categories processed by [`download_all`](Self::download_all).
    ///
    /// Unknown ids in the allow-list are logged and ignored.
    #[must_use]
    pub fn selected_categories(&self) -> Vec<&'static Category> {
        let selected = &self.config.selected_categories;
        if selected.is_empty() {
            return CATEGORIES.iter().collect();
        }

        for id in selected {
            if find_category(id).is_none() {
                warn!(category = %id, "ignoring unknown selected category");
            }
        }

        CATEGORIES
            .iter()
            .filter(|category| selected.iter().any(|id| id == category.id))
            .collect()
    }

    /// Returns the deterministic local path for a category file.
    #[must_use]
    pub fn expected_path(&self, category: &str, url: &str) -> PathBuf {
        self.config
            .download_path
            .join(category)
            .join(local_file_name(category, url))
    }

    /// Checks and, where needed, fetches every selected category.
    ///
    /// Returns exactly one result per selected category; callers must not
    /// rely on their order. Individual failures never abort the sweep. After `token` is
    /// cancelled, unfinished categories resolve promptly with
    /// [`FetchError::Cancelled`].
    #[instrument(skip_all)]
    pub async fn download_all(&self, token: &CancellationToken) -> Vec<DownloadResult> {
        let categories = self.selected_categories();
        info!(categories = categories.len(), "starting sweep");

        let mut handles = Vec::with_capacity(categories.len());
        for category in categories {
            let url = category.url(&self.config.base_url);
            debug!(category = %category.id, url = %url, "scheduling category");

            let downloader = self.clone();
            let token = token.clone();
            let task_url = url.clone();
            let handle = tokio::spawn(async move {
                let started_at = Utc::now();
                let permit = tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    permit = Arc::clone(&downloader.semaphore).acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return DownloadResult::failed(
                        category.id,
                        &task_url,
                        started_at,
                        FetchError::cancelled(&task_url),
                    );
                };

                downloader.download(category.id, &task_url, &token).await
            });
            handles.push((category.id, url, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (category, url, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(category = %category, error = %e, "download task panicked");
                    results.push(DownloadResult::failed(
                        category,
                        &url,
                        Utc::now(),
                        FetchError::TaskAborted {
                            url: url.clone(),
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }

        let stats = SweepStats::from_results(&results);
        info!(
            fetched = stats.fetched,
            up_to_date = stats.up_to_date,
            failed = stats.failed,
            total = stats.total(),
            "sweep complete"
        );

        results
    }

    /// Checks one category and fetches it if the remote file is newer.
    ///
    /// Does not take a concurrency permit; [`download_all`](Self::download_all)
    /// does that around each call.
    #[instrument(skip(self, token), fields(category = %category, url = %url))]
    pub async fn download(
        &self,
        category: &str,
        url: &str,
        token: &CancellationToken,
    ) -> DownloadResult {
        let started_at = Utc::now();
        let dest = self.expected_path(category, url);

        let remote_last_modified = match self.client.probe_last_modified(url, token).await {
            // Fail open: an unknown remote time forces a fetch.
            Ok(remote) => remote.unwrap_or_else(Utc::now),
            Err(e) => {
                return DownloadResult::failed(
                    category,
                    url,
                    started_at,
                    FetchError::probe_failed(url, e),
                );
            }
        };

        if let Some(stored) = self.metadata.get_last_modified(category).await {
            debug!(remote = %remote_last_modified, local = %stored, "comparing timestamps");
            if remote_last_modified <= stored {
                info!("already at the latest version, skipping download");
                return DownloadResult::up_to_date(category, url, started_at, dest, stored);
            }
        }

        let policy = &self.config.retry_policy;
        let mut attempt = 0u32;
        let last_error: DownloadError = loop {
            attempt += 1;
            debug!(attempt, "attempting download");

            let error = match self.client.download_to_path(url, &dest, token).await {
                Ok(file) => {
                    info!(
                        path = %file.path.display(),
                        bytes = file.bytes_written,
                        "download completed"
                    );
                    if let Err(e) = self
                        .metadata
                        .update_last_modified(category, remote_last_modified)
                        .await
                    {
                        warn!(error = %e, "failed to update metadata");
                    }
                    return DownloadResult::fetched(
                        category,
                        url,
                        started_at,
                        file.path,
                        remote_last_modified,
                    );
                }
                Err(e) if e.is_cancelled() => {
                    return DownloadResult::failed(
                        category,
                        url,
                        started_at,
                        FetchError::cancelled(url),
                    );
                }
                Err(e) => e,
            };

            match policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt,
                        next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "download attempt failed, retrying"
                    );
                    if !wait_or_cancel(delay, token).await {
                        return DownloadResult::failed(
                            category,
                            url,
                            started_at,
                            FetchError::cancelled(url),
                        );
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying download");
                    break error;
                }
            }
        };

        warn!(attempts = attempt, error = %last_error, "download failed after all attempts");
        DownloadResult::failed(
            category,
            url,
            started_at,
            FetchError::retrieval_exhausted(url, attempt, last_error),
        )
    }
}
