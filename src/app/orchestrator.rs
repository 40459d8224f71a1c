//! Wires the change monitor, the downloader and the file processor together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use harvester_core::{
    ChangeMonitor, DownloadResult, Downloader, FileProcessor, HttpClient, MarcFileInspector,
    MetadataStore, SweepStats,
};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app_config::FileConfig;

/// Outcome of one sweep plus post-processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SweepReport {
    pub(crate) stats: SweepStats,
    pub(crate) processing_failures: usize,
}

impl SweepReport {
    pub(crate) fn is_clean(&self) -> bool {
        self.stats.failed == 0 && self.processing_failures == 0
    }
}

/// Runs sweeps in manual, monitor and forced modes.
pub(crate) struct Harvester {
    downloader: Downloader,
    processor: Arc<dyn FileProcessor>,
    monitor_client: HttpClient,
    monitor_url: String,
    check_interval: Duration,
}

impl Harvester {
    /// Opens the metadata store and builds the HTTP clients.
    ///
    /// Fails when the metadata file exists but cannot be parsed.
    pub(crate) async fn from_config(config: &FileConfig) -> Result<Self> {
        let downloader_config = config.downloader_config();
        let store = MetadataStore::open(&downloader_config.download_path)
            .await
            .context("Failed to open metadata store")?;
        info!(
            path = %store.path().display(),
            records = store.len().await,
            "metadata store loaded"
        );

        let download_client =
            HttpClient::with_timeouts(config.connect_timeout_secs(), config.request_timeout_secs());
        let downloader = Downloader::new(downloader_config, download_client, Arc::new(store))?;

        Ok(Self {
            downloader,
            processor: Arc::new(MarcFileInspector),
            monitor_client: HttpClient::with_timeouts(
                config.connect_timeout_secs(),
                config.monitor_timeout_secs(),
            ),
            monitor_url: config.monitor_url().to_string(),
            check_interval: config.check_interval(),
        })
    }

    /// Runs one sweep and fails if any category or file failed.
    pub(crate) async fn run_manual(&self, token: &CancellationToken) -> Result<()> {
        info!("running manual sweep");
        let report = run_sweep(&self.downloader, self.processor.as_ref(), token).await;
        if !report.is_clean() {
            bail!(
                "sweep finished with {} failed categories and {} processing errors",
                report.stats.failed,
                report.processing_failures
            );
        }
        Ok(())
    }

    /// Watches for changes and sweeps on each one until `token` is cancelled.
    ///
    /// With `force`, one sweep starts immediately. Changes that arrive while a
    /// sweep is running are coalesced into one follow-up sweep, started as soon
    /// as the running one finishes.
    pub(crate) async fn run_monitor(&self, token: &CancellationToken, force: bool) -> Result<()> {
        let monitor = ChangeMonitor::new(
            self.monitor_client.clone(),
            self.monitor_url.clone(),
            self.check_interval,
        );
        info!(
            url = %self.monitor_url,
            interval_secs = self.check_interval.as_secs(),
            "starting change monitor"
        );
        let mut handle = monitor.start(token.clone());

        let mut sweep: Option<JoinHandle<SweepReport>> = None;
        if force {
            info!("forced sweep requested");
            sweep = Some(self.spawn_sweep(token));
        }

        let mut pending = false;
        let mut errors_open = true;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                joined = join_sweep(&mut sweep), if sweep.is_some() => {
                    sweep = None;
                    if let Err(e) = joined {
                        warn!(error = %e, "sweep task panicked");
                    }
                    if pending {
                        pending = false;
                        info!("starting queued sweep");
                        sweep = Some(self.spawn_sweep(token));
                    }
                }
                event = handle.changes.recv() => {
                    let Some(event) = event else { break };
                    info!(
                        url = %event.url,
                        first = event.is_first_observation,
                        fingerprint = %event.fingerprint,
                        "change detected"
                    );
                    if sweep.is_some() {
                        info!("sweep still running, queued another");
                        pending = true;
                        continue;
                    }
                    sweep = Some(self.spawn_sweep(token));
                }
                poll_error = handle.errors.recv(), if errors_open => match poll_error {
                    Some(e) => warn!(error = %e, "monitor poll failed"),
                    None => errors_open = false,
                },
            }
        }

        info!("shutting down");
        if let Some(running) = sweep
            && let Err(e) = running.await
        {
            warn!(error = %e, "sweep task panicked");
        }
        if let Err(e) = handle.task.await {
            warn!(error = %e, "monitor task panicked");
        }
        Ok(())
    }

    fn spawn_sweep(&self, token: &CancellationToken) -> JoinHandle<SweepReport> {
        let downloader = self.downloader.clone();
        let processor = Arc::clone(&self.processor);
        let token = token.clone();
        tokio::spawn(async move { run_sweep(&downloader, processor.as_ref(), &token).await })
    }
}

/// Waits for the running sweep; pending forever when there is none.
async fn join_sweep(
    sweep: &mut Option<JoinHandle<SweepReport>>,
) -> Result<SweepReport, JoinError> {
    match sweep {
        Some(running) => running.await,
        None => std::future::pending().await,
    }
}

/// Runs one sweep, logs every failure and processes freshly fetched files.
pub(crate) async fn run_sweep(
    downloader: &Downloader,
    processor: &dyn FileProcessor,
    token: &CancellationToken,
) -> SweepReport {
    let results = downloader.download_all(token).await;
    let stats = SweepStats::from_results(&results);
    let processing_failures = process_results(&results, processor).await;

    let report = SweepReport {
        stats,
        processing_failures,
    };
    if report.is_clean() {
        info!(
            fetched = stats.fetched,
            up_to_date = stats.up_to_date,
            "all categories current"
        );
    } else {
        warn!(
            failed = stats.failed,
            processing_failures, "sweep finished with errors"
        );
    }
    report
}

async fn process_results(results: &[DownloadResult], processor: &dyn FileProcessor) -> usize {
    let mut failures = 0;
    for result in results {
        if let Some(e) = &result.error {
            error!(category = %result.category, error = %e, "category failed");
            continue;
        }
        if !result.fetched {
            debug!(category = %result.category, "up to date, nothing to process");
            continue;
        }
        let Some(path) = &result.local_file_path else {
            continue;
        };
        if let Err(e) = processor.process(path).await {
            error!(category = %result.category, error = %e, "processing failed");
            failures += 1;
        }
    }
    failures
}
