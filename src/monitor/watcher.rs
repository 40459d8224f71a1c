//! Interval polling loop of the change monitor.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{ContentFingerprint, MonitorError};
use crate::download::HttpClient;

/// Shortest accepted poll interval; zero would spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A detected change of the monitored page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    /// The monitored URL.
    pub url: String,
    /// True on the first successful poll after start.
    pub is_first_observation: bool,
    /// `Last-Modified` of the page, or the poll time when absent.
    pub remote_last_modified: DateTime<Utc>,
    /// `ETag` of the page, if any. Informational only.
    pub etag: Option<String>,
    /// Fingerprint of the body that triggered the event.
    pub fingerprint: ContentFingerprint,
}

/// Receiving ends of a running monitor.
///
/// Both channels close once the monitor task ends.
#[derive(Debug)]
pub struct MonitorHandle {
    /// Detected changes.
    pub changes: mpsc::Receiver<FileChangeEvent>,
    /// Poll failures.
    pub errors: mpsc::Receiver<MonitorError>,
    /// The polling task.
    pub task: JoinHandle<()>,
}

/// Polls one URL and reports when its body changes.
#[derive(Debug)]
pub struct ChangeMonitor {
    client: HttpClient,
    url: String,
    interval: Duration,
    fingerprints: HashMap<String, ContentFingerprint>,
    token: CancellationToken,
}

impl ChangeMonitor {
    /// Creates a monitor for `url`, polled every `interval`.
    #[must_use]
    pub fn new(client: HttpClient, url: impl Into<String>, interval: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            interval: interval.max(MIN_INTERVAL),
            fingerprints: HashMap::new(),
            token: CancellationToken::new(),
        }
    }

    /// The monitored URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetches the page once and compares it with the last fingerprint.
    ///
    /// Returns `Ok(None)` when the body is unchanged. A failed poll leaves the
    /// stored fingerprint untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::PollFailed`] on transport failure or a
    /// non-success status.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn poll_once(&mut self) -> Result<Option<FileChangeEvent>, MonitorError> {
        let page = self
            .client
            .fetch_page(&self.url, &self.token)
            .await
            .map_err(|e| MonitorError::poll_failed(&self.url, e))?;

        let fingerprint = ContentFingerprint::of(&page.body);
        let previous = self.fingerprints.insert(self.url.clone(), fingerprint);

        match previous {
            Some(previous) if previous == fingerprint => {
                debug!(%fingerprint, "page unchanged");
                Ok(None)
            }
            previous => {
                let is_first_observation = previous.is_none();
                info!(%fingerprint, is_first_observation, "page change detected");
                Ok(Some(FileChangeEvent {
                    url: self.url.clone(),
                    is_first_observation,
                    remote_last_modified: page.last_modified.unwrap_or_else(Utc::now),
                    etag: page.etag,
                    fingerprint,
                }))
            }
        }
    }

    /// Spawns the polling loop.
    ///
    /// The first poll happens one interval after start. Cancelling `token`
    /// ends the loop, including while it waits on a full channel.
    #[must_use]
    pub fn start(mut self, token: CancellationToken) -> MonitorHandle {
        let (changes_tx, changes) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);
        self.token = token;

        let task = tokio::spawn(async move {
            self.run(changes_tx, errors_tx).await;
        });

        MonitorHandle {
            changes,
            errors,
            task,
        }
    }

    #[instrument(skip_all, fields(url = %self.url, interval_secs = self.interval.as_secs()))]
    async fn run(
        mut self,
        changes_tx: mpsc::Sender<FileChangeEvent>,
        errors_tx: mpsc::Sender<MonitorError>,
    ) {
        info!("change monitor started");
        let token = self.token.clone();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(Some(event)) => {
                    let sent = tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        sent = changes_tx.send(event) => sent,
                    };
                    if sent.is_err() {
                        info!("change receiver dropped, stopping monitor");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) if token.is_cancelled() => {
                    debug!(error = %e, "poll interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "poll failed");
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        // A dropped error receiver is not fatal.
                        _ = errors_tx.send(e) => {}
                    }
                }
            }
        }

        info!("change monitor stopped");
    }
}
