//! Error types for the change monitor.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors reported on the monitor's error channel.
///
/// None of these stop the monitor; the next tick polls again.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The page could not be fetched.
    #[error("poll of {url} failed: {source}")]
    PollFailed {
        /// The monitored URL.
        url: String,
        /// The request error.
        #[source]
        source: DownloadError,
    },
}

impl MonitorError {
    /// Creates a poll failure.
    pub fn poll_failed(url: impl Into<String>, source: DownloadError) -> Self {
        Self::PollFailed {
            url: url.into(),
            source,
        }
    }

    /// Returns the URL the failure relates to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::PollFailed { url, .. } => url,
        }
    }
}
