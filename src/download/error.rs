//! Error types for the download module.
//!
//! [`DownloadError`] describes why a single HTTP request failed;
//! [`FetchError`] describes why a whole category failed within a sweep.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a single HEAD or GET request.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Any status other than 200 OK.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an unexpected status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the body.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The request was abandoned because cancellation was requested.
    #[error("request to {url} cancelled")]
    Cancelled {
        /// The URL whose request was abandoned.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns true when the request was abandoned due to cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Why a category produced no fresh file in a sweep.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HEAD freshness probe failed. The probe is never retried.
    #[error("freshness probe failed for {url}: {source}")]
    ProbeFailed {
        /// The category URL.
        url: String,
        /// The request error.
        #[source]
        source: DownloadError,
    },

    /// Every retrieval attempt failed.
    #[error("all {attempts} download attempts failed for {url}: {source}")]
    RetrievalExhausted {
        /// The category URL.
        url: String,
        /// How many GET attempts were made.
        attempts: u32,
        /// The error from the most recent attempt.
        #[source]
        source: DownloadError,
    },

    /// Cancellation was observed during a request, a retry wait, or while
    /// waiting for a download slot.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The category URL.
        url: String,
    },

    /// The worker task for the category panicked or was aborted.
    #[error("download task for {url} aborted: {reason}")]
    TaskAborted {
        /// The category URL.
        url: String,
        /// Join error description.
        reason: String,
    },
}

impl FetchError {
    /// Wraps a probe failure, keeping cancellation distinct.
    pub fn probe_failed(url: impl Into<String>, source: DownloadError) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled { url: url.into() };
        }
        Self::ProbeFailed {
            url: url.into(),
            source,
        }
    }

    /// Wraps the last retrieval error after all attempts were used.
    pub fn retrieval_exhausted(
        url: impl Into<String>,
        attempts: u32,
        source: DownloadError,
    ) -> Self {
        Self::RetrievalExhausted {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns true for [`FetchError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
