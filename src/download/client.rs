//! HTTP client wrapper for freshness probes and streaming downloads.
//!
//! Every request races a [`CancellationToken`], so cancelling a sweep or the
//! monitor aborts in-flight transfers instead of waiting for the timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{ETAG, HeaderMap, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use super::error::DownloadError;

/// User-Agent sent with every request.
fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("marc-harvester/{version}")
}

/// HTTP client shared by the downloader and the change monitor.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Outcome of a completed GET streamed to disk.
#[derive(Debug, Clone)]
pub struct StreamedFile {
    /// Final output path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes_written: u64,
}

/// Body and selected headers of a fully buffered GET.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Raw response body.
    pub body: Vec<u8>,
    /// Parsed `Last-Modified`, if present and valid.
    pub last_modified: Option<DateTime<Utc>>,
    /// `ETag` header value, if present.
    pub etag: Option<String>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30 s connect, 10 min request).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, request_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(request_timeout_secs))
            .gzip(true)
            .user_agent(default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Issues a HEAD request and returns the remote `Last-Modified` time.
    ///
    /// A missing or unparsable header yields `Ok(None)`; the caller decides
    /// how to treat an unknown modification time.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, any status other than
    /// 200, or cancellation.
    #[instrument(skip(self, token), fields(url = %url))]
    pub async fn probe_last_modified(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Option<DateTime<Utc>>, DownloadError> {
        let response = self.send(self.client.head(url), url, token).await?;
        let last_modified = parse_last_modified(response.headers());
        debug!(?last_modified, "probe complete");
        Ok(last_modified)
    }

    /// Downloads `url` into `dest`, replacing any existing file.
    ///
    /// The body is streamed into a sibling `.part` file that is renamed over
    /// `dest` only after the last byte is flushed, so `dest` never holds a
    /// truncated body. The `.part` file is removed on any failure.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on invalid URL, transport failure, non-200
    /// status, disk errors, or cancellation.
    #[must_use = "download result contains the path to the downloaded file"]
    #[instrument(skip(self, token), fields(url = %url, dest = %dest.display()))]
    pub async fn download_to_path(
        &self,
        url: &str,
        dest: &Path,
        token: &CancellationToken,
    ) -> Result<StreamedFile, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.send(self.client.get(url), url, token).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let part_path = part_path_for(dest);
        let mut file = File::create(&part_path)
            .await
            .map_err(|e| DownloadError::io(part_path.clone(), e))?;

        let stream_result = tokio::select! {
            biased;
            () = token.cancelled() => Err(DownloadError::cancelled(url)),
            result = stream_to_file(&mut file, response, url, &part_path) => result,
        };
        drop(file);

        let bytes_written = match stream_result {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part_path, dest).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::io(dest, e));
        }

        debug!(bytes = bytes_written, "download complete");
        Ok(StreamedFile {
            path: dest.to_path_buf(),
            bytes_written,
        })
    }

    /// Issues a GET and buffers the whole body in memory.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-success status, or
    /// cancellation.
    #[instrument(skip(self, token), fields(url = %url))]
    pub async fn fetch_page(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FetchedPage, DownloadError> {
        let response = self.send(self.client.get(url), url, token).await?;
        let last_modified = parse_last_modified(response.headers());
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = tokio::select! {
            biased;
            () = token.cancelled() => return Err(DownloadError::cancelled(url)),
            body = response.bytes() => body.map_err(|e| DownloadError::network(url, e))?,
        };

        Ok(FetchedPage {
            body: body.to_vec(),
            last_modified,
            etag,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        token: &CancellationToken,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(DownloadError::cancelled(url)),
            response = request.send() => response.map_err(|e| DownloadError::network(url, e))?,
        };

        if response.status() != StatusCode::OK {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        Ok(response)
    }
}

/// Parses `Last-Modified` as an RFC 1123 HTTP date.
#[must_use]
pub fn parse_last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let raw = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    match httpdate::parse_http_date(raw) {
        Ok(time) => Some(DateTime::<Utc>::from(time)),
        Err(e) => {
            debug!(value = %raw, error = %e, "unparsable Last-Modified header");
            None
        }
    }
}

/// Temporary path the body is streamed into before the final rename.
fn part_path_for(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
