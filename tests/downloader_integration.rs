//! Integration tests for the sweep engine against a mock export server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use harvester_core::{
    DownloadError, DownloadResult, Downloader, DownloaderConfig, FetchError, HttpClient,
    MetadataStore, RetryPolicy, SweepStats,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

fn last_modified_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap()
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(100))
}

struct Harness {
    downloader: Downloader,
    store: Arc<MetadataStore>,
    dir: TempDir,
}

async fn harness(
    server: &MockServer,
    categories: &[&str],
    policy: RetryPolicy,
    concurrency: usize,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MetadataStore::open(dir.path()).await.unwrap());
    let config = DownloaderConfig {
        base_url: format!("{}/exports/", server.uri()),
        download_path: dir.path().to_path_buf(),
        max_concurrent_downloads: concurrency,
        retry_policy: policy,
        selected_categories: categories.iter().map(ToString::to_string).collect(),
    };
    let downloader = Downloader::new(config, HttpClient::new(), Arc::clone(&store)).unwrap();
    Harness {
        downloader,
        store,
        dir,
    }
}

async fn mount_head(server: &MockServer, category: &str, last_modified: &str) {
    Mock::given(method("HEAD"))
        .and(path(format!("/exports/{category}-mrc_new.mrc")))
        .respond_with(ResponseTemplate::new(200).insert_header("Last-Modified", last_modified))
        .mount(server)
        .await;
}

/// Fails the first `failures` requests with 503, then serves `body`.
struct FlakyResponder {
    calls: AtomicUsize,
    failures: usize,
    body: &'static [u8],
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            ResponseTemplate::new(503)
        } else {
            ResponseTemplate::new(200).set_body_bytes(self.body)
        }
    }
}

/// Serves every request after `delay` and tracks how many overlap.
struct OverlapRecorder {
    arrivals: Mutex<Vec<Instant>>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl Respond for OverlapRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now = Instant::now();
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.push(now);
        // A request that arrived under half a delay ago is still being served.
        let in_flight = arrivals
            .iter()
            .filter(|arrived| now.duration_since(**arrived) < self.delay / 2)
            .count();
        self.peak.fetch_max(in_flight, Ordering::SeqCst);
        ResponseTemplate::new(200)
            .set_body_bytes(b"records")
            .set_delay(self.delay)
    }
}

const SERVE_DELAY: Duration = Duration::from_millis(300);

/// Sweeps `categories` with the given ceiling; returns peak overlap and elapsed time.
async fn sweep_overlap(
    server: &MockServer,
    categories: &[&str],
    ceiling: usize,
) -> (usize, Duration) {
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("Last-Modified", LAST_MODIFIED))
        .mount(server)
        .await;
    let peak = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .respond_with(OverlapRecorder {
            arrivals: Mutex::new(Vec::new()),
            peak: Arc::clone(&peak),
            delay: SERVE_DELAY,
        })
        .expect(categories.len() as u64)
        .mount(server)
        .await;

    let h = harness(server, categories, fast_policy(1), ceiling).await;
    let started = Instant::now();
    let results = h.downloader.download_all(&CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), categories.len());
    assert!(results.iter().all(|r| r.fetched));
    (peak.load(Ordering::SeqCst), elapsed)
}

#[tokio::test]
async fn test_no_record_fetches_and_records_timestamp() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"00042nam kit records"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(3), 3).await;
    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.is_success(), "Unexpected error: {:?}", result.error);
    assert!(result.fetched);
    assert_eq!(result.category, "KIT");
    assert_eq!(result.remote_last_modified, Some(last_modified_time()));

    let expected = h.dir.path().join("KIT").join("KIT-mrc_new.mrc");
    assert_eq!(result.local_file_path.as_deref(), Some(expected.as_path()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"00042nam kit records");
    assert!(!h.dir.path().join("KIT").join("KIT-mrc_new.mrc.part").exists());

    assert_eq!(
        h.store.get_last_modified("KIT").await,
        Some(last_modified_time())
    );
    assert!(h.dir.path().join("metadata.json").exists());
}

#[tokio::test]
async fn test_up_to_date_category_issues_no_get() {
    let server = require_mock_server!();
    mount_head(&server, "VIDEO", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"unused"))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, &["VIDEO"], fast_policy(3), 3).await;
    h.store
        .update_last_modified("VIDEO", last_modified_time())
        .await
        .unwrap();

    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.is_success());
    assert!(!result.fetched);
    assert_eq!(result.remote_last_modified, Some(last_modified_time()));
    assert_eq!(
        result.local_file_path.as_deref(),
        Some(h.dir.path().join("VIDEO").join("VIDEO-mrc_new.mrc").as_path())
    );
}

#[tokio::test]
async fn test_remote_older_than_stored_issues_no_get() {
    let server = require_mock_server!();
    mount_head(&server, "VIDEO", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, &["VIDEO"], fast_policy(3), 3).await;
    let stored = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    h.store.update_last_modified("VIDEO", stored).await.unwrap();

    let url = format!("{}/exports/VIDEO-mrc_new.mrc", server.uri());
    let result = h
        .downloader
        .download("VIDEO", &url, &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert!(!result.fetched);
    assert_eq!(result.remote_last_modified, Some(stored));
    assert_eq!(h.store.get_last_modified("VIDEO").await, Some(stored));
}

#[tokio::test]
async fn test_newer_remote_replaces_existing_file() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(3), 3).await;
    let old = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
    h.store.update_last_modified("KIT", old).await.unwrap();
    let file = h.dir.path().join("KIT").join("KIT-mrc_new.mrc");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, b"old contents that are longer").unwrap();

    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert!(results[0].fetched);
    assert_eq!(std::fs::read(&file).unwrap(), b"new");
    assert_eq!(
        h.store.get_last_modified("KIT").await,
        Some(last_modified_time())
    );
}

#[tokio::test]
async fn test_second_sweep_is_idempotent() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    mount_head(&server, "VIDEO", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/exports/[A-Z]+-mrc_new\.mrc$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"records"))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT", "VIDEO"], fast_policy(3), 3).await;
    let token = CancellationToken::new();

    let first_results = h.downloader.download_all(&token).await;
    let first = SweepStats::from_results(&first_results);
    assert_eq!(first.fetched, 2);

    let second_results = h.downloader.download_all(&token).await;
    let second = SweepStats::from_results(&second_results);
    assert_eq!(second.fetched, 0);
    assert_eq!(second.up_to_date, 2);
    assert_eq!(second.failed, 0);

    let paths = |results: &[DownloadResult]| {
        let mut paths: Vec<_> = results
            .iter()
            .map(|r| r.local_file_path.clone().unwrap())
            .collect();
        paths.sort();
        paths
    };
    assert_eq!(paths(&first_results), paths(&second_results));
}

#[tokio::test]
async fn test_ceiling_of_one_serializes_fetches() {
    let server = require_mock_server!();
    let (peak, elapsed) = sweep_overlap(&server, &["KIT", "VIDEO", "MUSICAESC"], 1).await;

    assert_eq!(peak, 1, "Expected one GET at a time");
    assert!(
        elapsed >= SERVE_DELAY * 3,
        "Expected three sequential rounds, got {elapsed:?}"
    );
}

#[tokio::test]
async fn test_ceiling_of_two_never_exceeds_two_fetches() {
    let server = require_mock_server!();
    let (peak, elapsed) =
        sweep_overlap(&server, &["KIT", "VIDEO", "MUSICAESC", "SERIADA"], 2).await;

    assert_eq!(peak, 2, "Expected exactly two GETs in flight at the peak");
    assert!(
        elapsed >= SERVE_DELAY * 2,
        "Expected two rounds with ceiling 2, got {elapsed:?}"
    );
}

#[tokio::test]
async fn test_retry_stops_after_max_attempts_with_last_error() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(3), 3).await;

    let started = Instant::now();
    let results = h.downloader.download_all(&CancellationToken::new()).await;
    let elapsed = started.elapsed();

    let result = &results[0];
    assert!(result.local_file_path.is_none());
    match &result.error {
        Some(FetchError::RetrievalExhausted {
            attempts, source, ..
        }) => {
            assert_eq!(*attempts, 3);
            assert!(matches!(
                source,
                DownloadError::HttpStatus { status: 503, .. }
            ));
        }
        other => panic!("Expected RetrievalExhausted, got: {other:?}"),
    }
    // Two waits of 100ms between three attempts.
    assert!(
        elapsed >= Duration::from_millis(200),
        "Expected retry spacing, got {elapsed:?}"
    );
    assert!(h.store.get_last_modified("KIT").await.is_none());
    assert!(!h.dir.path().join("KIT").join("KIT-mrc_new.mrc").exists());
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_failures() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(FlakyResponder {
            calls: AtomicUsize::new(0),
            failures: 2,
            body: b"third time lucky",
        })
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(3), 3).await;
    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert!(results[0].fetched, "Unexpected error: {:?}", results[0].error);
    assert_eq!(
        std::fs::read(h.dir.path().join("KIT").join("KIT-mrc_new.mrc")).unwrap(),
        b"third time lucky"
    );
}

#[tokio::test]
async fn test_cancellation_during_retry_wait_returns_promptly() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(
        &server,
        &["KIT"],
        RetryPolicy::new(3, Duration::from_secs(30)),
        3,
    )
    .await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let results = h.downloader.download_all(&token).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(results.len(), 1);
    assert!(
        results[0].error.as_ref().is_some_and(FetchError::is_cancelled),
        "Expected Cancelled, got: {:?}",
        results[0].error
    );
    assert!(h.store.get_last_modified("KIT").await.is_none());
}

#[tokio::test]
async fn test_probe_failure_is_not_retried() {
    let server = require_mock_server!();
    Mock::given(method("HEAD"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(3), 3).await;
    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert!(matches!(
        results[0].error,
        Some(FetchError::ProbeFailed {
            source: DownloadError::HttpStatus { status: 404, .. },
            ..
        })
    ));
}

#[tokio::test]
async fn test_missing_last_modified_forces_fetch() {
    let server = require_mock_server!();
    Mock::given(method("HEAD"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"records"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(3), 3).await;
    h.store
        .update_last_modified("KIT", last_modified_time())
        .await
        .unwrap();

    let before = Utc::now();
    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert!(results[0].fetched);
    let recorded = h.store.get_last_modified("KIT").await.unwrap();
    assert!(recorded >= before, "Expected 'now' timestamp, got {recorded}");
}

#[tokio::test]
async fn test_partial_failure_keeps_other_categories() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    mount_head(&server, "VIDEO", LAST_MODIFIED).await;
    mount_head(&server, "MUSICAESC", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/MUSICAESC-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/exports/(KIT|VIDEO)-mrc_new\.mrc$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"records"))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT", "VIDEO", "MUSICAESC"], fast_policy(2), 3).await;
    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert_eq!(results.len(), 3);
    let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].category, "MUSICAESC");
    assert!(
        matches!(
            failed[0].error,
            Some(FetchError::RetrievalExhausted { attempts: 2, .. })
        ),
        "Expected RetrievalExhausted after 2 attempts, got: {:?}",
        failed[0].error
    );
    let mut fetched: Vec<_> = results
        .iter()
        .filter(|r| r.fetched)
        .map(|r| r.category.as_str())
        .collect();
    fetched.sort_unstable();
    assert_eq!(fetched, ["KIT", "VIDEO"]);
    assert!(h.store.get_last_modified("KIT").await.is_some());
    assert!(h.store.get_last_modified("VIDEO").await.is_some());
    assert!(h.store.get_last_modified("MUSICAESC").await.is_none());
}

#[tokio::test]
async fn test_truncated_body_keeps_previous_copy() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    // Advertises more bytes than it sends, so the stream ends early.
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Length", "1000")
                .set_body_bytes(b"00042nam cut"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(2), 3).await;
    let old = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
    h.store.update_last_modified("KIT", old).await.unwrap();
    let file = h.dir.path().join("KIT").join("KIT-mrc_new.mrc");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, b"previous good copy").unwrap();

    let results = h.downloader.download_all(&CancellationToken::new()).await;

    assert!(
        matches!(
            results[0].error,
            Some(FetchError::RetrievalExhausted { attempts: 2, .. })
        ),
        "Expected RetrievalExhausted, got: {:?}",
        results[0].error
    );
    assert!(!h.dir.path().join("KIT").join("KIT-mrc_new.mrc.part").exists());
    assert_eq!(std::fs::read(&file).unwrap(), b"previous good copy");
    assert_eq!(h.store.get_last_modified("KIT").await, Some(old));
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let server = require_mock_server!();
    mount_head(&server, "KIT", LAST_MODIFIED).await;
    Mock::given(method("GET"))
        .and(path("/exports/KIT-mrc_new.mrc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"records"))
        .mount(&server)
        .await;

    let h = harness(&server, &["KIT"], fast_policy(1), 1).await;
    h.downloader.download_all(&CancellationToken::new()).await;

    let reopened = MetadataStore::open(h.dir.path()).await.unwrap();
    assert_eq!(
        reopened.get_last_modified("KIT").await,
        Some(last_modified_time())
    );
}
