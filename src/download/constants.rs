//! Constants for the download module (timeouts, concurrency, retries).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default absolute request timeout (10 minutes, exports can be large).
pub const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous category downloads.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default number of GET attempts per category.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed wait between GET attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
