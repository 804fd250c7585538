//! Error types for the stampede library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. zero shards, an eviction percentage above 100).
//! - [`FetchError`]: The error space shared between the read-through
//!   operations and caller-supplied fetch callbacks, including the
//!   missing-record sentinels.
//! - [`BatchError`]: Returned by [`Cache::get_fetch_batch`](crate::Cache::get_fetch_batch);
//!   its partial-failure variant carries the records that were served from
//!   the cache.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use stampede::Cache;
//!
//! // Fallible construction for user-configurable parameters
//! let cache = Cache::builder(100, 4, Duration::from_secs(60), 10).build();
//! assert!(cache.is_ok());
//!
//! // Invalid percentage is caught without panicking
//! let bad = Cache::builder(100, 4, Duration::from_secs(60), 101).build();
//! assert!(bad.is_err());
//! ```

use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheBuilder::build`](crate::CacheBuilder::build). Carries a
/// human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stampede::Cache;
///
/// let err = Cache::builder(100, 0, Duration::from_secs(60), 10)
///     .build()
///     .unwrap_err();
/// assert!(err.to_string().contains("shard"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

/// The error space shared between single-key read-through calls and
/// caller-supplied fetch callbacks.
///
/// Two variants are sentinels with stable identity:
///
/// - A fetch callback returns [`FetchError::StoreMissingRecord`] to report
///   that the upstream has no record for the key. The cache inserts a
///   negative-cache entry (when enabled) and the calling request observes
///   `StoreMissingRecord`.
/// - The cache returns [`FetchError::MissingRecord`] when a *live*
///   negative-cache entry is read, without touching the upstream.
///
/// Any other callback error is transient: it is surfaced verbatim on a cold
/// miss and triggers exponential back-off during a background refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError<E> {
    /// The upstream reported that no record exists for this key. Returned by
    /// fetch callbacks to request a negative-cache insert, and surfaced to
    /// the caller whose request performed the upstream call.
    StoreMissingRecord,
    /// A live negative-cache entry was read; the upstream was not contacted.
    MissingRecord,
    /// The call was cancelled before a value was available.
    Cancelled,
    /// The upstream fetch failed with the caller's error.
    Upstream(E),
}

impl<E: fmt::Display> fmt::Display for FetchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::StoreMissingRecord => f.write_str("the record is missing upstream"),
            FetchError::MissingRecord => f.write_str("the record is cached as missing"),
            FetchError::Cancelled => f.write_str("the fetch was cancelled"),
            FetchError::Upstream(err) => write!(f, "upstream fetch failed: {err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for FetchError<E> {}

// ---------------------------------------------------------------------------
// BatchError
// ---------------------------------------------------------------------------

/// Error returned by [`Cache::get_fetch_batch`](crate::Cache::get_fetch_batch).
///
/// When some ids were served from the cache but the upstream call for the
/// remainder failed, the caller still receives the cached records through
/// [`BatchError::OnlyCachedRecords`] and can decide whether a partial result
/// is acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError<V, E> {
    /// Some ids were served from the cache; the upstream call for the rest
    /// failed. `records` holds everything that could be served.
    OnlyCachedRecords {
        /// The records that were available without the failed upstream call,
        /// keyed by the caller's ids.
        records: HashMap<String, V>,
        /// The upstream error.
        source: E,
    },
    /// Nothing was cached and the upstream call failed.
    Upstream(E),
    /// The call was cancelled before any upstream work completed.
    Cancelled,
}

impl<V, E> BatchError<V, E> {
    /// Consumes the error, returning whatever records were served from the
    /// cache. Empty for the non-partial variants.
    pub fn into_records(self) -> HashMap<String, V> {
        match self {
            BatchError::OnlyCachedRecords { records, .. } => records,
            _ => HashMap::new(),
        }
    }
}

impl<V, E: fmt::Display> fmt::Display for BatchError<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::OnlyCachedRecords { records, source } => write!(
                f,
                "upstream batch fetch failed, {} record(s) served from cache: {source}",
                records.len()
            ),
            BatchError::Upstream(err) => write!(f, "upstream batch fetch failed: {err}"),
            BatchError::Cancelled => f.write_str("the batch fetch was cancelled"),
        }
    }
}

impl<V: fmt::Debug, E: fmt::Debug + fmt::Display> std::error::Error for BatchError<V, E> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
