//! # Metrics recorder contract
//!
//! Recording is decoupled from consumption: the cache only ever *emits*
//! events through the [`MetricsRecorder`] trait, and implementations decide
//! whether to count, export, or drop them. All methods take `&self` and use
//! interior mutability because every shard and background task emits
//! concurrently.
//!
//! ## Architecture
//!
//! ```text
//!   Cache / Shards / Coordinator
//!        │ cache_hit · cache_miss · eviction(n) · forced_eviction(n)
//!        │ shard_index(i) · refresh_success · refresh_failure · batch_refresh(n)
//!        ▼
//!   ┌───────────────────────┐     ┌───────────────────────────┐
//!   │   MetricsRecorder     │────►│ NoopMetrics (default)     │
//!   │   (&self, concurrent) │     │ AtomicMetrics (counters + │
//!   └───────────────────────┘     │   MetricsSnapshot)        │
//!                                 └───────────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! - **Single responsibility**: the recorder only writes counters; reading
//!   happens through an explicit snapshot.
//! - **Concurrent emission**: every method is `&self` and must tolerate
//!   simultaneous calls from all shards.
//! - **Zero default cost**: [`NoopMetrics`] compiles to empty inlined calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for cache events.
///
/// Every method has an empty default body so implementations only override
/// the signals they care about. Implementations must tolerate concurrent
/// emission from all shards and background tasks.
pub trait MetricsRecorder: Send + Sync {
    /// A read found a live entry.
    fn cache_hit(&self) {}
    /// A read found nothing (or only a dead entry).
    fn cache_miss(&self) {}
    /// An expiry sweep removed `count` entries from one shard.
    fn eviction(&self, count: usize) {
        let _ = count;
    }
    /// A full shard forcibly evicted `count` entries to admit a write.
    /// Emitted with `count == 0` when forced eviction is disabled and the
    /// write was dropped instead.
    fn forced_eviction(&self, count: usize) {
        let _ = count;
    }
    /// A write was routed to shard `index`. Emitted for every set, including
    /// writes that a full shard subsequently dropped.
    fn shard_index(&self, index: usize) {
        let _ = index;
    }
    /// A background refresh replaced or confirmed an entry.
    fn refresh_success(&self) {}
    /// A background refresh failed; the entry backs off.
    fn refresh_failure(&self) {}
    /// A background batch refresh was scheduled for `size` keys.
    fn batch_refresh(&self, size: usize) {
        let _ = size;
    }
}

// =============================================================================
// NoopMetrics
// =============================================================================

/// Recorder that drops every event. Used when no recorder is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {}

// =============================================================================
// AtomicMetrics
// =============================================================================

/// Point-in-time copy of an [`AtomicMetrics`] recorder's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evicted_entries: u64,
    pub forced_evictions: u64,
    pub sets: u64,
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub batch_refreshes: u64,
}

/// Lock-free counting recorder.
///
/// Suitable for production monitoring and for asserting cache behavior in
/// tests.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use stampede::{AtomicMetrics, Cache};
///
/// let metrics = Arc::new(AtomicMetrics::new());
/// let cache = Cache::builder(100, 4, Duration::from_secs(60), 10)
///     .metrics(metrics.clone())
///     .build()
///     .unwrap();
///
/// cache.set("a", 1u32);
/// assert_eq!(cache.get::<u32>("a"), Some(1));
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.sets, 1);
/// assert_eq!(snapshot.hits, 1);
/// ```
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evicted_entries: AtomicU64,
    forced_evictions: AtomicU64,
    sets: AtomicU64,
    refresh_successes: AtomicU64,
    refresh_failures: AtomicU64,
    batch_refreshes: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evicted_entries: self.evicted_entries.load(Ordering::Relaxed),
            forced_evictions: self.forced_evictions.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            batch_refreshes: self.batch_refreshes.load(Ordering::Relaxed),
        }
    }
}

impl MetricsRecorder for AtomicMetrics {
    fn cache_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn eviction(&self, count: usize) {
        self.evicted_entries.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn forced_eviction(&self, count: usize) {
        self.forced_evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn shard_index(&self, _index: usize) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn refresh_success(&self) {
        self.refresh_successes.fetch_add(1, Ordering::Relaxed);
    }

    fn refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn batch_refresh(&self, _size: usize) {
        self.batch_refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
