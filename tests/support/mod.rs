//! Shared helpers for the integration tests: a scriptable fetch observer
//! and a metrics recorder that tracks per-shard write distribution.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::distr::Alphanumeric;
use rand::Rng;

use stampede::{CancelToken, FetchError, MetricsRecorder};

/// Generates a random alphanumeric key of the given length.
pub fn rand_key(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// =============================================================================
// FetchObserver
// =============================================================================

/// What the observer's fetch callbacks answer with.
#[derive(Debug, Clone, Copy)]
enum Script {
    /// Respond `value{id}` (batch: for every requested id).
    Values,
    /// Batch only: respond with an empty map (every id is missing).
    EmptyBatch,
    /// Fail with a transient error.
    Error,
    /// Single only: report the record as missing upstream.
    Missing,
}

#[derive(Debug)]
struct ObserverState {
    script: Script,
    delay: Option<Duration>,
    fetch_count: usize,
    requested: Vec<String>,
}

#[derive(Debug)]
struct ObserverInner {
    state: Mutex<ObserverState>,
    completed: Condvar,
}

/// Scriptable upstream double: counts calls, records requested ids, and
/// answers according to the current script.
#[derive(Debug, Clone)]
pub struct FetchObserver {
    inner: Arc<ObserverInner>,
}

impl FetchObserver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                state: Mutex::new(ObserverState {
                    script: Script::Values,
                    delay: None,
                    fetch_count: 0,
                    requested: Vec::new(),
                }),
                completed: Condvar::new(),
            }),
        }
    }

    pub fn respond_with_values(&self) {
        self.inner.state.lock().script = Script::Values;
    }

    pub fn respond_with_empty_batch(&self) {
        self.inner.state.lock().script = Script::EmptyBatch;
    }

    pub fn respond_with_error(&self) {
        self.inner.state.lock().script = Script::Error;
    }

    pub fn respond_with_missing(&self) {
        self.inner.state.lock().script = Script::Missing;
    }

    /// Makes every fetch sleep before answering, to widen race windows.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.state.lock().delay = Some(delay);
    }

    /// Resets the script to values and forgets the requested ids. The fetch
    /// count is preserved.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.script = Script::Values;
        state.delay = None;
        state.requested.clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.state.lock().fetch_count
    }

    pub fn requested(&self) -> Vec<String> {
        self.inner.state.lock().requested.clone()
    }

    /// Blocks until at least `count` fetches have started or the timeout
    /// elapses. Returns whether the count was reached.
    pub fn wait_for_fetch_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.fetch_count < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner
                .completed
                .wait_for(&mut state, deadline - now);
        }
        true
    }

    pub fn assert_fetch_count(&self, expected: usize) {
        let actual = self.fetch_count();
        assert_eq!(actual, expected, "expected {expected} fetches, got {actual}");
    }

    pub fn assert_max_fetch_count(&self, max: usize) {
        let actual = self.fetch_count();
        assert!(actual <= max, "expected at most {max} fetches, got {actual}");
    }

    pub fn assert_requested(&self, expected: &[&str]) {
        let mut actual = self.requested();
        actual.sort();
        let mut expected: Vec<String> = expected.iter().map(|id| id.to_string()).collect();
        expected.sort();
        assert_eq!(actual, expected);
    }

    /// A single-key fetch callback bound to this observer.
    pub fn fetch(
        &self,
    ) -> impl FnOnce(&CancelToken, &str) -> Result<String, FetchError<String>> + Send + 'static
    {
        let inner = Arc::clone(&self.inner);
        move |_ctx: &CancelToken, id: &str| {
            let (script, delay) = {
                let mut state = inner.state.lock();
                state.fetch_count += 1;
                state.requested.push(id.to_string());
                (state.script, state.delay)
            };
            inner.completed.notify_all();
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            match script {
                Script::Values | Script::EmptyBatch => Ok(format!("value{id}")),
                Script::Error => Err(FetchError::Upstream("error".to_string())),
                Script::Missing => Err(FetchError::StoreMissingRecord),
            }
        }
    }

    /// A batch fetch callback bound to this observer.
    pub fn batch_fetch(
        &self,
    ) -> impl Fn(&CancelToken, &[String]) -> Result<HashMap<String, String>, String>
           + Clone
           + Send
           + 'static {
        let inner = Arc::clone(&self.inner);
        move |_ctx: &CancelToken, ids: &[String]| {
            let (script, delay) = {
                let mut state = inner.state.lock();
                state.fetch_count += 1;
                state.requested.extend(ids.iter().cloned());
                (state.script, state.delay)
            };
            inner.completed.notify_all();
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            match script {
                Script::Values => Ok(ids
                    .iter()
                    .map(|id| (id.clone(), format!("value{id}")))
                    .collect()),
                Script::EmptyBatch | Script::Missing => Ok(HashMap::new()),
                Script::Error => Err("error".to_string()),
            }
        }
    }
}

impl Default for FetchObserver {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TestMetricsRecorder
// =============================================================================

/// Recorder mirroring what the eviction tests need: per-shard write counts,
/// evicted-entry totals, and forced-eviction event counts.
#[derive(Debug)]
pub struct TestMetricsRecorder {
    shard_counts: Mutex<Vec<u64>>,
    evicted_entries: AtomicU64,
    forced_eviction_events: AtomicU64,
    forced_evicted_entries: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    refresh_successes: AtomicU64,
    refresh_failures: AtomicU64,
    batch_refreshes: AtomicU64,
}

impl TestMetricsRecorder {
    pub fn new(num_shards: usize) -> Self {
        Self {
            shard_counts: Mutex::new(vec![0; num_shards]),
            evicted_entries: AtomicU64::new(0),
            forced_eviction_events: AtomicU64::new(0),
            forced_evicted_entries: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            refresh_successes: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            batch_refreshes: AtomicU64::new(0),
        }
    }

    pub fn evicted_entries(&self) -> u64 {
        self.evicted_entries.load(Ordering::SeqCst)
    }

    /// Number of forced-eviction events (one overflowing write each),
    /// regardless of how many entries each removed.
    pub fn forced_eviction_events(&self) -> u64 {
        self.forced_eviction_events.load(Ordering::SeqCst)
    }

    pub fn forced_evicted_entries(&self) -> u64 {
        self.forced_evicted_entries.load(Ordering::SeqCst)
    }

    pub fn refresh_successes(&self) -> u64 {
        self.refresh_successes.load(Ordering::SeqCst)
    }

    pub fn shard_counts(&self) -> Vec<u64> {
        self.shard_counts.lock().clone()
    }

    /// Asserts every shard's share of writes is within `tolerance` percent
    /// of a perfectly uniform split.
    pub fn validate_shard_distribution(&self, tolerance: f64) {
        let counts = self.shard_counts();
        let total: u64 = counts.iter().sum();
        let expected = total as f64 / counts.len() as f64;
        for (index, &count) in counts.iter().enumerate() {
            let deviation = (count as f64 - expected).abs() / expected * 100.0;
            assert!(
                deviation <= tolerance,
                "shard {index} received {count} writes, expected {expected:.0} ± {tolerance}% \
                 (off by {deviation:.1}%)"
            );
        }
    }
}

impl MetricsRecorder for TestMetricsRecorder {
    fn cache_hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn cache_miss(&self) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn eviction(&self, count: usize) {
        self.evicted_entries.fetch_add(count as u64, Ordering::SeqCst);
    }

    fn forced_eviction(&self, count: usize) {
        // A zero count marks a dropped write (forced eviction disabled),
        // not an eviction event.
        if count > 0 {
            self.forced_eviction_events.fetch_add(1, Ordering::SeqCst);
            self.forced_evicted_entries
                .fetch_add(count as u64, Ordering::SeqCst);
        }
    }

    fn shard_index(&self, index: usize) {
        let mut counts = self.shard_counts.lock();
        if index >= counts.len() {
            counts.resize(index + 1, 0);
        }
        counts[index] += 1;
    }

    fn refresh_success(&self) {
        self.refresh_successes.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn batch_refresh(&self, _size: usize) {
        self.batch_refreshes.fetch_add(1, Ordering::SeqCst);
    }
}
