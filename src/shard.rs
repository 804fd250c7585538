//! One cache shard: a bounded key→entry map behind a single mutex.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Shard (1 of N)                             │
//! │                                                                   │
//! │   Mutex<ShardState>                                               │
//! │   ┌─────────────────────────────────────────────────────────┐     │
//! │   │ entries: FxHashMap<String, Entry>                       │     │
//! │   │ rng: XorShift64      (refresh-delay jitter)             │     │
//! │   └─────────────────────────────────────────────────────────┘     │
//! │                                                                   │
//! │   get / get_for_fetch ── liveness check, refresh claim            │
//! │   set ─────────────────── overwrite | insert | forced eviction    │
//! │   evict_expired ────────── periodic sweep, driven by the Clock    │
//! │   back_off / clear_claim ─ refresh bookkeeping under the lock     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Single lock**: every public operation acquires the shard mutex once
//!   and never performs I/O while holding it. Upstream fetches happen in the
//!   coordinator, outside any lock.
//! - **Capacity bound**: the shard holds at most `ceil(capacity/numShards)`
//!   entries. A write to a full shard forcibly evicts a quota of entries
//!   first, so the bound holds when the write returns.
//! - **Cheap eviction policy**: instead of maintaining LRU order, overflow
//!   eviction makes one pass over the map and removes the entries closest to
//!   expiry. Map iteration order is effectively random, and the pass is
//!   O(n) with no per-access bookkeeping.
//! - **Refresh claims**: marking an entry as refreshing happens under the
//!   same lock as the lookup that found it due, so at most one refresh per
//!   key is ever in flight.

use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::builder::Config;
use crate::clock::Clock;
use crate::entry::{Entry, Payload};
use crate::metrics::MetricsRecorder;

// =============================================================================
// Jitter PRNG
// =============================================================================

/// XorShift64 PRNG for refresh-delay jitter. Fast, deterministic for a given
/// seed, and requires no system entropy.
#[derive(Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // The golden-ratio increment keeps the state non-zero for any seed.
        Self {
            state: seed.wrapping_add(0x9e37_79b9_7f4a_7c15),
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

// =============================================================================
// Shard
// =============================================================================

/// Result of a read-through lookup on a live entry.
#[derive(Debug, Clone)]
pub(crate) struct FetchHit {
    pub(crate) payload: Payload,
    /// True when this lookup claimed the entry's background refresh. The
    /// caller is then responsible for running a refresh that eventually
    /// releases the claim.
    pub(crate) claimed_refresh: bool,
}

struct ShardState {
    entries: FxHashMap<String, Entry>,
    rng: XorShift64,
}

/// A self-contained bounded sub-cache owning one slice of the key space.
pub(crate) struct Shard {
    index: usize,
    capacity: usize,
    state: Mutex<ShardState>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl Shard {
    pub(crate) fn new(
        index: usize,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        let capacity = config.per_shard_capacity;
        Self {
            index,
            capacity,
            state: Mutex::new(ShardState {
                entries: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                rng: XorShift64::new(index as u64),
            }),
            config,
            clock,
            metrics,
        }
    }

    /// Number of entries currently stored, live or not.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Plain lookup: returns the payload of a live entry. Dead entries are
    /// invisible and left for the sweep.
    pub(crate) fn get(&self, key: &str) -> Option<Payload> {
        let now = self.clock.now();
        let state = self.state.lock();
        match state.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.metrics.cache_hit();
                Some(entry.payload.clone())
            }
            _ => {
                self.metrics.cache_miss();
                None
            }
        }
    }

    /// Read-through lookup: like [`get`](Self::get), but when stampede
    /// protection is configured and the entry is due, this lookup atomically
    /// claims the entry's background refresh.
    pub(crate) fn get_for_fetch(&self, key: &str) -> Option<FetchHit> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let mut claimed = false;
                if self.config.stampede.is_some() && entry.is_due(now) && !entry.is_refreshing {
                    entry.is_refreshing = true;
                    claimed = true;
                }
                self.metrics.cache_hit();
                Some(FetchHit {
                    payload: entry.payload.clone(),
                    claimed_refresh: claimed,
                })
            }
            _ => {
                self.metrics.cache_miss();
                None
            }
        }
    }

    /// Inserts or replaces an entry.
    ///
    /// An existing key is overwritten in place. A new key either fits below
    /// the capacity, triggers a forced eviction to make room, or, when
    /// forced eviction is disabled, is silently dropped.
    pub(crate) fn set(&self, key: &str, payload: Payload) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.metrics.shard_index(self.index);

        let entry = Entry::new(
            payload,
            now,
            self.config.ttl,
            self.draw_refresh_at(&mut state.rng, now),
        );

        if state.entries.contains_key(key) || state.entries.len() < self.capacity {
            state.entries.insert(key.to_string(), entry);
            return;
        }

        if self.config.eviction_percentage == 0 {
            // Contract: a full shard with forced eviction disabled drops the
            // write. The recorder observes the event with a zero count.
            self.metrics.forced_eviction(0);
            return;
        }

        let evicted = Self::force_evict(&mut state.entries, self.eviction_quota());
        self.metrics.forced_eviction(evicted);
        log::debug!(
            "shard {} forcibly evicted {evicted} entries to admit a write",
            self.index
        );
        state.entries.insert(key.to_string(), entry);
    }

    /// Removes an entry if present.
    pub(crate) fn delete(&self, key: &str) {
        self.state.lock().entries.remove(key);
    }

    /// Removes every entry whose expiry has passed and reports the count.
    pub(crate) fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        let evicted = before - state.entries.len();
        self.metrics.eviction(evicted);
        if evicted > 0 {
            log::trace!("shard {} sweep evicted {evicted} expired entries", self.index);
        }
        evicted
    }

    /// Records a failed background refresh for `key`: the entry backs off
    /// exponentially and its refresh claim is released. A no-op when the
    /// entry was evicted while the refresh was in flight.
    pub(crate) fn back_off(&self, key: &str) {
        let Some(stampede) = self.config.stampede.as_ref() else {
            return;
        };
        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.back_off(now, stampede.retry_interval);
        }
    }

    /// Releases a refresh claim without touching the back-off state. Used
    /// when a claimed refresh is abandoned before reaching the upstream.
    pub(crate) fn clear_refresh_claim(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.is_refreshing = false;
        }
    }

    /// The number of entries a forced eviction removes:
    /// `ceil(perShardCapacity * evictionPercentage / 100)`.
    fn eviction_quota(&self) -> usize {
        (self.capacity * self.config.eviction_percentage).div_ceil(100)
    }

    /// Draws the next refresh deadline. With stampede protection the delay
    /// is uniform in `[min, max]`, advancing the shard's PRNG so co-inserted
    /// entries spread out. Without it the deadline coincides with the expiry
    /// and the entry is never due while live.
    fn draw_refresh_at(&self, rng: &mut XorShift64, now: Instant) -> Instant {
        match self.config.stampede.as_ref() {
            Some(stampede) => {
                let window = stampede.max_refresh_delay - stampede.min_refresh_delay;
                let window_nanos = window.as_nanos() as u64;
                let jitter = if window_nanos == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_nanos(rng.next() % (window_nanos + 1))
                };
                now + stampede.min_refresh_delay + jitter
            }
            None => now + self.config.ttl,
        }
    }

    /// Removes the `quota` entries closest to expiry in a single pass over
    /// the map. A max-heap of size `quota` tracks the smallest `expires_at`
    /// values seen so far; iteration order is hash order, which is as good
    /// as random for tie-breaking.
    fn force_evict(entries: &mut FxHashMap<String, Entry>, quota: usize) -> usize {
        if quota == 0 {
            return 0;
        }
        if quota >= entries.len() {
            let evicted = entries.len();
            entries.clear();
            return evicted;
        }

        let mut victims: BinaryHeap<(Instant, String)> = BinaryHeap::with_capacity(quota + 1);
        for (key, entry) in entries.iter() {
            victims.push((entry.expires_at, key.clone()));
            if victims.len() > quota {
                victims.pop();
            }
        }

        let mut evicted = 0;
        for (_, key) in victims {
            if entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        evicted
    }
}

// =============================================================================
// Tests
// =============================================================================
