//! The sharded cache: shard array, key router, and typed access.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Cache                                   │
//! │                                                                      │
//! │   key ──► ShardRouter ──► shards[i] ──► Mutex<entries>               │
//! │                                                                      │
//! │   shared by all shards: Config · Clock · MetricsRecorder             │
//! │   per shard: sweeper thread firing every eviction_interval           │
//! │   cache-wide: FlightRegistry (cold-miss single-flight, fetch.rs)     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache stores type-erased payloads so one instance can hold values of
//! different types for different keys. The typed accessors downcast at the
//! call site; a read with the wrong type behaves like a miss, it never
//! panics.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use stampede::Cache;
//!
//! let cache = Cache::builder(10_000, 10, Duration::from_secs(7200), 10)
//!     .build()
//!     .unwrap();
//!
//! cache.set("key1", "value".to_string());
//! assert_eq!(cache.get::<String>("key1"), Some("value".to_string()));
//!
//! cache.set("key2", 1u64);
//! assert_eq!(cache.get::<u64>("key2"), Some(1));
//!
//! // Reading key2 as the wrong type is a miss, not a panic.
//! assert_eq!(cache.get::<String>("key2"), None);
//! ```
//!
//! ## Thread Safety
//!
//! `Cache` is `Send + Sync`; share it across threads with `Arc` or borrows.
//! Dropping the cache stops the sweeper threads; outstanding background
//! refreshes own `Arc`s to their shard and finish on their own.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::builder::{CacheBuilder, Config};
use crate::clock::{Clock, StopSignal};
use crate::entry::Payload;
use crate::metrics::MetricsRecorder;
use crate::router::ShardRouter;
use crate::shard::Shard;
use crate::singleflight::FlightRegistry;

/// In-process sharded read-through cache.
///
/// Constructed through [`Cache::builder`]; see the [crate docs](crate) for
/// the full feature tour.
pub struct Cache {
    shards: Vec<Arc<Shard>>,
    router: ShardRouter,
    config: Arc<Config>,
    metrics: Arc<dyn MetricsRecorder>,
    flights: FlightRegistry,
    stop: Arc<StopSignal>,
    sweepers: Vec<thread::JoinHandle<()>>,
}

impl Cache {
    /// Starts building a cache holding at most `capacity` entries spread
    /// over `num_shards` shards, each entry living for `ttl`. When a full
    /// shard admits a write it forcibly evicts `eviction_percentage` percent
    /// of its capacity; zero disables forced eviction and drops such writes.
    pub fn builder(
        capacity: usize,
        num_shards: usize,
        ttl: Duration,
        eviction_percentage: usize,
    ) -> CacheBuilder {
        CacheBuilder::new(capacity, num_shards, ttl, eviction_percentage)
    }

    /// Creates the shard array and spawns one expiry sweeper per shard.
    /// Called by [`CacheBuilder::build`] after validation.
    pub(crate) fn start(
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        let shards: Vec<Arc<Shard>> = (0..config.num_shards)
            .map(|index| {
                Arc::new(Shard::new(
                    index,
                    Arc::clone(&config),
                    Arc::clone(&clock),
                    Arc::clone(&metrics),
                ))
            })
            .collect();

        let stop = Arc::new(StopSignal::new());
        let sweepers = shards
            .iter()
            .map(|shard| {
                let shard = Arc::clone(shard);
                let clock = Arc::clone(&clock);
                let stop = Arc::clone(&stop);
                let interval = config.eviction_interval;
                thread::spawn(move || loop {
                    let deadline = clock.now() + interval;
                    if clock.wait_until(deadline, &stop) {
                        break;
                    }
                    shard.evict_expired();
                })
            })
            .collect();

        Self {
            shards,
            router: ShardRouter::new(config.num_shards, 0),
            config,
            metrics,
            flights: FlightRegistry::new(),
            stop,
            sweepers,
        }
    }

    /// Stores `value` under `key`, replacing any previous entry. The entry
    /// expires after the configured TTL; with stampede protection enabled it
    /// becomes due for refresh at a random point in the refresh window.
    pub fn set<V>(&self, key: &str, value: V)
    where
        V: Send + Sync + 'static,
    {
        self.shard_for(key).set(key, Payload::Value(Arc::new(value)));
    }

    /// Returns a copy of the live value stored under `key`.
    ///
    /// Returns `None` for absent or expired entries, for negative-cache
    /// entries, and for entries holding a different type than `V`.
    pub fn get<V>(&self, key: &str) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        match self.shard_for(key).get(key)? {
            Payload::Value(any) => any.downcast_ref::<V>().cloned(),
            Payload::Missing => None,
        }
    }

    /// Removes the entry stored under `key`, if any.
    pub fn delete(&self, key: &str) {
        self.shard_for(key).delete(key);
    }

    /// Total number of entries across all shards, live or awaiting a sweep.
    pub fn size(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Returns the key function for a logical table: ids are namespaced as
    /// `"{prefix}-{id}"` so multiple tables share one cache without
    /// collisions.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use stampede::Cache;
    ///
    /// let cache = Cache::builder(100, 2, Duration::from_secs(60), 10)
    ///     .build()
    ///     .unwrap();
    /// let key_fn = cache.batch_key_fn("item");
    /// assert_eq!(key_fn("42"), "item-42");
    /// ```
    pub fn batch_key_fn(&self, prefix: &str) -> impl Fn(&str) -> String {
        let prefix = prefix.to_string();
        move |id: &str| format!("{prefix}-{id}")
    }

    pub(crate) fn shard_for(&self, key: &str) -> &Arc<Shard> {
        &self.shards[self.router.shard_for_key(key)]
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        &self.metrics
    }

    pub(crate) fn flights(&self) -> &FlightRegistry {
        &self.flights
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.stop.set();
        for sweeper in self.sweepers.drain(..) {
            // A sweeper that panicked already did its damage; teardown
            // proceeds either way.
            let _ = sweeper.join();
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.config.capacity)
            .field("num_shards", &self.config.num_shards)
            .field("ttl", &self.config.ttl)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
