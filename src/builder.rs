//! Validated cache construction.
//!
//! Provides the [`CacheBuilder`] entry point used by [`Cache::builder`] while
//! hiding internal configuration details (per-shard capacity, defaulted
//! clock and recorder).
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use stampede::Cache;
//!
//! let cache = Cache::builder(10_000, 10, Duration::from_secs(2 * 3600), 10)
//!     .build()
//!     .unwrap();
//!
//! cache.set("key1", "value".to_string());
//! assert_eq!(cache.get::<String>("key1"), Some("value".to_string()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::metrics::{MetricsRecorder, NoopMetrics};

/// Stampede-protection settings: the jitter window for background refreshes,
/// the base retry interval for back-off, and whether "missing upstream"
/// answers are cached negatively.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StampedeProtection {
    pub(crate) min_refresh_delay: Duration,
    pub(crate) max_refresh_delay: Duration,
    pub(crate) retry_interval: Duration,
    pub(crate) store_missing_records: bool,
}

/// Immutable cache configuration shared by every shard.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) capacity: usize,
    pub(crate) num_shards: usize,
    pub(crate) per_shard_capacity: usize,
    pub(crate) ttl: Duration,
    /// Share of a full shard removed by one forced eviction, in `[0, 100]`.
    /// Zero disables forced eviction and makes overflowing writes no-ops.
    pub(crate) eviction_percentage: usize,
    pub(crate) eviction_interval: Duration,
    pub(crate) stampede: Option<StampedeProtection>,
}

/// Builder for [`Cache`]. Created by [`Cache::builder`].
///
/// The four positional parameters cover the mandatory configuration; the
/// remaining knobs are optional:
///
/// | option | default |
/// |---|---|
/// | [`metrics`](Self::metrics) | drop all events |
/// | [`clock`](Self::clock) | the host monotonic clock |
/// | [`eviction_interval`](Self::eviction_interval) | the TTL |
/// | [`stampede_protection`](Self::stampede_protection) | disabled |
#[must_use = "call build() to construct the cache"]
pub struct CacheBuilder {
    capacity: usize,
    num_shards: usize,
    ttl: Duration,
    eviction_percentage: usize,
    eviction_interval: Option<Duration>,
    stampede: Option<StampedeProtection>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl CacheBuilder {
    pub(crate) fn new(
        capacity: usize,
        num_shards: usize,
        ttl: Duration,
        eviction_percentage: usize,
    ) -> Self {
        Self {
            capacity,
            num_shards,
            ttl,
            eviction_percentage,
            eviction_interval: None,
            stampede: None,
            clock: None,
            metrics: None,
        }
    }

    /// Installs a metrics recorder. Every shard and background task emits
    /// through it concurrently.
    pub fn metrics(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(recorder);
        self
    }

    /// Replaces the time source. All timestamps and sweep timers derive from
    /// this clock, which is what makes tests with a
    /// [`TestClock`](crate::TestClock) deterministic.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets how often each shard sweeps out expired entries. Defaults to the
    /// TTL.
    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = Some(interval);
        self
    }

    /// Enables stampede protection: read-through hits schedule a background
    /// refresh at a random point in `[min_refresh_delay, max_refresh_delay]`
    /// after insertion, and failures back off exponentially from
    /// `retry_interval`. When `store_missing_records` is set, "missing
    /// upstream" answers are cached negatively.
    pub fn stampede_protection(
        mut self,
        min_refresh_delay: Duration,
        max_refresh_delay: Duration,
        retry_interval: Duration,
        store_missing_records: bool,
    ) -> Self {
        self.stampede = Some(StampedeProtection {
            min_refresh_delay,
            max_refresh_delay,
            retry_interval,
            store_missing_records,
        });
        self
    }

    /// Validates the configuration and starts the cache, including its
    /// per-shard expiry sweepers.
    pub fn build(self) -> Result<Cache, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::new("capacity must be greater than zero"));
        }
        if self.num_shards == 0 {
            return Err(ConfigError::new("num_shards must be greater than zero"));
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::new("ttl must be greater than zero"));
        }
        if self.eviction_percentage > 100 {
            return Err(ConfigError::new(
                "eviction_percentage must be between 0 and 100",
            ));
        }
        if let Some(stampede) = self.stampede.as_ref() {
            if stampede.min_refresh_delay > stampede.max_refresh_delay {
                return Err(ConfigError::new(
                    "min_refresh_delay must not exceed max_refresh_delay",
                ));
            }
            if stampede.retry_interval.is_zero() {
                return Err(ConfigError::new("retry_interval must be greater than zero"));
            }
        }

        let config = Config {
            capacity: self.capacity,
            num_shards: self.num_shards,
            per_shard_capacity: self.capacity.div_ceil(self.num_shards),
            ttl: self.ttl,
            eviction_percentage: self.eviction_percentage,
            eviction_interval: self.eviction_interval.unwrap_or(self.ttl),
            stampede: self.stampede,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        Ok(Cache::start(Arc::new(config), clock, metrics))
    }
}
