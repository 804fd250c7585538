//! stampede: in-process sharded read-through cache with stampede
//! suppression, TTL expiry, and background refresh.
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod builder;
pub mod cache;
pub mod clock;
pub mod context;
pub mod error;
pub mod metrics;

mod entry;
mod fetch;
mod router;
mod shard;
mod singleflight;

pub mod prelude;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use clock::{Clock, StopSignal, SystemClock, TestClock};
pub use context::CancelToken;
pub use error::{BatchError, ConfigError, FetchError};
pub use metrics::{AtomicMetrics, MetricsRecorder, MetricsSnapshot, NoopMetrics};
