pub use crate::builder::CacheBuilder;
pub use crate::cache::Cache;
pub use crate::clock::{Clock, SystemClock, TestClock};
pub use crate::context::CancelToken;
pub use crate::error::{BatchError, ConfigError, FetchError};
pub use crate::metrics::{AtomicMetrics, MetricsRecorder, MetricsSnapshot, NoopMetrics};
