//! Cache entry: type-erased payload plus expiry and refresh metadata.
//!
//! An entry moves through a small lifecycle. It is *live* until its TTL
//! passes, *due* once its randomized `refresh_at` deadline passes, and backs
//! off exponentially while refreshes fail:
//!
//! ```text
//!              insert                refresh_at reached
//!   [absent] ────────► [fresh] ───────────────────────► [due]
//!                         ▲                               │
//!                         │        refresh success        │
//!                         └───────────────────────────────┤
//!                                                         │ refresh failure
//!                         ┌───────────────────────────────┘
//!                         ▼
//!                    [backing-off] ── retry · 2^failures elapses ──► [due]
//!
//!                    expires_at reached in any state ──► [absent]
//! ```
//!
//! Values are stored type-erased so one cache can hold heterogeneous types;
//! the typed accessors on [`Cache`](crate::Cache) downcast at the call site
//! and treat a mismatch as a miss.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exponent cap for refresh back-off. Keeps `retry_interval << failures`
/// from overflowing while still reaching multi-hour pauses.
const BACKOFF_EXPONENT_CAP: u32 = 10;

/// Type-erased value handle shared between the shard, the single-flight
/// registry, and background refreshes.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// The stored payload: a real value, or a marker that the upstream reported
/// the record as missing (negative caching).
#[derive(Clone)]
pub(crate) enum Payload {
    Value(AnyValue),
    Missing,
}

impl Payload {
    pub(crate) fn is_missing(&self) -> bool {
        matches!(self, Payload::Missing)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Value(_) => f.write_str("Value(..)"),
            Payload::Missing => f.write_str("Missing"),
        }
    }
}

/// One stored record with its expiry and refresh state.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) payload: Payload,
    pub(crate) created_at: Instant,
    pub(crate) expires_at: Instant,
    pub(crate) refresh_at: Instant,
    pub(crate) is_refreshing: bool,
    pub(crate) refresh_failures: u32,
}

impl Entry {
    /// Creates a fresh entry inserted at `now` with the given TTL and
    /// refresh deadline. The caller draws `refresh_at` from the configured
    /// jitter window (or pins it to the expiry when refresh is disabled).
    pub(crate) fn new(payload: Payload, now: Instant, ttl: Duration, refresh_at: Instant) -> Self {
        Self {
            payload,
            created_at: now,
            expires_at: now + ttl,
            refresh_at,
            is_refreshing: false,
            refresh_failures: 0,
        }
    }

    /// A live entry has not reached its expiry yet. Dead entries are
    /// invisible to lookups and removed by the next sweep.
    pub(crate) fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// A due entry should be refreshed on the next read-through access.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        now >= self.refresh_at
    }

    /// Records a failed refresh: bumps the failure counter, schedules the
    /// next attempt at `retry_interval * 2^min(failures, cap)`, and releases
    /// the refresh claim.
    pub(crate) fn back_off(&mut self, now: Instant, retry_interval: Duration) {
        self.refresh_failures = self.refresh_failures.saturating_add(1);
        let exponent = self.refresh_failures.min(BACKOFF_EXPONENT_CAP);
        self.refresh_at = now + retry_interval * 2u32.pow(exponent);
        self.is_refreshing = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
