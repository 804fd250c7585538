//! Per-key single-flight registry for cold-miss fetches.
//!
//! When several callers miss on the same key at the same time, only one of
//! them (the *leader*) performs the upstream fetch. Everyone else waits on
//! the leader's flight and receives the same outcome, so N concurrent misses
//! make exactly one upstream call.
//!
//! ```text
//!   caller A ──► begin("k") ─► Leader ──► fetch upstream ─► finish("k", outcome)
//!   caller B ──► begin("k") ─► Waiter ─────────────────────► outcome
//!   caller C ──► begin("k") ─► Waiter ─────────────────────► outcome
//! ```
//!
//! Flights are additionally keyed by the caller's value/error types: readers
//! that disagree on the stored type never exchange payloads, mirroring the
//! type-mismatch-is-a-miss rule of the typed accessors. A waiter whose
//! cancellation token trips may stop waiting early; the leader always
//! completes and publishes its result.

use std::any::TypeId;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::context::CancelToken;
use crate::entry::AnyValue;

/// How often a waiter re-checks its cancellation token while blocked.
const WAIT_CANCEL_POLL: Duration = Duration::from_millis(25);

/// What a completed flight produced. Cheap to clone; payloads and errors are
/// behind `Arc`s.
#[derive(Clone)]
pub(crate) enum FlightOutcome {
    /// The upstream returned a value (already inserted into the cache).
    Value(AnyValue),
    /// The upstream reported the record as missing.
    Missing,
    /// The fetch was cancelled before completing.
    Cancelled,
    /// The upstream failed; holds the caller's error type.
    Failed(AnyValue),
}

impl std::fmt::Debug for FlightOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightOutcome::Value(_) => f.write_str("Value(..)"),
            FlightOutcome::Missing => f.write_str("Missing"),
            FlightOutcome::Cancelled => f.write_str("Cancelled"),
            FlightOutcome::Failed(_) => f.write_str("Failed(..)"),
        }
    }
}

/// One in-flight upstream fetch, shared between the leader and its waiters.
pub(crate) struct Flight {
    outcome: Mutex<Option<FlightOutcome>>,
    done: Condvar,
}

impl std::fmt::Debug for Flight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: FlightOutcome) {
        let mut slot = self.outcome.lock();
        *slot = Some(outcome);
        self.done.notify_all();
    }

    /// Blocks until the leader publishes an outcome. Returns
    /// [`FlightOutcome::Cancelled`] early if the waiter's own token trips
    /// first; the flight itself keeps running.
    pub(crate) fn wait(&self, ctx: &CancelToken) -> FlightOutcome {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            if ctx.is_cancelled() {
                return FlightOutcome::Cancelled;
            }
            self.done.wait_for(&mut slot, WAIT_CANCEL_POLL);
        }
    }
}

/// Role handed out by [`FlightRegistry::begin`].
pub(crate) enum Ticket {
    /// This caller performs the upstream fetch and must call
    /// [`FlightRegistry::finish`] exactly once.
    Leader(Arc<Flight>),
    /// Another caller is already fetching; wait on the flight.
    Waiter(Arc<Flight>),
}

type FlightKey = (String, TypeId);

/// Registry of in-flight cold-miss fetches, keyed by cache key and the
/// caller's value/error types.
#[derive(Debug, Default)]
pub(crate) struct FlightRegistry {
    flights: Mutex<FxHashMap<FlightKey, Arc<Flight>>>,
}

impl FlightRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Joins the flight for `key`, creating it (and becoming the leader) if
    /// none is in progress.
    pub(crate) fn begin(&self, key: &str, type_key: TypeId) -> Ticket {
        let mut flights = self.flights.lock();
        match flights.entry((key.to_string(), type_key)) {
            MapEntry::Occupied(occupied) => Ticket::Waiter(Arc::clone(occupied.get())),
            MapEntry::Vacant(vacant) => {
                let flight = Arc::new(Flight::new());
                vacant.insert(Arc::clone(&flight));
                Ticket::Leader(flight)
            }
        }
    }

    /// Publishes the leader's outcome and retires the flight. Later calls to
    /// [`begin`](Self::begin) for the same key start a fresh fetch.
    pub(crate) fn finish(
        &self,
        key: &str,
        type_key: TypeId,
        flight: &Arc<Flight>,
        outcome: FlightOutcome,
    ) {
        flight.complete(outcome);
        let mut flights = self.flights.lock();
        if let Some(current) = flights.get(&(key.to_string(), type_key)) {
            if Arc::ptr_eq(current, flight) {
                flights.remove(&(key.to_string(), type_key));
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
