//! Injectable time source for deterministic tests.
//!
//! Every timestamp the cache reads and every timer it sleeps on goes through
//! the [`Clock`] trait, never through the host clock directly. Production
//! code uses [`SystemClock`]; tests inject a [`TestClock`] whose
//! [`add`](TestClock::add) advances time *and* wakes any sweeper blocked on a
//! timer, so expiry behavior is fully deterministic.
//!
//! ## Key Components
//!
//! - [`Clock`]: `now()` plus a stoppable wait-until-deadline primitive.
//! - [`SystemClock`]: monotonic host clock with real sleeps.
//! - [`TestClock`]: manually advanced clock for tests.
//! - [`StopSignal`]: teardown flag shared with background sweepers.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How often a [`TestClock`] waiter re-checks the stop flag. The flag has no
/// hook into the test clock's condvar, so teardown latency is bounded by
/// this interval.
const TEST_CLOCK_STOP_POLL: Duration = Duration::from_millis(25);

/// A monotonically advancing time source.
///
/// Implementations must be safe to share across threads; the cache hands one
/// instance to every shard and background task.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant according to this clock.
    fn now(&self) -> Instant;

    /// Blocks the calling thread until the clock reaches `deadline` or
    /// `stop` is signalled, whichever comes first.
    ///
    /// Returns `true` when the wait ended because of the stop signal.
    fn wait_until(&self, deadline: Instant, stop: &StopSignal) -> bool;
}

// ---------------------------------------------------------------------------
// StopSignal
// ---------------------------------------------------------------------------

/// One-way teardown flag with a condvar so real-time sleepers wake promptly.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    /// Creates an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every thread blocked in
    /// [`Clock::wait_until`] on a [`SystemClock`].
    pub fn set(&self) {
        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.cv.notify_all();
    }

    /// Returns `true` once [`set`](Self::set) has been called.
    pub fn is_set(&self) -> bool {
        *self.stopped.lock()
    }

    /// Waits on the signal's condvar for at most `timeout`. Returns `true`
    /// if the signal is set when the wait ends.
    fn wait_for(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return true;
        }
        self.cv.wait_for(&mut stopped, timeout);
        *stopped
    }
}

// ---------------------------------------------------------------------------
// SystemClock
// ---------------------------------------------------------------------------

/// Production clock backed by [`Instant::now`] with real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant, stop: &StopSignal) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return stop.is_set();
            }
            if stop.wait_for(deadline - now) {
                return true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TestClock
// ---------------------------------------------------------------------------

/// Manually advanced clock for deterministic tests.
///
/// `now()` only moves when [`add`](TestClock::add) is called. Advancing the
/// clock wakes every thread blocked in [`Clock::wait_until`], which is what
/// lets a test drive the expiry sweep without real sleeps.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stampede::{Clock, TestClock};
///
/// let clock = TestClock::new();
/// let start = clock.now();
/// clock.add(Duration::from_secs(60));
/// assert_eq!(clock.now() - start, Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct TestClock {
    now: Mutex<Instant>,
    cv: Condvar,
}

impl TestClock {
    /// Creates a test clock starting at the current host instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a test clock starting at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
            cv: Condvar::new(),
        }
    }

    /// Advances the clock by `delta` and wakes all timer waiters.
    pub fn add(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
        self.cv.notify_all();
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn wait_until(&self, deadline: Instant, stop: &StopSignal) -> bool {
        let mut now = self.now.lock();
        loop {
            if stop.is_set() {
                return true;
            }
            if *now >= deadline {
                return false;
            }
            // Woken by add(); the timeout only bounds stop-flag latency.
            self.cv.wait_for(&mut now, TEST_CLOCK_STOP_POLL);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
