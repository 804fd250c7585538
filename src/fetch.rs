//! Read-through coordination: single-key and batch fetch flows.
//!
//! ## Architecture
//!
//! ```text
//!   get_fetch(ctx, key, fetchFn)
//!   ──────────────────────────────────────────────────────────────────
//!     shard lookup
//!       ├─ live hit, not due ───────► return cached value
//!       ├─ live hit, due (claimed) ─► spawn background refresh,
//!       │                             return stale-but-live value
//!       ├─ live negative hit ───────► Err(MissingRecord) (+ refresh)
//!       └─ miss ────────────────────► single-flight upstream fetch,
//!                                     insert, return
//!
//!   get_fetch_batch(ctx, ids, keyFn, batchFetchFn)
//!   ──────────────────────────────────────────────────────────────────
//!     partition ids → (cached, due-for-refresh, missing)
//!       cached  ──► returned immediately
//!       due     ──► one background batch refresh (claimed keys only)
//!       missing ──► per-key single-flight; this caller leads one batch
//!                   call for unclaimed keys and joins flights led by
//!                   concurrent callers
//! ```
//!
//! Upstream callbacks always run outside every shard lock. A background
//! refresh snapshots nothing but its key: it re-fetches, then publishes the
//! result through the ordinary `set` path under the shard lock. Stale values
//! keep being served while a refresh is in flight or backing off, so callers
//! never block on a live hit.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crate::cache::Cache;
use crate::context::CancelToken;
use crate::entry::{AnyValue, Payload};
use crate::error::{BatchError, FetchError};
use crate::shard::Shard;
use crate::singleflight::{FlightOutcome, Ticket};

impl Cache {
    /// Read-through lookup for a single key.
    ///
    /// A live cached value is returned immediately. When the entry is due
    /// for refresh (stampede protection enabled), the stale-but-live value
    /// is returned and `fetch` runs in a background thread; at most one
    /// refresh per key is ever in flight. On a miss, `fetch` runs
    /// synchronously, with concurrent misses for the same key coalesced
    /// into a single upstream call.
    ///
    /// `fetch` reports "no such record" by returning
    /// [`FetchError::StoreMissingRecord`]; with negative caching enabled the
    /// answer is cached and later reads return
    /// [`FetchError::MissingRecord`] without contacting the upstream.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use stampede::{Cache, CancelToken, FetchError};
    ///
    /// let cache = Cache::builder(5, 2, Duration::from_secs(60), 10)
    ///     .build()
    ///     .unwrap();
    /// let ctx = CancelToken::new();
    ///
    /// let value = cache.get_fetch(&ctx, "1", |_ctx, id| {
    ///     Ok::<_, FetchError<String>>(format!("value{id}"))
    /// });
    /// assert_eq!(value.unwrap(), "value1");
    ///
    /// // Served from the cache; the callback does not run again.
    /// let cached = cache.get_fetch(&ctx, "1", |_ctx, _id| {
    ///     Err::<String, _>(FetchError::Upstream("unreachable".to_string()))
    /// });
    /// assert_eq!(cached.unwrap(), "value1");
    /// ```
    pub fn get_fetch<V, E, F>(
        &self,
        ctx: &CancelToken,
        key: &str,
        fetch: F,
    ) -> Result<V, FetchError<E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce(&CancelToken, &str) -> Result<V, FetchError<E>> + Send + 'static,
    {
        let shard = self.shard_for(key);
        if let Some(hit) = shard.get_for_fetch(key) {
            match hit.payload {
                Payload::Value(any) => {
                    if let Some(value) = any.downcast_ref::<V>() {
                        let value = value.clone();
                        if hit.claimed_refresh {
                            self.spawn_refresh(key, Arc::clone(shard), fetch);
                        }
                        return Ok(value);
                    }
                    // Entry holds a different type: a miss for this caller.
                    if hit.claimed_refresh {
                        shard.clear_refresh_claim(key);
                    }
                }
                Payload::Missing => {
                    if hit.claimed_refresh {
                        self.spawn_refresh(key, Arc::clone(shard), fetch);
                    }
                    return Err(FetchError::MissingRecord);
                }
            }
        }
        self.fetch_cold(ctx, key, fetch)
    }

    /// Read-through lookup for a batch of ids sharing one logical table.
    ///
    /// `key_fn` namespaces ids into cache keys (see
    /// [`batch_key_fn`](Cache::batch_key_fn)); the returned map is keyed by
    /// the caller's original ids. Cached ids are served immediately, due
    /// ids are refreshed by a single background batch call, and missing ids
    /// are fetched synchronously. Ids the upstream omits from its response
    /// are treated as missing records and cached negatively when enabled.
    ///
    /// When the upstream call fails but some ids were served from the
    /// cache, the partial map is returned inside
    /// [`BatchError::OnlyCachedRecords`].
    pub fn get_fetch_batch<V, E, S, KF, BF>(
        &self,
        ctx: &CancelToken,
        ids: &[S],
        key_fn: KF,
        fetch: BF,
    ) -> Result<HashMap<String, V>, BatchError<V, E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        S: AsRef<str>,
        KF: Fn(&str) -> String,
        BF: Fn(&CancelToken, &[String]) -> Result<HashMap<String, V>, E>
            + Clone
            + Send
            + 'static,
    {
        if ctx.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let mut records: HashMap<String, V> = HashMap::new();
        let mut due: Vec<(String, String)> = Vec::new();
        let mut missing: Vec<(String, String)> = Vec::new();

        for id in ids {
            let id = id.as_ref();
            let key = key_fn(id);
            let shard = self.shard_for(&key);
            match shard.get_for_fetch(&key) {
                Some(hit) => match &hit.payload {
                    Payload::Value(any) => match any.downcast_ref::<V>() {
                        Some(value) => {
                            records.insert(id.to_string(), value.clone());
                            if hit.claimed_refresh {
                                due.push((id.to_string(), key));
                            }
                        }
                        None => {
                            if hit.claimed_refresh {
                                shard.clear_refresh_claim(&key);
                            }
                            missing.push((id.to_string(), key));
                        }
                    },
                    // A live negative entry is omitted from the result map;
                    // a claimed refresh still runs so it can recover.
                    Payload::Missing => {
                        if hit.claimed_refresh {
                            due.push((id.to_string(), key));
                        }
                    }
                },
                None => missing.push((id.to_string(), key)),
            }
        }

        if !due.is_empty() {
            self.spawn_batch_refresh(due, fetch.clone());
        }
        if missing.is_empty() {
            return Ok(records);
        }
        self.fetch_missing_batch(ctx, records, missing, fetch)
    }

    /// Runs a claimed single-key refresh in a background thread. Every exit
    /// path releases the claim: success and confirmed-missing overwrite or
    /// remove the entry, failure backs it off.
    fn spawn_refresh<V, E, F>(&self, key: &str, shard: Arc<Shard>, fetch: F)
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce(&CancelToken, &str) -> Result<V, FetchError<E>> + Send + 'static,
    {
        let key = key.to_string();
        let metrics = Arc::clone(self.metrics());
        let store_missing = self.store_missing_records();

        thread::spawn(move || {
            // Refreshes are shared work: they get their own token and are
            // never cancelled by the caller that happened to schedule them.
            let ctx = CancelToken::new();
            match fetch(&ctx, &key) {
                Ok(value) => {
                    shard.set(&key, Payload::Value(Arc::new(value)));
                    metrics.refresh_success();
                }
                Err(FetchError::StoreMissingRecord) => {
                    if store_missing {
                        shard.set(&key, Payload::Missing);
                    } else {
                        shard.delete(&key);
                    }
                    metrics.refresh_success();
                }
                Err(_) => {
                    shard.back_off(&key);
                    metrics.refresh_failure();
                    log::warn!("background refresh failed for key {key:?}; backing off");
                }
            }
        });
    }

    /// Runs one background batch refresh for all claimed due keys.
    fn spawn_batch_refresh<V, E, BF>(&self, due: Vec<(String, String)>, fetch: BF)
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        BF: Fn(&CancelToken, &[String]) -> Result<HashMap<String, V>, E> + Send + 'static,
    {
        self.metrics().batch_refresh(due.len());
        let shards: Vec<Arc<Shard>> = due
            .iter()
            .map(|(_, key)| Arc::clone(self.shard_for(key)))
            .collect();
        let metrics = Arc::clone(self.metrics());
        let store_missing = self.store_missing_records();

        thread::spawn(move || {
            let ctx = CancelToken::new();
            let ids: Vec<String> = due.iter().map(|(id, _)| id.clone()).collect();
            match fetch(&ctx, &ids) {
                Ok(map) => {
                    for ((id, key), shard) in due.iter().zip(&shards) {
                        match map.get(id) {
                            Some(value) => {
                                shard.set(key, Payload::Value(Arc::new(value.clone())));
                            }
                            // Omitted from the response: the record is gone.
                            None => {
                                if store_missing {
                                    shard.set(key, Payload::Missing);
                                } else {
                                    shard.delete(key);
                                }
                            }
                        }
                        metrics.refresh_success();
                    }
                }
                Err(_) => {
                    for ((_, key), shard) in due.iter().zip(&shards) {
                        shard.back_off(key);
                        metrics.refresh_failure();
                    }
                    log::warn!(
                        "background batch refresh of {} keys failed; backing off",
                        due.len()
                    );
                }
            }
        });
    }

    /// Synchronous cold-miss fetch with per-key single-flight coalescing.
    fn fetch_cold<V, E, F>(
        &self,
        ctx: &CancelToken,
        key: &str,
        fetch: F,
    ) -> Result<V, FetchError<E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce(&CancelToken, &str) -> Result<V, FetchError<E>> + Send + 'static,
    {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let type_key = flight_type_key::<V, E>();
        match self.flights().begin(key, type_key) {
            Ticket::Leader(flight) => {
                let result = fetch(ctx, key);
                let outcome = self.apply_single_result(key, &result);
                self.flights().finish(key, type_key, &flight, outcome);
                result
            }
            Ticket::Waiter(flight) => match flight.wait(ctx) {
                FlightOutcome::Value(any) => match any.downcast_ref::<V>() {
                    Some(value) => Ok(value.clone()),
                    // Unreachable with type-keyed flights; fetch directly
                    // rather than guessing.
                    None => self.fetch_direct(ctx, key, fetch),
                },
                FlightOutcome::Missing => Err(FetchError::StoreMissingRecord),
                FlightOutcome::Cancelled => Err(FetchError::Cancelled),
                FlightOutcome::Failed(any) => match any.downcast_ref::<E>() {
                    Some(err) => Err(FetchError::Upstream(err.clone())),
                    None => self.fetch_direct(ctx, key, fetch),
                },
            },
        }
    }

    /// Uncoalesced fallback for the degenerate waiter paths above.
    fn fetch_direct<V, E, F>(
        &self,
        ctx: &CancelToken,
        key: &str,
        fetch: F,
    ) -> Result<V, FetchError<E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce(&CancelToken, &str) -> Result<V, FetchError<E>> + Send + 'static,
    {
        let result = fetch(ctx, key);
        let _ = self.apply_single_result(key, &result);
        result
    }

    /// Applies a fetch result to the cache and maps it to a flight outcome.
    /// Values and confirmed-missing answers are inserted; transient errors
    /// are never cached.
    fn apply_single_result<V, E>(
        &self,
        key: &str,
        result: &Result<V, FetchError<E>>,
    ) -> FlightOutcome
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        match result {
            Ok(value) => {
                let any: AnyValue = Arc::new(value.clone());
                self.shard_for(key)
                    .set(key, Payload::Value(Arc::clone(&any)));
                FlightOutcome::Value(any)
            }
            Err(FetchError::StoreMissingRecord) => {
                if self.store_missing_records() {
                    self.shard_for(key).set(key, Payload::Missing);
                }
                FlightOutcome::Missing
            }
            Err(FetchError::Cancelled) => FlightOutcome::Cancelled,
            Err(FetchError::MissingRecord) => FlightOutcome::Missing,
            Err(FetchError::Upstream(err)) => FlightOutcome::Failed(Arc::new(err.clone())),
        }
    }

    /// Synchronous fetch of a batch's missing keys. This caller leads one
    /// upstream call for the keys nobody else is fetching and joins the
    /// flights of concurrent callers for the rest.
    fn fetch_missing_batch<V, E, BF>(
        &self,
        ctx: &CancelToken,
        mut records: HashMap<String, V>,
        missing: Vec<(String, String)>,
        fetch: BF,
    ) -> Result<HashMap<String, V>, BatchError<V, E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        BF: Fn(&CancelToken, &[String]) -> Result<HashMap<String, V>, E>,
    {
        let type_key = flight_type_key::<V, E>();
        let mut leads = Vec::new();
        let mut joins = Vec::new();
        for (id, key) in missing {
            match self.flights().begin(&key, type_key) {
                Ticket::Leader(flight) => leads.push((id, key, flight)),
                Ticket::Waiter(flight) => joins.push((id, flight)),
            }
        }

        let mut failure: Option<E> = None;

        if !leads.is_empty() {
            let ids: Vec<String> = leads.iter().map(|(id, _, _)| id.clone()).collect();
            match fetch(ctx, &ids) {
                Ok(map) => {
                    for (id, key, flight) in &leads {
                        let outcome = match map.get(id) {
                            Some(value) => {
                                let any: AnyValue = Arc::new(value.clone());
                                self.shard_for(key)
                                    .set(key, Payload::Value(Arc::clone(&any)));
                                records.insert(id.clone(), value.clone());
                                FlightOutcome::Value(any)
                            }
                            None => {
                                if self.store_missing_records() {
                                    self.shard_for(key).set(key, Payload::Missing);
                                }
                                FlightOutcome::Missing
                            }
                        };
                        self.flights().finish(key, type_key, flight, outcome);
                    }
                }
                Err(err) => {
                    for (_, key, flight) in &leads {
                        self.flights().finish(
                            key,
                            type_key,
                            flight,
                            FlightOutcome::Failed(Arc::new(err.clone())),
                        );
                    }
                    failure = Some(err);
                }
            }
        }

        for (id, flight) in joins {
            match flight.wait(ctx) {
                FlightOutcome::Value(any) => {
                    if let Some(value) = any.downcast_ref::<V>() {
                        records.insert(id, value.clone());
                    }
                }
                FlightOutcome::Missing => {}
                // The shared fetch was abandoned; the id is simply absent
                // from this response and the next read retries.
                FlightOutcome::Cancelled => {}
                FlightOutcome::Failed(any) => {
                    if failure.is_none() {
                        if let Some(err) = any.downcast_ref::<E>() {
                            failure = Some(err.clone());
                        }
                    }
                }
            }
        }

        match failure {
            None => Ok(records),
            Some(source) if records.is_empty() => Err(BatchError::Upstream(source)),
            Some(source) => Err(BatchError::OnlyCachedRecords { records, source }),
        }
    }

    fn store_missing_records(&self) -> bool {
        self.config()
            .stampede
            .as_ref()
            .is_some_and(|stampede| stampede.store_missing_records)
    }
}

/// Flights are keyed by the caller's value and error types on top of the
/// cache key, so differently-typed readers never exchange payloads.
fn flight_type_key<V: 'static, E: 'static>() -> TypeId {
    TypeId::of::<(V, E)>()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::metrics::AtomicMetrics;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type TestError = FetchError<String>;

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce(&CancelToken, &str) -> Result<String, TestError> + Send + 'static {
        let counter = Arc::clone(counter);
        move |_ctx: &CancelToken, id: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("value{id}"))
        }
    }

    #[test]
    fn second_read_is_served_from_cache() {
        let cache = Cache::builder(5, 2, Duration::from_secs(60), 10)
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_fetch(&ctx, "1", counting_fetch(&calls)).unwrap();
        assert_eq!(first, "value1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = cache.get_fetch(&ctx, "1", counting_fetch(&calls)).unwrap();
        assert_eq!(second, "value1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cold_miss_error_is_not_cached() {
        let cache = Cache::builder(5, 1, Duration::from_secs(60), 10)
            .build()
            .unwrap();
        let ctx = CancelToken::new();

        let err = cache
            .get_fetch::<String, String, _>(&ctx, "1", |_ctx, _id| {
                Err(FetchError::Upstream("boom".to_string()))
            })
            .unwrap_err();
        assert_eq!(err, FetchError::Upstream("boom".to_string()));

        // The failure was not cached; the next call reaches the upstream.
        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.get_fetch(&ctx, "1", counting_fetch(&calls)).unwrap();
        assert_eq!(value, "value1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_context_short_circuits_a_cold_miss() {
        let cache = Cache::builder(5, 1, Duration::from_secs(60), 10)
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        ctx.cancel();

        let err = cache
            .get_fetch::<String, String, _>(&ctx, "1", |_ctx, _id| {
                panic!("the upstream must not be contacted")
            })
            .unwrap_err();
        assert_eq!(err, FetchError::Cancelled);
    }

    #[test]
    fn missing_record_without_negative_caching_is_refetched() {
        let cache = Cache::builder(5, 1, Duration::from_secs(60), 10)
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let err = cache
                .get_fetch::<String, String, _>(&ctx, "1", move |_ctx, _id| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::StoreMissingRecord)
                })
                .unwrap_err();
            assert_eq!(err, FetchError::StoreMissingRecord);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn negative_caching_suppresses_repeat_fetches() {
        let clock = Arc::new(TestClock::new());
        let cache = Cache::builder(5, 1, Duration::from_secs(60), 10)
            .clock(clock)
            .stampede_protection(
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_millis(10),
                true,
            )
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let calls = Arc::clone(&calls);
            let err = cache
                .get_fetch::<String, String, _>(&ctx, "1", move |_ctx, _id| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::StoreMissingRecord)
                })
                .unwrap_err();
            assert_eq!(err, FetchError::StoreMissingRecord);
        }

        // Cached as missing: no upstream call, sentinel switches.
        let err = cache
            .get_fetch::<String, String, _>(&ctx, "1", |_ctx, _id| {
                panic!("served from the negative cache")
            })
            .unwrap_err();
        assert_eq!(err, FetchError::MissingRecord);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The plain typed accessor treats the negative entry as absent.
        assert_eq!(cache.get::<String>("1"), None);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn stale_value_is_served_while_the_refresh_runs() {
        let clock = Arc::new(TestClock::new());
        let metrics = Arc::new(AtomicMetrics::new());
        let cache = Cache::builder(10, 2, Duration::from_secs(60), 10)
            .clock(clock.clone())
            .metrics(metrics.clone())
            .stampede_protection(
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(10),
                true,
            )
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_fetch(&ctx, "1", counting_fetch(&calls)).unwrap();
        clock.add(Duration::from_millis(1001));

        // Due: the stale value comes back immediately, the refresh runs in
        // the background.
        let stale = cache.get_fetch(&ctx, "1", counting_fetch(&calls)).unwrap();
        assert_eq!(stale, "value1");

        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        for _ in 0..100 {
            if metrics.snapshot().refresh_successes == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(metrics.snapshot().refresh_successes, 1);
    }

    #[test]
    fn batch_partitions_between_cache_and_upstream() {
        let cache = Cache::builder(5, 1, Duration::from_secs(60), 30)
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        let requested: Arc<parking_lot::Mutex<Vec<String>>> = Arc::new(Default::default());

        let fetch = {
            let requested = Arc::clone(&requested);
            move |_ctx: &CancelToken, ids: &[String]| {
                requested.lock().extend(ids.iter().cloned());
                Ok::<_, String>(
                    ids.iter()
                        .map(|id| (id.clone(), format!("value{id}")))
                        .collect::<HashMap<_, _>>(),
                )
            }
        };

        let ids = ["1", "2", "3"];
        let first = cache
            .get_fetch_batch(&ctx, &ids, cache.batch_key_fn("item"), fetch.clone())
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(requested.lock().len(), 3);

        // Only "4" is new; the rest come from the cache.
        let ids = ["1", "2", "3", "4"];
        let second = cache
            .get_fetch_batch(&ctx, &ids, cache.batch_key_fn("item"), fetch)
            .unwrap();
        assert_eq!(second.len(), 4);
        assert_eq!(second.get("4"), Some(&"value4".to_string()));
        let requested = requested.lock();
        assert_eq!(requested.len(), 4);
        assert_eq!(requested[3], "4");
    }

    #[test]
    fn batch_failure_with_cached_records_is_partial() {
        let cache = Cache::builder(10, 1, Duration::from_secs(60), 10)
            .build()
            .unwrap();
        let ctx = CancelToken::new();

        for id in ["1", "2", "3", "4"] {
            cache.set(&format!("item-{id}"), format!("value{id}"));
        }

        let err = cache
            .get_fetch_batch::<String, String, _, _, _>(
                &ctx,
                &["1", "2", "3", "4", "5"],
                cache.batch_key_fn("item"),
                |_ctx, _ids| Err("upstream down".to_string()),
            )
            .unwrap_err();

        match err {
            BatchError::OnlyCachedRecords { records, source } => {
                assert_eq!(records.len(), 4);
                assert_eq!(source, "upstream down");
            }
            other => panic!("expected OnlyCachedRecords, got {other:?}"),
        }
    }

    #[test]
    fn batch_failure_with_nothing_cached_surfaces_the_error() {
        let cache = Cache::builder(10, 1, Duration::from_secs(60), 10)
            .build()
            .unwrap();
        let ctx = CancelToken::new();

        let err = cache
            .get_fetch_batch::<String, String, _, _, _>(
                &ctx,
                &["1", "2"],
                cache.batch_key_fn("item"),
                |_ctx, _ids| Err("upstream down".to_string()),
            )
            .unwrap_err();
        assert_eq!(err, BatchError::Upstream("upstream down".to_string()));
    }

    #[test]
    fn batch_omitted_ids_become_negative_entries() {
        let cache = Cache::builder(10, 1, Duration::from_secs(60), 10)
            .stampede_protection(
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(1),
                true,
            )
            .build()
            .unwrap();
        let ctx = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = {
            let calls = Arc::clone(&calls);
            move |_ctx: &CancelToken, _ids: &[String]| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<HashMap<String, String>, String>(HashMap::new())
            }
        };

        let ids = ["1", "2", "3", "4"];
        let records = cache
            .get_fetch_batch(&ctx, &ids, cache.batch_key_fn("item"), fetch.clone())
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // All four ids are now cached as missing: no second upstream call.
        let records = cache
            .get_fetch_batch(&ctx, &ids, cache.batch_key_fn("item"), fetch)
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
