use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    Clock, RequotaError, Rule, SystemClock,
    common::saturating_sum,
    distributed::common::{bucket_key, counted_bucket_starts, window_base_key},
};

/// One increment of a `(key, rule)` window.
#[derive(Debug, Clone, Copy)]
pub struct WindowIncrement<'a> {
    /// Caller key being limited.
    pub key: &'a str,
    /// Rule whose window is incremented.
    pub rule: &'a Rule,
    /// Number of operations to add.
    pub weight: u64,
}

/// Shared counter storage for the distributed engine.
///
/// Implementations must make [`increment_and_sum`](Self::increment_and_sum)
/// atomic with respect to every other caller of the same store, across all
/// processes sharing it:
///
/// 1. add `weight` to the bucket containing "now"
/// 2. set that bucket's expiry to `window_seconds + bucket_width` from now
/// 3. sum every bucket still inside the window
/// 4. return the sum
///
/// No caller may observe the state between steps 1 and 3.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically record `increment` and return the post-increment window total.
    async fn increment_and_sum(
        &self,
        increment: WindowIncrement<'_>,
    ) -> Result<u64, RequotaError>;

    /// Current window total for `key` under `rule`, without counting.
    async fn sum(&self, key: &str, rule: &Rule) -> Result<u64, RequotaError>;

    /// Delete every bucket of `key` under `rule`. Returns whether any existed.
    async fn reset(&self, key: &str, rule: &Rule) -> Result<bool, RequotaError>;

    /// Whether calls may wait on network I/O driven by an async runtime.
    fn suspends_on_io(&self) -> bool {
        true
    }

    /// Release connections held by the store.
    fn close(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct StoredBucket {
    count: u64,
    expires_at: u64,
}

/// In-process [`CounterStore`] using the same keyspace and expiry rules as the
/// Redis store.
///
/// Every operation runs under a single mutex, which gives the same atomicity a
/// server-side script gives. Useful for tests, simulations and deployments
/// where several limiter factories in one process must share counters.
#[derive(Debug, Clone)]
pub struct MemoryCounterStore {
    prefix: Arc<str>,
    clock: Arc<dyn Clock>,
    buckets: Arc<Mutex<HashMap<String, StoredBucket>>>,
    writes: Arc<AtomicU64>,
}

/// Purge expired buckets after this many increments.
const PURGE_EVERY: u64 = 1024;

impl MemoryCounterStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            prefix: Arc::from("requota"),
            clock,
            buckets: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of live bucket entries, including ones awaiting purge.
    pub fn stored_buckets(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Drop every bucket whose expiry has passed.
    pub fn purge_expired(&self) {
        let now_seconds = self.clock.now_seconds();
        self.buckets
            .lock()
            .retain(|_, bucket| bucket.expires_at > now_seconds);
    }

    fn window_total(
        buckets: &HashMap<String, StoredBucket>,
        base_key: &str,
        rule: &Rule,
        now_seconds: u64,
    ) -> u64 {
        let counts = counted_bucket_starts(rule, now_seconds)
            .filter_map(|start| buckets.get(&bucket_key(base_key, start)))
            .filter(|bucket| bucket.expires_at > now_seconds)
            .map(|bucket| bucket.count);

        saturating_sum(counts)
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_and_sum(
        &self,
        increment: WindowIncrement<'_>,
    ) -> Result<u64, RequotaError> {
        let rule = increment.rule;
        let now_seconds = self.clock.now_seconds();
        let base_key = window_base_key(&self.prefix, increment.key, rule);
        let expires_at = now_seconds + rule.bucket_expiry_seconds();

        let total = {
            let mut buckets = self.buckets.lock();

            let bucket = buckets
                .entry(bucket_key(&base_key, rule.bucket_start(now_seconds)))
                .or_insert(StoredBucket {
                    count: 0,
                    expires_at,
                });

            if bucket.expires_at <= now_seconds {
                bucket.count = 0;
            }

            bucket.count = bucket.count.saturating_add(increment.weight);
            bucket.expires_at = expires_at;

            Self::window_total(&buckets, &base_key, rule, now_seconds)
        };

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            self.purge_expired();
        }

        Ok(total)
    }

    async fn sum(&self, key: &str, rule: &Rule) -> Result<u64, RequotaError> {
        let now_seconds = self.clock.now_seconds();
        let base_key = window_base_key(&self.prefix, key, rule);

        Ok(Self::window_total(
            &self.buckets.lock(),
            &base_key,
            rule,
            now_seconds,
        ))
    }

    async fn reset(&self, key: &str, rule: &Rule) -> Result<bool, RequotaError> {
        let now_seconds = self.clock.now_seconds();
        let base_key = window_base_key(&self.prefix, key, rule);
        let mut buckets = self.buckets.lock();

        let mut removed = false;
        for start in counted_bucket_starts(rule, now_seconds) {
            removed |= buckets.remove(&bucket_key(&base_key, start)).is_some();
        }

        Ok(removed)
    }

    fn suspends_on_io(&self) -> bool {
        false
    }
}
