use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{
    Clock, LimitResult, LocalRateLimiterOptions, RateLimiter, RequotaError, RuleSet,
    common::{Threshold, WindowSeries, validate_key, validate_weight},
    factory::ClosedFlag,
};

/// Sliding-window rate limiter for in-process use.
///
/// Keeps one bucket series per `(key, rule)` pair in a [`DashMap`]. All
/// buckets of a key are updated under that key's shard write guard, so the
/// increment, the window sum and the comparison happen as one step with
/// respect to every other caller in the process.
///
/// # Algorithm
///
/// 1. Compute the bucket start for "now" from the rule's bucket width
/// 2. Evict buckets whose start is no longer inside the window
/// 3. Add the weight to the current bucket (creating it if needed)
/// 4. Compare the remaining total against the rule's limit
///
/// # Memory
///
/// Expired buckets are evicted whenever their key is touched. Keys that are
/// never touched again are swept opportunistically every
/// [`sweep_every`](LocalRateLimiterOptions::sweep_every) calls, or on demand
/// with [`cleanup`](Self::cleanup). No background task is spawned.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use requota::{LocalRateLimiterFactory, RateLimiter, RateLimiterFactory, Rule, RuleSet};
///
/// let factory = LocalRateLimiterFactory::default();
/// let rules = RuleSet::from(Rule::of(Duration::from_secs(60), 2).unwrap());
/// let limiter = factory.get_instance(&rules).unwrap();
///
/// assert!(!limiter.is_over_limit("user_123").unwrap());
/// assert!(!limiter.is_over_limit("user_123").unwrap());
/// assert!(limiter.is_over_limit("user_123").unwrap());
/// ```
pub struct LocalRateLimiter {
    rules: RuleSet,
    clock: Arc<dyn Clock>,
    series: DashMap<String, Vec<WindowSeries>>,
    sweep_every: u64,
    calls: AtomicU64,
    closed: ClosedFlag,
}

impl LocalRateLimiter {
    pub(crate) fn new(
        rules: RuleSet,
        options: &LocalRateLimiterOptions,
        closed: ClosedFlag,
    ) -> Self {
        Self {
            rules,
            clock: options.clock.clone(),
            series: DashMap::new(),
            sweep_every: options.sweep_every,
            calls: AtomicU64::new(0),
            closed,
        }
    } // end constructor

    /// Rule set this limiter enforces.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Number of keys currently holding counter state.
    pub fn tracked_keys(&self) -> usize {
        self.series.len()
    }

    /// Remove every key whose buckets have all left their windows.
    pub fn cleanup(&self) {
        let now_seconds = self.clock.now_seconds();

        self.series.retain(|_, series| {
            !self
                .rules
                .iter()
                .zip(series.iter())
                .all(|(rule, window)| window.is_expired(rule, now_seconds))
        });
    } // end method cleanup

    fn record(
        &self,
        key: &str,
        weight: u64,
        threshold: Threshold,
    ) -> Result<LimitResult, RequotaError> {
        self.closed.ensure_open()?;
        validate_key(key)?;
        validate_weight(weight)?;

        let now_seconds = self.clock.now_seconds();

        let result = {
            let mut series = match self.series.get_mut(key) {
                Some(series) => series,
                None => self
                    .series
                    .entry(key.to_string())
                    .or_insert_with(|| self.empty_series()),
            };

            let totals: Vec<u64> = self
                .rules
                .iter()
                .zip(series.iter_mut())
                .map(|(rule, window)| window.record(rule, now_seconds, weight))
                .collect();

            LimitResult::from_totals(self.rules.iter().zip(totals), threshold)
        };

        tracing::trace!(key, weight, over_limit = result.over_limit, "requota.local.record");

        self.maybe_sweep();

        Ok(result)
    } // end method record

    fn empty_series(&self) -> Vec<WindowSeries> {
        self.rules.iter().map(|_| WindowSeries::default()).collect()
    }

    fn maybe_sweep(&self) {
        if self.sweep_every == 0 {
            return;
        }

        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;

        if calls % self.sweep_every == 0 {
            self.cleanup();
        }
    }
} // end of impl

impl RateLimiter for LocalRateLimiter {
    fn is_over_limit_with_result_by(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<LimitResult, RequotaError> {
        self.record(key, weight, Threshold::Exceeds)
    }

    fn ge_limit_when_incremented_by(&self, key: &str, weight: u64) -> Result<bool, RequotaError> {
        Ok(self.record(key, weight, Threshold::Reaches)?.over_limit)
    }

    fn is_over_limit_peek(&self, key: &str) -> Result<bool, RequotaError> {
        self.closed.ensure_open()?;
        validate_key(key)?;

        let Some(mut series) = self.series.get_mut(key) else {
            return Ok(false);
        };

        let now_seconds = self.clock.now_seconds();

        let totals: Vec<u64> = self
            .rules
            .iter()
            .zip(series.iter_mut())
            .map(|(rule, window)| {
                window.evict_expired(rule, now_seconds);
                window.total
            })
            .collect();

        Ok(LimitResult::from_totals(self.rules.iter().zip(totals), Threshold::Reaches).over_limit)
    }

    fn reset_limit(&self, key: &str) -> Result<bool, RequotaError> {
        self.closed.ensure_open()?;
        validate_key(key)?;

        Ok(self.series.remove(key).is_some())
    }
}
