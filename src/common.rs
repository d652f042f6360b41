use std::collections::VecDeque;

use crate::{RequotaError, Rule};

/// One counted bucket of a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bucket {
    pub start: u64,
    pub count: u64,
}

/// Buckets for one `(key, rule)` pair, oldest first.
///
/// Counts saturate at `u64::MAX`. `total` is the exact bucket sum whenever it
/// is below `u64::MAX`.
#[derive(Debug, Default)]
pub(crate) struct WindowSeries {
    pub buckets: VecDeque<Bucket>,
    pub total: u64,
}

impl WindowSeries {
    /// Drop buckets that no longer count toward the window ending at `now_seconds`.
    pub fn evict_expired(&mut self, rule: &Rule, now_seconds: u64) {
        let saturated = self.total == u64::MAX;
        let mut evicted = false;

        while let Some(bucket) = self.buckets.front()
            && !rule.counts_toward_window(bucket.start, now_seconds)
        {
            if !saturated {
                self.total -= bucket.count;
            }
            self.buckets.pop_front();
            evicted = true;
        }

        if saturated && evicted {
            self.total = saturating_sum(self.buckets.iter().map(|bucket| bucket.count));
        }
    }

    /// Add `weight` to the bucket containing `now_seconds` and return the window total.
    pub fn record(&mut self, rule: &Rule, now_seconds: u64, weight: u64) -> u64 {
        self.evict_expired(rule, now_seconds);

        let start = rule.bucket_start(now_seconds);

        match self.buckets.back_mut() {
            Some(bucket) if bucket.start == start => {
                bucket.count = bucket.count.saturating_add(weight)
            }
            _ => self.buckets.push_back(Bucket {
                start,
                count: weight,
            }),
        }

        self.total = self.total.saturating_add(weight);
        self.total
    }

    /// Whether every bucket has left the window.
    pub fn is_expired(&self, rule: &Rule, now_seconds: u64) -> bool {
        self.buckets
            .back()
            .is_none_or(|bucket| !rule.counts_toward_window(bucket.start, now_seconds))
    }
}

/// How a post-increment window total is compared against a rule's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Threshold {
    /// Over when the total exceeds the limit.
    Exceeds,
    /// Over when the total reaches the limit.
    Reaches,
}

impl Threshold {
    pub fn is_breached(self, total: u64, limit: u64) -> bool {
        match self {
            Threshold::Exceeds => total > limit,
            Threshold::Reaches => total >= limit,
        }
    }
}

/// Outcome of evaluating a key against a rule set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LimitResult {
    /// Whether any rule in the set is over its limit.
    pub over_limit: bool,
    /// First rule, in declaration order, found over its limit.
    pub breached_rule: Option<Rule>,
}

impl LimitResult {
    /// Name of the breached rule, if it has one.
    pub fn breached_rule_name(&self) -> Option<&str> {
        self.breached_rule.as_ref().and_then(Rule::name)
    }

    /// Build a result from per-rule window totals given in declaration order.
    pub(crate) fn from_totals<'a>(
        totals: impl IntoIterator<Item = (&'a Rule, u64)>,
        threshold: Threshold,
    ) -> Self {
        totals
            .into_iter()
            .find(|(rule, total)| threshold.is_breached(*total, rule.limit()))
            .map(|(rule, _)| Self {
                over_limit: true,
                breached_rule: Some(rule.clone()),
            })
            .unwrap_or_default()
    }
}

/// Sum of `counts`, saturating at `u64::MAX`.
pub(crate) fn saturating_sum(counts: impl IntoIterator<Item = u64>) -> u64 {
    counts
        .into_iter()
        .fold(0, |total, count| total.saturating_add(count))
}

pub(crate) fn validate_key(key: &str) -> Result<(), RequotaError> {
    if key.is_empty() {
        return Err(RequotaError::InvalidKey("key must not be empty".to_string()));
    }

    Ok(())
}

pub(crate) fn validate_weight(weight: u64) -> Result<(), RequotaError> {
    if weight == 0 {
        return Err(RequotaError::InvalidWeight);
    }

    Ok(())
}
