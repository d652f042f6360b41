//! Caller-facing contracts shared by every counting engine.
//!
//! Two engines implement these traits:
//!
//! - [`LocalRateLimiter`](crate::LocalRateLimiter): in-process counters, never suspends.
//! - [`DistributedRateLimiter`](crate::DistributedRateLimiter): counters in a shared
//!   [`CounterStore`](crate::CounterStore), evaluated atomically by the store.
//!
//! Limiters are obtained from a [`RateLimiterFactory`], which returns the same
//! instance for every equal [`RuleSet`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::{LimitResult, RequotaError, RuleSet};

/// Blocking rate limiter contract.
///
/// Every `is_over_limit*` and `ge_limit_when_incremented*` call counts the
/// request against every rule, even when the answer is "over limit".
pub trait RateLimiter: Send + Sync {
    /// Count `weight` operations for `key` and report which rule, if any, is now exceeded.
    fn is_over_limit_with_result_by(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<LimitResult, RequotaError>;

    /// Count `weight` operations for `key` and report whether any rule has now
    /// reached its limit.
    fn ge_limit_when_incremented_by(&self, key: &str, weight: u64) -> Result<bool, RequotaError>;

    /// Report whether any rule for `key` has already reached its limit, without counting.
    fn is_over_limit_peek(&self, key: &str) -> Result<bool, RequotaError>;

    /// Forget every counter for `key`. Returns whether anything was removed.
    fn reset_limit(&self, key: &str) -> Result<bool, RequotaError>;

    /// Count one operation for `key` and report whether any rule is exceeded.
    fn is_over_limit(&self, key: &str) -> Result<bool, RequotaError> {
        self.is_over_limit_by(key, 1)
    }

    /// Count `weight` operations for `key` and report whether any rule is exceeded.
    fn is_over_limit_by(&self, key: &str, weight: u64) -> Result<bool, RequotaError> {
        Ok(self.is_over_limit_with_result_by(key, weight)?.over_limit)
    }

    /// Count one operation for `key` and report which rule, if any, is exceeded.
    fn is_over_limit_with_result(&self, key: &str) -> Result<LimitResult, RequotaError> {
        self.is_over_limit_with_result_by(key, 1)
    }

    /// Count one operation for `key` and report whether any rule has reached its limit.
    fn ge_limit_when_incremented(&self, key: &str) -> Result<bool, RequotaError> {
        self.ge_limit_when_incremented_by(key, 1)
    }
}

/// Non-blocking rate limiter contract.
///
/// Same semantics as [`RateLimiter`], but results are delivered through a
/// future so the calling task is never blocked on the store round-trip.
#[async_trait]
pub trait ReactiveRateLimiter: Send + Sync {
    /// See [`RateLimiter::is_over_limit_with_result_by`].
    async fn is_over_limit_with_result_by_async(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<LimitResult, RequotaError>;

    /// See [`RateLimiter::ge_limit_when_incremented_by`].
    async fn ge_limit_when_incremented_by_async(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<bool, RequotaError>;

    /// See [`RateLimiter::is_over_limit_peek`].
    async fn is_over_limit_peek_async(&self, key: &str) -> Result<bool, RequotaError>;

    /// See [`RateLimiter::reset_limit`].
    async fn reset_limit_async(&self, key: &str) -> Result<bool, RequotaError>;

    /// See [`RateLimiter::is_over_limit`].
    async fn is_over_limit_async(&self, key: &str) -> Result<bool, RequotaError> {
        Ok(self
            .is_over_limit_with_result_by_async(key, 1)
            .await?
            .over_limit)
    }

    /// See [`RateLimiter::is_over_limit_by`].
    async fn is_over_limit_by_async(&self, key: &str, weight: u64) -> Result<bool, RequotaError> {
        Ok(self
            .is_over_limit_with_result_by_async(key, weight)
            .await?
            .over_limit)
    }

    /// See [`RateLimiter::is_over_limit_with_result`].
    async fn is_over_limit_with_result_async(
        &self,
        key: &str,
    ) -> Result<LimitResult, RequotaError> {
        self.is_over_limit_with_result_by_async(key, 1).await
    }

    /// See [`RateLimiter::ge_limit_when_incremented`].
    async fn ge_limit_when_incremented_async(&self, key: &str) -> Result<bool, RequotaError> {
        self.ge_limit_when_incremented_by_async(key, 1).await
    }
}

/// Produces and caches limiters keyed by rule set value.
pub trait RateLimiterFactory: Send + Sync {
    /// Limiter type handed out by this factory.
    type Limiter: RateLimiter;

    /// Return the limiter for `rules`. Equal rule sets always yield the same instance.
    fn get_instance(&self, rules: &RuleSet) -> Result<Arc<Self::Limiter>, RequotaError>;

    /// Release shared resources. Limiters obtained earlier fail with
    /// [`RequotaError::ClosedFactory`] from now on.
    fn close(&self);
}
