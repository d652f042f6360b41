use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::{
    CounterStore, LimitResult, RateLimiter, ReactiveRateLimiter, RequotaError, RuleSet,
    WindowIncrement,
    common::{Threshold, validate_weight},
    distributed::common::validate_store_key,
    factory::ClosedFlag,
};

/// Sliding-window rate limiter whose counters live in a shared [`CounterStore`].
///
/// Each rule is evaluated by one atomic store operation (increment, refresh
/// expiry, sum the window). Rules of a set are submitted concurrently; the
/// result is over limit when any rule is, and the reported rule is the first
/// breached one in declaration order regardless of completion order.
///
/// # Calling conventions
///
/// - [`ReactiveRateLimiter`]: returns futures, never blocks the caller.
/// - [`RateLimiter`]: blocking wrapper. Inside a multi-thread tokio runtime the
///   wait happens in [`block_in_place`](tokio::task::block_in_place); outside a
///   runtime it uses the runtime handle captured by the factory. Blocking calls
///   from a current-thread runtime fail with
///   [`RequotaError::BlockingUnsupported`].
///
/// Store failures are returned as [`RequotaError::StoreUnavailable`] or
/// [`RequotaError::EvaluationFailed`], never as "under limit", and are not
/// retried.
pub struct DistributedRateLimiter<S: CounterStore> {
    rules: RuleSet,
    store: Arc<S>,
    runtime: Option<Handle>,
    closed: ClosedFlag,
}

impl<S: CounterStore> DistributedRateLimiter<S> {
    pub(crate) fn new(
        rules: RuleSet,
        store: Arc<S>,
        runtime: Option<Handle>,
        closed: ClosedFlag,
    ) -> Self {
        Self {
            rules,
            store,
            runtime,
            closed,
        }
    }

    /// Rule set this limiter enforces.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    async fn record(
        &self,
        key: &str,
        weight: u64,
        threshold: Threshold,
    ) -> Result<LimitResult, RequotaError> {
        self.closed.ensure_open()?;
        validate_store_key(key)?;
        validate_weight(weight)?;

        let totals = try_join_all(self.rules.iter().map(|rule| {
            self.store
                .increment_and_sum(WindowIncrement { key, rule, weight })
        }))
        .await
        .inspect_err(|err| tracing::warn!(key, error = %err, "requota.distributed.record.error"))?;

        let result = LimitResult::from_totals(self.rules.iter().zip(totals), threshold);

        tracing::trace!(key, weight, over_limit = result.over_limit, "requota.distributed.record");

        Ok(result)
    } // end method record

    async fn peek(&self, key: &str) -> Result<bool, RequotaError> {
        self.closed.ensure_open()?;
        validate_store_key(key)?;

        let totals =
            try_join_all(self.rules.iter().map(|rule| self.store.sum(key, rule))).await?;

        Ok(LimitResult::from_totals(self.rules.iter().zip(totals), Threshold::Reaches).over_limit)
    }

    async fn reset(&self, key: &str) -> Result<bool, RequotaError> {
        self.closed.ensure_open()?;
        validate_store_key(key)?;

        let removed =
            try_join_all(self.rules.iter().map(|rule| self.store.reset(key, rule))).await?;

        Ok(removed.into_iter().any(|removed| removed))
    }

    fn block_on<T>(
        &self,
        future: impl Future<Output = Result<T, RequotaError>>,
    ) -> Result<T, RequotaError> {
        if let Ok(handle) = Handle::try_current() {
            return match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => Err(RequotaError::BlockingUnsupported),
                _ => tokio::task::block_in_place(|| handle.block_on(future)),
            };
        }

        match &self.runtime {
            Some(handle) => handle.block_on(future),
            None if !self.store.suspends_on_io() => futures::executor::block_on(future),
            None => Err(RequotaError::BlockingUnsupported),
        }
    } // end method block_on
} // end of impl

impl<S: CounterStore> RateLimiter for DistributedRateLimiter<S> {
    fn is_over_limit_with_result_by(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<LimitResult, RequotaError> {
        self.block_on(self.record(key, weight, Threshold::Exceeds))
    }

    fn ge_limit_when_incremented_by(&self, key: &str, weight: u64) -> Result<bool, RequotaError> {
        self.block_on(self.record(key, weight, Threshold::Reaches))
            .map(|result| result.over_limit)
    }

    fn is_over_limit_peek(&self, key: &str) -> Result<bool, RequotaError> {
        self.block_on(self.peek(key))
    }

    fn reset_limit(&self, key: &str) -> Result<bool, RequotaError> {
        self.block_on(self.reset(key))
    }
}

#[async_trait]
impl<S: CounterStore> ReactiveRateLimiter for DistributedRateLimiter<S> {
    async fn is_over_limit_with_result_by_async(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<LimitResult, RequotaError> {
        self.record(key, weight, Threshold::Exceeds).await
    }

    async fn ge_limit_when_incremented_by_async(
        &self,
        key: &str,
        weight: u64,
    ) -> Result<bool, RequotaError> {
        Ok(self
            .record(key, weight, Threshold::Reaches)
            .await?
            .over_limit)
    }

    async fn is_over_limit_peek_async(&self, key: &str) -> Result<bool, RequotaError> {
        self.peek(key).await
    }

    async fn reset_limit_async(&self, key: &str) -> Result<bool, RequotaError> {
        self.reset(key).await
    }
}
