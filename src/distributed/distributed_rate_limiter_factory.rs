use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    CounterStore, DistributedRateLimiter, RateLimiterFactory, RequotaError, RuleSet,
    factory::InstanceCache,
};

/// Hands out one [`DistributedRateLimiter`] per distinct [`RuleSet`].
///
/// Every limiter shares the factory's [`CounterStore`], and therefore its
/// connection. The factory owns the store's lifecycle: [`close`](RateLimiterFactory::close)
/// releases it and makes every limiter produced here fail with
/// [`RequotaError::ClosedFactory`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use requota::{
///     DistributedRateLimiterFactory, MemoryCounterStore, ReactiveRateLimiter, Rule, RuleSet,
/// };
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let factory = DistributedRateLimiterFactory::new(MemoryCounterStore::new());
/// let rules = RuleSet::from(Rule::of(Duration::from_secs(60), 1).unwrap());
/// let limiter = factory.get_instance_reactive(&rules).unwrap();
///
/// assert!(!limiter.is_over_limit_async("user_123").await.unwrap());
/// assert!(limiter.is_over_limit_async("user_123").await.unwrap());
/// # });
/// ```
pub struct DistributedRateLimiterFactory<S: CounterStore> {
    store: Arc<S>,
    runtime: Option<Handle>,
    instances: InstanceCache<DistributedRateLimiter<S>>,
}

impl<S: CounterStore> DistributedRateLimiterFactory<S> {
    /// Create a factory over `store`.
    ///
    /// If called inside a tokio runtime, its handle is kept for blocking calls
    /// made later from threads outside any runtime.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            runtime: Handle::try_current().ok(),
            instances: InstanceCache::new(),
        }
    }

    /// Use `runtime` to drive blocking calls made outside any runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Shared store backing every limiter of this factory.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the limiter for `rules` for use through [`ReactiveRateLimiter`](crate::ReactiveRateLimiter).
    ///
    /// This is the same instance [`get_instance`](RateLimiterFactory::get_instance) returns.
    pub fn get_instance_reactive(
        &self,
        rules: &RuleSet,
    ) -> Result<Arc<DistributedRateLimiter<S>>, RequotaError> {
        let closed = self.instances.closed_flag().clone();

        self.instances.get_or_create(rules, |rules| {
            DistributedRateLimiter::new(
                rules.clone(),
                self.store.clone(),
                self.runtime.clone(),
                closed,
            )
        })
    }

    /// Number of distinct rule sets a limiter has been requested for.
    pub fn cached_instances(&self) -> usize {
        self.instances.len()
    }
}

impl<S: CounterStore> RateLimiterFactory for DistributedRateLimiterFactory<S> {
    type Limiter = DistributedRateLimiter<S>;

    fn get_instance(&self, rules: &RuleSet) -> Result<Arc<Self::Limiter>, RequotaError> {
        self.get_instance_reactive(rules)
    }

    fn close(&self) {
        if self.instances.close() {
            self.store.close();
            tracing::info!("requota.distributed.factory.closed");
        }
    }
}
