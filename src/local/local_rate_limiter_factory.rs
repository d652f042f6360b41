use std::sync::Arc;

use crate::{
    Clock, LocalRateLimiter, RateLimiterFactory, RequotaError, RuleSet, SystemClock,
    factory::InstanceCache,
};

/// Configuration for local rate limiters.
#[derive(Clone, Debug)]
pub struct LocalRateLimiterOptions {
    /// Time source used for bucket arithmetic.
    pub clock: Arc<dyn Clock>,
    /// Sweep fully expired keys after this many calls on a limiter.
    ///
    /// `0` disables the opportunistic sweep; [`LocalRateLimiter::cleanup`] can
    /// still be called directly.
    pub sweep_every: u64,
}

impl Default for LocalRateLimiterOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            sweep_every: 1024,
        }
    }
}

/// Hands out one [`LocalRateLimiter`] per distinct [`RuleSet`].
///
/// Each limiter owns its own counter table; nothing is shared between
/// limiters of different rule sets.
pub struct LocalRateLimiterFactory {
    options: LocalRateLimiterOptions,
    instances: InstanceCache<LocalRateLimiter>,
}

impl LocalRateLimiterFactory {
    /// Create a factory whose limiters use `options`.
    pub fn new(options: LocalRateLimiterOptions) -> Self {
        Self {
            options,
            instances: InstanceCache::new(),
        }
    }

    /// Number of distinct rule sets a limiter has been requested for.
    pub fn cached_instances(&self) -> usize {
        self.instances.len()
    }
}

impl Default for LocalRateLimiterFactory {
    fn default() -> Self {
        Self::new(LocalRateLimiterOptions::default())
    }
}

impl RateLimiterFactory for LocalRateLimiterFactory {
    type Limiter = LocalRateLimiter;

    fn get_instance(&self, rules: &RuleSet) -> Result<Arc<LocalRateLimiter>, RequotaError> {
        let closed = self.instances.closed_flag().clone();

        self.instances.get_or_create(rules, |rules| {
            LocalRateLimiter::new(rules.clone(), &self.options, closed)
        })
    }

    fn close(&self) {
        if self.instances.close() {
            tracing::info!("requota.local.factory.closed");
        }
    }
}
