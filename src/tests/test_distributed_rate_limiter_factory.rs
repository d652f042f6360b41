use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    CounterStore, DistributedRateLimiterFactory, ManualClock, MemoryCounterStore, RateLimiter,
    RateLimiterFactory, ReactiveRateLimiter, RequotaError, Rule, RuleSet, WindowIncrement,
};

fn rules(limit: u64) -> RuleSet {
    RuleSet::from(Rule::of(Duration::from_secs(60), limit).unwrap())
}

/// Memory store that records whether the factory released it.
struct TrackedStore {
    inner: MemoryCounterStore,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl CounterStore for TrackedStore {
    async fn increment_and_sum(
        &self,
        increment: WindowIncrement<'_>,
    ) -> Result<u64, RequotaError> {
        self.inner.increment_and_sum(increment).await
    }

    async fn sum(&self, key: &str, rule: &Rule) -> Result<u64, RequotaError> {
        self.inner.sum(key, rule).await
    }

    async fn reset(&self, key: &str, rule: &Rule) -> Result<bool, RequotaError> {
        self.inner.reset(key, rule).await
    }

    fn suspends_on_io(&self) -> bool {
        false
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[test]
fn equal_rule_sets_share_one_instance() {
    let factory = DistributedRateLimiterFactory::new(MemoryCounterStore::new());

    let limiter1 = factory.get_instance(&rules(10)).unwrap();
    let limiter2 = factory.get_instance(&rules(10)).unwrap();
    let limiter3 = factory.get_instance(&rules(11)).unwrap();

    assert!(Arc::ptr_eq(&limiter1, &limiter2));
    assert!(!Arc::ptr_eq(&limiter1, &limiter3));
    assert_eq!(factory.cached_instances(), 2);
}

#[test]
fn reactive_and_blocking_lookups_return_the_same_instance() {
    let factory = DistributedRateLimiterFactory::new(MemoryCounterStore::new());

    let blocking = factory.get_instance(&rules(10)).unwrap();
    let reactive = factory.get_instance_reactive(&rules(10)).unwrap();

    assert!(Arc::ptr_eq(&blocking, &reactive));
}

#[test]
fn every_limiter_shares_the_factory_store() {
    let clock = ManualClock::new(1_700_000_000);
    let factory =
        DistributedRateLimiterFactory::new(MemoryCounterStore::with_clock(Arc::new(clock)));

    let per_minute = factory.get_instance(&rules(10)).unwrap();
    let hourly = factory
        .get_instance(&RuleSet::from(
            Rule::of(Duration::from_secs(3600), 10).unwrap(),
        ))
        .unwrap();

    per_minute.is_over_limit("k").unwrap();
    hourly.is_over_limit("k").unwrap();

    // One bucket per (key, rule) window, both in the same store.
    assert_eq!(factory.store().stored_buckets(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_build_exactly_one_instance() {
    let factory = Arc::new(DistributedRateLimiterFactory::new(MemoryCounterStore::new()));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let factory = factory.clone();
            tokio::spawn(async move { factory.get_instance_reactive(&rules(7)).unwrap() })
        })
        .collect();

    let mut limiters = Vec::new();
    for task in tasks {
        limiters.push(task.await.unwrap());
    }

    assert!(limiters.iter().all(|l| Arc::ptr_eq(l, &limiters[0])));
    assert_eq!(factory.cached_instances(), 1);
}

/// Memory store that claims to wait on network I/O, like a remote store would.
struct IoStore(MemoryCounterStore);

#[async_trait]
impl CounterStore for IoStore {
    async fn increment_and_sum(
        &self,
        increment: WindowIncrement<'_>,
    ) -> Result<u64, RequotaError> {
        self.0.increment_and_sum(increment).await
    }

    async fn sum(&self, key: &str, rule: &Rule) -> Result<u64, RequotaError> {
        self.0.sum(key, rule).await
    }

    async fn reset(&self, key: &str, rule: &Rule) -> Result<bool, RequotaError> {
        self.0.reset(key, rule).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn factory_captures_the_runtime_it_was_built_in() {
    let factory = DistributedRateLimiterFactory::new(IoStore(MemoryCounterStore::new()));
    let limiter = factory.get_instance(&rules(1)).unwrap();

    // Blocking call from a plain thread, outside any runtime.
    let over = std::thread::spawn(move || {
        limiter.is_over_limit("k").unwrap();
        limiter.is_over_limit("k").unwrap()
    })
    .join()
    .unwrap();

    assert!(over);
}

#[test]
fn factory_built_outside_a_runtime_refuses_blocking_io() {
    let factory = DistributedRateLimiterFactory::new(IoStore(MemoryCounterStore::new()));
    let limiter = factory.get_instance(&rules(1)).unwrap();

    assert_eq!(
        limiter.is_over_limit("k").unwrap_err(),
        RequotaError::BlockingUnsupported
    );
}

#[test]
fn with_runtime_drives_blocking_calls() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let factory = DistributedRateLimiterFactory::new(IoStore(MemoryCounterStore::new()))
        .with_runtime(runtime.handle().clone());
    let limiter = factory.get_instance(&rules(1)).unwrap();

    assert!(!limiter.is_over_limit("k").unwrap());
    assert!(limiter.is_over_limit("k").unwrap());
}

#[tokio::test]
async fn close_releases_the_store_and_fails_every_limiter() {
    let closed = Arc::new(AtomicBool::new(false));
    let factory = DistributedRateLimiterFactory::new(TrackedStore {
        inner: MemoryCounterStore::new(),
        closed: closed.clone(),
    });

    let limiter = factory.get_instance_reactive(&rules(10)).unwrap();
    assert!(!limiter.is_over_limit_async("k").await.unwrap());

    factory.close();

    assert!(closed.load(Ordering::SeqCst));
    assert!(matches!(
        factory.get_instance(&rules(10)),
        Err(RequotaError::ClosedFactory)
    ));
    assert_eq!(
        limiter.is_over_limit_async("k").await.unwrap_err(),
        RequotaError::ClosedFactory
    );
    assert_eq!(
        limiter.reset_limit_async("k").await.unwrap_err(),
        RequotaError::ClosedFactory
    );
}

#[test]
fn close_releases_the_store_only_once() {
    struct CountingStore(Arc<std::sync::atomic::AtomicU64>);

    #[async_trait]
    impl CounterStore for CountingStore {
        async fn increment_and_sum(
            &self,
            _increment: WindowIncrement<'_>,
        ) -> Result<u64, RequotaError> {
            Ok(1)
        }

        async fn sum(&self, _key: &str, _rule: &Rule) -> Result<u64, RequotaError> {
            Ok(0)
        }

        async fn reset(&self, _key: &str, _rule: &Rule) -> Result<bool, RequotaError> {
            Ok(false)
        }

        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let closes = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let factory = DistributedRateLimiterFactory::new(CountingStore(closes.clone()));

    factory.close();
    factory.close();

    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
