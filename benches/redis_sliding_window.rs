use criterion::{Criterion, criterion_group, criterion_main};

#[cfg(feature = "redis-tokio")]
mod enabled {
    use std::{env, time::Duration};

    use criterion::Criterion;
    use std::hint::black_box;

    use requota::{
        ReactiveRateLimiter, RedisKey, RedisRateLimiterFactory, RedisRateLimiterOptions, Rule,
        RuleSet,
    };

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:16379/".to_string())
    }

    pub fn bench_is_over_limit(c: &mut Criterion) {
        let mut group = c.benchmark_group("redis_sliding_window");
        group.sample_size(50);

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .build()
            .unwrap();

        let factory = RedisRateLimiterFactory::from_options(RedisRateLimiterOptions {
            prefix: Some(RedisKey::try_from("bench").unwrap()),
            ..RedisRateLimiterOptions::new(redis::Client::open(redis_url()).unwrap())
        });

        let rules = RuleSet::from(
            Rule::of(Duration::from_secs(60), u64::MAX / 2)
                .unwrap()
                .with_precision(12)
                .unwrap(),
        );
        let limiter = factory.get_instance_reactive(&rules).unwrap();

        // Ensure connection is warm.
        rt.block_on(async {
            limiter.is_over_limit_async("user_1").await.unwrap();
        });

        group.bench_function("is_over_limit_async/hot_key", |b| {
            b.iter(|| {
                let _ = rt.block_on(async {
                    let res = limiter.is_over_limit_async(black_box("user_1")).await;
                    black_box(res)
                });
            });
        });

        group.bench_function("is_over_limit_peek_async/hot_key", |b| {
            b.iter(|| {
                let _ = rt.block_on(async {
                    let res = limiter.is_over_limit_peek_async(black_box("user_1")).await;
                    black_box(res)
                });
            });
        });

        // Give outstanding IO a moment before runtime drop.
        std::thread::sleep(Duration::from_millis(50));
        group.finish();
    }
}

#[cfg(feature = "redis-tokio")]
fn bench_is_over_limit(c: &mut Criterion) {
    enabled::bench_is_over_limit(c)
}

#[cfg(not(feature = "redis-tokio"))]
fn bench_is_over_limit(_: &mut Criterion) {}

criterion_group!(benches, bench_is_over_limit);
criterion_main!(benches);
