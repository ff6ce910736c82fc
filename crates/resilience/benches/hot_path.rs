//! Benchmarks for the per-request hot path
//!
//! Measures:
//! - Payment quota check and record against the in-memory store
//! - Breaker admission and recording around a no-op call
//! - Gateway failover when the primary is open

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rally_resilience::core::names;
use rally_resilience::{ResilienceError, ResilienceRegistry};
use std::hint::black_box;
use std::sync::Arc;

fn registry() -> Arc<ResilienceRegistry> {
    Arc::new(ResilienceRegistry::builder().build().unwrap())
}

fn rate_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");

    for &actors in &[1_u64, 100, 10_000] {
        group.bench_with_input(BenchmarkId::new("check_and_record", actors), &actors, |b, &actors| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let registry = registry();
            let mut n = 0_u64;

            b.to_async(&rt).iter(|| {
                n += 1;
                let actor = format!("member-{}", n % actors);
                let limiter = Arc::clone(registry.limiter());
                async move { black_box(limiter.check_and_record(&actor, 1_000, "card").await) }
            });
        });
    }

    group.finish();
}

fn circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("protected_call_closed", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let breaker = registry().breaker(names::STRIPE).unwrap();

        b.to_async(&rt).iter(|| {
            let breaker = Arc::clone(&breaker);
            async move {
                let result = breaker
                    .protected_call(|| async { Ok::<_, ResilienceError>(black_box(42)) })
                    .await;
                black_box(result)
            }
        });
    });

    group.bench_function("can_execute_open", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let breaker = registry().breaker(names::STRIPE).unwrap();
        rt.block_on(async {
            for _ in 0..breaker.config().failure_threshold {
                breaker.record_failure().await;
            }
        });

        b.to_async(&rt).iter(|| {
            let breaker = Arc::clone(&breaker);
            async move { black_box(breaker.can_execute().await) }
        });
    });

    group.finish();
}

fn failover(c: &mut Criterion) {
    let mut group = c.benchmark_group("failover");

    group.bench_function("skip_open_primary", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let registry = registry();
        rt.block_on(async {
            let stripe = registry.breaker(names::STRIPE).unwrap();
            for _ in 0..stripe.config().failure_threshold {
                stripe.record_failure().await;
            }
        });

        b.to_async(&rt).iter(|| {
            let registry = Arc::clone(&registry);
            async move {
                let failover = registry.failover("card").unwrap();
                let outcome = failover
                    .run(|gateway| async move { Ok::<_, ResilienceError>(black_box(gateway)) })
                    .await;
                black_box(outcome)
            }
        });
    });

    group.finish();
}

criterion_group!(benches, rate_limiter, circuit_breaker, failover);
criterion_main!(benches);
