use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use storefront_admin_core::app::config::RiskRules;
use storefront_admin_core::models::payment::{PaymentAttempt, PaymentStatus};
use storefront_admin_core::services::risk_evaluator::{evaluate, FailureWindow};

fn bench_evaluate(c: &mut Criterion) {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let rules = RiskRules::default();
    let attempt = PaymentAttempt::new("u1", 1500.0, "USD", PaymentStatus::Failure, "127.0.0.1", "bench").at(now);

    let mut window = FailureWindow::default();
    for i in 0..500 {
        window.record(now - Duration::seconds(i));
    }

    c.bench_function("evaluate_500_failures", |b| {
        b.iter(|| evaluate(black_box(&rules), black_box(&attempt), Some(&window), now))
    });

    c.bench_function("record_and_prune", |b| {
        b.iter(|| {
            let mut window = window.clone();
            window.record(now);
            window.prune(now + Duration::minutes(10), Duration::minutes(15));
            black_box(window.len())
        })
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
