// benches/aggregate_benchmarks.rs
use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, sync::Arc, time::Duration};
use tokio::runtime::Runtime;

use clinic_audit::{
    config::IssueThresholds,
    domain::models::{AuditType, CheckCategory, ViewportProfiles},
    repository::MemoryAuditStore,
    service::AuditAggregator,
    test_utils::{fixtures::page, MockBrowser, PageFixture, StaticFetcher},
    AuditCancel, AuditConfig, AuditRequest, AuditService,
};

fn bench_aggregate(c: &mut Criterion) {
    let aggregator = AuditAggregator::new(IssueThresholds::default());
    let pages: Vec<_> = (0..200)
        .map(|i| {
            let spread = (i % 10) as f64 * 9.0;
            page(
                &format!("https://a.test/page/{i}"),
                &[
                    (CheckCategory::Performance, 40.0 + spread),
                    (CheckCategory::Crawlability, 100.0 - spread),
                    (CheckCategory::Schema, spread),
                    (CheckCategory::Mobile, 60.0 + spread / 3.0),
                ],
            )
        })
        .collect();

    c.bench_function("aggregate_200_pages", |b| {
        b.iter(|| {
            let summary = aggregator.aggregate(black_box(&pages)).expect("Failed");
            black_box(summary)
        });
    });
}

fn bench_run_audit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let browser = Arc::new(MockBrowser::new().with_latency(Duration::ZERO));
    let urls: Vec<String> = (0..20).map(|i| format!("https://a.test/p{i}")).collect();
    for url in &urls {
        browser.serve(url, PageFixture::healthy());
    }
    let service = AuditService::new(
        AuditConfig::default(),
        browser,
        Arc::new(StaticFetcher::healthy_site("https://a.test")),
        Arc::new(MemoryAuditStore::new()),
    )
    .expect("Failed");

    c.bench_function("run_audit_20_pages", |b| {
        b.to_async(&rt).iter(|| async {
            let request = AuditRequest {
                clinic_id: "bench".to_string(),
                urls: urls.clone(),
                audit_type: AuditType::Comprehensive,
                viewport_profiles: ViewportProfiles::both(),
            };
            let record = service
                .run_audit(black_box(request), &AuditCancel::new())
                .await
                .expect("Failed");

            black_box(record)
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(10));
    targets = bench_aggregate, bench_run_audit
}

criterion_main!(benches);
