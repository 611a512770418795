//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use npcflow::core::{EntityId, Stage};
use npcflow::pipeline::should_run;
use npcflow::testing::TestHarness;

fn cached_run_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let harness = TestHarness::new();
    let id = harness.seed_page(1274, "Hans", &["https://img/Hans.png"]);
    let warm = rt.block_on(harness.orchestrator.run_pipeline(id, None)).unwrap();
    assert!(warm.is_complete());

    c.bench_function("cached_run", |b| {
        b.iter(|| {
            let run = rt
                .block_on(harness.orchestrator.run_pipeline(black_box(id), None))
                .unwrap();
            black_box(run)
        });
    });

    c.bench_function("cache_gate", |b| {
        b.iter(|| {
            for stage in Stage::EXTRACTION_ORDER {
                black_box(should_run(&warm.record, stage, black_box(None)));
            }
        });
    });
}

fn fresh_batch_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let ids: Vec<u64> = (1..=16).collect();

    c.bench_function("fresh_batch_16", |b| {
        b.iter(|| {
            let harness = TestHarness::new();
            let entity_ids: Vec<EntityId> = ids
                .iter()
                .map(|id| harness.seed_page(*id, &format!("NPC_{id}"), &[]))
                .collect();
            let report = rt.block_on(harness.orchestrator.run_batch(&entity_ids, None));
            black_box(report.summary())
        });
    });
}

criterion_group!(benches, cached_run_benchmark, fresh_batch_benchmark);
criterion_main!(benches);
