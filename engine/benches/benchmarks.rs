//! Performance benchmarks for stocksync-engine

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stocksync_engine::{
    detect_conflict, merge_quantity, Actor, ConflictSet, InventoryRecord, Ledger, PendingChange,
    Resolution, ServerTimestamp, Store,
};

fn ledger_with(changes: usize, records: usize) -> Ledger {
    let actor = Actor::new("u-1", "Bench");
    let at = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
    let mut ledger = Ledger::new();
    for i in 0..changes {
        let delta = if i % 2 == 0 { 3 } else { -2 };
        ledger
            .record(PendingChange::quantity_delta(
                format!("c-{i}"),
                format!("item-{}", i % records),
                delta,
                None,
                &actor,
                at,
            ))
            .unwrap();
    }
    ledger
}

fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");

    for size in [100usize, 1000, 5000] {
        let ledger = ledger_with(size, 50);

        group.bench_with_input(BenchmarkId::new("list_unsynced_one", size), &size, |b, _| {
            b.iter(|| ledger.list_unsynced(black_box(Some("item-7"))).len())
        });

        group.bench_with_input(BenchmarkId::new("purge_half", size), &size, |b, _| {
            b.iter_batched(
                || {
                    let mut ledger = ledger.clone();
                    for i in (0..size).step_by(2) {
                        ledger.mark_synced(&format!("c-{i}"));
                    }
                    ledger
                },
                |mut ledger| ledger.purge_synced(),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_quantity");

    for size in [10usize, 100, 1000] {
        let ledger = ledger_with(size, 1);
        let unsynced = ledger.list_unsynced(None);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| merge_quantity(black_box(500), unsynced.iter().copied()))
        });
    }

    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let last_sync = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
    let local = InventoryRecord::new("item-1", "Widget", "Parts", 85, 5, "A1");
    let server = InventoryRecord::new("item-1", "Widget", "Parts", 100, 5, "B2")
        .with_last_updated(ServerTimestamp::from_datetime(last_sync + Duration::minutes(1)));

    c.bench_function("detect_conflict", |b| {
        b.iter(|| detect_conflict(black_box(&local), black_box(&server), last_sync, last_sync))
    });
}

fn bench_resolution(c: &mut Criterion) {
    let last_sync = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
    let records: Vec<InventoryRecord> = (0..50)
        .map(|i| {
            InventoryRecord::new(format!("item-{i}"), "Widget", "Parts", 100, 5, "A1")
                .with_last_updated(ServerTimestamp::epoch(last_sync))
        })
        .collect();
    let store = Store::from_parts(records, ledger_with(1000, 50), ConflictSet::new(), last_sync);

    c.bench_function("observe_and_merge", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| {
                let server = InventoryRecord::new("item-7", "Widget", "Parts", 90, 5, "A1")
                    .with_last_updated(ServerTimestamp::epoch(last_sync + Duration::minutes(1)));
                store.observe(server, last_sync);
                let claim = store.begin_resolution("item-7")?;
                Some(claim.plan(Resolution::Merge))
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_ledger,
    bench_merge,
    bench_detect,
    bench_resolution
);
criterion_main!(benches);
