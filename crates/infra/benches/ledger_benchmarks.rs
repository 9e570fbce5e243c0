use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use canteen_core::ItemId;
use canteen_events::InMemoryEventBus;
use canteen_infra::{Engine, EngineConfig, InMemoryEngine, InMemoryStorage, MovementRequest, NewItem};
use canteen_inventory::MovementType;
use canteen_sequence::EntityType;

fn engine() -> InMemoryEngine {
    let mut config = EngineConfig::default();
    config.notify_low_stock = false;
    match Engine::new(Arc::new(InMemoryStorage::new()), Arc::new(InMemoryEventBus::new()), config) {
        Ok(engine) => engine,
        Err(e) => panic!("engine failed to start: {e}"),
    }
}

fn item(engine: &InMemoryEngine, code: &str) -> ItemId {
    let new = NewItem {
        code: code.to_string(),
        name: code.to_string(),
        unit: "kg".to_string(),
        reorder_level: Decimal::ZERO,
        opening_stock: Decimal::from(1_000_000),
        opening_cost: Decimal::from(12),
    };
    match engine.ledger.create_item(new, None) {
        Ok(item) => item.id_typed(),
        Err(e) => panic!("item creation failed: {e}"),
    }
}

/// One-shot movements: reference issue, item write, movement write.
fn bench_record_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_movement");
    group.throughput(Throughput::Elements(1));

    for kind in [MovementType::In, MovementType::Out] {
        let engine = engine();
        let id = item(&engine, "BENCH");
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
            b.iter(|| {
                let request = MovementRequest::new(id, kind, Decimal::ONE).with_cost(Decimal::from(11));
                black_box(engine.ledger.record_movement(request, None))
            });
        });
    }
    group.finish();
}

/// Folding the audit trail back to the balance, by trail length.
fn bench_verify_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_ledger");

    for movements in [100u64, 1_000] {
        let engine = engine();
        let id = item(&engine, "FOLD");
        for _ in 0..movements {
            let request = MovementRequest::new(id, MovementType::Out, Decimal::ONE);
            let _ = engine.ledger.record_movement(request, None);
        }
        group.throughput(Throughput::Elements(movements));
        group.bench_with_input(BenchmarkId::from_parameter(movements), &movements, |b, _| {
            b.iter(|| black_box(engine.ledger.verify_ledger(id)));
        });
    }
    group.finish();
}

fn bench_sequence_next(c: &mut Criterion) {
    let engine = engine();
    c.bench_function("sequence_next", |b| {
        b.iter(|| black_box(engine.sequences.next(EntityType::Bill)));
    });
}

criterion_group!(benches, bench_record_movement, bench_verify_ledger, bench_sequence_next);
criterion_main!(benches);
