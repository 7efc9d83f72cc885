//! Performance benchmarks for kanban-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kanban_engine::{position, BoardState, Container, Item, OptimisticStore};
use serde_json::json;

fn create_test_board(columns: usize, cards_per_column: usize) -> BoardState {
    let containers: Vec<Container> = (0..columns)
        .map(|c| Container::new(format!("col_{}", c), format!("Column {}", c), c as f64))
        .collect();
    let items: Vec<Item> = (0..columns)
        .flat_map(|c| {
            (0..cards_per_column).map(move |i| {
                Item::new(
                    format!("card_{}_{}", c, i),
                    format!("col_{}", c),
                    i as f64,
                    json!({"title": format!("Card {}", i)}),
                )
            })
        })
        .collect();
    BoardState::from_parts(containers, items).unwrap()
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");

    for size in [10, 100, 1000].iter() {
        let siblings: Vec<Item> = (0..*size)
            .map(|i| Item::new(format!("card_{}", i), "col", i as f64, json!({})))
            .collect();

        group.bench_with_input(BenchmarkId::new("midpoint", size), size, |b, &size| {
            b.iter(|| position::allocate(black_box(&siblings), black_box(size / 2)))
        });
    }

    group.bench_function("needs_rebalance_1000", |b| {
        let siblings: Vec<Item> = (0..1000)
            .map(|i| Item::new(format!("card_{}", i), "col", i as f64, json!({})))
            .collect();
        b.iter(|| position::needs_rebalance(black_box(&siblings), 1e-6))
    });

    group.finish();
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_operations");

    for cards in [10, 100, 500].iter() {
        let board = create_test_board(5, *cards);
        let store = OptimisticStore::new(board);

        // Move a card back and forth between two columns
        group.bench_with_input(BenchmarkId::new("move_item", cards), cards, |b, _| {
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let target = if flip { "col_1" } else { "col_0" };
                store
                    .move_item(black_box("card_0_0"), black_box(target), -1.0)
                    .unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("siblings", cards), cards, |b, _| {
            let snapshot = store.snapshot();
            b.iter(|| snapshot.siblings(black_box("col_2")).len())
        });
    }

    // Rollback is reinstalling a snapshot
    group.bench_function("rollback", |b| {
        let store = OptimisticStore::new(create_test_board(5, 100));
        let snapshot = store.snapshot();
        b.iter(|| store.install(black_box(snapshot.clone())))
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let board = create_test_board(5, 200);
    let json = board.to_json_pretty().unwrap();

    group.bench_function("board_to_json_1000", |b| {
        b.iter(|| black_box(&board).to_json_pretty().unwrap())
    });

    group.bench_function("board_from_json_1000", |b| {
        b.iter(|| BoardState::from_json(black_box(&json)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_allocation,
    bench_store_operations,
    bench_serialization
);
criterion_main!(benches);
