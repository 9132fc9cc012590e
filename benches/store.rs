//! Benchmarks for store operations.
//!
//! Covers the hot paths:
//! - `put` of a small object
//! - `get` of a live key
//! - `all` over a pattern-filtered table
//! - `gc` over a table with expired rows

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use metakv::{Database, KeyValueStore, ListFilter, Page, Store, StoreOptions, Value};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;
use tempfile::TempDir;

fn on_disk_store(dir: &TempDir) -> Store {
    let db = Database::open(dir.path().join("bench.db")).expect("open database");
    Store::open(&db, StoreOptions::default()).expect("open store")
}

fn populate(store: &Store, n: usize) {
    store
        .transaction(|tx| {
            for i in 0..n {
                store.put(
                    &format!("key-{i:06}"),
                    Value::from(json!({"i": i, "name": "bench"})),
                    Some(tx),
                )?;
            }
            Ok(())
        })
        .expect("populate");
}

fn bench_put(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let store = on_disk_store(&dir);
    let mut i = 0u64;
    c.bench_function("store_put", |b| {
        b.iter(|| {
            i += 1;
            store
                .put(
                    &format!("k{}", i % 1000),
                    black_box(Value::from(json!({"n": i}))),
                    None,
                )
                .unwrap();
        });
    });
}

fn bench_get(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let store = on_disk_store(&dir);
    populate(&store, 1_000);
    c.bench_function("store_get", |b| {
        b.iter(|| store.get(black_box("key-000500"), None).unwrap());
    });
}

fn bench_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_all");
    for size in [100usize, 1_000, 10_000] {
        let dir = TempDir::new().expect("tempdir");
        let store = on_disk_store(&dir);
        populate(&store, size);
        let filter = ListFilter::new().with_pattern("key-00*");
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| store.all(&filter, Page::all(), None).unwrap());
        });
    }
    group.finish();
}

fn bench_gc(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let store = on_disk_store(&dir);
    c.bench_function("store_gc_1000_expired", |b| {
        b.iter_batched(
            || {
                populate(&store, 1_000);
                store
                    .transaction(|tx| {
                        for i in 0..1_000 {
                            store.expire(
                                &format!("key-{i:06}"),
                                Duration::from_millis(1),
                                Some(tx),
                            )?;
                        }
                        Ok(())
                    })
                    .unwrap();
                std::thread::sleep(Duration::from_millis(2));
            },
            |()| store.gc(None).unwrap(),
            criterion::BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, bench_put, bench_get, bench_all, bench_gc);
criterion_main!(benches);
