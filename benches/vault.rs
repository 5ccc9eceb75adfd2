//! Vault benchmarks: mutation batch cost as tree size grows, and snapshot
//! load cost under a concurrently mutating writer.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use indigo::testutil::ExprBackend;
use indigo::{CompileOptions, Op, Rule, Vault};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn seeded_vault(width: u32) -> Vault<ExprBackend> {
    let mut root = Rule::new_rule("root", "");
    for i in 0..width {
        root.add_child(Rule::new_rule(format!("c{i}"), "true")).unwrap();
    }
    Vault::new(ExprBackend, Some(root), CompileOptions::default()).unwrap()
}

fn bench_single_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutate_single_add");
    for width in [10u32, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let vault = seeded_vault(width);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                vault
                    .mutate(vec![Op::Add {
                        rule: Rule::new_rule(format!("bench-{i}"), "true"),
                        parent_id: "root".to_string(),
                    }])
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_batched_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutate_batch_of_20");
    for width in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let vault = seeded_vault(width);
            let mut batch_no = 0u64;
            b.iter(|| {
                batch_no += 1;
                let ops = (0..20)
                    .map(|j| Op::Add {
                        rule: Rule::new_rule(format!("batch-{batch_no}-{j}"), "true"),
                        parent_id: "root".to_string(),
                    })
                    .collect();
                vault.mutate(ops).unwrap();
            });
        });
    }
    group.finish();
}

/// Snapshot load latency while a background thread is continuously
/// publishing, demonstrating the wait-free read path stays cheap regardless
/// of writer activity.
fn bench_current_under_contention(c: &mut Criterion) {
    let vault = Arc::new(seeded_vault(1_000));
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let vault = Arc::clone(&vault);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                i += 1;
                let _ = vault.mutate(vec![Op::Add {
                    rule: Rule::new_rule(format!("writer-{i}"), "true"),
                    parent_id: "root".to_string(),
                }]);
            }
        })
    };

    c.bench_function("current_under_contention", |b| {
        b.iter(|| vault.current());
    });

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_single_add, bench_batched_mutation, bench_current_under_contention
}
criterion_main!(benches);
