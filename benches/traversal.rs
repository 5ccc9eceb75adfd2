//! Evaluation Engine benchmarks: sequential and parallel traversal cost as
//! tree width grows, and the batch_size/max_parallel tradeoff at a fixed
//! width.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use indigo::testutil::ExprBackend;
use indigo::{CompileOptions, Data, EvalContext, EvalOptions, Engine, ParallelOptions, Rule};

fn wide_tree(width: u32) -> Rule<ExprBackend> {
    let mut root = Rule::new_rule("root", "true");
    for i in 0..width {
        let expr = if i % 3 == 0 { "false" } else { "true" };
        root.add_child(Rule::new_rule(format!("c{i}"), expr)).unwrap();
    }
    let engine = Engine::new(ExprBackend);
    engine.compile(&mut root, CompileOptions::default()).unwrap();
    root
}

fn bench_sequential_traversal(c: &mut Criterion) {
    let engine = Engine::new(ExprBackend);
    let ctx = EvalContext::new();

    let mut group = c.benchmark_group("sequential_traversal");
    for width in [10u32, 100, 1_000] {
        let root = wide_tree(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                let mut data = Data::new();
                engine.eval(&ctx, &root, &mut data, EvalOptions::default()).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_parallel_traversal(c: &mut Criterion) {
    let engine = Engine::new(ExprBackend);
    let ctx = EvalContext::new();

    let mut group = c.benchmark_group("parallel_traversal");
    for width in [100u32, 1_000, 10_000] {
        let root = wide_tree(width);
        let opts = EvalOptions {
            parallel: Some(ParallelOptions::new(32, 8)),
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                let mut data = Data::new();
                engine.eval(&ctx, &root, &mut data, opts.clone()).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_batch_size_tradeoff(c: &mut Criterion) {
    let engine = Engine::new(ExprBackend);
    let ctx = EvalContext::new();
    let root = wide_tree(5_000);

    let mut group = c.benchmark_group("batch_size_tradeoff");
    for batch_size in [8usize, 64, 512] {
        let opts = EvalOptions {
            parallel: Some(ParallelOptions::new(batch_size, 8)),
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, _| {
            b.iter(|| {
                let mut data = Data::new();
                engine.eval(&ctx, &root, &mut data, opts.clone()).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_sequential_traversal, bench_parallel_traversal, bench_batch_size_tradeoff
}
criterion_main!(benches);
