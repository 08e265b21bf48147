//! # Tracing Benchmarks
//!
//! Measures both tracing phases on synthetic merger trees: object-ID
//! assignment, carrier propagation and the combined run.
//!
//! Run: `cargo bench --bench tracing_bench`

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use galflow_core::{MemoryStore, MergerTree, MergerTreeBuilder, Tracer, TreeIndex};

const SNAPSHOTS: usize = 20;

/// Every tenth node fades, every tenth merges, some skip two snapshots
fn synthetic_tree(num_snapshots: usize, width: usize) -> MergerTree {
    let mut builder = MergerTreeBuilder::new(num_snapshots);
    let nodes: Vec<Vec<_>> = (0..num_snapshots).map(|s| builder.add_nodes(s, width)).collect();

    for s in 0..num_snapshots {
        for i in 0..width {
            let target = |snapshot: usize, index: usize| {
                (snapshot < num_snapshots && index < width).then(|| nodes[snapshot][index])
            };
            let (desc, main) = match i % 10 {
                0 => (None, true),
                1 => (target(s + 1, i - 1), false),
                2 if s % 2 == 0 => (target(s + 2, i), true),
                2 => (None, true),
                3 if s % 2 == 0 => (target(s + 2, i + 1), false),
                _ => (target(s + 1, i), true),
            };
            match desc {
                Some(desc) if main => {
                    builder.link_main(nodes[s][i], desc);
                }
                Some(desc) => {
                    builder.link_merging(nodes[s][i], desc);
                }
                None => {}
            }
        }
    }
    builder.build().expect("synthetic tree is consistent")
}

/// Benchmark object-ID assignment
fn bench_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign");

    for width in [1_000, 10_000] {
        let tree = synthetic_tree(SNAPSHOTS, width);
        group.throughput(Throughput::Elements(tree.num_entries() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &tree, |b, tree| {
            b.iter(|| {
                let mut store = MemoryStore::new();
                black_box(Tracer::new().assign_all(tree, &mut store).unwrap())
            })
        });
    }

    group.finish();
}

/// Benchmark carrier propagation over a store filled by the assigner
fn bench_propagate(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagate");

    for width in [1_000, 10_000] {
        let tree = synthetic_tree(SNAPSHOTS, width);
        let mut assigned = MemoryStore::new();
        Tracer::new().assign_all(&tree, &mut assigned).unwrap();

        group.throughput(Throughput::Elements(tree.num_entries() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &assigned, |b, assigned| {
            b.iter_batched(
                || assigned.clone(),
                |mut store| black_box(Tracer::new().propagate_all(&mut store).unwrap()),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

/// Benchmark tree layout plus both phases
fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_run");
    group.sample_size(20);

    group.bench_function("build_tree_10k", |b| b.iter(|| black_box(synthetic_tree(SNAPSHOTS, 10_000))));

    let tree = synthetic_tree(SNAPSHOTS, 10_000);
    group.bench_function("run_10k", |b| {
        b.iter(|| {
            let mut store = MemoryStore::new();
            black_box(Tracer::new().run(&tree, &mut store).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_assign, bench_propagate, bench_full_run);
criterion_main!(benches);
