//! Criterion micro-benchmarks for object and slice allocation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nl_bench::{generate, replay, WorkloadShape};
use nl_runtime::{Region, RuntimeAllocator, RuntimeConfig, SystemHeap, TrackedHeap};

fn system() -> RuntimeAllocator<SystemHeap> {
    RuntimeAllocator::new(SystemHeap, RuntimeConfig::default()).unwrap()
}

fn bench_object_round_trip(c: &mut Criterion) {
    let rt = system();
    c.bench_function("object_alloc_release_64", |b| {
        b.iter(|| {
            let obj = rt.allocate_object(black_box(64)).unwrap();
            // SAFETY: allocated above with the same size, released once.
            unsafe { rt.release_object(black_box(obj), 64).unwrap() };
        });
    });
}

fn bench_slice_round_trip(c: &mut Criterion) {
    let rt = system();
    let mut group = c.benchmark_group("slice_alloc_release");
    for length in [0usize, 16, 1_024, 65_536] {
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            b.iter(|| {
                let slice = rt.allocate_slice(black_box(length), 4).unwrap();
                // SAFETY: allocated above with element size 4, released once.
                unsafe { rt.release_slice(black_box(slice), 4).unwrap() };
            });
        });
    }
    group.finish();
}

fn bench_workload(c: &mut Criterion) {
    let steps = generate(&WorkloadShape::compiler_like(10_000), 42);
    let mut group = c.benchmark_group("workload_10k");

    let plain = system();
    group.bench_function("system", |b| {
        b.iter(|| replay(&plain, black_box(&steps)).unwrap());
    });

    let tracked =
        RuntimeAllocator::new(TrackedHeap::new(SystemHeap), RuntimeConfig::default()).unwrap();
    group.bench_function("tracked", |b| {
        b.iter(|| replay(&tracked, black_box(&steps)).unwrap());
    });

    let region = Region::system();
    let in_region = RuntimeAllocator::new(&region, RuntimeConfig::default()).unwrap();
    group.bench_function("region", |b| {
        b.iter(|| replay(&in_region, black_box(&steps)).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_object_round_trip,
    bench_slice_round_trip,
    bench_workload
);
criterion_main!(benches);
