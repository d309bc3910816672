//! Benchmarks for buffer and analysis hot paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sampleflow_rs::analysis::modules::{gauss_kernel, mean_std, moving_average, smooth};
use sampleflow_rs::analysis::{BinaryOp, FftAnalyzer, Formula, ValueSource};
use sampleflow_rs::buffer::{SampleBuffer, StoragePolicy};

fn signal(size: usize) -> Vec<f64> {
    (0..size).map(|i| (i as f64 * 0.01).sin()).collect()
}

fn bench_buffer_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_append");

    for size in [1000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("single", size), size, |b, &size| {
            let buffer = SampleBuffer::new("bench", StoragePolicy::FixedMemory(size));
            let mut i = 0u64;
            b.iter(|| {
                buffer.append(black_box(i as f64));
                i = i.wrapping_add(1);
            });
        });
    }

    // Bulk append at capacity evicts as many values as it adds
    for chunk in [16, 256, 4096].iter() {
        let values = signal(*chunk);
        group.throughput(Throughput::Elements(*chunk as u64));
        group.bench_with_input(BenchmarkId::new("slice", chunk), &values, |b, values| {
            let buffer = SampleBuffer::new("bench", StoragePolicy::FixedMemory(10_000));
            buffer.append_from_slice(&signal(10_000));
            b.iter(|| buffer.append_from_slice(black_box(values)));
        });
    }

    group.finish();
}

fn bench_buffer_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_snapshot");

    for size in [1000, 10_000, 50_000].iter() {
        let buffer = SampleBuffer::new("bench", StoragePolicy::Unbounded);
        buffer.append_from_slice(&signal(*size));

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("to_vec", size), &buffer, |b, buffer| {
            b.iter(|| black_box(buffer.to_vec()));
        });
    }

    group.finish();
}

fn bench_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("arithmetic");

    for size in [1000, 10_000, 100_000].iter() {
        let a = ValueSource::Vector(signal(*size));
        let b = ValueSource::Vector(signal(*size));
        let k = ValueSource::Scalar(2.5);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("vector_vector", size), &a, |bench, a| {
            bench.iter(|| black_box(a.apply(BinaryOp::Mul, &b)));
        });
        group.bench_with_input(BenchmarkId::new("vector_scalar", size), &a, |bench, a| {
            bench.iter(|| black_box(a.apply(BinaryOp::Mul, &k)));
        });
    }

    group.finish();
}

fn bench_formula(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula");

    group.bench_function("parse", |b| {
        b.iter(|| black_box(Formula::parse(black_box("sqrt([1]^2+[2]^2)*[3_]-max([1],0)"))))
    });

    let formula = Formula::parse("sqrt([1]^2+[2]^2)*[3_]").unwrap_or_else(|e| panic!("{}", e));
    for size in [1000, 10_000, 50_000].iter() {
        let inputs = vec![signal(*size), signal(*size), vec![1.0, 2.0]];
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("evaluate", size), &inputs, |b, inputs| {
            b.iter(|| black_box(formula.evaluate(inputs)));
        });
    }

    group.finish();
}

fn bench_fft(c: &mut Criterion) {
    let mut group = c.benchmark_group("fft");

    for size in [1000, 4096, 48_000].iter() {
        let values = signal(*size);
        let mut analyzer = FftAnalyzer::new();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("forward", size), &values, |b, values| {
            b.iter(|| black_box(analyzer.forward(values, None)));
        });
        group.bench_with_input(BenchmarkId::new("autocorrelate", size), &values, |b, values| {
            b.iter(|| black_box(analyzer.autocorrelate(values)));
        });
    }

    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");

    for size in [1000, 10_000, 50_000].iter() {
        let values = signal(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("mean_std", size), &values, |b, values| {
            b.iter(|| black_box(mean_std(values)));
        });
        group.bench_with_input(BenchmarkId::new("moving_average", size), &values, |b, values| {
            b.iter(|| black_box(moving_average(values, 32, false)));
        });

        let kernel = gauss_kernel(3.0);
        group.bench_with_input(BenchmarkId::new("gauss_smooth", size), &values, |b, values| {
            b.iter(|| black_box(smooth(values, &kernel)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_buffer_append,
    bench_buffer_snapshot,
    bench_arithmetic,
    bench_formula,
    bench_fft,
    bench_statistics,
);

criterion_main!(benches);
