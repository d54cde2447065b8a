//! Criterion benchmarks for the nivela FFT engine
//!
//! Run with: cargo bench -p nivela-fft

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nivela_fft::{Complex64, Fft};

/// Deterministic noise buffer.
fn generate_noise(size: usize) -> Vec<Complex64> {
    let mut state = 0x12345678u32;
    (0..size)
        .map(|_| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as i32 as f64) / (i32::MAX as f64)
            };
            Complex64::new(next(), next())
        })
        .collect()
}

fn bench_forward_pow2(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_pow2");
    let fft = Fft::new();

    for size in [256usize, 1024, 4096, 16384] {
        let input = generate_noise(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut buf = input.clone();
                fft.forward_pow2(black_box(&mut buf));
                buf
            });
        });
    }
    group.finish();
}

fn bench_forward_generic(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_generic");
    let fft = Fft::new();

    // Composite, power-of-two and prime lengths of comparable size.
    for size in [1000usize, 1024, 1009, 4096, 3960] {
        let input = generate_noise(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut buf = input.clone();
                fft.forward(black_box(&mut buf)).unwrap();
                buf
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_forward_pow2, bench_forward_generic);
criterion_main!(benches);
