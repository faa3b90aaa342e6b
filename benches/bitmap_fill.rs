//! Bitmap fill and shared-buffer conversion benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use parallax_bitmap::{Bitmap, BitmapFormat, Color, Size};
use std::sync::Arc;

const SIZES: [(u32, u32); 3] = [(320, 240), (1280, 720), (1921, 1080)];

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_fill");

    for (width, height) in SIZES {
        let size = Size::new(width, height);
        let mut bitmap = Bitmap::create(BitmapFormat::Rgba32, size);

        group.throughput(Throughput::Bytes(size.area() as u64 * 4));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| bitmap.fill(std::hint::black_box(Color::from_rgb(1, 2, 3))));
        });
    }

    group.finish();
}

fn bench_to_shareable(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_to_shareable");

    for (width, height) in SIZES {
        let size = Size::new(width, height);
        let bitmap = Arc::new(Bitmap::create(BitmapFormat::Rgb32, size));

        group.throughput(Throughput::Bytes(bitmap.size_in_bytes() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bitmap, |b, bitmap| {
            b.iter(|| bitmap.to_shareable_bitmap().expect("shared buffer"));
        });
    }

    group.finish();
}

fn bench_purge_cycle(c: &mut Criterion) {
    let mut bitmap = Bitmap::create_purgeable(BitmapFormat::Rgba32, Size::new(1280, 720));
    bitmap.fill(Color::WHITE);

    c.bench_function("bitmap_volatile_cycle_720p", |b| {
        b.iter(|| {
            bitmap.set_volatile();
            std::hint::black_box(bitmap.set_nonvolatile())
        });
    });
}

criterion_group!(benches, bench_fill, bench_to_shareable, bench_purge_cycle);
criterion_main!(benches);
