use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensorcast::{
    depth::{flip_vertical, DepthRange},
    readback::{rgba_to_rgb_blocked, rgba_to_rgb_scalar},
};

const RESOLUTIONS: [(usize, usize); 3] = [(320, 240), (640, 480), (1280, 720)];

fn benchmark_linearize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Linearize");
    let range = DepthRange::default();

    for &(width, height) in RESOLUTIONS.iter() {
        let pixels = width * height;
        let raw: Vec<f32> = (0..pixels).map(|i| i as f32 / pixels as f32).collect();
        group.throughput(Throughput::Elements(pixels as u64));

        group.bench_with_input(
            BenchmarkId::new("in_place", format!("{}x{}", width, height)),
            &raw,
            |b, raw| {
                let mut samples = raw.clone();
                b.iter(|| {
                    samples.copy_from_slice(raw);
                    range.linearize_in_place(&mut samples);
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("flip_and_linearize", format!("{}x{}", width, height)),
            &raw,
            |b, raw| {
                let mut samples = raw.clone();
                b.iter(|| {
                    samples.copy_from_slice(raw);
                    flip_vertical(&mut samples, width, height);
                    range.linearize_in_place(&mut samples);
                });
            },
        );
    }

    group.finish();
}

fn benchmark_rgba_to_rgb(c: &mut Criterion) {
    let mut group = c.benchmark_group("RgbaToRgb");

    for &(width, height) in RESOLUTIONS.iter() {
        let pixels = width * height;
        let rgba: Vec<u8> = (0..pixels * 4).map(|i| i as u8).collect();
        let mut rgb = vec![0u8; pixels * 3];
        group.throughput(Throughput::Bytes((pixels * 4) as u64));

        let label = format!("{}x{}", width, height);
        group.bench_function(BenchmarkId::new("scalar", &label), |b| {
            b.iter(|| rgba_to_rgb_scalar(&rgba, &mut rgb));
        });
        group.bench_function(BenchmarkId::new("blocked", &label), |b| {
            b.iter(|| rgba_to_rgb_blocked(&rgba, &mut rgb));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_linearize, benchmark_rgba_to_rgb);
criterion_main!(benches);
