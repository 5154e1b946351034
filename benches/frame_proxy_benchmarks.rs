//! Frame forwarding benchmarks for CrabView
//!
//! Run with: cargo bench --bench frame_proxy_benchmarks
//!
//! Measures the per-frame cost the proxy adds on the decode thread and the
//! cost of retargeting while a producer is running.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crabview::testing::synthetic_frame;
use crabview::{FrameSink, FrameSinkProxy, RenderError, VideoFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Surface that does no work, so only proxy overhead is measured
struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&self, frame: &VideoFrame) -> Result<(), RenderError> {
        black_box(frame.sequence);
        Ok(())
    }
}

fn bench_forwarding(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame Forwarding");
    group.measurement_time(Duration::from_secs(5));

    let resolutions = [(320, 240, "240p"), (1280, 720, "720p"), (1920, 1080, "1080p")];

    for (width, height, name) in resolutions {
        let frame = synthetic_frame(1, width, height);
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("bound_target", name), &frame, |b, frame| {
            let proxy = FrameSinkProxy::new();
            let sink: Arc<dyn FrameSink> = Arc::new(NullSink);
            proxy.set_target(Some(&sink));
            b.iter(|| proxy.on_frame(black_box(frame)));
        });

        group.bench_with_input(BenchmarkId::new("no_target", name), &frame, |b, frame| {
            let proxy = FrameSinkProxy::new();
            b.iter(|| proxy.on_frame(black_box(frame)));
        });
    }

    group.finish();
}

fn bench_retarget_under_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("Retarget Under Load");
    group.measurement_time(Duration::from_secs(5));

    let proxy = Arc::new(FrameSinkProxy::new());
    let stop = Arc::new(AtomicBool::new(false));
    let producer = {
        let proxy = Arc::clone(&proxy);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let frame = synthetic_frame(1, 640, 480);
            while !stop.load(Ordering::Relaxed) {
                let _ = proxy.on_frame(&frame);
            }
        })
    };

    let first: Arc<dyn FrameSink> = Arc::new(NullSink);
    let second: Arc<dyn FrameSink> = Arc::new(NullSink);

    group.bench_function("set_target_swap", |b| {
        b.iter(|| {
            proxy.set_target(Some(&first));
            proxy.set_target(Some(&second));
        });
    });

    group.bench_function("detach_if_matches", |b| {
        b.iter(|| {
            proxy.set_target(Some(&second));
            black_box(proxy.detach_if_matches(&second))
        });
    });

    group.finish();
    stop.store(true, Ordering::Relaxed);
    let _ = producer.join();
}

fn bench_synthetic_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("Synthetic Frames");

    for (width, height, name) in [(320, 240, "240p"), (1280, 720, "720p")] {
        group.throughput(Throughput::Bytes(u64::from(width * height * 3 / 2)));
        group.bench_function(BenchmarkId::new("generate", name), |b| {
            let mut sequence = 0u64;
            b.iter(|| {
                sequence += 1;
                synthetic_frame(black_box(sequence), width, height)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_forwarding,
    bench_retarget_under_load,
    bench_synthetic_frame
);
criterion_main!(benches);
