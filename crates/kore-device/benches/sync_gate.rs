//! Benchmark: cost of the sync policy gate on the stream_synchronize hot path.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use kore_device::gate::check_sync;
use kore_device::runtime::SimRuntime;
use kore_device::{set_sync_warning_level, GpuContext, GpuRuntime, Stream, SyncWarningLevel};

fn bench_gate(iters: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        let _ = black_box(check_sync(black_box("bench")));
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_stream_sync(ctx: &GpuContext, iters: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        let _ = ctx.stream_synchronize(black_box(Stream::DEFAULT));
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn main() {
    let ctx = GpuContext::new(Arc::new(SimRuntime::with_devices(1)) as Arc<dyn GpuRuntime>);
    let iters = 10_000_000;

    println!("=== Kore Sync Gate Benchmark ===\n");
    println!("{:<28} {:>12}", "case", "ns/call");

    set_sync_warning_level(SyncWarningLevel::Disabled);
    println!("{:<28} {:>12.2}", "gate (disabled)", bench_gate(iters) * 1e9);

    set_sync_warning_level(SyncWarningLevel::Error);
    println!("{:<28} {:>12.2}", "gate (error)", bench_gate(iters / 10) * 1e9);

    set_sync_warning_level(SyncWarningLevel::Disabled);
    println!(
        "{:<28} {:>12.2}",
        "stream_synchronize (sim)",
        bench_stream_sync(&ctx, iters / 10) * 1e9
    );
}
