//! Benchmarks for the weak handler.
//!
//! Benchmarks cover:
//! - Post followed by a full drain
//! - Post followed by cancellation (identity scan)
//! - Cancellation scans over registries full of released tasks
//! - Message send and drain

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_weak_handler::core::{Task, WeakHandler};
use prometheus_weak_handler::infra::{Looper, MessageQueue};
use prometheus_weak_handler::util::ManualClock;

// ============================================================================
// Helper Functions
// ============================================================================

fn setup(depth: usize) -> (Looper, WeakHandler) {
    let queue = Arc::new(MessageQueue::new(depth, Arc::new(ManualClock::default())));
    let looper = Looper::new(Arc::clone(&queue));
    (looper, WeakHandler::new(queue))
}

fn counting_task(counter: &Arc<AtomicU64>) -> Task {
    let counter = Arc::clone(counter);
    Task::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    })
}

// ============================================================================
// Post / Drain
// ============================================================================

fn bench_post_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_drain");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let counter = Arc::new(AtomicU64::new(0));
            let task = counting_task(&counter);
            b.iter(|| {
                let (looper, handler) = setup(size as usize);
                for _ in 0..size {
                    handler.post(&task);
                }
                black_box(looper.drain());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Post / Cancel
// ============================================================================

fn bench_post_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_cancel");

    for size in [100u64, 1_000, 5_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let counter = Arc::new(AtomicU64::new(0));
            let tasks: Vec<Task> = (0..size).map(|_| counting_task(&counter)).collect();
            b.iter(|| {
                let (_looper, handler) = setup(size as usize);
                for task in &tasks {
                    handler.post_delayed(task, Duration::from_secs(1));
                }
                // Oldest first: each removal scans past every newer node.
                for task in &tasks {
                    handler.remove_callbacks(task);
                }
                black_box(handler.pending_callbacks());
            });
        });
    }
    group.finish();
}

fn bench_cancel_with_stale_nodes(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel_stale_scan");

    for stale in [100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(stale), &stale, |b, &stale| {
            let counter = Arc::new(AtomicU64::new(0));
            let absent = counting_task(&counter);
            b.iter(|| {
                let (_looper, handler) = setup(stale as usize + 1);
                for _ in 0..stale {
                    let released = counting_task(&counter);
                    handler.post_delayed(&released, Duration::from_secs(1));
                }
                handler.remove_callbacks(&absent);
                black_box(handler.pending_callbacks());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Messages
// ============================================================================

fn bench_message_send_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_send_drain");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let (looper, handler) = setup(size as usize);
                for what in 0..size {
                    handler.send_empty_message((what % 16) as i32);
                }
                black_box(looper.drain());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    handler_benches,
    bench_post_drain,
    bench_post_cancel,
    bench_cancel_with_stale_nodes
);

criterion_group!(message_benches, bench_message_send_drain);

criterion_main!(handler_benches, message_benches);
