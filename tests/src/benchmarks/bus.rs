//! # Bus Benchmarks
//!
//! Fan-out cost of the event bus and the round trip of a transition through
//! the dispatch thread.
//!
//! | Workload | Measures |
//! |----------|----------|
//! | `publish_fanout/N` | one publish to N handlers |
//! | `publish_isolated_failure` | fan-out with one failing handler in 16 |
//! | `transition_round_trip` | STARTING/SERVING/STOPPING/IDLE cycle on a bus |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ch_02_process_bus::{BusConfig, ProcessBus};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use shared_bus::EventBus;
use shared_types::LifecycleState;

pub fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("event-bus");

    for handlers in [1usize, 8, 64, 256] {
        let bus = EventBus::<u64>::new();
        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..handlers {
            let hits = Arc::clone(&hits);
            bus.subscribe("SERVING", move |payload| {
                hits.fetch_add(*payload, Ordering::Relaxed);
                Ok(())
            });
        }

        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(
            BenchmarkId::new("publish_fanout", handlers),
            &handlers,
            |b, _| b.iter(|| black_box(bus.publish("SERVING", &1))),
        );
    }

    let bus = EventBus::<u64>::new();
    for i in 0..16u64 {
        bus.subscribe("SERVING", move |_| {
            if i == 7 {
                anyhow::bail!("handler {i} failed");
            }
            Ok(())
        });
    }
    group.bench_function("publish_isolated_failure", |b| {
        b.iter(|| black_box(bus.publish("SERVING", &1).failures.len()))
    });

    group.finish();
}

pub fn bench_transition_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("process-bus");

    let Ok(bus) = ProcessBus::new("bench", BusConfig::default()) else {
        return;
    };
    group.bench_function("transition_round_trip", |b| {
        b.iter(|| {
            for to in [
                LifecycleState::Starting,
                LifecycleState::Stopping,
                LifecycleState::Idle,
            ] {
                black_box(bus.transition(to).ok());
            }
        })
    });

    group.finish();
}
