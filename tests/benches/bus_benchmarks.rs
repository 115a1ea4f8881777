//! # Content-Host Bus Benchmarks
//!
//! ```bash
//! cargo bench -p ch-tests
//! ```

use ch_tests::benchmarks::bus::{bench_publish_fanout, bench_transition_round_trip};
use criterion::{criterion_group, criterion_main};

criterion_group!(benches, bench_publish_fanout, bench_transition_round_trip);
criterion_main!(benches);
