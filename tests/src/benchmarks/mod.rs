//! # Content-Host Benchmarks
//!
//! Workloads shared by `benches/bus_benchmarks.rs`.

pub mod bus;
