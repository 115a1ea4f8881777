//! # Content-Host Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Fan-out and dispatch workloads (criterion)
//! │   └── bus.rs
//! │
//! └── integration/      # Cross-crate scenarios
//!     ├── lifecycle.rs  # run/graceful/exit against real plugins
//!     ├── fanout.rs     # subscriber order and failure isolation
//!     ├── properties.rs # transition table properties (proptest)
//!     └── host_flow.rs  # two-bus host activity
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ch-tests
//!
//! # By category
//! cargo test -p ch-tests integration::lifecycle::
//! cargo test -p ch-tests integration::properties::
//!
//! # Benchmarks
//! cargo bench -p ch-tests
//! ```

#![allow(dead_code)]

pub mod benchmarks;
pub mod integration;
