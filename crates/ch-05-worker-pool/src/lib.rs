//! # CH-05 Worker Pool
//!
//! Runs queued background jobs for the worker bus.
//!
//! ## Job lifecycle
//!
//! ```text
//!   submit ──▶ Queued ──claim──▶ Running ──▶ Done
//!                ▲                  │  └───▶ Failed
//!                │   recurring      │
//!                └──────────────────┘
//!
//!   Running at shutdown ──(next STARTING)──▶ Queued
//! ```
//!
//! ## Shutdown
//!
//! STOPPING signals the dispatcher to stop claiming jobs and then waits for
//! it up to [`DrainPolicy::deadline`](shared_types::DrainPolicy::deadline).
//! A bus started with `graceful()` waits for the configured drain deadline;
//! otherwise only a short grace period applies. Jobs still running when the
//! wait ends stay `Running` in the store and are requeued on the next start.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod job;
pub mod plugin;
mod pool;
pub mod runner;
pub mod store;

pub use config::{ScheduledJob, WorkerPoolConfig};
pub use job::{JobRecord, JobState};
pub use plugin::WorkerPoolPlugin;
pub use runner::RunnerRegistry;
pub use store::{InMemoryJobStore, JobStore, JobStoreError, JsonFileJobStore};
