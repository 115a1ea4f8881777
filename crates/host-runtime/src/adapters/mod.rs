//! # Host Adapters
//!
//! Implementations of the host-side ports for a desktop or headless run.
//! A mobile embedding supplies its own [`HostAdapter`](ch_06_host_bridge::HostAdapter)
//! and [`ForegroundNotifier`](ch_06_host_bridge::ForegroundNotifier).

pub mod host;
pub mod jobs;
pub mod lock;
pub mod store;

pub use host::LoggingHostAdapter;
pub use jobs::default_runners;
pub use lock::{HomeLock, LockError};
pub use store::JsonFileStore;
