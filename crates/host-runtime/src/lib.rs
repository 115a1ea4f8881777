//! # Host Runtime Library
//!
//! Everything one content host process owns, behind a single
//! [`HostContext`]. The `content-host` binary and the integration tests
//! build on it.
//!
//! ## Two buses
//!
//! ```text
//!   server bus: content-server, zip-content-server, [network-announcer],
//!               app-bridge, foreground
//!   worker bus: worker-pool, foreground
//! ```
//!
//! The server bus follows the host activity (IDLE while the activity is
//! stopped). The worker bus keeps running jobs in the background and only
//! exits, gracefully, when the activity is destroyed.

pub mod activity;
pub mod adapters;
pub mod container;
pub mod plugins;

pub use activity::{HostActivity, StartupHandle, StartupOutcome};
pub use container::{ConfigError, ContextError, HostConfig, HostContext};
pub use plugins::ServicePlugin;
