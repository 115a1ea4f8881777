//! # Host Container
//!
//! Configuration and the owning context object. The context holds every
//! long-lived resource and releases them in a fixed order when dropped.

pub mod config;
pub mod context;

pub use config::{ConfigError, HostConfig, PathsConfig, ServerConfig, WorkerConfig};
pub use context::{ContextError, HostContext};
