//! # CH-03 Content Server
//!
//! The network-facing plugins of the server bus.
//!
//! | Plugin | Role | Channel actions |
//! |--------|------|-----------------|
//! | [`ContentServerPlugin`] | primary | STARTING: bind + report port; STOPPING/EXITED/ERROR: release |
//! | [`ZipContentServerPlugin`] | secondary | same, for the zip-content root |
//!
//! Binding happens on a runtime task, never on the bus dispatch thread. The
//! task reports `listener_bound` or `listener_failed` through the bus
//! command queue; the bus enters SERVING once every listener has bound.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod handler;
pub mod listener;
pub mod plugin;

pub use config::ContentServerConfig;
pub use handler::{ConnectionHandler, StatusPageHandler};
pub use plugin::{ContentServerPlugin, ZipContentServerPlugin};
