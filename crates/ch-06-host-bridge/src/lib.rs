//! # CH-06 Host Bridge
//!
//! | Plugin | Channel | Host call |
//! |--------|---------|-----------|
//! | [`AppBridgePlugin`] | SERVING | set the session cookie, load `base + saved path` |
//! | [`ForegroundPlugin`] | STARTING | keep the process in the foreground (once) |
//! | [`ForegroundPlugin`] | EXITED, ERROR | release the foreground notification |
//!
//! The host side is reached through [`HostAdapter`] and
//! [`ForegroundNotifier`]; both are implemented by the embedding
//! application.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bridge;
pub mod foreground;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bridge::{base_url, service_path, AppBridgePlugin, COOKIE_URL};
pub use foreground::ForegroundPlugin;
pub use ports::{BridgeError, ForegroundNotifier, HostAdapter};
