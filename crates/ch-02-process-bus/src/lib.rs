//! # CH-02 Process Bus
//!
//! The service lifecycle bus. Host callbacks and plugin completions arrive
//! from arbitrary threads; all of them become commands on a single queue
//! consumed by one dispatch thread, so transition logic never interleaves.
//!
//! ```text
//!   host thread ──transition()──┐             ┌──► STARTING handlers
//!   tokio task ──listener_bound─┼─► queue ──► dispatch ──► SERVING handlers
//!   UI thread ───request()──────┘   (FIFO)    thread   └──► ...
//! ```
//!
//! ## Startup
//!
//! Plugins that bind a socket call [`ProcessBus::register_listener`] when
//! they attach. After the STARTING fan-out the bus waits until every
//! registered role has reported [`ProcessBus::listener_bound`], then enters
//! SERVING with the resolved ports. Any bind failure, failing STARTING
//! handler or startup timeout moves the bus to ERROR instead.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod plugin;
pub mod startup;

pub use bus::ProcessBus;
pub use command::CommandSender;
pub use config::BusConfig;
pub use error::BuildError;
pub use lifecycle::lifecycle_table;
pub use plugin::BusPlugin;
