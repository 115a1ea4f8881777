//! # Shared Types
//!
//! Vocabulary shared by the lifecycle bus, the service plugins and the host
//! runtime. Nothing here owns a thread or a socket; these are plain values
//! plus the host key-value store port.
//!
//! ## Lifecycle
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │
//!   IDLE ──► STARTING ──► SERVING ──► STOPPING ─────────┘
//!     │         │  │          │  │        │  │
//!     │         │  └──────────┼──┴────────┼──┴──► EXITED   (terminal)
//!     └─────────┴─────────────┴───────────┴─────► ERROR    (terminal)
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod errors;
pub mod events;
pub mod ports;

pub use entities::{
    AppKey, DrainPolicy, LifecycleState, ParseStateError, ServiceDescriptor,
    ServiceRole, ServingPayload,
};
pub use errors::{BusError, BusFailure, FailureKind, PluginError};
pub use events::{channels, BusEvent};
pub use ports::{keys, HostStore, InMemoryHostStore, StoreError};
