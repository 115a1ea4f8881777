//! # CH-04 Network Announcer
//!
//! Makes the content server discoverable by other devices on the local
//! network.
//!
//! ```text
//!   SERVING { port, zipPort }
//!          │
//!          ▼
//!   NetworkAnnouncerPlugin ──register──▶ DiscoveryRegistrar
//!          │                                 ├─ InMemoryRegistrar
//!          ▼                                 └─ UdpAnnouncer (multicast hello / goodbye)
//!   publish(ANNOUNCED, record)
//!
//!   STOPPING / EXITED / ERROR ──deregister──▶ DiscoveryRegistrar
//! ```
//!
//! Announcing is best effort: a registrar failure is logged as a subscriber
//! failure and never takes the bus down.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod plugin;
pub mod record;
pub mod registrar;

pub use plugin::NetworkAnnouncerPlugin;
pub use record::{Announcement, DiscoveryRecord, SERVICE_TYPE};
pub use registrar::{
    AnnounceError, DiscoveryRegistrar, InMemoryRegistrar, UdpAnnouncer, DEFAULT_GROUP,
    DEFAULT_INTERVAL,
};
