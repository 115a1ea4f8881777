//! # Shared Bus - Publish/Subscribe Core
//!
//! The leaf of the lifecycle stack: named channels, ordered subscriber lists
//! and synchronous dispatch on the calling thread.
//!
//! ## Dispatch Rules
//!
//! - Handlers for one channel fire in registration order.
//! - A handler is invoked at most once per `publish` call.
//! - A failing handler (returned error or panic) is logged and recorded in
//!   the [`PublishReport`]; the remaining handlers still run.
//! - No ordering guarantee exists across different channels.
//!
//! ```text
//!   publish("SERVING", payload)
//!          │
//!          ▼
//!   ┌──────────────────────────────┐
//!   │ "SERVING" → [A] → [B] → [C]  │   snapshot taken, lock released
//!   └──────────────────────────────┘
//!          │        │ (fails)  │
//!          ▼        ▼          ▼
//!        ok    SubscriberFailure   ok
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod report;
pub mod subscription;

pub use bus::{EventBus, Handler};
pub use report::{FailureCause, PublishReport, SubscriberFailure};
pub use subscription::{SubscriptionHandle, SubscriptionId};
