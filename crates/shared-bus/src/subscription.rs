//! # Subscriptions
//!
//! Handles returned by [`EventBus::subscribe`](crate::EventBus::subscribe).

use std::fmt;

/// Monotonic identifier of a subscription.
///
/// Identifiers are never reused within one bus, so they double as the
/// registration order of a channel's subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    /// Raw numeric value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle used to remove a handler from the bus.
///
/// Dropping the handle does NOT unsubscribe; subscriptions live until
/// [`EventBus::unsubscribe`](crate::EventBus::unsubscribe) is called or the
/// bus itself is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    channel: String,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, channel: String) -> Self {
        Self { id, channel }
    }

    /// Identifier of the subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Channel the handler is attached to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}
