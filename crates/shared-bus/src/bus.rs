//! # Event Bus
//!
//! In-memory, synchronous publish/subscribe over named channels.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::report::{FailureCause, PublishReport, SubscriberFailure};
use crate::subscription::{SubscriptionHandle, SubscriptionId};

/// A subscriber callback.
pub type Handler<P> = Arc<dyn Fn(&P) -> anyhow::Result<()> + Send + Sync>;

struct Subscriber<P> {
    id: SubscriptionId,
    handler: Handler<P>,
}

/// Publish/subscribe bus with per-channel ordered subscriber lists.
///
/// `publish` snapshots the channel's subscriber list and releases the lock
/// before invoking anything, so handlers may subscribe, unsubscribe or
/// publish again without deadlocking. Changes made during a publish take
/// effect from the next publish on.
pub struct EventBus<P> {
    /// Subscribers by channel, kept in registration order.
    channels: RwLock<HashMap<String, Vec<Subscriber<P>>>>,

    /// Next subscription identifier.
    next_id: AtomicU64,

    /// Total publish calls.
    events_published: AtomicU64,
}

impl<P> EventBus<P> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
        }
    }

    /// Register `handler` on `channel`. Never fails.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let channel = channel.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.channels
            .write()
            .entry(channel.clone())
            .or_default()
            .push(Subscriber {
                id,
                handler: Arc::new(handler),
            });

        debug!(channel = %channel, subscription = %id, "Subscriber registered");
        SubscriptionHandle::new(id, channel)
    }

    /// Remove a handler. Returns `false` when it was already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut channels = self.channels.write();
        let Some(subscribers) = channels.get_mut(handle.channel()) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.id != handle.id());
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            channels.remove(handle.channel());
        }
        if removed {
            debug!(channel = %handle.channel(), subscription = %handle.id(), "Subscriber removed");
        }
        removed
    }

    /// Invoke every handler currently subscribed to `channel`, in
    /// registration order, on the calling thread.
    pub fn publish(&self, channel: &str, payload: &P) -> PublishReport {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<(SubscriptionId, Handler<P>)> = {
            let channels = self.channels.read();
            match channels.get(channel) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut report = PublishReport::empty(channel);
        for (id, handler) in snapshot {
            report.delivered += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(payload)));
            let cause = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => FailureCause::Returned(err),
                Err(panic_payload) => FailureCause::Panicked(panic_message(&*panic_payload)),
            };

            warn!(
                channel = channel,
                subscription = %id,
                error = %cause,
                "Subscriber failed; continuing fan-out"
            );
            report.failures.push(SubscriberFailure {
                subscription: id,
                channel: channel.to_string(),
                cause,
            });
        }

        debug!(
            channel = channel,
            delivered = report.delivered,
            failed = report.failures.len(),
            "Event published"
        );
        report
    }

    /// Number of handlers on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, Vec::len)
    }

    /// Number of handlers across all channels.
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.channels.read().values().map(Vec::len).sum()
    }

    /// Channels that currently have at least one subscriber.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Total publish calls made on this bus.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
