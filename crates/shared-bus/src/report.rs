//! # Publish Reports
//!
//! Outcome of a single fan-out. Failures are isolated per subscriber and
//! surfaced here so callers can escalate them without the bus itself
//! deciding what a failure means.

use thiserror::Error;

use crate::subscription::SubscriptionId;

/// Why a subscriber failed.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// The handler returned an error.
    #[error("{0:#}")]
    Returned(anyhow::Error),

    /// The handler panicked; the payload message is kept when it is a string.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// One isolated subscriber failure.
#[derive(Debug, Error)]
#[error("subscriber {subscription} on channel '{channel}' failed: {cause}")]
pub struct SubscriberFailure {
    /// Failing subscription.
    pub subscription: SubscriptionId,
    /// Channel that was being published.
    pub channel: String,
    /// Failure cause.
    pub cause: FailureCause,
}

impl SubscriberFailure {
    /// Downcast a returned error to a concrete type.
    ///
    /// Returns `None` for panics or errors of another type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match &self.cause {
            FailureCause::Returned(err) => err.downcast_ref::<E>(),
            FailureCause::Panicked(_) => None,
        }
    }

    /// True when the handler panicked rather than returning an error.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self.cause, FailureCause::Panicked(_))
    }
}

/// Result of one `publish` call.
#[derive(Debug)]
pub struct PublishReport {
    /// Channel that was published.
    pub channel: String,
    /// Number of handlers invoked (successful or not).
    pub delivered: usize,
    /// Handlers that failed, in invocation order.
    pub failures: Vec<SubscriberFailure>,
}

impl PublishReport {
    pub(crate) fn empty(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            delivered: 0,
            failures: Vec::new(),
        }
    }

    /// True when every invoked handler succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of handlers that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.delivered - self.failures.len()
    }

    /// Consume the report, keeping only the failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<SubscriberFailure> {
        self.failures
    }
}
