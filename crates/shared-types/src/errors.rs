//! # Error Types
//!
//! The bus error taxonomy. Illegal transitions are recovered locally by the
//! caller; bind and subscriber failures during STARTING are promoted to the
//! ERROR state; drain timeouts are only logged.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{LifecycleState, ServiceRole};

/// Category of a failure recorded by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A listener could not acquire its port.
    BindFailure,
    /// A handler returned an error or panicked during publish.
    SubscriberFailure,
    /// Readiness was not reached before the startup timeout.
    StartupTimeout,
    /// A plugin reported an unrecoverable condition of its own.
    Plugin,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::BindFailure => "bind failure",
            FailureKind::SubscriberFailure => "subscriber failure",
            FailureKind::StartupTimeout => "startup timeout",
            FailureKind::Plugin => "plugin failure",
        };
        f.write_str(label)
    }
}

/// A structured failure report. Carried by the ERROR event and by
/// [`BusError::StartupFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind} in {origin}: {message}")]
pub struct BusFailure {
    pub kind: FailureKind,
    /// Who reported it: a plugin name, a role or a channel.
    pub origin: String,
    pub message: String,
}

impl BusFailure {
    pub fn new(kind: FailureKind, origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin: origin.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bind(role: ServiceRole, addr: SocketAddr, reason: impl fmt::Display) -> Self {
        Self::new(
            FailureKind::BindFailure,
            role.as_str(),
            format!("cannot bind {addr}: {reason}"),
        )
    }

    #[must_use]
    pub fn startup_timeout(timeout: Duration) -> Self {
        Self::new(
            FailureKind::StartupTimeout,
            "bus",
            format!("not serving after {timeout:?}"),
        )
    }
}

/// Errors returned by the bus API.
#[derive(Debug, Error)]
pub enum BusError {
    /// The pair (current, requested) is not in the transition table.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// At least one plugin failed while starting; the bus is in ERROR.
    #[error("startup failed: {}", summarize(.0))]
    StartupFailed(Vec<BusFailure>),

    /// Readiness was not reached in time; the bus is in ERROR.
    #[error("startup timed out after {0:?}")]
    StartupTimeout(Duration),

    /// The bus left the startup path before serving.
    #[error("startup interrupted: bus moved to {0}")]
    Interrupted(LifecycleState),

    /// Plugins can only attach before the bus is first started.
    #[error("registration is closed once the bus has started")]
    RegistrationClosed,

    /// The session key is immutable once installed.
    #[error("session key already set")]
    SessionKeyAlreadySet,

    /// The dispatch thread has stopped.
    #[error("bus dispatcher is gone")]
    DispatcherGone,

    /// `run`/`graceful` was called from a handler on the dispatch thread.
    #[error("blocking bus call from the dispatch thread")]
    BlockingOnDispatcher,

    /// A blocking bus call was made from inside an async task.
    #[error("blocking bus call from an async context")]
    AsyncContext,
}

impl BusError {
    /// Failures behind a startup error, if any.
    #[must_use]
    pub fn failures(&self) -> &[BusFailure] {
        match self {
            BusError::StartupFailed(failures) => failures,
            _ => &[],
        }
    }
}

fn summarize(failures: &[BusFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by plugins while attaching or handling events.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{role} listener cannot bind {addr}: {source}")]
    BindFailure {
        role: ServiceRole,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A host collaborator (store, notifier, web view) failed.
    #[error("collaborator '{name}' failed: {reason}")]
    Collaborator { name: String, reason: String },

    #[error(transparent)]
    Bus(#[from] BusError),
}
