//! # Core Entities
//!
//! Lifecycle states, service roles and the per-plugin service descriptor.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ports::{keys, HostStore, StoreError};

/// States of a service lifecycle bus.
///
/// Serialises to the canonical upper-case name. The legacy names `START`
/// and `RUN` are accepted when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Constructed, nothing running. Initial state.
    Idle,
    /// Plugins are acquiring their resources.
    #[serde(alias = "START")]
    Starting,
    /// Every listener is bound and the SERVING payload has been published.
    #[serde(alias = "RUN")]
    Serving,
    /// Plugins are releasing their resources.
    Stopping,
    /// Shut down for good.
    Exited,
    /// Unrecoverable failure. Recovery means building a new bus.
    Error,
}

impl LifecycleState {
    /// Every state, in declaration order.
    pub const ALL: [LifecycleState; 6] = [
        LifecycleState::Idle,
        LifecycleState::Starting,
        LifecycleState::Serving,
        LifecycleState::Stopping,
        LifecycleState::Exited,
        LifecycleState::Error,
    ];

    /// Canonical name, also used as the bus channel name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "IDLE",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Serving => "SERVING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Exited => "EXITED",
            LifecycleState::Error => "ERROR",
        }
    }

    /// Terminal states have no outgoing transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Exited | LifecycleState::Error)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown lifecycle state '{0}'")]
pub struct ParseStateError(pub String);

impl FromStr for LifecycleState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Ok(LifecycleState::Idle),
            "STARTING" | "START" => Ok(LifecycleState::Starting),
            "SERVING" | "RUN" => Ok(LifecycleState::Serving),
            "STOPPING" => Ok(LifecycleState::Stopping),
            "EXITED" => Ok(LifecycleState::Exited),
            "ERROR" => Ok(LifecycleState::Error),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Which network-facing service a listener belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Main HTTP content server. Its port is `ServingPayload::port`.
    Primary,
    /// Parallel asset server for zipped content. Its port is `zip_port`.
    Secondary,
}

impl ServiceRole {
    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Primary => "primary",
            ServiceRole::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the SERVING event.
///
/// `port` is 0 on a bus that registers no primary listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingPayload {
    pub port: u16,
    pub zip_port: Option<u16>,
}

/// Per-plugin record of the port it asked for and the port it got.
///
/// Owned by exactly one plugin. `bound_port` is filled in only once the
/// listener has actually bound and is cleared again on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub role: ServiceRole,
    /// 0 asks the OS for an ephemeral port.
    pub requested_port: u16,
    pub bound_port: Option<u16>,
    pub running: bool,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn new(role: ServiceRole, requested_port: u16) -> Self {
        Self {
            role,
            requested_port,
            bound_port: None,
            running: false,
        }
    }

    /// True when the OS picks the port.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.requested_port == 0
    }

    /// Record the resolved port.
    pub fn mark_bound(&mut self, port: u16) {
        self.bound_port = Some(port);
        self.running = true;
    }

    /// Forget the resolved port after the listener is released.
    pub fn clear(&mut self) {
        self.bound_port = None;
        self.running = false;
    }
}

/// Opaque session token shared between the embedded browser and the local
/// server. Computed once per process and never changed afterwards.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppKey(String);

impl AppKey {
    /// Wrap an existing key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Mint a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Read the persisted key, or mint and persist a new one.
    pub fn load_or_create(store: &dyn HostStore) -> Result<Self, StoreError> {
        if let Some(existing) = store.get(keys::APP_KEY)? {
            if !existing.is_empty() {
                return Ok(Self(existing));
            }
        }
        let key = Self::generate();
        store.set(keys::APP_KEY, key.as_str())?;
        debug!("Minted new app key");
        Ok(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep the token out of logs.
impl fmt::Debug for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppKey(..)")
    }
}

/// How long worker plugins may wait for in-flight work on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Stop without waiting.
    #[default]
    Immediate,
    /// Let in-flight work finish, bounded by the deadline.
    Graceful(Duration),
}

impl DrainPolicy {
    /// Upper bound on the drain wait.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        match self {
            DrainPolicy::Immediate => Duration::ZERO,
            DrainPolicy::Graceful(deadline) => *deadline,
        }
    }
}
