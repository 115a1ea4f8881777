//! # Startup Tracker
//!
//! Which listeners the bus waits for, which have bound, and what failed.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

use shared_types::{BusFailure, ServiceRole, ServingPayload};

/// Where a startup attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Still waiting for these roles.
    Pending(Vec<ServiceRole>),
    /// Every registered listener has bound.
    Ready(ServingPayload),
    /// At least one failure was recorded.
    Failed(Vec<BusFailure>),
}

/// Startup bookkeeping. Registered roles survive restarts; bound endpoints
/// and failures are per attempt.
#[derive(Debug, Default)]
pub struct StartupTracker {
    expected: BTreeSet<ServiceRole>,
    bound: BTreeMap<ServiceRole, SocketAddr>,
    failures: Vec<BusFailure>,
}

impl StartupTracker {
    /// Register a listener role. Returns `false` when already registered.
    pub fn expect(&mut self, role: ServiceRole) -> bool {
        self.expected.insert(role)
    }

    /// Forget the previous attempt.
    pub fn begin_attempt(&mut self) {
        self.bound.clear();
        self.failures.clear();
    }

    /// Record a bound listener. Returns `false` for an unregistered role.
    pub fn bind(&mut self, role: ServiceRole, addr: SocketAddr) -> bool {
        if !self.expected.contains(&role) {
            return false;
        }
        self.bound.insert(role, addr);
        true
    }

    pub fn fail(&mut self, failure: BusFailure) {
        self.failures.push(failure);
    }

    /// Drop the bound endpoints once the listeners are released.
    pub fn release(&mut self) {
        self.bound.clear();
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        if !self.failures.is_empty() {
            return Readiness::Failed(self.failures.clone());
        }
        let missing: Vec<ServiceRole> = self
            .expected
            .iter()
            .filter(|role| !self.bound.contains_key(role))
            .copied()
            .collect();
        if missing.is_empty() {
            Readiness::Ready(self.payload())
        } else {
            Readiness::Pending(missing)
        }
    }

    /// SERVING payload from the currently bound listeners.
    #[must_use]
    pub fn payload(&self) -> ServingPayload {
        ServingPayload {
            port: self.port(ServiceRole::Primary).unwrap_or(0),
            zip_port: self.port(ServiceRole::Secondary),
        }
    }

    #[must_use]
    pub fn port(&self, role: ServiceRole) -> Option<u16> {
        self.bound.get(&role).map(SocketAddr::port)
    }

    /// Ports of every bound listener.
    #[must_use]
    pub fn bound_ports(&self) -> Vec<u16> {
        self.bound.values().map(SocketAddr::port).collect()
    }

    #[must_use]
    pub fn failures(&self) -> &[BusFailure] {
        &self.failures
    }

    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected.len()
    }
}
