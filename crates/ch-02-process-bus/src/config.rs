//! Bus configuration.

use std::time::Duration;

/// Knobs of one [`ProcessBus`](crate::ProcessBus).
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// How long `run`/`graceful` wait for SERVING before forcing ERROR.
    pub startup_timeout: Duration,

    /// Drain deadline applied by `graceful`.
    pub drain_deadline: Duration,

    /// Scheme of the bus's own endpoints.
    pub service_scheme: String,

    /// Hosts under which the bound listeners are reachable.
    pub service_hosts: Vec<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(120),
            drain_deadline: Duration::from_secs(10),
            service_scheme: "http".to_string(),
            service_hosts: vec!["127.0.0.1".to_string()],
        }
    }
}

impl BusConfig {
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }
}
