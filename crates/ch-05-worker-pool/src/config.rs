//! Worker pool configuration.

use std::time::Duration;

/// A job that re-queues itself after every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    /// Fixed id, so seeding is idempotent across restarts.
    pub id: String,
    pub kind: String,
    pub interval: Duration,
}

impl ScheduledJob {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            interval,
        }
    }

    /// Daily usage ping.
    #[must_use]
    pub fn ping() -> Self {
        Self::new("ping", "ping", Duration::from_secs(24 * 60 * 60))
    }

    /// Daily database vacuum.
    #[must_use]
    pub fn vacuum() -> Self {
        Self::new("vacuum", "vacuum", Duration::from_secs(24 * 60 * 60))
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Jobs executed concurrently.
    pub workers: usize,
    /// How often an idle dispatcher looks for newly due jobs.
    pub poll_interval: Duration,
    /// Minimum wait for the dispatcher on shutdown, even without a drain
    /// deadline.
    pub shutdown_grace: Duration,
    pub scheduled: Vec<ScheduledJob>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_millis(200),
            scheduled: vec![ScheduledJob::ping(), ScheduledJob::vacuum()],
        }
    }
}

impl WorkerPoolConfig {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_scheduled(mut self, scheduled: Vec<ScheduledJob>) -> Self {
        self.scheduled = scheduled;
        self
    }
}
