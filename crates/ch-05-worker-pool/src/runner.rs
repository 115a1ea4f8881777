//! Job runners, looked up by job kind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::job::JobRecord;

/// Executes one job on a blocking worker thread.
pub type JobRunner = Arc<dyn Fn(&JobRecord) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: HashMap<String, JobRunner>,
}

impl RunnerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `runner` for `kind`, replacing any earlier one.
    pub fn register<F>(&mut self, kind: impl Into<String>, runner: F)
    where
        F: Fn(&JobRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.runners.insert(kind.into(), Arc::new(runner));
    }

    #[must_use]
    pub fn with<F>(mut self, kind: impl Into<String>, runner: F) -> Self
    where
        F: Fn(&JobRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(kind, runner);
        self
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<JobRunner> {
        self.runners.get(kind).cloned()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.runners.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
