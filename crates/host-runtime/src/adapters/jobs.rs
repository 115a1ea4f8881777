//! Runners for the built-in recurring jobs.

use ch_05_worker_pool::RunnerRegistry;
use tracing::info;

/// `ping` and `vacuum` runners. The embedding application registers the
/// runners for its own job kinds on top.
#[must_use]
pub fn default_runners() -> RunnerRegistry {
    RunnerRegistry::new()
        .with("ping", |job| {
            info!(job = %job.id, attempt = job.attempts, "Usage ping");
            Ok(())
        })
        .with("vacuum", |job| {
            info!(job = %job.id, "Vacuuming local database");
            Ok(())
        })
}
