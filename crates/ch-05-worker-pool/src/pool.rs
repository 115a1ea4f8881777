//! Job dispatcher task.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use host_telemetry::metrics::{JOBS_IN_FLIGHT, JOBS_PROCESSED};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::job::JobRecord;
use crate::runner::RunnerRegistry;
use crate::store::JobStore;

/// Shared between the dispatcher and the plugin.
pub(crate) struct PoolShared {
    pub store: Arc<dyn JobStore>,
    pub runners: RunnerRegistry,
    pub wake: Notify,
    pub in_flight: AtomicUsize,
}

/// Claim and run jobs until `shutdown` flips, then wait for the jobs
/// already running.
pub(crate) async fn dispatch(
    shared: Arc<PoolShared>,
    workers: usize,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut running = JoinSet::new();
    info!(workers, "Worker pool dispatcher started");

    'dispatch: loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break 'dispatch;
                }
            }
            Some(finished) = running.join_next(), if !running.is_empty() => reap(finished),
            permit = Arc::clone(&permits).acquire_owned() => {
                let Ok(permit) = permit else {
                    break 'dispatch;
                };
                let claimed = match shared.store.claim_next(SystemTime::now()) {
                    Ok(claimed) => claimed,
                    Err(e) => {
                        warn!(error = %e, "Could not claim next job");
                        None
                    }
                };
                match claimed {
                    Some(job) => {
                        shared.in_flight.fetch_add(1, Ordering::SeqCst);
                        JOBS_IN_FLIGHT.inc();
                        let shared = Arc::clone(&shared);
                        running.spawn_blocking(move || {
                            let _permit = permit;
                            execute(&shared, job);
                        });
                    }
                    None => {
                        drop(permit);
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break 'dispatch;
                                }
                            }
                            Some(finished) = running.join_next(), if !running.is_empty() => reap(finished),
                            _ = shared.wake.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }
        }
    }

    let draining = running.len();
    if draining > 0 {
        info!(jobs = draining, "Waiting for in-flight jobs");
    }
    while let Some(finished) = running.join_next().await {
        reap(finished);
    }
    info!("Worker pool dispatcher stopped");
}

fn reap(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Job task ended abnormally");
    }
}

/// Run one claimed job and record its outcome. Runs on a blocking thread.
fn execute(shared: &PoolShared, mut job: JobRecord) {
    debug!(job = %job.id, kind = %job.kind, attempt = job.attempts, "Job started");
    let (label, outcome) = match shared.runners.get(&job.kind) {
        Some(runner) => match catch_unwind(AssertUnwindSafe(|| runner(&job))) {
            Ok(Ok(())) => ("ok", Ok(())),
            Ok(Err(e)) => ("failed", Err(format!("{e:#}"))),
            Err(_) => ("failed", Err("job panicked".to_string())),
        },
        None => ("unknown_kind", Err(format!("no runner for kind {}", job.kind))),
    };

    match &outcome {
        Ok(()) => info!(job = %job.id, kind = %job.kind, "Job finished"),
        Err(e) => warn!(job = %job.id, kind = %job.kind, error = %e, "Job failed"),
    }
    job.finish(outcome, SystemTime::now());
    if let Err(e) = shared.store.update(&job) {
        error!(job = %job.id, error = %e, "Could not record job outcome");
    }

    JOBS_PROCESSED.with_label_values(&[label]).inc();
    JOBS_IN_FLIGHT.dec();
    shared.in_flight.fetch_sub(1, Ordering::SeqCst);
}
