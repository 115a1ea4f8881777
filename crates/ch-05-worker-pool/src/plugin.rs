//! # Worker Pool Plugin

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ch_02_process_bus::{BusPlugin, ProcessBus};
use host_telemetry::metrics::DRAIN_TIMEOUTS;
use parking_lot::Mutex;
use shared_types::{DrainPolicy, LifecycleState, PluginError};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::job::JobRecord;
use crate::pool::{dispatch, PoolShared};
use crate::runner::RunnerRegistry;
use crate::store::{JobStore, JobStoreError};

struct RunningDispatcher {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Pool {
    config: WorkerPoolConfig,
    runtime: Handle,
    shared: Arc<PoolShared>,
    dispatcher: Mutex<Option<RunningDispatcher>>,
}

impl Pool {
    fn start(&self) -> anyhow::Result<()> {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            warn!("Worker pool already running");
            return Ok(());
        }

        // Jobs abandoned at a drain deadline may still be running, so they
        // stay `Running` here. The file store requeues them when reopened.
        for scheduled in &self.config.scheduled {
            if !self.shared.store.contains(&scheduled.id) {
                let job = JobRecord::with_id(
                    scheduled.id.clone(),
                    scheduled.kind.clone(),
                    serde_json::Value::Null,
                )
                .recurring(scheduled.interval);
                self.shared.store.insert(job)?;
                info!(job = %scheduled.id, interval = ?scheduled.interval, "Scheduled recurring job");
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = self.runtime.spawn(dispatch(
            Arc::clone(&self.shared),
            self.config.workers,
            self.config.poll_interval,
            shutdown_rx,
        ));
        *dispatcher = Some(RunningDispatcher { shutdown, task });
        Ok(())
    }

    fn stop(&self, policy: DrainPolicy, state: LifecycleState) {
        let Some(running) = self.dispatcher.lock().take() else {
            return;
        };
        let _ = running.shutdown.send(true);

        let deadline = policy.deadline().max(self.config.shutdown_grace);
        let drained = self
            .runtime
            .block_on(async { tokio::time::timeout(deadline, running.task).await })
            .is_ok();
        let left = self.shared.in_flight.load(Ordering::SeqCst);

        if drained {
            info!(state = %state, "Worker pool drained");
        } else if matches!(policy, DrainPolicy::Graceful(_)) {
            DRAIN_TIMEOUTS.inc();
            warn!(
                state = %state,
                ?deadline,
                jobs = left,
                "Drain deadline passed, shutting down with jobs still running"
            );
        } else {
            debug!(state = %state, jobs = left, "Stopped without draining");
        }
    }
}

/// Runs queued jobs while the worker bus is up.
pub struct WorkerPoolPlugin {
    pool: Arc<Pool>,
}

impl WorkerPoolPlugin {
    #[must_use]
    pub fn new(
        config: WorkerPoolConfig,
        store: Arc<dyn JobStore>,
        runners: RunnerRegistry,
        runtime: Handle,
    ) -> Self {
        Self {
            pool: Arc::new(Pool {
                config,
                runtime,
                shared: Arc::new(PoolShared {
                    store,
                    runners,
                    wake: Notify::new(),
                    in_flight: AtomicUsize::new(0),
                }),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Queue a job and wake the dispatcher. Jobs submitted while the pool
    /// is stopped run on the next start.
    pub fn submit(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<String, JobStoreError> {
        let job = JobRecord::new(kind, payload);
        let id = job.id.clone();
        self.pool.shared.store.insert(job)?;
        self.pool.shared.wake.notify_one();
        debug!(job = %id, "Job submitted");
        Ok(id)
    }

    /// Jobs executing right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pool.shared.in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pool.dispatcher.lock().is_some()
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.pool.shared.store)
    }
}

impl BusPlugin for WorkerPoolPlugin {
    fn name(&self) -> &'static str {
        "worker-pool"
    }

    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        let pool = Arc::clone(&self.pool);
        bus.subscribe(LifecycleState::Starting.as_str(), move |_, _| pool.start())?;

        for state in [
            LifecycleState::Stopping,
            LifecycleState::Exited,
            LifecycleState::Error,
        ] {
            let pool = Arc::clone(&self.pool);
            bus.subscribe(state.as_str(), move |bus, _| {
                pool.stop(bus.drain_policy(), state);
                Ok(())
            })?;
        }
        Ok(())
    }
}
