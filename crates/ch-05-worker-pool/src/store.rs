//! # Job Store Port
//!
//! Persistent job queue. Every method is synchronous and short; the JSON
//! file store writes the whole table on each mutation.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::job::{JobRecord, JobState};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("job store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("unknown job {0}")]
    NotFound(String),
}

pub trait JobStore: Send + Sync {
    /// Add `job` to the queue. Replaces a job with the same id.
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError>;

    fn contains(&self, id: &str) -> bool;

    fn get(&self, id: &str) -> Option<JobRecord>;

    /// Mark the oldest job that is ready at `now` as running and return it.
    fn claim_next(&self, now: SystemTime) -> Result<Option<JobRecord>, JobStoreError>;

    /// Store the new state of an existing job.
    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError>;

    /// Move every `Running` job back to `Queued`. Returns how many moved.
    /// Only safe when nothing is executing jobs from this store.
    fn requeue_running(&self) -> Result<usize, JobStoreError>;

    fn jobs(&self) -> Vec<JobRecord>;
}

/// Finished one-shot jobs kept for inspection. Older ones are dropped.
pub const MAX_FINISHED_JOBS: usize = 100;

/// Table shared by both stores.
#[derive(Debug, Default, Clone)]
struct JobTable {
    jobs: BTreeMap<String, JobRecord>,
    next_seq: u64,
}

impl JobTable {
    fn from_jobs(jobs: Vec<JobRecord>) -> Self {
        let next_seq = jobs.iter().map(|j| j.seq + 1).max().unwrap_or(0);
        Self {
            jobs: jobs.into_iter().map(|j| (j.id.clone(), j)).collect(),
            next_seq,
        }
    }

    fn insert(&mut self, mut job: JobRecord) {
        job.seq = self.next_seq;
        self.next_seq += 1;
        self.jobs.insert(job.id.clone(), job);
        self.prune_finished();
    }

    fn claim_next(&mut self, now: SystemTime) -> Option<JobRecord> {
        let job = self
            .jobs
            .values_mut()
            .filter(|j| j.is_ready(now))
            .min_by_key(|j| j.seq)?;
        job.state = JobState::Running;
        job.attempts += 1;
        Some(job.clone())
    }

    fn update(&mut self, job: &JobRecord) -> Result<(), JobStoreError> {
        let slot = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| JobStoreError::NotFound(job.id.clone()))?;
        *slot = job.clone();
        self.prune_finished();
        Ok(())
    }

    /// Drop the oldest finished one-shot jobs beyond `MAX_FINISHED_JOBS`.
    fn prune_finished(&mut self) {
        let mut finished: Vec<(u64, String)> = self
            .jobs
            .values()
            .filter(|j| j.interval.is_none())
            .filter(|j| matches!(j.state, JobState::Done | JobState::Failed))
            .map(|j| (j.seq, j.id.clone()))
            .collect();
        if finished.len() <= MAX_FINISHED_JOBS {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - MAX_FINISHED_JOBS;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
        debug!(pruned = excess, "Dropped old finished jobs");
    }

    fn requeue_running(&mut self) -> usize {
        let mut moved = 0;
        for job in self.jobs.values_mut() {
            if job.state == JobState::Running {
                job.state = JobState::Queued;
                moved += 1;
            }
        }
        moved
    }

    fn sorted(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<_> = self.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.seq);
        jobs
    }
}

// ============================================================================
// InMemoryJobStore
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    table: Mutex<JobTable>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError> {
        self.table.lock().insert(job);
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.table.lock().jobs.contains_key(id)
    }

    fn get(&self, id: &str) -> Option<JobRecord> {
        self.table.lock().jobs.get(id).cloned()
    }

    fn claim_next(&self, now: SystemTime) -> Result<Option<JobRecord>, JobStoreError> {
        Ok(self.table.lock().claim_next(now))
    }

    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        self.table.lock().update(job)
    }

    fn requeue_running(&self) -> Result<usize, JobStoreError> {
        Ok(self.table.lock().requeue_running())
    }

    fn jobs(&self) -> Vec<JobRecord> {
        self.table.lock().sorted()
    }
}

// ============================================================================
// JsonFileJobStore
// ============================================================================

/// Job queue persisted as a JSON array. Survives restarts of the host.
#[derive(Debug)]
pub struct JsonFileJobStore {
    path: PathBuf,
    table: Mutex<JobTable>,
}

impl JsonFileJobStore {
    /// Open `path`, loading existing jobs. A missing file is an empty queue.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let path = path.into();
        let jobs: Vec<JobRecord> = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let store = Self {
            path,
            table: Mutex::new(JobTable::from_jobs(jobs)),
        };
        // Jobs left `Running` belong to a process that is gone.
        let requeued = store.requeue_running()?;
        info!(
            path = %store.path.display(),
            jobs = store.table.lock().jobs.len(),
            requeued,
            "Job store opened"
        );
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the table and swap it in once the copy
    /// is on disk. A failed write leaves memory as it was.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut JobTable) -> Result<(T, bool), JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let mut table = self.table.lock();
        let mut next = table.clone();
        let (out, changed) = change(&mut next)?;
        if changed {
            self.persist(&next)?;
            *table = next;
        }
        Ok(out)
    }

    fn persist(&self, table: &JobTable) -> Result<(), JobStoreError> {
        let contents = serde_json::to_vec_pretty(&table.sorted())?;
        atomic_write(&self.path, &contents)?;
        debug!(path = %self.path.display(), jobs = table.jobs.len(), "Job store saved");
        Ok(())
    }
}

/// Write to a sibling temp file, sync, then rename over `path`.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, path)
}

impl JobStore for JsonFileJobStore {
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError> {
        self.commit(|table| {
            table.insert(job);
            Ok(((), true))
        })
    }

    fn contains(&self, id: &str) -> bool {
        self.table.lock().jobs.contains_key(id)
    }

    fn get(&self, id: &str) -> Option<JobRecord> {
        self.table.lock().jobs.get(id).cloned()
    }

    fn claim_next(&self, now: SystemTime) -> Result<Option<JobRecord>, JobStoreError> {
        self.commit(|table| {
            let claimed = table.claim_next(now);
            let changed = claimed.is_some();
            Ok((claimed, changed))
        })
    }

    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        self.commit(|table| {
            table.update(job)?;
            Ok(((), true))
        })
    }

    fn requeue_running(&self) -> Result<usize, JobStoreError> {
        self.commit(|table| {
            let moved = table.requeue_running();
            Ok((moved, moved > 0))
        })
    }

    fn jobs(&self) -> Vec<JobRecord> {
        self.table.lock().sorted()
    }
}
