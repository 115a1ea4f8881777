//! Single-instance lock on the host home directory.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("cannot open lock file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is locked by another host process (owner pid: {})", .path.display(), .owner.as_deref().unwrap_or("unknown"))]
    Held { path: PathBuf, owner: Option<String> },
}

/// Exclusive advisory lock, released when dropped.
#[derive(Debug)]
pub struct HomeLock {
    path: PathBuf,
    file: File,
}

impl HomeLock {
    /// Take the lock without waiting.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            debug!(path = %path.display(), error = %e, "Lock acquisition failed");
            let owner = std::fs::read_to_string(&path)
                .ok()
                .map(|contents| contents.trim().to_string())
                .filter(|pid| !pid.is_empty());
            return Err(LockError::Held { path, owner });
        }

        // Owner pid, for the error message of the next contender.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());
        info!(path = %path.display(), "Home directory locked");
        Ok(Self { path, file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HomeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Home directory unlocked");
    }
}
