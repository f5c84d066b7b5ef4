// ABOUTME: Cross-process mutual exclusion using an atomically created lock directory.
// ABOUTME: The guard removes the directory on drop, so every exit path releases the lock.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::StorageError;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOCK_RETRY: Duration = Duration::from_millis(100);

/// How long to wait for the lock and how often to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub retry: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            retry: DEFAULT_LOCK_RETRY,
        }
    }
}

/// A held directory lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    /// Acquire the lock at `path` by creating it as a directory. `mkdir` is
    /// atomic on every filesystem we care about, so exactly one caller wins.
    /// Losers sleep `options.retry` and try again until `options.timeout`.
    pub fn acquire(path: &Path, options: LockOptions) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        loop {
            match fs::create_dir(path) {
                Ok(()) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let waited = started.elapsed();
                    if waited >= options.timeout {
                        tracing::warn!(
                            lock = %path.display(),
                            waited_ms = waited.as_millis(),
                            "lock acquisition timed out"
                        );
                        return Err(StorageError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: waited.as_millis(),
                        });
                    }
                    thread::sleep(options.retry.min(options.timeout - waited));
                }
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}
