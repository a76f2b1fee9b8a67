//! Advisory lock around the pipeline's critical section.
//!
//! Best-effort mutual exclusion with a short acquisition window:
//! contenders that fail to acquire abandon their run rather than wait.
//! The production lock is an exclusive `fs2` file lock; the guard
//! releases on drop so the lock is freed on every exit path.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

/// Guard that holds the lock until dropped.
pub trait LockGuard: Send {}

pub trait PipelineLock: Send + Sync {
    /// Try to acquire within the short retry window. `None` means
    /// another invocation holds the lock.
    fn try_acquire(&self) -> Option<Box<dyn LockGuard>>;
}

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive file lock.
pub struct FileLock {
    path: PathBuf,
    acquire_window: Duration,
}

impl FileLock {
    pub fn new(path: PathBuf, acquire_window: Duration) -> Self {
        Self {
            path,
            acquire_window,
        }
    }
}

struct FileLockGuard {
    file: File,
}

impl LockGuard for FileLockGuard {}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl PipelineLock for FileLock {
    fn try_acquire(&self) -> Option<Box<dyn LockGuard>> {
        let started = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&self.path)
                .ok()?;
            match file.try_lock_exclusive() {
                Ok(()) => return Some(Box::new(FileLockGuard { file })),
                Err(_) if started.elapsed() < self.acquire_window => {
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(_) => {
                    debug!("pipeline lock held elsewhere, skipping run");
                    return None;
                }
            }
        }
    }
}
