//! Mutual exclusion between cron runs.
//!
//! A lock is acquired without waiting. The returned guard holds it until it is
//! dropped, and the operating system (or the database session) drops it for
//! us if the process dies, so a crashed run never blocks the next one.

use anyhow::{Context, Result};
use log::warn;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// A lock that at most one cron run can hold at a time.
pub trait CronLock {
    /// Releases the lock when dropped.
    type Guard;

    /// Take the lock if nobody holds it.
    /// Returns `Ok(None)` right away if another run has it.
    ///
    /// # Errors
    /// Returns an error if the lock itself could not be checked.
    fn try_acquire(&self) -> Result<Option<Self::Guard>>;

    /// Who holds the lock, if that is known.
    fn holder(&self) -> Option<String> {
        None
    }
}

/// An exclusive advisory lock on a file. The holder's pid is written into the
/// file for whoever wants to know who is running.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

/// Holds a [`FileLock`] until dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileLock { path: path.into() }
    }

    /// The pid recorded by the current or last holder, if any.
    #[must_use]
    pub fn holder_pid(&self) -> Option<u32> {
        let mut contents = String::new();
        File::open(&self.path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .ok()?;
        contents.trim().parse().ok()
    }
}

impl CronLock for FileLock {
    type Guard = FileLockGuard;

    fn try_acquire(&self) -> Result<Option<FileLockGuard>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("Failed to open lock file {}", self.path.display()))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Error(err)) => {
                return Err(err)
                    .with_context(|| format!("Failed to lock {}", self.path.display()));
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Some(FileLockGuard { file }))
    }

    fn holder(&self) -> Option<String> {
        self.holder_pid().map(|pid| format!("pid {pid}"))
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!("Failed to release the cron lock: {err}");
        }
    }
}
