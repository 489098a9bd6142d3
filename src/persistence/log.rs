//! Append-Only Log Writer
//!
//! Every successfully applied mutating command is re-encoded in request
//! framing and appended here. The sink sits behind a single mutex owned by
//! the log, so records from concurrent connections never interleave.

use crate::config::SyncPolicy;
use crate::persistence::PersistenceError;
use crate::protocol::serialize_command;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A byte stream the log can append to.
pub trait LogSink: Write + Send {
    /// Forces written data to stable storage.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl LogSink for Vec<u8> {}

/// Process-wide append-only command log.
///
/// Construct it once and share it behind an `Arc`.
///
/// # Blocking
///
/// `append` is synchronous: it takes a `std::sync::Mutex` and performs a
/// blocking file write on the calling thread, which in the server is a tokio
/// worker. With [`SyncPolicy::Always`] every record also waits for
/// `sync_data`, and writers from other connections queue on the mutex for
/// that long. Enough concurrent writers can then occupy every runtime worker
/// until the disk catches up. [`SyncPolicy::Never`] keeps each append to a
/// page-cache write.
pub struct AppendOnlyLog {
    sink: Mutex<Box<dyn LogSink>>,
    policy: SyncPolicy,
    path: Option<PathBuf>,

    appended: AtomicU64,
    failed: AtomicU64,
}

impl std::fmt::Debug for AppendOnlyLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendOnlyLog")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("appended", &self.appended.load(Ordering::Relaxed))
            .finish()
    }
}

impl AppendOnlyLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>, policy: SyncPolicy) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), ?policy, "Opened append-only log");

        let mut log = Self::from_sink(file, policy);
        log.path = Some(path.to_path_buf());
        Ok(log)
    }

    /// Wraps an arbitrary sink.
    pub fn from_sink(sink: impl LogSink + 'static, policy: SyncPolicy) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            policy,
            path: None,
            appended: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// File backing this log, if it was opened from a path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one command as a single record.
    ///
    /// The record is written with one `write_all` while the lock is held.
    /// A failure here does not undo anything already applied to the store.
    pub fn append(&self, args: &[Bytes]) -> Result<(), PersistenceError> {
        let record = serialize_command(args);

        let result = {
            let mut sink = self.lock();
            sink.write_all(&record).and_then(|()| match self.policy {
                SyncPolicy::Always => sink.sync(),
                SyncPolicy::Never => Ok(()),
            })
        };

        match result {
            Ok(()) => {
                self.appended.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    /// Flushes and syncs the sink regardless of policy.
    pub fn sync(&self) -> Result<(), PersistenceError> {
        let mut sink = self.lock();
        sink.flush()?;
        sink.sync()?;
        Ok(())
    }

    /// Records appended successfully since the log was opened.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Appends that failed since the log was opened.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    // Every write is a single write_all, so a poisoned lock holds no partial state
    // beyond what a failed write would leave anyway.
    fn lock(&self) -> MutexGuard<'_, Box<dyn LogSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
