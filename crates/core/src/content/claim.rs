//! Per-key claims.
//!
//! Two layers guard the miss path of one key:
//!
//! - [`Inflight`]: an in-process single-flight registry keyed by the resolved
//!   final path. Concurrent callers share one outcome cell; the first to
//!   drive it runs the derivation, the rest await the same result.
//! - [`FileClaim`]: an advisory exclusive lock on `<base>/.locks/<root>/<key>.lock`
//!   serializing separate processes working on the same store.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::FileExt;
use tokio::sync::{Mutex, OnceCell};

use super::reference::ContentRef;
use crate::Error;

/// Outcome of one derivation, shared by every caller that joined it.
pub(crate) type SharedOutcome = Arc<OnceCell<Result<ContentRef, Error>>>;

/// In-process single-flight registry.
#[derive(Debug, Default)]
pub(crate) struct Inflight {
    entries: Mutex<HashMap<PathBuf, SharedOutcome>>,
}

impl Inflight {
    /// Join the flight for `path`, creating it if nobody is producing it.
    ///
    /// A flight that already holds an outcome was left behind by callers that
    /// were cancelled before retiring it; it is replaced so the new caller
    /// runs from the claim step again.
    pub(crate) async fn join(&self, path: &Path) -> SharedOutcome {
        let mut entries = self.entries.lock().await;
        let flight = entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()));
        if flight.initialized() {
            *flight = Arc::new(OnceCell::new());
        }
        Arc::clone(flight)
    }

    /// Retire a completed flight so the next request starts again from lookup.
    ///
    /// Only removes the entry if it is still the flight the caller joined.
    pub(crate) async fn finish(&self, path: &Path, flight: &SharedOutcome) {
        let mut entries = self.entries.lock().await;
        if entries.get(path).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            entries.remove(path);
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Held advisory lock on a claim file. Dropping it releases the lock.
#[derive(Debug)]
pub(crate) struct FileClaim {
    file: File,
    path: PathBuf,
}

impl FileClaim {
    /// Block (on the blocking pool) until the claim file is exclusively locked.
    pub(crate) async fn acquire(path: PathBuf) -> Result<Self, Error> {
        tokio::task::spawn_blocking(move || {
            let file = open_claim_file(&path)?;
            FileExt::lock_exclusive(&file)
                .map_err(|e| Error::ClaimFailed(format!("failed to lock {}: {e}", path.display())))?;
            Ok(Self { file, path })
        })
        .await
        .map_err(|e| Error::ClaimFailed(format!("claim task failed: {e}")))?
    }

    /// Lock the claim file if nobody holds it.
    pub(crate) fn try_acquire(path: &Path) -> Result<Option<Self>, Error> {
        let file = open_claim_file(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { file, path: path.to_path_buf() })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::ClaimFailed(format!("failed to lock {}: {e}", path.display()))),
        }
    }

    /// Release the lock explicitly so release faults are reported.
    pub(crate) fn release(self) -> Result<(), Error> {
        FileExt::unlock(&self.file)
            .map_err(|e| Error::ClaimFailed(format!("failed to unlock {}: {e}", self.path.display())))
    }
}

fn open_claim_file(path: &Path) -> Result<File, Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::ClaimFailed(format!("failed to create lock directory {}: {e}", parent.display())))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| Error::ClaimFailed(format!("failed to open claim {}: {e}", path.display())))
}
