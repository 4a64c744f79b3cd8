//! Removal of staging output left behind by interrupted derivations.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::claim::FileClaim;
use super::key::ArtifactKey;
use super::layout::{LOCKS_DIR, Layout, staging_key};
use super::store::ContentStore;
use crate::Error;

/// Result of a staging sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SweepSummary {
    /// Staging files or directories removed.
    pub removed: u64,
    /// Staging entries skipped because their key is being derived right now.
    pub claimed: u64,
}

impl ContentStore {
    /// Remove every `<key>_tmp.<ext>` entry whose key is not currently claimed.
    ///
    /// Committed artifacts and claim files are never touched.
    pub async fn sweep_staging(&self) -> Result<SweepSummary, Error> {
        let layout = self.layout.clone();
        let summary = tokio::task::spawn_blocking(move || sweep_blocking(&layout))
            .await
            .map_err(|e| Error::Storage(format!("sweep task failed: {e}")))??;
        tracing::info!(
            base = %self.base().display(),
            removed = summary.removed,
            claimed = summary.claimed,
            "swept staging output"
        );
        Ok(summary)
    }
}

fn sweep_blocking(layout: &Layout) -> Result<SweepSummary, Error> {
    let mut summary = SweepSummary::default();
    if !layout.base().is_dir() {
        return Ok(summary);
    }
    let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(layout.base().to_path_buf(), Vec::new())];

    while let Some((dir, segments)) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| Error::storage(format!("failed to list {}", dir.display()), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage(format!("failed to list {}", dir.display()), e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let path = entry.path();

            if segments.is_empty() && name == LOCKS_DIR {
                continue;
            }

            if !segments.is_empty()
                && let Some(key) = staging_key(&name)
            {
                let root = segments.join("/");
                if sweep_one(layout, &root, key, &path)? {
                    summary.removed += 1;
                } else {
                    summary.claimed += 1;
                }
                continue;
            }

            let is_dir = entry
                .file_type()
                .map_err(|e| Error::storage(format!("failed to stat {}", path.display()), e))?
                .is_dir();
            if is_dir && !name.starts_with('.') {
                let mut child = segments.clone();
                child.push(name);
                pending.push((path, child));
            }
        }
    }

    Ok(summary)
}

/// Remove one staging entry if its claim is free. Returns false if it is claimed.
fn sweep_one(layout: &Layout, root: &str, key: &str, path: &Path) -> Result<bool, Error> {
    let key = ArtifactKey::parse(key)?;
    let Some(claim) = FileClaim::try_acquire(&layout.lock_path(root, &key))? else {
        return Ok(false);
    };

    let removed = if path.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
    match removed {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::storage(format!("failed to remove {}", path.display()), e)),
    }
    claim.release()?;
    tracing::debug!(staging = %path.display(), "removed staging output");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::key::Arg;

    #[tokio::test]
    async fn test_sweep_removes_unclaimed_staging_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());

        let stale = store.reference_for("docA", "importPageImage", &[Arg::from("p1.png")], "jpg").unwrap();
        let stale_dir = store.reference_for("image-tiles", "tiles", &[Arg::from("p1.jpg")], "tiles").unwrap();
        let held = store.reference_for("docA", "importPageImage", &[Arg::from("p2.png")], "jpg").unwrap();
        let committed = store.reference_for("docA", "importPageImage", &[Arg::from("p3.png")], "jpg").unwrap();

        std::fs::create_dir_all(dir.path().join("docA")).unwrap();
        std::fs::write(store.layout.staging_path(&stale), b"partial").unwrap();
        std::fs::create_dir_all(store.layout.staging_path(&stale_dir)).unwrap();
        std::fs::write(store.layout.staging_path(&held), b"in progress").unwrap();
        std::fs::write(store.absolute_path(&committed), b"done").unwrap();

        let claim = FileClaim::acquire(store.layout.lock_path("docA", held.key())).await.unwrap();

        let summary = store.sweep_staging().await.unwrap();
        assert_eq!(summary, SweepSummary { removed: 2, claimed: 1 });

        assert!(!store.layout.staging_path(&stale).exists());
        assert!(!store.layout.staging_path(&stale_dir).exists());
        assert!(store.layout.staging_path(&held).exists());
        assert!(store.absolute_path(&committed).exists());
        assert!(store.layout.lock_path("docA", stale.key()).is_file());

        claim.release().unwrap();
    }

    #[tokio::test]
    async fn test_sweep_missing_base_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("never-created"));
        assert_eq!(store.sweep_staging().await.unwrap(), SweepSummary::default());
    }
}
