//! Content store handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::claim::Inflight;
use super::key::{Arg, ArtifactKey, derive_key};
use super::layout::Layout;
use super::reference::ContentRef;
use crate::Error;

/// A content-addressed store rooted at one base directory.
///
/// The store is the sole writer of its directory tree. Clones share the
/// single-flight registry, so hand clones to concurrent tasks rather than
/// opening a second store over the same base.
#[derive(Clone, Debug)]
pub struct ContentStore {
    pub(crate) layout: Layout,
    pub(crate) inflight: Arc<Inflight>,
    pub(crate) timeout: Option<Duration>,
}

impl ContentStore {
    /// Open a store at `base`. Nothing is created until the first write.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { layout: Layout::new(base), inflight: Arc::new(Inflight::default()), timeout: None }
    }

    /// Bound every transformation run through this store.
    ///
    /// A transformation that exceeds the bound fails like any other
    /// transformation failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base(&self) -> &Path {
        self.layout.base()
    }

    /// Map `(root, key, extension)` to the artifact's final path.
    pub fn resolve_path(&self, root: &str, key: &ArtifactKey, extension: &str) -> Result<PathBuf, Error> {
        let content_ref = ContentRef::new(root, key.clone(), extension)?;
        Ok(self.layout.final_path(&content_ref))
    }

    /// Absolute (base-joined) location of a reference.
    pub fn absolute_path(&self, content_ref: &ContentRef) -> PathBuf {
        self.layout.final_path(content_ref)
    }

    /// The reference a derivation would produce, without running it.
    pub fn reference_for(
        &self, root: &str, operation_name: &str, args: &[Arg], extension: &str,
    ) -> Result<ContentRef, Error> {
        ContentRef::new(root, derive_key(operation_name, args)?, extension)
    }

    /// Whether a committed artifact exists for `content_ref`.
    pub async fn contains(&self, content_ref: &ContentRef) -> Result<bool, Error> {
        let path = self.layout.final_path(content_ref);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to stat {}", path.display()), e))
    }

    /// Read a committed file artifact.
    pub async fn read(&self, content_ref: &ContentRef) -> Result<Vec<u8>, Error> {
        let path = self.layout.final_path(content_ref);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to read {}", path.display()), e))
    }
}
