//! Interning source files by their content digest.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::claim::FileClaim;
use super::derive::{TransformOutput, discard_staging};
use super::key::ArtifactKey;
use super::reference::ContentRef;
use super::store::ContentStore;
use crate::Error;

impl ContentStore {
    /// Copy `source` into the store under `root`, named by the SHA-256 of its bytes.
    ///
    /// The extension is taken from `source`. If the content is already
    /// present, the stored file's size is checked against `source` as a
    /// sanity check and nothing is copied.
    pub async fn add_file(&self, root: &str, source: &Path) -> Result<ContentRef, Error> {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("{} has no usable extension", source.display())))?;

        let source_len = match tokio::fs::metadata(source).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::MissingSource(format!("expected {} to exist", source.display())));
            }
            Err(e) => return Err(Error::storage(format!("failed to stat {}", source.display()), e)),
        };

        let key = digest_file(source.to_path_buf()).await?;
        let content_ref = ContentRef::new(root, key, extension)?;

        if self.contains(&content_ref).await? {
            return self.confirm_size(&content_ref, source, source_len).await;
        }

        let claim = FileClaim::acquire(self.layout.lock_path(root, content_ref.key())).await?;
        let result = self.copy_in(&content_ref, source, source_len).await;
        let released = claim.release();
        let content_ref = result?;
        released?;
        Ok(content_ref)
    }

    async fn copy_in(
        &self, content_ref: &ContentRef, source: &Path, source_len: u64,
    ) -> Result<ContentRef, Error> {
        if self.contains(content_ref).await? {
            return self.confirm_size(content_ref, source, source_len).await;
        }

        let root_dir = self.layout.root_dir(content_ref.root());
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}", root_dir.display()), e))?;

        let staging = self.layout.staging_path(content_ref);
        discard_staging(&staging).await?;

        let copied = match tokio::fs::copy(source, &staging).await {
            Ok(_) => self.commit(&staging, content_ref, TransformOutput::Written).await,
            Err(e) => Err(Error::CommitFailed(format!(
                "failed to copy {} to {}: {e}",
                source.display(),
                staging.display()
            ))),
        };
        if let Err(e) = copied {
            discard_staging(&staging).await.ok();
            return Err(e);
        }

        tracing::info!(source = %source.display(), content_ref = %content_ref, "added content");
        Ok(content_ref.clone())
    }

    async fn confirm_size(
        &self, content_ref: &ContentRef, source: &Path, source_len: u64,
    ) -> Result<ContentRef, Error> {
        let stored = self.absolute_path(content_ref);
        let stored_len = tokio::fs::metadata(&stored)
            .await
            .map_err(|e| Error::storage(format!("failed to stat {}", stored.display()), e))?
            .len();
        if stored_len != source_len {
            return Err(Error::Storage(format!(
                "{} is already interned as {} but has a different size ({source_len} vs {stored_len})",
                source.display(),
                stored.display()
            )));
        }
        tracing::debug!(source = %source.display(), content_ref = %content_ref, "content already present");
        Ok(content_ref.clone())
    }
}

/// Streaming SHA-256 of a file, run on the blocking pool.
pub async fn digest_file(path: PathBuf) -> Result<ArtifactKey, Error> {
    tokio::task::spawn_blocking(move || {
        let mut file =
            File::open(&path).map_err(|e| Error::storage(format!("failed to open {}", path.display()), e))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(|e| Error::storage(format!("failed to read {}", path.display()), e))?;
        Ok(ArtifactKey::from_digest(&hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Storage(format!("digest task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_file_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("p1.png");
        std::fs::write(&source, b"not really a png").unwrap();
        let store = ContentStore::new(dir.path().join("content"));

        let r = store.add_file("docA", &source).await.unwrap();
        let expected = hex::encode(Sha256::digest(b"not really a png"));
        assert_eq!(r.key().as_str(), expected);
        assert_eq!(r.extension(), "png");
        assert_eq!(store.read(&r).await.unwrap(), b"not really a png");

        let again = store.add_file("docA", &source).await.unwrap();
        assert_eq!(again, r);
    }

    #[tokio::test]
    async fn test_add_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let err = store.add_file("docA", &dir.path().join("nope.png")).await.unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
    }

    #[tokio::test]
    async fn test_add_file_detects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("p1.png");
        std::fs::write(&source, b"abc").unwrap();
        let store = ContentStore::new(dir.path().join("content"));

        let r = store.add_file("docA", &source).await.unwrap();
        std::fs::write(store.absolute_path(&r), b"abcdef").unwrap();

        let err = store.add_file("docA", &source).await.unwrap_err();
        assert!(matches!(err, Error::Storage(msg) if msg.contains("different size")));
    }
}
