//! Get-or-compute of derived artifacts.
//!
//! Per `(root, key)` the executor moves through:
//!
//! 1. lookup: a committed artifact at the final path is returned as-is
//! 2. claim: join the in-process flight, then lock the claim file
//! 3. invoke: run the transformation against a private staging path
//! 4. commit: fsync + rename staging onto the final path (or discard it)
//! 5. release: drop the file lock and retire the flight
//!
//! A file only ever appears at its final path through a single rename, so
//! lookups never lock and never observe partial output.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use super::claim::FileClaim;
use super::key::{Arg, derive_key};
use super::reference::ContentRef;
use super::store::ContentStore;
use crate::Error;

/// What a transformation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// The transformation wrote its output (a file or a directory) at the target path.
    Written,
    /// The transformation returned its output; the store writes it to the target path.
    Bytes(Vec<u8>),
}

/// An expensive "produce output at path X given inputs" capability.
///
/// Implementations must not decide caching policy: they are called only on a
/// miss, with a staging `target` that is not yet visible to readers.
#[async_trait]
pub trait Transformation: Send + Sync {
    /// Operation name. Part of the cache key, so renaming it invalidates existing artifacts.
    fn name(&self) -> &str;

    /// Produce output for `args` at `target`.
    async fn produce(&self, target: &Path, args: &[Arg]) -> Result<TransformOutput, Error>;
}

impl ContentStore {
    /// Return the artifact for `transformation(args)` under `root`, computing it on a miss.
    ///
    /// Concurrent callers with identical inputs share one transformation run
    /// and all observe its result. Failures are not cached: the next call
    /// after a failure retries.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a bad root, extension, or empty operation name
    /// - `MissingSource` / `TransformFailed` from the transformation
    /// - `ClaimFailed` if the per-key claim cannot be taken or released
    /// - `CommitFailed` if the output cannot be moved into place
    pub async fn get_derived(
        &self, root: &str, transformation: &dyn Transformation, args: &[Arg], extension: &str,
    ) -> Result<ContentRef, Error> {
        let key = derive_key(transformation.name(), args)?;
        let content_ref = ContentRef::new(root, key, extension)?;
        let final_path = self.layout.final_path(&content_ref);

        if self.contains(&content_ref).await? {
            tracing::debug!(op = transformation.name(), content_ref = %content_ref, "derived artifact hit");
            return Ok(content_ref);
        }

        let flight = self.inflight.join(&final_path).await;
        let outcome = flight
            .get_or_init(|| self.derive_claimed(&content_ref, transformation, args))
            .await
            .clone();
        self.inflight.finish(&final_path, &flight).await;

        outcome
    }

    async fn derive_claimed(
        &self, content_ref: &ContentRef, transformation: &dyn Transformation, args: &[Arg],
    ) -> Result<ContentRef, Error> {
        let claim = FileClaim::acquire(self.layout.lock_path(content_ref.root(), content_ref.key())).await?;
        let result = self.derive_and_commit(content_ref, transformation, args).await;
        let released = claim.release();
        let content_ref = result?;
        released?;
        Ok(content_ref)
    }

    async fn derive_and_commit(
        &self, content_ref: &ContentRef, transformation: &dyn Transformation, args: &[Arg],
    ) -> Result<ContentRef, Error> {
        // another process may have committed while we waited for the claim
        if self.contains(content_ref).await? {
            tracing::debug!(content_ref = %content_ref, "derived artifact committed by another holder");
            return Ok(content_ref.clone());
        }

        let root_dir = self.layout.root_dir(content_ref.root());
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}", root_dir.display()), e))?;

        let staging = self.layout.staging_path(content_ref);
        if discard_staging(&staging).await? {
            tracing::warn!(staging = %staging.display(), "removed stale staging output from an interrupted derivation");
        }

        let started = Instant::now();
        let produced = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, transformation.produce(&staging, args))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::TransformFailed(format!(
                        "{} timed out after {}ms",
                        transformation.name(),
                        limit.as_millis()
                    )))
                }),
            None => transformation.produce(&staging, args).await,
        };

        let committed = match produced {
            Ok(output) => self.commit(&staging, content_ref, output).await,
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            if let Err(cleanup) = discard_staging(&staging).await {
                tracing::warn!(staging = %staging.display(), error = %cleanup, "failed to discard staging output");
            }
            tracing::warn!(op = transformation.name(), content_ref = %content_ref, error = %e, "derivation failed");
            return Err(e);
        }

        tracing::info!(
            op = transformation.name(),
            content_ref = %content_ref,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "derived artifact committed"
        );
        Ok(content_ref.clone())
    }

    /// Make staging output durable and rename it onto the final path.
    pub(crate) async fn commit(
        &self, staging: &Path, content_ref: &ContentRef, output: TransformOutput,
    ) -> Result<(), Error> {
        let final_path = self.layout.final_path(content_ref);

        match output {
            TransformOutput::Bytes(bytes) => {
                write_synced(staging, &bytes).await?;
            }
            TransformOutput::Written => {
                let meta = tokio::fs::symlink_metadata(staging).await.map_err(|_| {
                    Error::TransformFailed(format!(
                        "transformation reported success but wrote nothing at {}",
                        staging.display()
                    ))
                })?;
                if meta.is_file() {
                    let file = tokio::fs::File::open(staging)
                        .await
                        .map_err(|e| Error::CommitFailed(format!("failed to open {}: {e}", staging.display())))?;
                    file.sync_all()
                        .await
                        .map_err(|e| Error::CommitFailed(format!("failed to flush {}: {e}", staging.display())))?;
                }
            }
        }

        tokio::fs::rename(staging, &final_path).await.map_err(|e| {
            Error::CommitFailed(format!(
                "failed to move {} into place at {}: {e}",
                staging.display(),
                final_path.display()
            ))
        })?;

        if let Some(parent) = final_path.parent() {
            sync_dir(parent).await;
        }
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::CommitFailed(format!("failed to create {}: {e}", path.display())))?;
    file.write_all(bytes)
        .await
        .map_err(|e| Error::CommitFailed(format!("failed to write {}: {e}", path.display())))?;
    file.sync_all()
        .await
        .map_err(|e| Error::CommitFailed(format!("failed to flush {}: {e}", path.display())))
}

/// Best-effort fsync of a directory so a completed rename survives a crash.
async fn sync_dir(dir: &Path) {
    if let Ok(handle) = tokio::fs::File::open(dir).await {
        let _ = handle.sync_all().await;
    }
}

/// Remove a staging file or directory. Returns whether anything was removed.
pub(crate) async fn discard_staging(staging: &Path) -> Result<bool, Error> {
    let meta = match tokio::fs::symlink_metadata(staging).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::storage(format!("failed to stat {}", staging.display()), e)),
    };
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(staging).await
    } else {
        tokio::fs::remove_file(staging).await
    };
    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::storage(format!("failed to remove {}", staging.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Writes a fixed 10-byte file, counting real invocations.
    struct CountingWriter {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl CountingWriter {
        fn new(delay: Duration) -> Self {
            Self { calls: Arc::new(AtomicUsize::new(0)), delay }
        }
    }

    #[async_trait]
    impl Transformation for CountingWriter {
        fn name(&self) -> &str {
            "importPageImage"
        }

        async fn produce(&self, target: &Path, _args: &[Arg]) -> Result<TransformOutput, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            tokio::fs::write(target, b"0123456789").await.unwrap();
            Ok(TransformOutput::Written)
        }
    }

    /// Writes partial output, then fails.
    struct PartialThenFail {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Transformation for PartialThenFail {
        fn name(&self) -> &str {
            "importPageImage"
        }

        async fn produce(&self, target: &Path, _args: &[Arg]) -> Result<TransformOutput, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(target, b"01234").await.unwrap();
            tokio::time::sleep(self.delay).await;
            Err(Error::TransformFailed("convert: corrupt image".into()))
        }
    }

    struct ReturnsBytes;

    #[async_trait]
    impl Transformation for ReturnsBytes {
        fn name(&self) -> &str {
            "add"
        }

        async fn produce(&self, _target: &Path, args: &[Arg]) -> Result<TransformOutput, Error> {
            let sum: i64 = args.iter().filter_map(Arg::as_int).sum();
            Ok(TransformOutput::Bytes(sum.to_string().into_bytes()))
        }
    }

    struct WritesDirectory;

    #[async_trait]
    impl Transformation for WritesDirectory {
        fn name(&self) -> &str {
            "getTilesForImageCmd"
        }

        async fn produce(&self, target: &Path, _args: &[Arg]) -> Result<TransformOutput, Error> {
            tokio::fs::create_dir(target).await.unwrap();
            tokio::fs::write(target.join("tile-0-0.jpg"), b"t").await.unwrap();
            Ok(TransformOutput::Written)
        }
    }

    /// Leaves a directory at the target but returns bytes, so the store cannot write them.
    struct BytesOverDirectory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformation for BytesOverDirectory {
        fn name(&self) -> &str {
            "importPageImage"
        }

        async fn produce(&self, target: &Path, _args: &[Arg]) -> Result<TransformOutput, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir(target).await.unwrap();
            tokio::fs::write(target.join("partial"), b"01234").await.unwrap();
            Ok(TransformOutput::Bytes(b"0123456789".to_vec()))
        }
    }

    struct WritesNothing;

    #[async_trait]
    impl Transformation for WritesNothing {
        fn name(&self) -> &str {
            "noop"
        }

        async fn produce(&self, _target: &Path, _args: &[Arg]) -> Result<TransformOutput, Error> {
            Ok(TransformOutput::Written)
        }
    }

    fn page_args() -> Vec<Arg> {
        vec![Arg::from("imports/docA/p1.png")]
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::ZERO);

        let first = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap();
        let second = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.to_string(), second.to_string());
        let bytes = tokio::fs::read(store.absolute_path(&first)).await.unwrap();
        assert_eq!(bytes.len(), 10);
    }

    #[tokio::test]
    async fn test_reuse_across_store_instances() {
        let dir = tempfile::tempdir().unwrap();
        let stub = CountingWriter::new(Duration::ZERO);

        let first = ContentStore::new(dir.path())
            .get_derived("docA", &stub, &page_args(), "jpg")
            .await
            .unwrap();

        let restarted = ContentStore::new(dir.path());
        let second = restarted.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_roots_do_not_share_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::ZERO);

        let a = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap();
        let b = store.get_derived("docB", &stub, &page_args(), "jpg").await.unwrap();

        assert_eq!(a.key(), b.key());
        assert_ne!(store.absolute_path(&a), store.absolute_path(&b));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_leaves_nothing_visible() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = PartialThenFail { calls: AtomicUsize::new(0), delay: Duration::ZERO };

        for _ in 0..3 {
            let err = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap_err();
            assert!(matches!(err, Error::TransformFailed(_)));
        }

        // no negative caching: every call retried
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);

        let r = store.reference_for("docA", "importPageImage", &page_args(), "jpg").unwrap();
        assert!(!store.absolute_path(&r).exists());
        assert!(!store.layout.staging_path(&r).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = Arc::new(CountingWriter::new(Duration::from_millis(100)));

        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let stub = Arc::clone(&stub);
            handles.push(tokio::spawn(async move {
                store.get_derived("docA", stub.as_ref(), &page_args(), "jpg").await
            }));
        }

        let mut refs = Vec::new();
        for handle in handles {
            refs.push(handle.await.unwrap().unwrap());
        }
        let elapsed = started.elapsed();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert!(refs.windows(2).all(|w| w[0] == w[1]));
        assert!(elapsed < Duration::from_millis(190), "took {elapsed:?}");
        assert_eq!(store.inflight.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_concurrent_requests_take_one_delay() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::from_millis(100));

        let args = page_args();
        let started = Instant::now();
        let (a, b) = tokio::join!(
            store.get_derived("docA", &stub, &args, "jpg"),
            store.get_derived("docA", &stub, &args, "jpg"),
        );
        let elapsed = started.elapsed();

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(190), "took {elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = PartialThenFail { calls: AtomicUsize::new(0), delay: Duration::from_millis(50) };

        let args = page_args();
        let (a, b, c) = tokio::join!(
            store.get_derived("docA", &stub, &args, "jpg"),
            store.get_derived("docA", &stub, &args, "jpg"),
            store.get_derived("docA", &stub, &args, "jpg"),
        );

        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        for result in [a, b, c] {
            assert!(matches!(result, Err(Error::TransformFailed(msg)) if msg.contains("corrupt")));
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::ZERO);

        let p1 = store.get_derived("docA", &stub, &[Arg::from("p1.png")], "jpg").await.unwrap();
        let p2 = store.get_derived("docA", &stub, &[Arg::from("p2.png")], "jpg").await.unwrap();

        assert_ne!(p1, p2);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bytes_output_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());

        let r = store.get_derived("sums", &ReturnsBytes, &[Arg::Int(2), Arg::Int(2)], "txt").await.unwrap();
        assert_eq!(store.read(&r).await.unwrap(), b"4");
    }

    #[tokio::test]
    async fn test_directory_output_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());

        let r = store
            .get_derived("image-tiles", &WritesDirectory, &[Arg::from("p1.jpg")], "tiles")
            .await
            .unwrap();
        assert!(store.absolute_path(&r).join("tile-0-0.jpg").is_file());
    }

    #[tokio::test]
    async fn test_missing_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());

        let err = store.get_derived("docA", &WritesNothing, &[], "jpg").await.unwrap_err();
        assert!(matches!(err, Error::TransformFailed(_)));
    }

    #[tokio::test]
    async fn test_timeout_discards_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path()).with_timeout(Duration::from_millis(50));
        let stub = PartialThenFail { calls: AtomicUsize::new(0), delay: Duration::from_secs(5) };

        let err = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap_err();
        assert!(matches!(err, Error::TransformFailed(msg) if msg.contains("timed out")));

        let r = store.reference_for("docA", "importPageImage", &page_args(), "jpg").unwrap();
        assert!(!store.absolute_path(&r).exists());
        assert!(!store.layout.staging_path(&r).exists());
    }

    #[tokio::test]
    async fn test_stale_staging_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::ZERO);

        let r = store.reference_for("docA", "importPageImage", &page_args(), "jpg").unwrap();
        let staging = store.layout.staging_path(&r);
        std::fs::create_dir_all(staging.parent().unwrap()).unwrap();
        std::fs::write(&staging, b"half-written").unwrap();

        let got = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap();
        assert_eq!(got, r);
        assert_eq!(store.read(&r).await.unwrap(), b"0123456789");
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_invalid_root_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::ZERO);

        let err = store.get_derived("../escape", &stub, &page_args(), "jpg").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_separate_stores_on_one_base_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = ContentStore::new(dir.path());
        let second = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::from_millis(100));

        // no shared in-flight registry: only the claim file keeps them apart
        let args = page_args();
        let (a, b) = tokio::join!(
            first.get_derived("docA", &stub, &args, "jpg"),
            second.get_derived("docA", &stub, &args, "jpg"),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_claim_failure_never_runs_transformation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = CountingWriter::new(Duration::ZERO);
        std::fs::write(dir.path().join(crate::content::LOCKS_DIR), b"not a directory").unwrap();

        let err = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap_err();
        assert!(matches!(err, Error::ClaimFailed(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);

        let r = store.reference_for("docA", "importPageImage", &page_args(), "jpg").unwrap();
        assert!(!store.absolute_path(&r).exists());
    }

    #[tokio::test]
    async fn test_commit_failure_discards_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let stub = BytesOverDirectory { calls: AtomicUsize::new(0) };

        let err = store.get_derived("docA", &stub, &page_args(), "jpg").await.unwrap_err();
        assert!(matches!(err, Error::CommitFailed(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        let r = store.reference_for("docA", "importPageImage", &page_args(), "jpg").unwrap();
        assert!(!store.absolute_path(&r).exists());
        assert!(!store.layout.staging_path(&r).exists());
        assert_eq!(store.inflight.len().await, 0);
    }
}
