//! mp3 compression of recordings with lame.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use folio_core::{Arg, ContentRef, ContentStore, Error, TransformOutput, Transformation};

use crate::args::{expect_len, require_source, str_at};
use crate::process::Tool;

/// Operation name of audio compression.
pub const COMPRESS_AUDIO: &str = "compressAudioCmd";

/// Derived store root for compressed recordings.
pub const COMPRESSED_AUDIO_ROOT: &str = "compressed-audio";

/// `lame -V 7 -S <source> <target>`.
#[derive(Debug, Clone)]
pub struct CompressAudio {
    lame: Tool,
}

impl CompressAudio {
    pub fn new(lame: Tool) -> Self {
        Self { lame }
    }
}

#[async_trait]
impl Transformation for CompressAudio {
    fn name(&self) -> &str {
        COMPRESS_AUDIO
    }

    async fn produce(&self, target: &Path, args: &[Arg]) -> Result<TransformOutput, Error> {
        expect_len(COMPRESS_AUDIO, args, 1)?;
        let source = Path::new(str_at(COMPRESS_AUDIO, args, 0)?);
        require_source(source).await?;

        let lame_args: Vec<OsString> = vec!["-V".into(), "7".into(), "-S".into(), source.into(), target.into()];
        self.lame.run(&lame_args).await?;
        Ok(TransformOutput::Written)
    }
}

/// Compressed copies of recordings, made on first request.
#[derive(Clone)]
pub struct AudioCompressor {
    derived: ContentStore,
    transformation: Arc<dyn Transformation>,
}

impl AudioCompressor {
    pub fn new(derived: ContentStore, transformation: Arc<dyn Transformation>) -> Self {
        Self { derived, transformation }
    }

    /// mp3 for the recording at `audio`.
    pub async fn compressed_recording(&self, audio: &Path) -> Result<ContentRef, Error> {
        let args = [Arg::from(audio.to_string_lossy().into_owned())];
        self.derived
            .get_derived(COMPRESSED_AUDIO_ROOT, self.transformation.as_ref(), &args, "mp3")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_script;
    use std::time::Duration;

    #[tokio::test]
    async fn test_compressed_recording_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("word.wav");
        std::fs::write(&recording, b"RIFF").unwrap();

        // stand-in for lame: append to a call log, then write the target (last argument)
        let log = dir.path().join("calls");
        let body = format!("echo \"$@\" >> \"{}\"\nfor last; do :; done\necho mp3 > \"$last\"\n", log.display());
        let lame = Tool::new(write_script(dir.path(), "lame", &body), Duration::from_secs(5));

        let compressor = AudioCompressor::new(
            ContentStore::new(dir.path().join("derived")),
            Arc::new(CompressAudio::new(lame)),
        );
        let first = compressor.compressed_recording(&recording).await.unwrap();
        let second = compressor.compressed_recording(&recording).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.root(), COMPRESSED_AUDIO_ROOT);
        assert_eq!(first.extension(), "mp3");
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 1);
        assert!(calls.starts_with("-V 7 -S "));
    }

    #[tokio::test]
    async fn test_missing_recording() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = AudioCompressor::new(
            ContentStore::new(dir.path()),
            Arc::new(CompressAudio::new(Tool::new("/nonexistent/lame", Duration::from_secs(1)))),
        );
        let err = compressor.compressed_recording(&dir.path().join("gone.wav")).await.unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
    }
}
