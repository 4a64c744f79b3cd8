//! compress_audio tool implementation.

use std::path::{Path, PathBuf};

use folio_core::ContentStore;
use folio_pipeline::AudioCompressor;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for the compress_audio tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompressAudioParams {
    /// Path of the source recording.
    pub path: String,
}

/// Output from the compress_audio tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompressAudioOutput {
    /// Reference of the mp3 in the derived store.
    pub content_ref: String,
    /// Location of the mp3 on disk.
    pub path: PathBuf,
}

/// Implementation of the compress_audio tool.
pub async fn compress_impl(
    audio: &AudioCompressor, derived: &ContentStore, params: CompressAudioParams,
) -> Result<CallToolResult, McpError> {
    if params.path.trim().is_empty() {
        return Err(ToolError::InvalidInput("path must not be empty".into()).into());
    }
    let mp3 = audio.compressed_recording(Path::new(&params.path)).await?;
    json_result(&CompressAudioOutput { path: derived.absolute_path(&mp3), content_ref: mp3.to_string() })
}
