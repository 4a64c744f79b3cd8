//! content_resolve tool implementation.
//!
//! Maps a content reference back to its location on disk.

use std::path::PathBuf;

use folio_core::ContentRef;
use folio_pipeline::Folio;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::StoreName;
use crate::tools::json_result;

/// Parameters for the content_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentResolveParams {
    /// Reference in `<root>/<key>.<ext>` form.
    pub content_ref: String,

    /// Store the reference belongs to (default: content).
    #[serde(default)]
    pub store: StoreName,
}

/// Output from the content_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentResolveOutput {
    pub root: String,
    pub key: String,
    pub extension: String,
    pub path: PathBuf,
    /// Whether a committed artifact is present.
    pub exists: bool,
}

/// Implementation of the content_resolve tool.
pub async fn resolve_impl(folio: &Folio, params: ContentResolveParams) -> Result<CallToolResult, McpError> {
    let content_ref = ContentRef::parse(&params.content_ref)?;
    let store = params.store.select(folio);
    let output = ContentResolveOutput {
        root: content_ref.root().to_string(),
        key: content_ref.key().to_string(),
        extension: content_ref.extension().to_string(),
        path: store.absolute_path(&content_ref),
        exists: store.contains(&content_ref).await?,
    };
    json_result(&output)
}
