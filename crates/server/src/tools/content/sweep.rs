//! content_sweep tool implementation.
//!
//! Removes staging output left behind by interrupted derivations.

use folio_core::content::SweepSummary;
use folio_pipeline::Folio;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::StoreName;
use crate::tools::json_result;

/// Parameters for the content_sweep tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContentSweepParams {
    /// Store to sweep. Both stores are swept when omitted.
    #[serde(default)]
    pub store: Option<StoreName>,
}

/// Output from the content_sweep tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentSweepOutput {
    pub content: Option<SweepSummary>,
    pub derived: Option<SweepSummary>,
}

/// Implementation of the content_sweep tool.
pub async fn sweep_impl(folio: &Folio, params: ContentSweepParams) -> Result<CallToolResult, McpError> {
    let wants = |name: StoreName| params.store.is_none_or(|s| s == name);

    let content = if wants(StoreName::Content) { Some(folio.content.sweep_staging().await?) } else { None };
    let derived = if wants(StoreName::Derived) { Some(folio.derived.sweep_staging().await?) } else { None };

    json_result(&ContentSweepOutput { content, derived })
}
