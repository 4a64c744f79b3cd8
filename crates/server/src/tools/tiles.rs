//! prewarm_tiles tool implementation.
//!
//! Cuts every page of an imported document into viewer tiles ahead of time.

use folio_core::{ContentStore, MetadataDb};
use folio_pipeline::Tiler;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the prewarm_tiles tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PrewarmTilesParams {
    /// Friendly id of an imported document.
    pub friendly_document_id: String,
}

/// Implementation of the prewarm_tiles tool.
pub async fn prewarm_impl(
    tiler: &Tiler, db: &MetadataDb, content: &ContentStore, params: PrewarmTilesParams,
) -> Result<CallToolResult, McpError> {
    let report = tiler.prewarm_document(db, content, &params.friendly_document_id).await?;
    json_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use folio_core::db::NewDocument;

    #[tokio::test]
    async fn test_prewarm_unknown_document() {
        let dir = tempfile::tempdir().unwrap();
        let folio = testing::folio(dir.path()).await;
        let params = PrewarmTilesParams { friendly_document_id: "Rand".into() };

        let err = prewarm_impl(&folio.tiler, &folio.db, &folio.content, params).await.unwrap_err();
        assert_eq!(err.code.0, -32007);
    }

    #[tokio::test]
    async fn test_prewarm_document_without_pages() {
        let dir = tempfile::tempdir().unwrap();
        let folio = testing::folio(dir.path()).await;
        folio
            .db
            .insert_document(&NewDocument {
                friendly_document_id: "Rand".into(),
                title: "Rand".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let params = PrewarmTilesParams { friendly_document_id: "Rand".into() };
        let result = prewarm_impl(&folio.tiler, &folio.db, &folio.content, params).await.unwrap();
        let report: serde_json::Value = serde_json::from_str(&testing::text(&result)).unwrap();
        assert_eq!(report["tile_sets"].as_array().unwrap().len(), 0);
    }
}
