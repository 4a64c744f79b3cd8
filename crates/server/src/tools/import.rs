//! import_document tool implementation.
//!
//! Imports a scanned document from `<imports_dir>/<friendly_document_id>/`.

use folio_pipeline::{ImportRequest, Importer};
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Implementation of the import_document tool.
pub async fn import_impl(importer: &Importer, params: ImportRequest) -> Result<CallToolResult, McpError> {
    let report = importer.import_document(&params).await?;
    json_result(&report)
}
