//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::{
    audio::{CompressAudioParams, compress_impl},
    content::{ContentResolveParams, ContentSweepParams, resolve_impl, sweep_impl},
    import::import_impl,
    size::{ImageSizeParams, image_size_impl},
    tiles::{PrewarmTilesParams, prewarm_impl},
};

use folio_pipeline::{Folio, ImportRequest};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for folio.
#[derive(Clone)]
pub struct FolioServer {
    folio: Folio,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl FolioServer {
    /// Create a new server handler over opened stores.
    pub fn new(folio: Folio) -> Self {
        Self { folio, tool_router: Self::tool_router() }
    }

    /// Import a scanned document.
    ///
    /// Page files are read from `<imports_dir>/<friendly_document_id>/`. Re-running an
    /// interrupted import resumes after the last recorded page.
    #[tool(description = "Import a scanned document: convert each page file to JPEG, measure it and record page rows. \
                          Re-running resumes an interrupted import without reconverting pages.")]
    async fn import_document(&self, params: Parameters<ImportRequest>) -> Result<CallToolResult, McpError> {
        import_impl(&self.folio.importer, params.0).await
    }

    /// Cut every page of a document into viewer tiles.
    #[tool(description = "Pre-generate viewer tiles for every page of an imported document.")]
    async fn prewarm_tiles(&self, params: Parameters<PrewarmTilesParams>) -> Result<CallToolResult, McpError> {
        prewarm_impl(&self.folio.tiler, &self.folio.db, &self.folio.content, params.0).await
    }

    /// Report the pixel size of a stored image.
    #[tool(description = "Get the width and height of an image in the content store, by content reference.")]
    async fn image_size(&self, params: Parameters<ImageSizeParams>) -> Result<CallToolResult, McpError> {
        image_size_impl(self.folio.sizer.as_ref(), &self.folio.content, params.0).await
    }

    /// Compress a recording to mp3.
    #[tool(description = "Compress an audio recording to mp3 (cached by source path).")]
    async fn compress_audio(&self, params: Parameters<CompressAudioParams>) -> Result<CallToolResult, McpError> {
        compress_impl(&self.folio.audio, &self.folio.derived, params.0).await
    }

    /// Remove leftover staging output.
    #[tool(description = "Remove staging output left by interrupted derivations. Keys being derived are skipped.")]
    async fn content_sweep(&self, params: Parameters<ContentSweepParams>) -> Result<CallToolResult, McpError> {
        sweep_impl(&self.folio, params.0).await
    }

    /// Resolve a content reference to a file path.
    #[tool(description = "Resolve a content reference (<root>/<key>.<ext>) to its path and report whether it exists.")]
    async fn content_resolve(&self, params: Parameters<ContentResolveParams>) -> Result<CallToolResult, McpError> {
        resolve_impl(&self.folio, params.0).await
    }
}

impl ServerHandler for FolioServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "folio-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
