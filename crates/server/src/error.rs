//! Structured errors raised by the tool layer itself.
//!
//! Domain failures arrive as `folio_core::Error` and convert directly.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors that only exist at the MCP boundary.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Parameters that are well-formed JSON but make no sense together.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A tool output could not be rendered as JSON.
    #[error("SERIALIZE_FAILED: {0}")]
    Serialize(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Serialize(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
