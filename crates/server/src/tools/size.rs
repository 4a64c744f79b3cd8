//! image_size tool implementation.
//!
//! Reports the pixel size of a stored page image, measuring it at most once.

use folio_core::{ContentRef, ContentStore};
use folio_pipeline::ImageSizer;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the image_size tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageSizeParams {
    /// Content reference of an image in the content store (`<root>/<key>.<ext>`).
    pub image_ref: String,
}

/// Implementation of the image_size tool.
pub async fn image_size_impl(
    sizer: &dyn ImageSizer, content: &ContentStore, params: ImageSizeParams,
) -> Result<CallToolResult, McpError> {
    let image_ref = ContentRef::parse(&params.image_ref)?;
    let size = sizer.image_size(&content.absolute_path(&image_ref)).await?;
    json_result(&size)
}
