//! Content store MCP tools.
//!
//! This module provides tools for inspecting and cleaning the two stores.

pub mod resolve;
pub mod sweep;

pub use resolve::{ContentResolveParams, resolve_impl};
pub use sweep::{ContentSweepParams, sweep_impl};

use folio_core::ContentStore;
use folio_pipeline::Folio;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which store a tool call addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoreName {
    /// Imported page images.
    #[default]
    Content,
    /// Sizes, tiles and compressed audio.
    Derived,
}

impl StoreName {
    pub(crate) fn select(self, folio: &Folio) -> &ContentStore {
        match self {
            StoreName::Content => &folio.content,
            StoreName::Derived => &folio.derived,
        }
    }
}
