//! Import pipeline for folio.
//!
//! This crate provides:
//! - A bounded external tool runner
//! - Transformations backed by ImageMagick and lame
//! - Cached image sizes, page tiles and compressed audio
//! - The scanned document importer

mod args;
pub mod audio;
pub mod folio;
pub mod image;
pub mod import;
pub mod process;
pub mod size;
pub mod tiles;

#[cfg(test)]
mod testutil;

pub use audio::{AudioCompressor, CompressAudio};
pub use folio::Folio;
pub use image::{ImportPageImage, page_image_args};
pub use import::{ImportReport, ImportRequest, ImportSettings, ImportedPage, Importer, Rotation};
pub use process::{Tool, ToolError, ToolOutput};
pub use size::{CachedImageSizer, ImageSize, ImageSizeProbe, ImageSizer};
pub use tiles::{PrewarmReport, TileImage, Tiler};
