//! Core types and shared functionality for folio.
//!
//! This crate provides:
//! - The content-addressed derivation cache
//! - Metadata storage with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod content;
pub mod db;
pub mod error;

pub use config::AppConfig;
pub use content::{Arg, ArtifactKey, ContentRef, ContentStore, TransformOutput, Transformation};
pub use db::MetadataDb;
pub use error::Error;
