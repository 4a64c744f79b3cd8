//! SQLite-backed metadata for imported documents.
//!
//! Holds the two tables the importer writes: one row per scanned document
//! and one row per page, each page pointing at its derived image by
//! content reference. Access is async via tokio-rusqlite.

pub mod connection;
pub mod documents;
pub mod migrations;
pub mod pages;

pub use connection::MetadataDb;
pub use documents::{NewDocument, ScannedDocument};
pub use pages::{NewPage, ScannedPage};
