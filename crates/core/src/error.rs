//! Unified error types for folio.
//!
//! Every variant carries plain text so the error is `Clone`: a failed
//! derivation is handed to every caller that was waiting on the same key.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the folio workspace.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty operation name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The input artifact to transform does not exist.
    #[error("MISSING_SOURCE: {0}")]
    MissingSource(String),

    /// External process exited non-zero, timed out, or produced no output.
    #[error("TRANSFORM_FAILED: {0}")]
    TransformFailed(String),

    /// A per-key claim could not be acquired or released.
    #[error("CLAIM_FAILED: {0}")]
    ClaimFailed(String),

    /// Staging output could not be made durable or renamed into place.
    #[error("COMMIT_FAILED: {0}")]
    CommitFailed(String),

    /// Other I/O against the content tree.
    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    /// Malformed content reference.
    #[error("INVALID_CONTENT_REF: {0}")]
    InvalidContentRef(String),

    /// Database operation failed.
    #[error("DATABASE_ERROR: {0}")]
    Database(String),

    /// Migration failed to apply.
    #[error("DATABASE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A row the caller asked for does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
}

impl Error {
    /// Builds a [`Error::Storage`] from an I/O error and a short description of the operation.
    pub fn storage(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Error::Storage(format!("{context}: {err}"))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database("connection closed".into()),
            tokio_rusqlite::Error::Close(_) => Error::Database("failed to close connection".into()),
            _ => Error::Database("connection closed".into()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::MissingSource(msg) => (-32001, msg.clone()),
            Error::TransformFailed(msg) => (-32002, msg.clone()),
            Error::ClaimFailed(msg) => (-32003, msg.clone()),
            Error::CommitFailed(msg) => (-32004, msg.clone()),
            Error::Storage(msg) => (-32005, msg.clone()),
            Error::InvalidContentRef(msg) => (-32006, msg.clone()),
            Error::NotFound(msg) => (-32007, msg.clone()),
            Error::Database(msg) => (-32008, msg.clone()),
            Error::MigrationFailed(msg) => (-32008, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
