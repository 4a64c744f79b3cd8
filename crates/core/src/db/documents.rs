//! Scanned document rows.

use super::connection::MetadataDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Fields supplied when a document is first imported.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NewDocument {
    /// Human-chosen identifier, unique across documents (e.g. `PacifiquesGeography`).
    pub friendly_document_id: String,
    pub title: String,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub source_credit: Option<String>,
    pub source_notes: Option<String>,
    pub source_page_root_url: Option<String>,
}

/// A stored scanned document.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ScannedDocument {
    pub document_id: i64,
    pub friendly_document_id: String,
    pub title: String,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub source_credit: Option<String>,
    pub source_notes: Option<String>,
    pub source_page_root_url: Option<String>,
    pub imported_at: String,
}

impl MetadataDb {
    /// Insert a document row and return its generated id.
    ///
    /// A duplicate `friendly_document_id` is rejected as `InvalidInput`.
    pub async fn insert_document(&self, document: &NewDocument) -> Result<i64, Error> {
        if document.friendly_document_id.trim().is_empty() {
            return Err(Error::InvalidInput("friendly_document_id must not be empty".into()));
        }
        let document = document.clone();
        let imported_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                let inserted = conn.execute(
                    "INSERT INTO scanned_document (
                    friendly_document_id, title, source_url, source_title,
                    source_credit, source_notes, source_page_root_url, imported_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        &document.friendly_document_id,
                        &document.title,
                        &document.source_url,
                        &document.source_title,
                        &document.source_credit,
                        &document.source_notes,
                        &document.source_page_root_url,
                        imported_at,
                    ],
                );
                match inserted {
                    Ok(_) => Ok(conn.last_insert_rowid()),
                    Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                        Err(Error::InvalidInput(format!(
                            "document {} already exists",
                            document.friendly_document_id
                        )))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a document by its friendly id.
    ///
    /// Returns None if no such document was imported.
    pub async fn get_document_by_friendly_id(&self, friendly_id: &str) -> Result<Option<ScannedDocument>, Error> {
        let friendly_id = friendly_id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ScannedDocument>, Error> {
                let result = conn.query_row(
                    "SELECT
                    document_id, friendly_document_id, title, source_url, source_title,
                    source_credit, source_notes, source_page_root_url, imported_at
                FROM scanned_document WHERE friendly_document_id = ?1",
                    params![friendly_id],
                    |row| {
                        Ok(ScannedDocument {
                            document_id: row.get(0)?,
                            friendly_document_id: row.get(1)?,
                            title: row.get(2)?,
                            source_url: row.get(3)?,
                            source_title: row.get(4)?,
                            source_credit: row.get(5)?,
                            source_notes: row.get(6)?,
                            source_page_root_url: row.get(7)?,
                            imported_at: row.get(8)?,
                        })
                    },
                );

                match result {
                    Ok(d) => Ok(Some(d)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}
