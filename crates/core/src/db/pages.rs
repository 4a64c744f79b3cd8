//! Scanned page rows.

use super::connection::MetadataDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A page ready to be recorded: its derived image is already committed.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NewPage {
    pub document_id: i64,
    /// 1-based position within the document.
    pub page_number: i64,
    pub source_url: Option<String>,
    /// Path of the scan the page image was derived from.
    pub import_path: String,
    /// Content reference of the derived page image.
    pub image_ref: String,
    pub width: i64,
    pub height: i64,
    pub description: Option<String>,
}

/// A stored scanned page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ScannedPage {
    pub page_id: i64,
    pub document_id: i64,
    pub page_number: i64,
    pub source_url: Option<String>,
    pub import_path: String,
    pub image_ref: String,
    pub width: i64,
    pub height: i64,
    pub description: Option<String>,
}

impl MetadataDb {
    /// Insert a page row and return its generated id.
    pub async fn insert_page(&self, page: &NewPage) -> Result<i64, Error> {
        let page = page.clone();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                let inserted = conn.execute(
                    "INSERT INTO scanned_page (
                    document_id, page_number, source_url, import_path,
                    image_ref, width, height, description
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        page.document_id,
                        page.page_number,
                        &page.source_url,
                        &page.import_path,
                        &page.image_ref,
                        page.width,
                        page.height,
                        &page.description,
                    ],
                );
                match inserted {
                    Ok(_) => Ok(conn.last_insert_rowid()),
                    Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                        Err(Error::InvalidInput(format!(
                            "page {} of document {} conflicts with an existing page or document",
                            page.page_number, page.document_id
                        )))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Pages of a document ordered by page number.
    pub async fn list_pages(&self, document_id: i64) -> Result<Vec<ScannedPage>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<ScannedPage>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT
                    page_id, document_id, page_number, source_url, import_path,
                    image_ref, width, height, description
                FROM scanned_page WHERE document_id = ?1 ORDER BY page_number",
                )?;
                let rows = stmt.query_map(params![document_id], |row| {
                    Ok(ScannedPage {
                        page_id: row.get(0)?,
                        document_id: row.get(1)?,
                        page_number: row.get(2)?,
                        source_url: row.get(3)?,
                        import_path: row.get(4)?,
                        image_ref: row.get(5)?,
                        width: row.get(6)?,
                        height: row.get(7)?,
                        description: row.get(8)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }
}
