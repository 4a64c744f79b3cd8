//! Scanned document import.
//!
//! Inserts the document row, derives one JPEG per page into the content
//! store under a root named by the document's friendly id, measures it, then
//! records a page row pointing at the derived image.
//!
//! Pages are derived concurrently (bounded) but recorded strictly in page
//! order. The first page failure stops the import: pages before it keep
//! their rows and artifacts, and importing the same document again resumes
//! after the last recorded page without reconverting anything.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use folio_core::content::validate_root;
use folio_core::db::{NewDocument, NewPage, ScannedPage};
use folio_core::{ContentRef, ContentStore, Error, MetadataDb, Transformation};
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};

use crate::args::require_source;
use crate::image::{MAX_MAGNIFICATION, page_image_args};
use crate::size::{ImageSize, ImageSizer};

/// Per-page rotation, in degrees clockwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rotation {
    /// Pages are already upright.
    #[default]
    None,
    /// Every page turns by the same amount.
    Uniform { degrees: i64 },
    /// Facing pages scanned in opposite orientations (odd pages, then even pages).
    Alternating { odd: i64, even: i64 },
}

impl Rotation {
    /// Rotation for a 1-based page number, or None if the page stays as is.
    pub fn for_page(&self, page_number: i64) -> Option<i64> {
        let degrees = match *self {
            Rotation::None => return None,
            Rotation::Uniform { degrees } => degrees,
            Rotation::Alternating { odd, even } => {
                if page_number % 2 == 1 {
                    odd
                } else {
                    even
                }
            }
        };
        Some(degrees.rem_euclid(360)).filter(|d| *d != 0)
    }
}

/// Everything needed to import one scanned document.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ImportRequest {
    pub document: NewDocument,
    /// Page files relative to `<imports_dir>/<friendly_document_id>/`, in page order.
    pub page_files: Vec<String>,
    #[serde(default)]
    pub rotation: Rotation,
    /// How many times each page is doubled in size (`-magnify`), at most 4.
    #[serde(default)]
    pub magnification: u32,
}

/// One recorded page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ImportedPage {
    pub page_id: i64,
    pub page_number: i64,
    pub import_path: String,
    pub image_ref: String,
    pub width: i64,
    pub height: i64,
}

impl From<ScannedPage> for ImportedPage {
    fn from(page: ScannedPage) -> Self {
        Self {
            page_id: page.page_id,
            page_number: page.page_number,
            import_path: page.import_path,
            image_ref: page.image_ref,
            width: page.width,
            height: page.height,
        }
    }
}

/// Result of an import.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ImportReport {
    pub document_id: i64,
    pub friendly_document_id: String,
    /// Pages in page order.
    pub pages: Vec<ImportedPage>,
}

/// Importer settings taken from configuration.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub imports_dir: PathBuf,
    pub jpeg_quality: u32,
    pub page_concurrency: usize,
}

/// A page that is ready to be recorded.
enum Prepared {
    Recorded(ScannedPage),
    Derived { import_path: String, image_ref: ContentRef, size: ImageSize },
}

/// Import orchestrator.
#[derive(Clone)]
pub struct Importer {
    db: MetadataDb,
    content: ContentStore,
    page_image: Arc<dyn Transformation>,
    sizer: Arc<dyn ImageSizer>,
    settings: ImportSettings,
}

impl Importer {
    pub fn new(
        db: MetadataDb, content: ContentStore, page_image: Arc<dyn Transformation>, sizer: Arc<dyn ImageSizer>,
        settings: ImportSettings,
    ) -> Self {
        Self { db, content, page_image, sizer, settings }
    }

    /// Import (or resume importing) a scanned document.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an unusable friendly id, page path or magnification
    /// - `MissingSource` if a page file does not exist
    /// - any derivation or database error for the first page that failed
    pub async fn import_document(&self, request: &ImportRequest) -> Result<ImportReport, Error> {
        let friendly_id = request.document.friendly_document_id.as_str();
        validate_root(friendly_id)?;
        for import_path in &request.page_files {
            validate_import_path(import_path)?;
        }
        if request.magnification > MAX_MAGNIFICATION {
            return Err(Error::InvalidInput(format!(
                "magnification {} exceeds the limit of {MAX_MAGNIFICATION}",
                request.magnification
            )));
        }

        let started = Instant::now();
        let (document_id, existing) = match self.db.get_document_by_friendly_id(friendly_id).await? {
            Some(document) => {
                let pages = self.db.list_pages(document.document_id).await?;
                tracing::info!(document = friendly_id, recorded = pages.len(), "resuming import");
                let pages: HashMap<i64, ScannedPage> = pages.into_iter().map(|p| (p.page_number, p)).collect();
                (document.document_id, pages)
            }
            None => (self.db.insert_document(&request.document).await?, HashMap::new()),
        };
        tracing::info!(document = friendly_id, document_id, pages = request.page_files.len(), "importing document");

        let jobs: Vec<(i64, String, Option<ScannedPage>)> = request
            .page_files
            .iter()
            .enumerate()
            .map(|(index, import_path)| {
                let page_number = index as i64 + 1;
                (page_number, import_path.clone(), existing.get(&page_number).cloned())
            })
            .collect();
        let rotation = request.rotation;
        let magnification = request.magnification;

        let prepared = stream::iter(jobs)
            .map(move |(page_number, import_path, recorded)| async move {
                match recorded {
                    Some(row) if row.import_path == import_path => Ok(Prepared::Recorded(row)),
                    Some(row) => Err(Error::InvalidInput(format!(
                        "page {page_number} of {friendly_id} was already imported from {}",
                        row.import_path
                    ))),
                    None => {
                        let rotation = rotation.for_page(page_number);
                        self.derive_page(friendly_id, page_number, import_path, rotation, magnification)
                            .await
                    }
                }
            })
            .buffered(self.settings.page_concurrency.max(1));
        let mut prepared = std::pin::pin!(prepared);

        let mut pages = Vec::with_capacity(request.page_files.len());
        let mut page_number = 0;
        while let Some(next) = prepared.next().await {
            page_number += 1;
            let page = match next {
                Ok(Prepared::Recorded(row)) => ImportedPage::from(row),
                Ok(Prepared::Derived { import_path, image_ref, size }) => {
                    self.record_page(document_id, page_number, import_path, &image_ref, size)
                        .await?
                }
                Err(e) => {
                    tracing::warn!(document = friendly_id, page = page_number, error = %e, "import stopped");
                    return Err(e);
                }
            };
            pages.push(page);
        }

        tracing::info!(
            document = friendly_id,
            pages = pages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "imported document"
        );
        Ok(ImportReport { document_id, friendly_document_id: friendly_id.to_string(), pages })
    }

    async fn derive_page(
        &self, friendly_id: &str, page_number: i64, import_path: String, rotation: Option<i64>, magnification: u32,
    ) -> Result<Prepared, Error> {
        let source = self.settings.imports_dir.join(friendly_id).join(&import_path);
        require_source(&source).await?;

        let args = page_image_args(&source.to_string_lossy(), self.settings.jpeg_quality, rotation, magnification);
        let image_ref = self
            .content
            .get_derived(friendly_id, self.page_image.as_ref(), &args, "jpg")
            .await?;
        let size = self.sizer.image_size(&self.content.absolute_path(&image_ref)).await?;

        Ok(Prepared::Derived { import_path, image_ref, size })
    }

    async fn record_page(
        &self, document_id: i64, page_number: i64, import_path: String, image_ref: &ContentRef, size: ImageSize,
    ) -> Result<ImportedPage, Error> {
        let page = NewPage {
            document_id,
            page_number,
            source_url: None,
            import_path,
            image_ref: image_ref.to_string(),
            width: i64::from(size.width),
            height: i64::from(size.height),
            description: None,
        };
        let page_id = self.db.insert_page(&page).await?;
        tracing::debug!(page_id, page = page_number, image_ref = %image_ref, "recorded page");

        Ok(ImportedPage {
            page_id,
            page_number,
            import_path: page.import_path,
            image_ref: page.image_ref,
            width: page.width,
            height: page.height,
        })
    }
}

/// Page files must stay inside the document's import directory.
fn validate_import_path(import_path: &str) -> Result<(), Error> {
    let path = Path::new(import_path);
    let inside = !import_path.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if !inside {
        return Err(Error::InvalidInput(format!("page file {import_path:?} must be a relative path without '..'")));
    }
    Ok(())
}
