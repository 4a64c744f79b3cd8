//! Wiring of stores, tools and services from configuration.

use std::sync::Arc;

use folio_core::{AppConfig, ContentStore, Error, MetadataDb};

use crate::audio::{AudioCompressor, CompressAudio};
use crate::image::ImportPageImage;
use crate::import::{ImportSettings, Importer};
use crate::process::Tool;
use crate::size::{CachedImageSizer, ImageSizeProbe};
use crate::tiles::{TileImage, Tiler};

/// Everything the outer surfaces need, built once per process.
///
/// Holds one [`ContentStore`] per base directory so every task shares the
/// same single-flight registry.
#[derive(Clone)]
pub struct Folio {
    pub config: AppConfig,
    pub db: MetadataDb,
    /// Imported page images.
    pub content: ContentStore,
    /// Sizes, tiles and compressed audio.
    pub derived: ContentStore,
    pub sizer: Arc<CachedImageSizer>,
    pub importer: Importer,
    pub tiler: Tiler,
    pub audio: AudioCompressor,
}

impl Folio {
    /// Open the metadata database and set up both stores.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let db = MetadataDb::open(&config.db_path).await?;
        Ok(Self::with_db(config, db))
    }

    pub fn with_db(config: AppConfig, db: MetadataDb) -> Self {
        let timeout = config.transform_timeout();
        let convert = Tool::new(&config.image_magick_path, timeout);
        let lame = Tool::new(&config.lame_path, timeout);

        let content = ContentStore::new(&config.content_dir);
        let derived = ContentStore::new(&config.derived_dir);

        let sizer = Arc::new(CachedImageSizer::new(
            derived.clone(),
            Arc::new(ImageSizeProbe::new(convert.clone())),
        ));
        let importer = Importer::new(
            db.clone(),
            content.clone(),
            Arc::new(ImportPageImage::new(convert.clone())),
            sizer.clone(),
            ImportSettings {
                imports_dir: config.imports_dir.clone(),
                jpeg_quality: config.jpeg_quality,
                page_concurrency: config.page_concurrency,
            },
        );
        let tiler = Tiler::new(
            derived.clone(),
            Arc::new(TileImage::new(convert, sizer.clone())),
            config.tile_width,
            config.tile_height,
        );
        let audio = AudioCompressor::new(derived.clone(), Arc::new(CompressAudio::new(lame)));

        tracing::info!(
            content = %config.content_dir.display(),
            derived = %config.derived_dir.display(),
            "folio stores ready"
        );
        Self { config, db, content, derived, sizer, importer, tiler, audio }
    }
}
