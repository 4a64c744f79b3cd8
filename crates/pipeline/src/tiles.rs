//! Slicing page images into fixed-size tiles for the page viewer.
//!
//! A tile set is a directory artifact under the `image-tiles` root of the
//! derived store, holding `tile-<x>-<y>.jpg` for every grid cell.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use folio_core::{Arg, ContentRef, ContentStore, Error, MetadataDb, TransformOutput, Transformation};
use serde::{Deserialize, Serialize};

use crate::args::{expect_len, int_at, require_source, str_at};
use crate::process::Tool;
use crate::size::{ImageSize, ImageSizer};

/// Operation name of tiling.
pub const GET_TILES_FOR_IMAGE: &str = "getTilesForImageCmd";

/// Derived store root for tile sets.
pub const IMAGE_TILES_ROOT: &str = "image-tiles";

const TILE_QUALITY: &str = "80";

/// Number of tile columns and rows covering an image.
pub fn tile_grid(size: ImageSize, tile_width: u32, tile_height: u32) -> (u32, u32) {
    (size.width.div_ceil(tile_width), size.height.div_ceil(tile_height))
}

/// Cuts an image into a directory of tiles with `convert +gravity -crop`.
pub struct TileImage {
    convert: Tool,
    sizer: Arc<dyn ImageSizer>,
}

impl TileImage {
    pub fn new(convert: Tool, sizer: Arc<dyn ImageSizer>) -> Self {
        Self { convert, sizer }
    }
}

#[async_trait]
impl Transformation for TileImage {
    fn name(&self) -> &str {
        GET_TILES_FOR_IMAGE
    }

    async fn produce(&self, target: &Path, args: &[Arg]) -> Result<TransformOutput, Error> {
        expect_len(GET_TILES_FOR_IMAGE, args, 3)?;
        let image = Path::new(str_at(GET_TILES_FOR_IMAGE, args, 0)?);
        let tile_width = positive(int_at(GET_TILES_FOR_IMAGE, args, 1)?)?;
        let tile_height = positive(int_at(GET_TILES_FOR_IMAGE, args, 2)?)?;
        require_source(image).await?;

        tokio::fs::create_dir(target)
            .await
            .map_err(|e| Error::storage(format!("failed to create tile directory {}", target.display()), e))?;

        let crop_args: Vec<OsString> = vec![
            image.into(),
            "+gravity".into(),
            "-crop".into(),
            format!("{tile_width}x{tile_height}").into(),
            "-quality".into(),
            TILE_QUALITY.into(),
            target.join("tile-%d.jpg").into(),
        ];
        self.convert.run(&crop_args).await?;

        let size = self.sizer.image_size(image).await?;
        let (columns, rows) = tile_grid(size, tile_width, tile_height);
        let produced = count_entries(target).await?;
        let expected = u64::from(columns) * u64::from(rows);
        if produced != expected {
            return Err(Error::TransformFailed(format!(
                "{}: expected {expected} tiles for a {}x{} image with {tile_width}x{tile_height} tiles, got {produced}",
                target.display(),
                size.width,
                size.height
            )));
        }

        // convert numbers tiles row-major; name them by grid position instead
        for y in 0..rows {
            for x in 0..columns {
                let numbered = target.join(format!("tile-{}.jpg", y * columns + x));
                let positioned = target.join(format!("tile-{x}-{y}.jpg"));
                tokio::fs::rename(&numbered, &positioned)
                    .await
                    .map_err(|e| Error::storage(format!("failed to rename {}", numbered.display()), e))?;
            }
        }

        tracing::debug!(image = %image.display(), columns, rows, "tiled image");
        Ok(TransformOutput::Written)
    }
}

fn positive(value: i64) -> Result<u32, Error> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| Error::InvalidInput(format!("{GET_TILES_FOR_IMAGE}: tile dimension {value} must be positive")))
}

async fn count_entries(dir: &Path) -> Result<u64, Error> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::storage(format!("failed to list {}", dir.display()), e))?;
    let mut count = 0;
    while entries
        .next_entry()
        .await
        .map_err(|e| Error::storage(format!("failed to list {}", dir.display()), e))?
        .is_some()
    {
        count += 1;
    }
    Ok(count)
}

/// Tile sets produced for one document.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PrewarmReport {
    pub friendly_document_id: String,
    /// Tile set reference per page, in page order.
    pub tile_sets: Vec<String>,
}

/// Tile sets in the derived store, at one configured tile size.
#[derive(Clone)]
pub struct Tiler {
    derived: ContentStore,
    transformation: Arc<dyn Transformation>,
    tile_width: u32,
    tile_height: u32,
}

impl Tiler {
    pub fn new(
        derived: ContentStore, transformation: Arc<dyn Transformation>, tile_width: u32, tile_height: u32,
    ) -> Self {
        Self { derived, transformation, tile_width, tile_height }
    }

    /// Tile directory for `image`, cutting it on first request.
    pub async fn tiles_for_image(&self, image: &Path) -> Result<ContentRef, Error> {
        let args = [
            Arg::from(image.to_string_lossy().into_owned()),
            Arg::from(self.tile_width),
            Arg::from(self.tile_height),
        ];
        self.derived
            .get_derived(IMAGE_TILES_ROOT, self.transformation.as_ref(), &args, "tiles")
            .await
    }

    /// Tile every page of a document so the viewer never waits on `convert`.
    ///
    /// Pages are processed in order and the first failure stops the run;
    /// tile sets already produced stay in the store.
    pub async fn prewarm_document(
        &self, db: &MetadataDb, content: &ContentStore, friendly_document_id: &str,
    ) -> Result<PrewarmReport, Error> {
        let document = db
            .get_document_by_friendly_id(friendly_document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no document {friendly_document_id}")))?;
        let pages = db.list_pages(document.document_id).await?;

        let mut tile_sets = Vec::with_capacity(pages.len());
        for page in pages {
            tracing::info!(document = friendly_document_id, page = page.page_number, "generating page tiles");
            let image_ref = ContentRef::parse(&page.image_ref)?;
            let tiles = self.tiles_for_image(&content.absolute_path(&image_ref)).await?;
            tile_sets.push(tiles.to_string());
        }

        Ok(PrewarmReport { friendly_document_id: friendly_document_id.to_string(), tile_sets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_script;
    use folio_core::db::{NewDocument, NewPage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedSizer(ImageSize);

    #[async_trait]
    impl ImageSizer for FixedSizer {
        async fn image_size(&self, _image: &Path) -> Result<ImageSize, Error> {
            Ok(self.0)
        }
    }

    /// Writes tile-0.jpg .. tile-(n-1).jpg into the directory given by the last argument.
    fn fake_convert(dir: &Path, tiles: u32) -> Tool {
        let body = format!(
            "for last; do :; done\nd=$(dirname \"$last\")\ni=0\n\
             while [ $i -lt {tiles} ]; do echo t > \"$d/tile-$i.jpg\"; i=$((i+1)); done\n"
        );
        Tool::new(write_script(dir, "convert", &body), Duration::from_secs(5))
    }

    #[test]
    fn test_tile_grid_rounds_up() {
        assert_eq!(tile_grid(ImageSize { width: 2550, height: 3300 }, 1024, 128), (3, 26));
        assert_eq!(tile_grid(ImageSize { width: 1024, height: 128 }, 1024, 128), (1, 1));
    }

    #[tokio::test]
    async fn test_tiles_named_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("page.jpg");
        std::fs::write(&image, b"jpg").unwrap();

        let sizer = Arc::new(FixedSizer(ImageSize { width: 300, height: 250 }));
        let tiler = Tiler::new(
            ContentStore::new(dir.path().join("derived")),
            Arc::new(TileImage::new(fake_convert(dir.path(), 6), sizer)),
            100,
            128,
        );

        let tiles = tiler.tiles_for_image(&image).await.unwrap();
        let tile_dir = dir.path().join("derived").join(tiles.to_string());
        assert!(tile_dir.join("tile-0-0.jpg").is_file());
        assert!(tile_dir.join("tile-2-1.jpg").is_file());
        assert!(!tile_dir.join("tile-5.jpg").exists());
    }

    #[tokio::test]
    async fn test_wrong_tile_count_fails_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("page.jpg");
        std::fs::write(&image, b"jpg").unwrap();

        let sizer = Arc::new(FixedSizer(ImageSize { width: 300, height: 250 }));
        let derived = ContentStore::new(dir.path().join("derived"));
        let tiler = Tiler::new(
            derived.clone(),
            Arc::new(TileImage::new(fake_convert(dir.path(), 4), sizer)),
            100,
            128,
        );

        let err = tiler.tiles_for_image(&image).await.unwrap_err();
        assert!(matches!(err, Error::TransformFailed(msg) if msg.contains("expected 6 tiles")));
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("derived").join(IMAGE_TILES_ROOT))
            .unwrap()
            .collect();
        assert!(entries.is_empty());
    }

    struct CountingTiles(AtomicUsize);

    #[async_trait]
    impl Transformation for CountingTiles {
        fn name(&self) -> &str {
            GET_TILES_FOR_IMAGE
        }

        async fn produce(&self, target: &Path, _args: &[Arg]) -> Result<TransformOutput, Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir(target).await.unwrap();
            Ok(TransformOutput::Written)
        }
    }

    #[tokio::test]
    async fn test_prewarm_document_tiles_each_page_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = MetadataDb::open_in_memory().await.unwrap();
        let content = ContentStore::new(dir.path().join("content"));
        let doc = db
            .insert_document(&NewDocument {
                friendly_document_id: "docA".into(),
                title: "A".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        for n in 1..=2 {
            let image_ref = content.reference_for("docA", "importPageImage", &[Arg::Int(n)], "jpg").unwrap();
            db.insert_page(&NewPage {
                document_id: doc,
                page_number: n,
                source_url: None,
                import_path: format!("p{n}.png"),
                image_ref: image_ref.to_string(),
                width: 100,
                height: 100,
                description: None,
            })
            .await
            .unwrap();
        }

        let counting = Arc::new(CountingTiles(AtomicUsize::new(0)));
        let tiler = Tiler::new(ContentStore::new(dir.path().join("derived")), counting.clone(), 1024, 128);

        let first = tiler.prewarm_document(&db, &content, "docA").await.unwrap();
        let second = tiler.prewarm_document(&db, &content, "docA").await.unwrap();
        assert_eq!(first.tile_sets.len(), 2);
        assert_eq!(first.tile_sets, second.tile_sets);
        assert_eq!(counting.0.load(Ordering::SeqCst), 2);

        let err = tiler.prewarm_document(&db, &content, "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
