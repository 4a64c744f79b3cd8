//! Image dimensions, measured with ImageMagick and cached as derived artifacts.
//!
//! Measuring spawns `convert -ping`, which is slow enough to matter across a
//! few hundred pages. The JSON answer is stored under the `image-sizes` root
//! of the derived store, so re-imports and tiling measure without a spawn.
//! Only pass paths whose content never changes (content store artifacts).

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use folio_core::{Arg, ContentStore, Error, TransformOutput, Transformation};
use serde::{Deserialize, Serialize};

use crate::args::{expect_len, require_source, str_at};
use crate::process::Tool;

/// Operation name of the size probe.
pub const GET_IMAGE_SIZE: &str = "getImageSizeCmd";

/// Derived store root for cached sizes.
pub const IMAGE_SIZES_ROOT: &str = "image-sizes";

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    /// Parse `{"width": w, "height": h}`, rejecting missing or zero dimensions.
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        let size: ImageSize = serde_json::from_slice(bytes).map_err(|e| {
            Error::TransformFailed(format!("failed to parse image size '{}': {e}", String::from_utf8_lossy(bytes)))
        })?;
        if size.width == 0 || size.height == 0 {
            return Err(Error::TransformFailed(format!("image size has a zero dimension: {size:?}")));
        }
        Ok(size)
    }
}

/// Something that can tell the size of an image file.
#[async_trait]
pub trait ImageSizer: Send + Sync {
    async fn image_size(&self, image: &Path) -> Result<ImageSize, Error>;
}

/// `convert <image> -ping -format '{"width":%w, "height":%h}' info:`, returning the JSON.
#[derive(Debug, Clone)]
pub struct ImageSizeProbe {
    convert: Tool,
}

impl ImageSizeProbe {
    pub fn new(convert: Tool) -> Self {
        Self { convert }
    }

    /// Measure without caching.
    pub async fn measure(&self, image: &Path) -> Result<ImageSize, Error> {
        require_source(image).await?;
        let args: Vec<OsString> = vec![
            image.into(),
            "-ping".into(),
            "-format".into(),
            r#"{"width":%w, "height":%h}"#.into(),
            "info:".into(),
        ];
        let output = self.convert.run(&args).await?;
        ImageSize::from_json(&output.stdout)
    }
}

#[async_trait]
impl Transformation for ImageSizeProbe {
    fn name(&self) -> &str {
        GET_IMAGE_SIZE
    }

    async fn produce(&self, _target: &Path, args: &[Arg]) -> Result<TransformOutput, Error> {
        expect_len(GET_IMAGE_SIZE, args, 1)?;
        let size = self.measure(Path::new(str_at(GET_IMAGE_SIZE, args, 0)?)).await?;
        let json = serde_json::to_vec(&size).map_err(|e| Error::TransformFailed(e.to_string()))?;
        Ok(TransformOutput::Bytes(json))
    }
}

/// Image sizes served from the derived store.
#[derive(Clone)]
pub struct CachedImageSizer {
    derived: ContentStore,
    probe: Arc<dyn Transformation>,
}

impl CachedImageSizer {
    /// `probe` must answer with size JSON, normally an [`ImageSizeProbe`].
    pub fn new(derived: ContentStore, probe: Arc<dyn Transformation>) -> Self {
        Self { derived, probe }
    }
}

#[async_trait]
impl ImageSizer for CachedImageSizer {
    async fn image_size(&self, image: &Path) -> Result<ImageSize, Error> {
        let args = [Arg::from(image.to_string_lossy().into_owned())];
        let size_ref = self
            .derived
            .get_derived(IMAGE_SIZES_ROOT, self.probe.as_ref(), &args, "json")
            .await?;
        let bytes = self.derived.read(&size_ref).await?;
        ImageSize::from_json(&bytes)
            .map_err(|e| Error::Storage(format!("invalid cached image size {size_ref} for {}: {e}", image.display())))
    }
}
