//! Page image conversion with ImageMagick.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use folio_core::{Arg, Error, TransformOutput, Transformation};

use crate::args::{expect_len, int_at, opt_int_at, require_source, str_at};
use crate::process::Tool;

/// Operation name of page image conversion.
pub const IMPORT_PAGE_IMAGE: &str = "importPageImage";

/// Largest accepted `-magnify` count. Each one doubles both dimensions.
pub const MAX_MAGNIFICATION: u32 = 4;

/// Key arguments for one page image: `[source, quality, rotation|Absent, magnification]`.
///
/// A rotation that is a multiple of 360 degrees is the same request as no
/// rotation, so it is normalized to `Absent` here rather than in the key.
pub fn page_image_args(source: &str, quality: u32, rotation: Option<i64>, magnification: u32) -> Vec<Arg> {
    let rotation = rotation.map(|deg| deg.rem_euclid(360)).filter(|deg| *deg != 0);
    vec![Arg::from(source), Arg::from(quality), Arg::from(rotation), Arg::from(magnification)]
}

/// `convert <source> -quality <q> [-rotate <deg>] [-magnify]×n <target>`.
pub fn convert_args(
    source: &Path, target: &Path, quality: i64, rotation: Option<i64>, magnification: i64,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![source.into(), "-quality".into(), quality.to_string().into()];
    if let Some(deg) = rotation {
        args.push("-rotate".into());
        args.push(deg.to_string().into());
    }
    for _ in 0..magnification {
        args.push("-magnify".into());
    }
    args.push(target.into());
    args
}

/// Converts a scanned page to a JPEG at the target path.
#[derive(Debug, Clone)]
pub struct ImportPageImage {
    convert: Tool,
}

impl ImportPageImage {
    pub fn new(convert: Tool) -> Self {
        Self { convert }
    }
}

#[async_trait]
impl Transformation for ImportPageImage {
    fn name(&self) -> &str {
        IMPORT_PAGE_IMAGE
    }

    async fn produce(&self, target: &Path, args: &[Arg]) -> Result<TransformOutput, Error> {
        expect_len(IMPORT_PAGE_IMAGE, args, 4)?;
        let source = Path::new(str_at(IMPORT_PAGE_IMAGE, args, 0)?);
        let quality = int_at(IMPORT_PAGE_IMAGE, args, 1)?;
        let rotation = opt_int_at(IMPORT_PAGE_IMAGE, args, 2)?;
        let magnification = int_at(IMPORT_PAGE_IMAGE, args, 3)?;
        if !(1..=100).contains(&quality) || !(0..=i64::from(MAX_MAGNIFICATION)).contains(&magnification) {
            return Err(Error::InvalidInput(format!(
                "{IMPORT_PAGE_IMAGE}: quality {quality} or magnification {magnification} out of range"
            )));
        }

        require_source(source).await?;
        self.convert
            .run(&convert_args(source, target, quality, rotation, magnification))
            .await?;

        tracing::debug!(source = %source.display(), target = %target.display(), "converted page image");
        Ok(TransformOutput::Written)
    }
}
