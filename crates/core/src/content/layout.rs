//! Mapping from `(root, key, extension)` to paths under a store base.
//!
//! ```text
//! <base>/<root>/<key>.<ext>          committed artifact
//! <base>/<root>/<key>_tmp.<ext>      staging output (same directory, same volume)
//! <base>/.locks/<root>/<key>.lock    cross-process claim file
//! ```
//!
//! Claim files are empty and are never removed, so the lock tree holds one
//! file per key ever derived. Unlinking a claim file that another process
//! has open would let two holders lock different inodes for the same key.

use std::path::{Path, PathBuf};

use super::key::ArtifactKey;
use super::reference::ContentRef;

/// Directory under the base holding claim files.
pub const LOCKS_DIR: &str = ".locks";

/// Suffix appended to the key for staging outputs.
pub const STAGING_SUFFIX: &str = "_tmp";

#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory of one root.
    pub fn root_dir(&self, root: &str) -> PathBuf {
        root.split('/').fold(self.base.clone(), |p, seg| p.join(seg))
    }

    /// Final, visible location of an artifact.
    pub fn final_path(&self, content_ref: &ContentRef) -> PathBuf {
        self.root_dir(content_ref.root()).join(content_ref.file_name())
    }

    /// Private staging location for an artifact that is being produced.
    pub fn staging_path(&self, content_ref: &ContentRef) -> PathBuf {
        self.root_dir(content_ref.root())
            .join(format!("{}{STAGING_SUFFIX}.{}", content_ref.key(), content_ref.extension()))
    }

    /// Claim file guarding production of one key.
    pub fn lock_path(&self, root: &str, key: &ArtifactKey) -> PathBuf {
        root.split('/')
            .fold(self.base.join(LOCKS_DIR), |p, seg| p.join(seg))
            .join(format!("{key}.lock"))
    }
}

/// If `file_name` is a staging name (`<key>_tmp.<ext>`), return the key part.
pub fn staging_key(file_name: &str) -> Option<&str> {
    let (stem, _ext) = file_name.split_once('.')?;
    let key = stem.strip_suffix(STAGING_SUFFIX)?;
    super::key::is_key(key).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::key::{Arg, derive_key};

    fn sample_ref() -> ContentRef {
        let key = derive_key("importPageImage", &[Arg::from("imports/docA/p1.png")]).unwrap();
        ContentRef::new("docA", key, "jpg").unwrap()
    }

    #[test]
    fn test_final_path_shape() {
        let layout = Layout::new("/srv/content");
        let r = sample_ref();
        assert_eq!(layout.final_path(&r), PathBuf::from(format!("/srv/content/docA/{}.jpg", r.key())));
    }

    #[test]
    fn test_staging_is_sibling_with_same_extension() {
        let layout = Layout::new("/srv/content");
        let r = sample_ref();
        let staging = layout.staging_path(&r);
        assert_eq!(staging.parent(), layout.final_path(&r).parent());
        assert_eq!(staging.extension().unwrap(), "jpg");
        assert_ne!(staging, layout.final_path(&r));
    }

    #[test]
    fn test_nested_root_and_lock_path() {
        let layout = Layout::new("derived");
        let key = derive_key("getImageSizeCmd", &[Arg::from("x.jpg")]).unwrap();
        assert_eq!(layout.root_dir("image-sizes/v1"), PathBuf::from("derived/image-sizes/v1"));
        assert_eq!(
            layout.lock_path("image-sizes/v1", &key),
            PathBuf::from(format!("derived/.locks/image-sizes/v1/{key}.lock"))
        );
    }

    #[test]
    fn test_staging_key() {
        let r = sample_ref();
        let layout = Layout::new("c");
        let staging = layout.staging_path(&r);
        let name = staging.file_name().unwrap().to_str().unwrap();
        assert_eq!(staging_key(name), Some(r.key().as_str()));
        assert_eq!(staging_key(&r.file_name()), None);
        assert_eq!(staging_key("notes_tmp.txt"), None);
    }
}
