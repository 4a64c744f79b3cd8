//! Content references: `<root>/<key>.<extension>`, relative to a store base.
//!
//! The reference string is what callers persist (e.g. a page's `image_ref`),
//! so parsing it back is strict.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::key::{ArtifactKey, is_key};
use crate::Error;

/// Parsed form of a content reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRef {
    root: String,
    key: ArtifactKey,
    extension: String,
}

impl ContentRef {
    /// Build a reference, validating root and extension.
    pub fn new(root: &str, key: ArtifactKey, extension: &str) -> Result<Self, Error> {
        validate_root(root)?;
        validate_extension(extension)?;
        Ok(Self { root: root.to_string(), key, extension: extension.to_string() })
    }

    /// Parse a reference string such as `docA/3ba8…b255.jpg`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (root, file) = s
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidContentRef(format!("'{s}' has no root segment")))?;
        let (hash, extension) = file
            .split_once('.')
            .ok_or_else(|| Error::InvalidContentRef(format!("'{s}' has no extension")))?;
        if !is_key(hash) {
            return Err(Error::InvalidContentRef(format!("'{s}': key is not a 64 character hex digest")));
        }
        let key = ArtifactKey::parse(hash)?;
        Self::new(root, key, extension).map_err(|e| match e {
            Error::InvalidInput(msg) => Error::InvalidContentRef(format!("'{s}': {msg}")),
            other => other,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The file name inside the root directory.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.key, self.extension)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.root, self.key, self.extension)
    }
}

impl FromStr for ContentRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentRef> for String {
    fn from(r: ContentRef) -> Self {
        r.to_string()
    }
}

/// A root is one or more `/`-separated segments of `[A-Za-z0-9._-]`.
///
/// Segments may not be empty, `.`/`..`, or start with `.` (dot-names are
/// reserved for store bookkeeping such as `.locks`).
pub fn validate_root(root: &str) -> Result<(), Error> {
    if root.is_empty() {
        return Err(Error::InvalidInput("content root must not be empty".into()));
    }
    for segment in root.split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidInput(format!("content root '{root}' has an empty segment")));
        }
        if segment.starts_with('.') {
            return Err(Error::InvalidInput(format!("content root '{root}' has a segment starting with '.'")));
        }
        if !segment.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')) {
            return Err(Error::InvalidInput(format!("content root '{root}' contains unsupported characters")));
        }
    }
    Ok(())
}

/// Extensions are `[A-Za-z0-9_]+`.
pub fn validate_extension(extension: &str) -> Result<(), Error> {
    if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(Error::InvalidInput(format!("invalid extension '{extension}'")));
    }
    Ok(())
}
