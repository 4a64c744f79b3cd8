//! Content-addressed artifact key derivation.
//!
//! The key is the SHA-256 of a length-prefixed encoding of the operation name
//! and its ordered arguments. The encoding is part of the on-disk format:
//! changing it orphans every existing artifact, so it carries a version tag.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Version tag mixed into every key.
const KEY_FORMAT_TAG: &[u8] = b"folio-derive/v1\0";

/// Length of a hex-encoded key.
pub const KEY_LEN: usize = 64;

/// One argument of a derivation request.
///
/// `Int(1)` and `Float(1.0)` are different inputs. `Absent` is an explicit
/// placeholder for an optional argument; it is never dropped from the tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Absent,
}

impl Arg {
    /// String payload, if this is a string argument.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer argument.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Arg::Absent)
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Arg::Str(s) => {
                buf.push(b'S');
                push_len_prefixed(buf, s.as_bytes());
            }
            Arg::Int(i) => {
                buf.push(b'I');
                buf.extend_from_slice(&i.to_be_bytes());
            }
            Arg::Float(f) => {
                buf.push(b'F');
                // -0.0 and 0.0 compare equal, so they key the same
                let f = if *f == 0.0 { 0.0 } else { *f };
                buf.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Arg::Bool(b) => {
                buf.push(b'B');
                buf.push(u8::from(*b));
            }
            Arg::Absent => buf.push(b'N'),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Absent, Into::into)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "{s:?}"),
            Arg::Int(i) => write!(f, "{i}"),
            Arg::Float(x) => write!(f, "{x:?}"),
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Absent => f.write_str("absent"),
        }
    }
}

/// A 64-character lowercase hex SHA-256 digest naming one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Wraps an existing hex digest, checking its shape.
    pub fn parse(hex_digest: &str) -> Result<Self, Error> {
        if is_key(hex_digest) {
            Ok(Self(hex_digest.to_string()))
        } else {
            Err(Error::InvalidContentRef(format!("'{hex_digest}' is not a 64 character lowercase hex digest")))
        }
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.0
    }
}

pub(crate) fn is_key(s: &str) -> bool {
    s.len() == KEY_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn push_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    // u32 is plenty for argument payloads; saturate rather than wrap
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Canonical byte encoding of an operation name and its arguments.
pub fn canonical_encoding(operation_name: &str, args: &[Arg]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(KEY_FORMAT_TAG.len() + operation_name.len() + 16 * (args.len() + 1));
    buf.extend_from_slice(KEY_FORMAT_TAG);
    push_len_prefixed(&mut buf, operation_name.as_bytes());
    let argc = u32::try_from(args.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&argc.to_be_bytes());
    for arg in args {
        arg.encode_into(&mut buf);
    }
    buf
}

/// Derive the artifact key for an operation applied to `args`.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if `operation_name` is empty.
pub fn derive_key(operation_name: &str, args: &[Arg]) -> Result<ArtifactKey, Error> {
    if operation_name.is_empty() {
        return Err(Error::InvalidInput("operation name must not be empty".into()));
    }
    let digest = Sha256::digest(canonical_encoding(operation_name, args));
    Ok(ArtifactKey::from_digest(&digest))
}
