//! Positional argument access for transformations.

use std::path::Path;

use folio_core::{Arg, Error};

pub(crate) fn str_at<'a>(op: &str, args: &'a [Arg], index: usize) -> Result<&'a str, Error> {
    args.get(index)
        .and_then(Arg::as_str)
        .ok_or_else(|| Error::InvalidInput(format!("{op}: argument {index} must be a string")))
}

pub(crate) fn int_at(op: &str, args: &[Arg], index: usize) -> Result<i64, Error> {
    args.get(index)
        .and_then(Arg::as_int)
        .ok_or_else(|| Error::InvalidInput(format!("{op}: argument {index} must be an integer")))
}

/// An integer argument that may be passed as `Absent`.
pub(crate) fn opt_int_at(op: &str, args: &[Arg], index: usize) -> Result<Option<i64>, Error> {
    match args.get(index) {
        Some(Arg::Absent) => Ok(None),
        _ => int_at(op, args, index).map(Some),
    }
}

pub(crate) fn expect_len(op: &str, args: &[Arg], len: usize) -> Result<(), Error> {
    if args.len() != len {
        return Err(Error::InvalidInput(format!("{op}: expected {len} arguments, got {}", args.len())));
    }
    Ok(())
}

/// Fail with `MissingSource` unless `path` exists.
pub(crate) async fn require_source(path: &Path) -> Result<(), Error> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::MissingSource(format!("expected {} to exist", path.display()))),
        Err(e) => Err(Error::storage(format!("failed to stat {}", path.display()), e)),
    }
}
