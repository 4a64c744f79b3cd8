//! Content-addressed derivation cache.
//!
//! Artifacts are named by a digest of `(operation name, arguments)` and
//! stored once per `(root, key)` under a base directory. A derivation is
//! run only on a miss, at most once at a time per key, and its output only
//! becomes visible through an atomic rename.
//!
//! This module provides:
//! - Canonical key derivation ([`derive_key`])
//! - Stable content references ([`ContentRef`])
//! - The get-or-compute executor ([`ContentStore::get_derived`])
//! - Interning of source files by digest ([`ContentStore::add_file`])
//! - Cleanup of orphaned staging output ([`ContentStore::sweep_staging`])

mod claim;
mod derive;
mod intern;
mod key;
mod layout;
mod reference;
mod store;
mod sweep;

pub use derive::{TransformOutput, Transformation};
pub use intern::digest_file;
pub use key::{Arg, ArtifactKey, KEY_LEN, canonical_encoding, derive_key};
pub use layout::{LOCKS_DIR, Layout, STAGING_SUFFIX, staging_key};
pub use reference::{ContentRef, validate_extension, validate_root};
pub use store::ContentStore;
pub use sweep::SweepSummary;
