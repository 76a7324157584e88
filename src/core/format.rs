//! Purpose: Centralize table-format and sidecar-format versioning.
//! Exports: magic/version constants plus `table_version_error` and `index_version_error`.
//! Role: Shared policy for gating compatibility across build and load paths.
//! Invariants: Version lists are additive; a new table version needs a new scan path.
//! Invariants: Unsupported versions are hard errors, never warnings.

use crate::core::error::{Error, ErrorKind};

pub const TABLE_MAGIC: &[u8] = b"dials::af::reflection_table";
pub const TABLE_VERSION: i64 = 1;
pub const SUPPORTED_TABLE_VERSIONS: &[i64] = &[TABLE_VERSION];

pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const SUPPORTED_INDEX_FORMAT_VERSIONS: &[u32] = &[INDEX_FORMAT_VERSION];

pub const SIDECAR_EXTENSION: &str = "idx";

pub fn table_version_error(detected: i64, offset: u64) -> Error {
    Error::new(ErrorKind::Format)
        .with_message("unsupported reflection table version")
        .with_expected(join_versions(SUPPORTED_TABLE_VERSIONS))
        .with_found(detected.to_string())
        .with_offset(offset)
        .with_hint("This file was written by a newer DIALS release; upgrade refl-index.")
}

pub fn index_version_error(detected: u64) -> Error {
    Error::new(ErrorKind::Format)
        .with_message(format!("unsupported index format version {detected}"))
        .with_expected(join_versions(SUPPORTED_INDEX_FORMAT_VERSIONS))
        .with_found(detected.to_string())
        .with_hint("Rebuild the sidecar with `refl-index build <file>`.")
}

fn join_versions<T: ToString>(versions: &[T]) -> String {
    versions
        .iter()
        .map(|version| version.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
