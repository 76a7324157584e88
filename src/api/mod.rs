//! Purpose: Define the public Rust API boundary for refl-index.
//! Exports: Index building, sidecar persistence, column reads, and errors.
//! Role: Additive-only surface used by the CLI and integration tests.
//! Invariants: Scanner and skip primitives stay reachable only through `core`.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::builder::{
    BuildOptions, IndexBuilder, IndexOrigin, KeyOrder, build_all, build_index, load_or_build,
};
pub use crate::core::dtype::{Dtype, Scalar};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::index::{ColumnDescriptor, FileIdentity, SidecarIndex, sidecar_path_for};
pub use crate::core::reader::{ColumnSlice, ReadAt, Reader, ReaderOptions};
