//! Purpose: Library crate behind the `refl-index` CLI.
//! Exports: `api` (stable surface), `core` (scanner, builder, index, reader, errors).
//! Role: Builds sidecar offset indexes for DIALS reflection tables and serves column reads.
//! Invariants: Building never materializes column data; reading never parses the source format.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
