//! Purpose: JSON envelopes describing sidecar indexes for CLI output.
//! Exports: `index_info_json`, `build_summary_json`, `identity_json`.
//! Role: Keep `build`, `info`, and `check` payload shapes consistent.
//! Invariants: Stable key names; columns are emitted in file order as an array.

use std::path::Path;

use refl_index::api::{ColumnDescriptor, FileIdentity, SidecarIndex};
use serde_json::{Map, Value, json};

pub(crate) fn identity_json(identity: &FileIdentity) -> Value {
    let mut map = Map::new();
    map.insert("file_size".to_string(), json!(identity.size));
    if let Some(modified) = identity.modified_ns {
        map.insert("modified_ns".to_string(), json!(modified));
    }
    Value::Object(map)
}

pub(crate) fn build_summary_json(index: &SidecarIndex, index_path: &Path) -> Value {
    json!({
        "source": index.source_path().display().to_string(),
        "index": index_path.display().to_string(),
        "file_size": index.identity().size,
        "nrows": index.nrows(),
        "num_identifiers": index.num_identifiers(),
        "num_columns": index.len(),
    })
}

pub(crate) fn index_info_json(index: &SidecarIndex, index_path: &Path) -> Value {
    let columns = index.columns().map(column_json).collect::<Vec<_>>();
    json!({
        "index": index_path.display().to_string(),
        "source": index.source_path().display().to_string(),
        "identity": identity_json(&index.identity()),
        "created_at": index.created_at(),
        "nrows": index.nrows(),
        "num_identifiers": index.num_identifiers(),
        "columns": columns,
    })
}

fn column_json(column: &ColumnDescriptor) -> Value {
    json!({
        "name": column.name,
        "dtype": column.dtype.tag(),
        "numpy": column.dtype.scalar().numpy(),
        "shape": column.dtype.shape(column.count as usize),
        "elem_size": column.elem_size(),
        "count": column.count,
        "offset": column.offset,
        "length": column.length,
    })
}
