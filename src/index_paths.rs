//! Purpose: Sidecar and source path resolution helpers for the CLI.
//! Exports: `output_index_path` and `resolve_source_path`.
//! Role: Keep `build`, `read`, and `check` agreeing on where files live.
//! Invariants: An explicit `--source` or `--output` always wins.
//! Invariants: Relocated pairs resolve through the index's own directory.

use std::path::{Path, PathBuf};

use refl_index::api::{SidecarIndex, sidecar_path_for};

pub(crate) fn output_index_path(source: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => sidecar_path_for(source),
    }
}

/// Picks the source file for `index`, loaded from `index_path`.
///
/// Falls back to the recorded file name next to the sidecar when the recorded
/// path no longer exists (for example after moving both files together).
pub(crate) fn resolve_source_path(
    index: &SidecarIndex,
    index_path: &Path,
    explicit: Option<&Path>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let recorded = index.source_path();
    if recorded.exists() {
        return recorded.to_path_buf();
    }
    let sibling = index_path
        .parent()
        .zip(recorded.file_name())
        .map(|(dir, name)| dir.join(name));
    match sibling {
        Some(path) if path.exists() => path,
        _ => recorded.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::{output_index_path, resolve_source_path};
    use refl_index::api::{FileIdentity, SidecarIndex};
    use std::path::{Path, PathBuf};

    fn empty_index(source: &Path) -> SidecarIndex {
        SidecarIndex::new(source, FileIdentity::new(0), 0, 0, Vec::new()).expect("index")
    }

    #[test]
    fn output_defaults_to_sidecar_suffix() {
        assert_eq!(
            output_index_path(Path::new("/d/a.refl"), None),
            PathBuf::from("/d/a.refl.idx")
        );
        assert_eq!(
            output_index_path(Path::new("/d/a.refl"), Some(Path::new("/x/y.idx"))),
            PathBuf::from("/x/y.idx")
        );
    }

    #[test]
    fn explicit_source_wins() {
        let index = empty_index(Path::new("/nowhere/a.refl"));
        let resolved =
            resolve_source_path(&index, Path::new("/i/a.refl.idx"), Some(Path::new("/s/b.refl")));
        assert_eq!(resolved, PathBuf::from("/s/b.refl"));
    }

    #[test]
    fn relocated_pair_resolves_next_to_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        let moved = temp.path().join("a.refl");
        std::fs::write(&moved, b"x").expect("write");
        let index = empty_index(Path::new("/gone/a.refl"));
        let resolved = resolve_source_path(&index, &temp.path().join("a.refl.idx"), None);
        assert_eq!(resolved, moved);
    }

    #[test]
    fn missing_everywhere_keeps_recorded_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let index = empty_index(Path::new("/gone/a.refl"));
        let resolved = resolve_source_path(&index, &temp.path().join("a.refl.idx"), None);
        assert_eq!(resolved, PathBuf::from("/gone/a.refl"));
    }
}
