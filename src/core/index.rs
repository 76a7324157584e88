//! Purpose: Immutable sidecar index model plus its JSON persistence.
//! Exports: `SidecarIndex`, `ColumnDescriptor`, `FileIdentity`, `sidecar_path_for`.
//! Role: Output of the builder, input of the reader; the only persisted artifact.
//! Invariants: Column names are unique; every count equals `nrows`.
//! Invariants: Blob spans increase strictly in file order and never overlap.
//! Invariants: Identifier contents are never stored, only their count.
use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::dtype::Dtype;
use crate::core::error::{Error, ErrorKind, io_error_kind};
use crate::core::format::{
    INDEX_FORMAT_VERSION, SIDECAR_EXTENSION, SUPPORTED_INDEX_FORMAT_VERSIONS, index_version_error,
};

/// Size and modification marker of a source file at index time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileIdentity {
    pub size: u64,
    pub modified_ns: Option<u64>,
}

impl FileIdentity {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            modified_ns: None,
        }
    }

    pub fn from_metadata(meta: &Metadata) -> Self {
        let modified_ns = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .and_then(|age| u64::try_from(age.as_nanos()).ok());
        Self {
            size: meta.len(),
            modified_ns,
        }
    }

    pub fn of_path(path: &Path) -> Result<Self, Error> {
        let meta = fs::metadata(path).map_err(|err| Error::io(err).with_path(path))?;
        Ok(Self::from_metadata(&meta))
    }

    /// Sizes must agree; modification markers are compared only when both sides have one.
    pub fn matches(&self, current: &FileIdentity, verify_modified: bool) -> bool {
        if self.size != current.size {
            return false;
        }
        match (verify_modified, self.modified_ns, current.modified_ns) {
            (true, Some(recorded), Some(actual)) => recorded == actual,
            _ => true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub dtype: Dtype,
    pub count: u64,
    pub offset: u64,
    pub length: u64,
}

impl ColumnDescriptor {
    pub fn elem_size(&self) -> usize {
        self.dtype.elem_size()
    }

    /// Absolute offset one past the last blob byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Absolute byte span for rows `[rows.start, rows.end)`; bounds are not checked.
    pub fn byte_range(&self, rows: Range<u64>) -> Range<u64> {
        let elem = self.elem_size() as u64;
        self.offset + rows.start * elem..self.offset + rows.end * elem
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SidecarIndex {
    source_path: PathBuf,
    identity: FileIdentity,
    nrows: u64,
    num_identifiers: u64,
    created_at: String,
    columns: IndexMap<String, ColumnDescriptor>,
}

impl SidecarIndex {
    /// Assembles an index, enforcing every descriptor invariant.
    pub fn new(
        source_path: impl Into<PathBuf>,
        identity: FileIdentity,
        nrows: u64,
        num_identifiers: u64,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<Self, Error> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| Error::new(ErrorKind::Internal).with_source(err))?;
        Self::assemble(
            source_path.into(),
            identity,
            nrows,
            num_identifiers,
            created_at,
            columns,
        )
    }

    fn assemble(
        source_path: PathBuf,
        identity: FileIdentity,
        nrows: u64,
        num_identifiers: u64,
        created_at: String,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<Self, Error> {
        let mut map = IndexMap::with_capacity(columns.len());
        let mut prev: Option<(String, u64, u64)> = None;
        for column in columns {
            check_descriptor(&column, nrows, identity.size)?;
            if let Some((prev_name, prev_offset, prev_end)) = &prev {
                if column.offset <= *prev_offset || column.offset < *prev_end {
                    return Err(Error::new(ErrorKind::Format)
                        .with_message("column blobs overlap or are out of file order")
                        .with_column(&column.name)
                        .with_expected(format!("offset >= {prev_end} (after {prev_name})"))
                        .with_found(column.offset.to_string())
                        .with_offset(column.offset));
                }
            }
            prev = Some((column.name.clone(), column.offset, column.end()));
            let name = column.name.clone();
            if map.insert(name.clone(), column).is_some() {
                return Err(Error::new(ErrorKind::Format)
                    .with_message("duplicate column name")
                    .with_column(name));
            }
        }
        Ok(Self {
            source_path,
            identity,
            nrows,
            num_identifiers,
            created_at,
            columns: map,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn identity(&self) -> FileIdentity {
        self.identity
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn num_identifiers(&self) -> u64 {
        self.num_identifiers
    }

    /// RFC 3339 build timestamp.
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Descriptors in file order.
    pub fn columns(&self) -> impl ExactSizeIterator<Item = &ColumnDescriptor> {
        self.columns.values()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(name)
    }

    /// Like `column`, but a missing name is a `NotFound` error listing what exists.
    pub fn get(&self, name: &str) -> Result<&ColumnDescriptor, Error> {
        self.column(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!(
                    "column {name:?} not found; available: {}",
                    self.column_names().join(", ")
                ))
                .with_column(name)
        })
    }

    /// Smallest file length that covers every indexed blob.
    pub fn required_len(&self) -> u64 {
        self.columns().map(ColumnDescriptor::end).max().unwrap_or(0)
    }

    /// Fails with `StaleIndex` unless `current` matches the recorded identity.
    pub fn check_identity(&self, current: &FileIdentity, verify_modified: bool) -> Result<(), Error> {
        if self.identity.matches(current, verify_modified) {
            return Ok(());
        }
        Err(stale_error(&self.identity, current).with_path(&self.source_path))
    }

    /// Whether the file at `path` (default: the recorded source) still matches.
    pub fn is_current(&self, path: Option<&Path>) -> Result<bool, Error> {
        let path = path.unwrap_or(&self.source_path);
        match FileIdentity::of_path(path) {
            Ok(current) => Ok(self.identity.matches(&current, true)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes the sidecar JSON atomically; defaults to `<source>.idx`.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, Error> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sidecar_path_for(&self.source_path));
        let text = serde_json::to_string_pretty(&self.to_doc()).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode sidecar")
                .with_source(err)
        })?;

        let tmp = temp_path_for(&path);
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        if let Err(err) = write() {
            let _ = fs::remove_file(&tmp);
            let kind = match io_error_kind(&err) {
                ErrorKind::Permission => ErrorKind::Permission,
                _ => ErrorKind::Io,
            };
            return Err(Error::new(kind)
                .with_message("failed to write sidecar")
                .with_path(&path)
                .with_source(err));
        }
        tracing::debug!(path = %path.display(), columns = self.len(), "saved sidecar index");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::io(err)
                .with_message("failed to read sidecar")
                .with_path(path)
        })?;
        let index = Self::from_json(&text).map_err(|err| err.or_path(path))?;
        tracing::debug!(path = %path.display(), columns = index.len(), "loaded sidecar index");
        Ok(index)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(&self.to_doc())
            .map_err(|err| Error::new(ErrorKind::Internal).with_source(err))
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message("sidecar is not valid JSON")
                .with_source(err)
        })?;
        let version = value.get("version").and_then(Value::as_u64).unwrap_or(0);
        let supported = u32::try_from(version)
            .is_ok_and(|version| SUPPORTED_INDEX_FORMAT_VERSIONS.contains(&version));
        if !supported {
            return Err(index_version_error(version));
        }
        let doc: SidecarDoc = serde_json::from_value(value).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message("sidecar fields are malformed")
                .with_source(err)
        })?;
        Self::from_doc(doc)
    }

    fn to_doc(&self) -> SidecarDoc {
        let mut type_strs: Vec<String> = self
            .columns()
            .map(|column| column.dtype.tag().to_string())
            .collect();
        type_strs.sort();
        type_strs.dedup();

        let columns = self
            .columns()
            .map(|column| {
                let type_idx = type_strs
                    .iter()
                    .position(|tag| tag == column.dtype.tag())
                    .unwrap_or_default();
                ColumnRow(
                    column.name.clone(),
                    type_idx,
                    column.elem_size() as u64,
                    column.count,
                    column.offset,
                    column.length,
                )
            })
            .collect();

        SidecarDoc {
            version: INDEX_FORMAT_VERSION,
            refl_path: self.source_path.to_string_lossy().into_owned(),
            file_size: self.identity.size,
            modified_ns: self.identity.modified_ns,
            created_at: self.created_at.clone(),
            nrows: self.nrows,
            num_identifiers: self.num_identifiers,
            num_columns: self.columns.len(),
            string_tables: StringTables { type_strs },
            columns,
        }
    }

    fn from_doc(doc: SidecarDoc) -> Result<Self, Error> {
        OffsetDateTime::parse(&doc.created_at, &Rfc3339).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message("sidecar created_at is not RFC 3339")
                .with_found(doc.created_at.clone())
                .with_source(err)
        })?;
        if doc.num_columns != doc.columns.len() {
            return Err(Error::new(ErrorKind::Format)
                .with_message("sidecar column count disagrees with column table")
                .with_expected(doc.num_columns.to_string())
                .with_found(doc.columns.len().to_string()));
        }

        let type_strs = &doc.string_tables.type_strs;
        let mut columns = Vec::with_capacity(doc.columns.len());
        for ColumnRow(name, type_idx, elem_size, count, offset, length) in doc.columns {
            let tag = type_strs.get(type_idx).ok_or_else(|| {
                Error::new(ErrorKind::Format)
                    .with_message("sidecar type index out of range")
                    .with_column(&name)
                    .with_expected(format!("< {}", type_strs.len()))
                    .with_found(type_idx.to_string())
            })?;
            let dtype = Dtype::from_tag(tag).ok_or_else(|| unknown_tag(tag).with_column(&name))?;
            if elem_size != dtype.elem_size() as u64 {
                return Err(Error::new(ErrorKind::Format)
                    .with_message("sidecar element size disagrees with type registry")
                    .with_column(&name)
                    .with_expected(dtype.elem_size().to_string())
                    .with_found(elem_size.to_string()));
            }
            columns.push(ColumnDescriptor {
                name,
                dtype,
                count,
                offset,
                length,
            });
        }

        let identity = FileIdentity {
            size: doc.file_size,
            modified_ns: doc.modified_ns,
        };
        Self::assemble(
            PathBuf::from(doc.refl_path),
            identity,
            doc.nrows,
            doc.num_identifiers,
            doc.created_at,
            columns,
        )
    }
}

/// Default sidecar location: the source path with `.idx` appended.
pub fn sidecar_path_for(source: &Path) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

pub(crate) fn unknown_tag(tag: &str) -> Error {
    Error::new(ErrorKind::Format)
        .with_message("unknown column type tag")
        .with_expected("one of the 7 DIALS element types")
        .with_found(tag.to_string())
}

pub(crate) fn stale_error(recorded: &FileIdentity, current: &FileIdentity) -> Error {
    Error::new(ErrorKind::StaleIndex)
        .with_message("index does not match the source file")
        .with_expected(describe_identity(recorded))
        .with_found(describe_identity(current))
        .with_hint("The source changed since indexing; rebuild with `refl-index build <file>`.")
}

fn describe_identity(identity: &FileIdentity) -> String {
    match identity.modified_ns {
        Some(modified) => format!("size {} modified_ns {modified}", identity.size),
        None => format!("size {}", identity.size),
    }
}

fn check_descriptor(column: &ColumnDescriptor, nrows: u64, file_size: u64) -> Result<(), Error> {
    if column.count != nrows {
        return Err(Error::new(ErrorKind::Format)
            .with_message("column row count disagrees with table nrows")
            .with_column(&column.name)
            .with_expected(nrows.to_string())
            .with_found(column.count.to_string()));
    }
    let expected = column.dtype.byte_len(column.count);
    if expected != Some(column.length) {
        return Err(Error::new(ErrorKind::Format)
            .with_message("blob length disagrees with count x element size")
            .with_column(&column.name)
            .with_expected(expected.map_or_else(|| "overflow".to_string(), |len| len.to_string()))
            .with_found(column.length.to_string())
            .with_offset(column.offset));
    }
    let end = column.offset.checked_add(column.length);
    if end.is_none_or(|end| end > file_size) {
        return Err(Error::new(ErrorKind::Format)
            .with_message("blob extends past end of file")
            .with_column(&column.name)
            .with_expected(format!("end <= {file_size}"))
            .with_offset(column.offset));
    }
    Ok(())
}

/// Distinguishes concurrent saves within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("index"));
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".tmp-{}-{seq}", std::process::id()));
    path.with_file_name(name)
}

#[derive(Debug, Serialize, Deserialize)]
struct SidecarDoc {
    version: u32,
    refl_path: String,
    file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_ns: Option<u64>,
    created_at: String,
    nrows: u64,
    num_identifiers: u64,
    num_columns: usize,
    string_tables: StringTables,
    columns: Vec<ColumnRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StringTables {
    type_strs: Vec<String>,
}

/// `[name, type_idx, elem_size, count, blob_offset, blob_size]`
#[derive(Debug, Serialize, Deserialize)]
struct ColumnRow(String, usize, u64, u64, u64, u64);
