//! Purpose: Drive one sequential scan of a reflection table into a `SidecarIndex`.
//! Exports: `IndexBuilder`, `BuildOptions`, `KeyOrder`, `IndexOrigin`, `build_all`, `load_or_build`.
//! Role: Schema state machine over `Scanner`; the only producer of indexes from source bytes.
//! Invariants: Every byte of the file is consumed in order; offsets come from the scanner cursor.
//! Invariants: Any structural failure aborts the build; partial indexes are never returned.
//! Invariants: Parallelism exists only across files, never within one.
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use fs2::FileExt;

use crate::core::dtype::Dtype;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{SUPPORTED_TABLE_VERSIONS, TABLE_MAGIC, table_version_error};
use crate::core::index::{
    ColumnDescriptor, FileIdentity, SidecarIndex, sidecar_path_for, stale_error, unknown_tag,
};
use crate::core::scanner::Scanner;
use crate::core::skip::{BlobSkipper, DEFAULT_SKIP_BUFFER_LEN};

const TOP_LEVEL_LEN: u32 = 3;
const PAYLOAD_LEN: u32 = 3;
const COLUMN_ARRAY_LEN: u32 = 2;

/// How payload keys are matched against `identifiers`, `nrows`, `data`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum KeyOrder {
    /// Keys must appear in writer order.
    #[default]
    Strict,
    /// Keys are dispatched by content in any order.
    Relaxed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildOptions {
    pub key_order: KeyOrder,
    pub skip_buffer_len: usize,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self {
            key_order: KeyOrder::Strict,
            skip_buffer_len: DEFAULT_SKIP_BUFFER_LEN,
        }
    }

    pub fn with_key_order(mut self, key_order: KeyOrder) -> Self {
        self.key_order = key_order;
        self
    }

    pub fn with_skip_buffer_len(mut self, len: usize) -> Self {
        self.skip_buffer_len = len;
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
enum PayloadKey {
    Identifiers,
    Nrows,
    Data,
}

impl PayloadKey {
    const ALL: [PayloadKey; 3] = [PayloadKey::Identifiers, PayloadKey::Nrows, PayloadKey::Data];

    fn literal(self) -> &'static str {
        match self {
            PayloadKey::Identifiers => "identifiers",
            PayloadKey::Nrows => "nrows",
            PayloadKey::Data => "data",
        }
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.literal().as_bytes() == bytes)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    ExpectTopArray,
    ExpectMagic,
    ExpectVersion,
    ExpectPayloadMap,
    /// Strict order: exactly this key must come next.
    ExpectKey(PayloadKey),
    /// Relaxed order: any not-yet-seen payload key may come next.
    ExpectAnyKey,
    SkipIdentifiersValue,
    ReadNrows,
    ExpectDataMap,
    ReadColumnEntry { remaining: u32 },
    Done,
}

/// Mutable scan state for one file; dropped after the index is emitted.
struct Scan<R> {
    scanner: Scanner<R>,
    key_order: KeyOrder,
    nrows: Option<u64>,
    num_identifiers: u64,
    columns: Vec<ColumnDescriptor>,
    /// Offset of each column's row-count token, parallel to `columns`.
    count_offsets: Vec<u64>,
    names: HashSet<String>,
    seen: HashSet<PayloadKey>,
}

impl<R: Read> Scan<R> {
    fn run(&mut self) -> Result<(), Error> {
        let mut state = State::ExpectTopArray;
        while state != State::Done {
            state = self.step(state)?;
        }
        Ok(())
    }

    fn step(&mut self, state: State) -> Result<State, Error> {
        let at = self.scanner.position();
        let next = match state {
            State::ExpectTopArray => {
                let len = self.scanner.read_array_len()?;
                expect_len("top-level array", TOP_LEVEL_LEN, len, at)?;
                State::ExpectMagic
            }
            State::ExpectMagic => {
                let magic = self.scanner.read_str_or_bin()?;
                if magic != TABLE_MAGIC {
                    return Err(Error::new(ErrorKind::Format)
                        .with_message("not a reflection table")
                        .with_expected(String::from_utf8_lossy(TABLE_MAGIC))
                        .with_found(String::from_utf8_lossy(&magic))
                        .with_offset(at));
                }
                State::ExpectVersion
            }
            State::ExpectVersion => {
                let version = self.scanner.read_int()?;
                if !SUPPORTED_TABLE_VERSIONS.contains(&version) {
                    return Err(table_version_error(version, at));
                }
                State::ExpectPayloadMap
            }
            State::ExpectPayloadMap => {
                let len = self.scanner.read_map_len()?;
                expect_len("payload map", PAYLOAD_LEN, len, at)?;
                match self.key_order {
                    KeyOrder::Strict => State::ExpectKey(PayloadKey::Identifiers),
                    KeyOrder::Relaxed => State::ExpectAnyKey,
                }
            }
            State::ExpectKey(expected) => {
                let key = self.scanner.read_str()?;
                if key != expected.literal().as_bytes() {
                    return Err(Error::new(ErrorKind::Format)
                        .with_message("unexpected payload key")
                        .with_expected(expected.literal())
                        .with_found(String::from_utf8_lossy(&key))
                        .with_offset(at));
                }
                value_state(expected)
            }
            State::ExpectAnyKey => {
                let key = self.scanner.read_str()?;
                let Some(found) = PayloadKey::from_bytes(&key) else {
                    return Err(Error::new(ErrorKind::Format)
                        .with_message("unknown payload key")
                        .with_expected("identifiers, nrows, or data")
                        .with_found(String::from_utf8_lossy(&key))
                        .with_offset(at));
                };
                if self.seen.contains(&found) {
                    return Err(Error::new(ErrorKind::Format)
                        .with_message("duplicate payload key")
                        .with_found(found.literal())
                        .with_offset(at));
                }
                value_state(found)
            }
            State::SkipIdentifiersValue => {
                let count = self.scanner.read_map_len()?;
                for _ in 0..count {
                    self.scanner.read_int()?;
                    self.scanner.skip_str()?;
                }
                self.num_identifiers = u64::from(count);
                self.after_value(PayloadKey::Identifiers)
            }
            State::ReadNrows => {
                self.nrows = Some(self.scanner.read_uint()?);
                self.after_value(PayloadKey::Nrows)
            }
            State::ExpectDataMap => {
                let count = self.scanner.read_map_len()?;
                self.columns.reserve(count.min(256) as usize);
                if count == 0 {
                    self.after_value(PayloadKey::Data)
                } else {
                    State::ReadColumnEntry { remaining: count }
                }
            }
            State::ReadColumnEntry { remaining } => {
                self.read_column()?;
                if remaining > 1 {
                    State::ReadColumnEntry {
                        remaining: remaining - 1,
                    }
                } else {
                    self.after_value(PayloadKey::Data)
                }
            }
            State::Done => State::Done,
        };
        Ok(next)
    }

    fn after_value(&mut self, key: PayloadKey) -> State {
        self.seen.insert(key);
        match (self.key_order, key) {
            (KeyOrder::Strict, PayloadKey::Identifiers) => State::ExpectKey(PayloadKey::Nrows),
            (KeyOrder::Strict, PayloadKey::Nrows) => State::ExpectKey(PayloadKey::Data),
            (KeyOrder::Strict, PayloadKey::Data) => State::Done,
            (KeyOrder::Relaxed, _) if self.seen.len() as u32 == PAYLOAD_LEN => State::Done,
            (KeyOrder::Relaxed, _) => State::ExpectAnyKey,
        }
    }

    /// `name: [type_tag, [count, blob]]`
    fn read_column(&mut self) -> Result<(), Error> {
        let at = self.scanner.position();
        let name = self.scanner.read_str()?;
        let name = String::from_utf8(name).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message("column name is not UTF-8")
                .with_offset(at)
                .with_source(err)
        })?;
        if !self.names.insert(name.clone()) {
            return Err(Error::new(ErrorKind::Format)
                .with_message("duplicate column name")
                .with_column(name)
                .with_offset(at));
        }

        let at = self.scanner.position();
        let len = self.scanner.read_array_len()?;
        expect_len("column entry", COLUMN_ARRAY_LEN, len, at).map_err(|err| err.with_column(&name))?;

        let at = self.scanner.position();
        let tag = self.scanner.read_str()?;
        let dtype = Dtype::from_tag_bytes(&tag).ok_or_else(|| {
            unknown_tag(&String::from_utf8_lossy(&tag))
                .with_column(&name)
                .with_offset(at)
        })?;

        let at = self.scanner.position();
        let len = self.scanner.read_array_len()?;
        expect_len("column body", COLUMN_ARRAY_LEN, len, at).map_err(|err| err.with_column(&name))?;

        let count_at = self.scanner.position();
        let count = self.scanner.read_uint()?;
        if let Some(nrows) = self.nrows {
            if count != nrows {
                return Err(row_count_error(&name, nrows, count, count_at));
            }
        }

        let at = self.scanner.position();
        let length = u64::from(self.scanner.read_bin_len()?);
        let offset = self.scanner.position();
        if dtype.byte_len(count) != Some(length) {
            return Err(Error::new(ErrorKind::Format)
                .with_message("blob length disagrees with count x element size")
                .with_column(&name)
                .with_expected(format!("{count} x {} bytes", dtype.elem_size()))
                .with_found(format!("{length} bytes"))
                .with_offset(at));
        }
        self.scanner.skip(length).map_err(|err| err.with_column(&name))?;

        tracing::debug!(column = %name, dtype = %dtype, count, offset, length, "indexed column");
        self.columns.push(ColumnDescriptor {
            name,
            dtype,
            count,
            offset,
            length,
        });
        self.count_offsets.push(count_at);
        Ok(())
    }

    /// Row counts read before `nrows` (relaxed order) are checked once it is known.
    fn check_deferred_counts(&self) -> Result<(), Error> {
        let nrows = self.nrows.unwrap_or_default();
        for (column, &at) in self.columns.iter().zip(&self.count_offsets) {
            if column.count != nrows {
                return Err(row_count_error(&column.name, nrows, column.count, at));
            }
        }
        Ok(())
    }
}

fn row_count_error(column: &str, nrows: u64, count: u64, offset: u64) -> Error {
    Error::new(ErrorKind::Format)
        .with_message("column row count disagrees with table nrows")
        .with_column(column)
        .with_expected(nrows.to_string())
        .with_found(count.to_string())
        .with_offset(offset)
}

fn value_state(key: PayloadKey) -> State {
    match key {
        PayloadKey::Identifiers => State::SkipIdentifiersValue,
        PayloadKey::Nrows => State::ReadNrows,
        PayloadKey::Data => State::ExpectDataMap,
    }
}

fn expect_len(what: &str, expected: u32, found: u32, offset: u64) -> Result<(), Error> {
    if expected == found {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Format)
        .with_message(format!("unexpected {what} length"))
        .with_expected(expected.to_string())
        .with_found(found.to_string())
        .with_offset(offset))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IndexBuilder {
    options: BuildOptions,
}

impl IndexBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Indexes the file at `path` while holding a shared advisory lock on it.
    pub fn build_path(&self, path: &Path) -> Result<SidecarIndex, Error> {
        let file = File::open(path).map_err(|err| Error::io(err).with_path(path))?;
        let _lock = SharedLock::acquire(&file).map_err(|err| err.with_path(path))?;
        let identity = file
            .metadata()
            .map(|meta| FileIdentity::from_metadata(&meta))
            .map_err(|err| Error::io(err).with_path(path))?;

        let started = Instant::now();
        let index = self
            .build_from_reader(BufReader::new(&file), path, identity)
            .map_err(|err| err.or_path(path))?;

        let after = FileIdentity::of_path(path)?;
        if !identity.matches(&after, true) {
            return Err(stale_error(&identity, &after)
                .with_message("source changed while it was being indexed")
                .with_path(path));
        }

        tracing::info!(
            path = %path.display(),
            rows = index.nrows(),
            columns = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built index"
        );
        Ok(index)
    }

    /// Indexes an arbitrary forward-only stream; `identity` describes its source.
    pub fn build_from_reader<R: Read>(
        &self,
        src: R,
        source_path: &Path,
        identity: FileIdentity,
    ) -> Result<SidecarIndex, Error> {
        let skipper = BlobSkipper::with_buffer_len(self.options.skip_buffer_len);
        let mut scan = Scan {
            scanner: Scanner::with_skipper(src, skipper),
            key_order: self.options.key_order,
            nrows: None,
            num_identifiers: 0,
            columns: Vec::new(),
            count_offsets: Vec::new(),
            names: HashSet::new(),
            seen: HashSet::new(),
        };
        scan.run()?;
        debug_assert_eq!(scan.seen.len(), PayloadKey::ALL.len());
        scan.check_deferred_counts()?;

        let end = scan.scanner.position();
        if scan.scanner.has_trailing_bytes()? {
            tracing::warn!(
                path = %source_path.display(),
                offset = end,
                "ignoring trailing bytes after reflection table"
            );
        }

        let nrows = scan.nrows.unwrap_or_default();
        SidecarIndex::new(
            source_path,
            identity,
            nrows,
            scan.num_identifiers,
            scan.columns,
        )
    }
}

/// Releases the advisory lock when the build finishes or fails.
struct SharedLock<'a> {
    file: &'a File,
}

impl<'a> SharedLock<'a> {
    fn acquire(file: &'a File) -> Result<Self, Error> {
        FileExt::try_lock_shared(file).map_err(|err| {
            Error::io(err)
                .with_message("source is locked by a writer")
                .with_hint("Another process holds an exclusive lock; retry once it finishes.")
        })?;
        Ok(Self { file })
    }
}

impl Drop for SharedLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

pub fn build_index(path: &Path) -> Result<SidecarIndex, Error> {
    IndexBuilder::default().build_path(path)
}

/// Indexes independent files on worker threads; results keep input order.
pub fn build_all(paths: &[PathBuf], options: BuildOptions) -> Vec<Result<SidecarIndex, Error>> {
    let workers = thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(paths.len())
        .max(1);
    let builder = IndexBuilder::new(options);
    let next = AtomicUsize::new(0);
    let mut slots: Vec<Option<Result<SidecarIndex, Error>>> = paths.iter().map(|_| None).collect();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(path) = paths.get(i) else {
                            break;
                        };
                        done.push((i, builder.build_path(path)));
                    }
                    done
                })
            })
            .collect();
        for handle in handles {
            if let Ok(done) = handle.join() {
                for (i, result) in done {
                    slots[i] = Some(result);
                }
            }
        }
    });

    slots
        .into_iter()
        .zip(paths)
        .map(|(slot, path)| {
            slot.unwrap_or_else(|| {
                Err(Error::new(ErrorKind::Internal)
                    .with_message("index worker panicked")
                    .with_path(path))
            })
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexOrigin {
    /// A current sidecar was found and reused.
    Loaded,
    /// No usable sidecar existed; the source was scanned and the sidecar written.
    Built,
}

/// Reuses the sidecar when it matches `source`, otherwise rebuilds and saves it.
pub fn load_or_build(
    source: &Path,
    sidecar: Option<&Path>,
    options: BuildOptions,
) -> Result<(SidecarIndex, IndexOrigin), Error> {
    let sidecar = sidecar
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sidecar_path_for(source));
    match SidecarIndex::load(&sidecar) {
        Ok(index) => {
            let current = FileIdentity::of_path(source)?;
            if index.identity().matches(&current, true) {
                return Ok((index, IndexOrigin::Loaded));
            }
            tracing::warn!(sidecar = %sidecar.display(), "sidecar is stale; rebuilding");
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(sidecar = %sidecar.display(), error = %err, "sidecar unreadable; rebuilding");
        }
    }
    let index = IndexBuilder::new(options).build_path(source)?;
    index.save(Some(&sidecar))?;
    Ok((index, IndexOrigin::Built))
}
