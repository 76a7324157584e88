//! Purpose: Serve row-range reads of column blobs using a `SidecarIndex`.
//! Exports: `Reader`, `ReaderOptions`, `ReadAt`, `ColumnSlice`.
//! Role: Read-side counterpart of the builder; never parses the source format.
//! Invariants: Each read is one positioned read of exactly `(stop - start) * elem` bytes.
//! Invariants: Reads take `&self`; a `Reader` may be shared across threads.
//! Invariants: A short read is an error, never a partial result.
use std::fs::File;
use std::io;
use std::ops::Range;
use std::path::Path;

use memmap2::Mmap;

use crate::core::dtype::Dtype;
use crate::core::error::{Error, ErrorKind};
use crate::core::index::{ColumnDescriptor, FileIdentity, SidecarIndex};

/// Random-access byte source addressed by absolute offset.
pub trait ReadAt {
    /// Fills `buf` from `offset`; fails with `UnexpectedEof` if the source is too short.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    fn size(&self) -> io::Result<u64>;
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        self.metadata().map(|meta| meta.len())
    }
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ReadAt for Mmap {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self[..].read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReaderOptions {
    /// Also compare modification times when both sides recorded one.
    pub verify_modified: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            verify_modified: true,
        }
    }
}

/// Raw little-endian bytes for a row range of one column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnSlice {
    pub column: String,
    pub dtype: Dtype,
    pub rows: Range<u64>,
    pub bytes: Vec<u8>,
}

impl ColumnSlice {
    pub fn row_count(&self) -> u64 {
        self.rows.end - self.rows.start
    }

    /// `[rows]` for scalar types, `[rows, components]` for vector types.
    pub fn shape(&self) -> Vec<usize> {
        self.dtype.shape(self.row_count() as usize)
    }

    /// Bytes of the `i`-th row in this slice (relative to `rows.start`).
    pub fn row(&self, i: usize) -> Option<&[u8]> {
        let elem = self.dtype.elem_size();
        let start = i.checked_mul(elem)?;
        self.bytes.get(start..start.checked_add(elem)?)
    }
}

#[derive(Debug)]
pub struct Reader<'a, S> {
    index: &'a SidecarIndex,
    source: S,
}

impl<'a, S: ReadAt> Reader<'a, S> {
    /// Pairs an index with a byte source; fails if the source cannot hold every blob.
    pub fn new(index: &'a SidecarIndex, source: S) -> Result<Self, Error> {
        let actual = source.size().map_err(Error::io)?;
        let required = index.required_len();
        if actual < required {
            return Err(Error::new(ErrorKind::StaleIndex)
                .with_message("source is shorter than the indexed blobs")
                .with_expected(format!("at least {required} bytes"))
                .with_found(format!("{actual} bytes"))
                .with_path(index.source_path())
                .with_hint("The source was truncated or replaced; rebuild the index."));
        }
        Ok(Self { index, source })
    }

    pub fn index(&self) -> &'a SidecarIndex {
        self.index
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reads rows `[rows.start, rows.end)` of `column`.
    pub fn read(&self, column: &str, rows: Range<u64>) -> Result<ColumnSlice, Error> {
        let descriptor = self.index.get(column)?;
        self.read_descriptor(descriptor, rows)
    }

    pub fn read_all(&self, column: &str) -> Result<ColumnSlice, Error> {
        let descriptor = self.index.get(column)?;
        self.read_descriptor(descriptor, 0..descriptor.count)
    }

    /// Reads the same row range from several columns, in the order given.
    pub fn read_columns<N: AsRef<str>>(
        &self,
        names: &[N],
        rows: Range<u64>,
    ) -> Result<Vec<ColumnSlice>, Error> {
        names
            .iter()
            .map(|name| self.read(name.as_ref(), rows.clone()))
            .collect()
    }

    fn read_descriptor(
        &self,
        descriptor: &ColumnDescriptor,
        rows: Range<u64>,
    ) -> Result<ColumnSlice, Error> {
        check_rows(descriptor, &rows)?;
        let span = descriptor.byte_range(rows.clone());
        let len = usize::try_from(span.end - span.start).map_err(|_| {
            Error::new(ErrorKind::Range)
                .with_message("requested range does not fit in memory")
                .with_column(&descriptor.name)
        })?;
        let mut bytes = vec![0u8; len];
        if len > 0 {
            self.source
                .read_exact_at(&mut bytes, span.start)
                .map_err(|err| {
                    Error::io(err)
                        .with_message("short read from source")
                        .with_column(&descriptor.name)
                        .with_offset(span.start)
                        .with_path(self.index.source_path())
                })?;
        }
        Ok(ColumnSlice {
            column: descriptor.name.clone(),
            dtype: descriptor.dtype,
            rows,
            bytes,
        })
    }
}

impl<'a> Reader<'a, File> {
    /// Opens `path` (default: the recorded source) after checking it against the index.
    pub fn open(
        index: &'a SidecarIndex,
        path: Option<&Path>,
        options: ReaderOptions,
    ) -> Result<Self, Error> {
        let (file, _) = open_checked(index, path, options)?;
        Self::new(index, file)
    }
}

impl<'a> Reader<'a, Mmap> {
    /// Like `open`, but serves reads from a read-only memory map.
    pub fn map(
        index: &'a SidecarIndex,
        path: Option<&Path>,
        options: ReaderOptions,
    ) -> Result<Self, Error> {
        let (file, path) = open_checked(index, path, options)?;
        // The index identity check above is the only guard against concurrent truncation.
        let mmap = unsafe { Mmap::map(&file).map_err(|err| Error::io(err).with_path(path))? };
        Self::new(index, mmap)
    }
}

fn open_checked<'p>(
    index: &'p SidecarIndex,
    path: Option<&'p Path>,
    options: ReaderOptions,
) -> Result<(File, &'p Path), Error> {
    let path = path.unwrap_or(index.source_path());
    let file = File::open(path).map_err(|err| Error::io(err).with_path(path))?;
    let current = file
        .metadata()
        .map(|meta| FileIdentity::from_metadata(&meta))
        .map_err(|err| Error::io(err).with_path(path))?;
    index
        .check_identity(&current, options.verify_modified)
        .map_err(|err| err.with_path(path))?;
    Ok((file, path))
}

fn check_rows(descriptor: &ColumnDescriptor, rows: &Range<u64>) -> Result<(), Error> {
    if rows.start > rows.end {
        return Err(Error::new(ErrorKind::Range)
            .with_message("row start is after row stop")
            .with_column(&descriptor.name)
            .with_expected(format!("start <= {}", rows.end))
            .with_found(rows.start.to_string()));
    }
    if rows.end > descriptor.count {
        return Err(Error::new(ErrorKind::Range)
            .with_message("row stop is past the end of the column")
            .with_column(&descriptor.name)
            .with_expected(format!("stop <= {}", descriptor.count))
            .with_found(rows.end.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ReadAt, Reader, ReaderOptions};
    use crate::core::builder::IndexBuilder;
    use crate::core::dtype::Dtype;
    use crate::core::error::ErrorKind;
    use crate::core::fixture::{self, Fixture, Written};
    use crate::core::index::{FileIdentity, SidecarIndex};
    use std::fs::OpenOptions;
    use std::path::Path;
    use std::thread;

    fn index_of(written: &Written) -> SidecarIndex {
        IndexBuilder::default()
            .build_from_reader(
                written.bytes.as_slice(),
                Path::new("mem.refl"),
                FileIdentity::new(written.bytes.len() as u64),
            )
            .expect("build")
    }

    #[test]
    fn scenario_slice_matches_values() {
        let written = Fixture::new(3)
            .column("x", "double", fixture::f64_column(&[1.0, 2.0, 3.0]))
            .column("id", "int", fixture::i32_column(&[0, 1, 2]))
            .write();
        let index = index_of(&written);
        let reader = Reader::new(&index, written.bytes.as_slice()).expect("reader");

        let slice = reader.read("x", 1..3).expect("read");
        assert_eq!(slice.bytes, fixture::f64_column(&[2.0, 3.0]));
        assert_eq!(slice.dtype, Dtype::Double);
        assert_eq!(slice.shape(), vec![2]);
        assert_eq!(slice.row(1), Some(3.0f64.to_le_bytes().as_slice()));
        assert_eq!(slice.row(2), None);
    }

    #[test]
    fn every_range_matches_reference_slice() {
        let nrows = 9u64;
        let written = Fixture::all_types(nrows).write();
        let index = index_of(&written);
        let reader = Reader::new(&index, &written.bytes).expect("reader");

        for column in index.columns() {
            let reference = written.blob_bytes(&column.name);
            let elem = column.elem_size();
            for start in 0..=nrows {
                for stop in start..=nrows {
                    let slice = reader.read(&column.name, start..stop).expect("read");
                    let expected = &reference[start as usize * elem..stop as usize * elem];
                    assert_eq!(slice.bytes, expected, "{} {start}..{stop}", column.name);
                }
            }
        }
    }

    #[test]
    fn vector_types_report_component_shape() {
        let written = Fixture::all_types(4).write();
        let index = index_of(&written);
        let reader = Reader::new(&index, written.bytes.as_slice()).expect("reader");
        assert_eq!(reader.read("bbox", 0..4).expect("bbox").shape(), vec![4, 6]);
        assert_eq!(reader.read("miller_index", 1..2).expect("hkl").shape(), vec![1, 3]);
        assert_eq!(reader.read_all("flags").expect("flags").bytes.len(), 16);
    }

    #[test]
    fn range_rules() {
        let written = Fixture::all_types(5).write();
        let index = index_of(&written);
        let reader = Reader::new(&index, written.bytes.as_slice()).expect("reader");

        let empty = reader.read("flags", 3..3).expect("empty");
        assert!(empty.bytes.is_empty());
        assert_eq!(empty.shape(), vec![0]);

        let err = reader.read("flags", 0..6).expect_err("past end");
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(err.found(), Some("6"));

        #[allow(clippy::reversed_empty_ranges)]
        let err = reader.read("flags", 4..2).expect_err("reversed");
        assert_eq!(err.kind(), ErrorKind::Range);

        let err = reader.read("nope", 0..1).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.message().unwrap_or_default().contains("flags"));
    }

    #[test]
    fn read_columns_keeps_requested_order() {
        let written = Fixture::all_types(6).write();
        let index = index_of(&written);
        let reader = Reader::new(&index, written.bytes.as_slice()).expect("reader");
        let slices = reader
            .read_columns(&["xyzcal.px", "flags"], 2..5)
            .expect("read");
        let names: Vec<&str> = slices.iter().map(|slice| slice.column.as_str()).collect();
        assert_eq!(names, ["xyzcal.px", "flags"]);
        assert!(reader.read_columns(&["flags", "nope"], 0..1).is_err());
    }

    #[test]
    fn short_source_is_stale() {
        let written = Fixture::all_types(5).write();
        let index = index_of(&written);
        let last = written.blobs.last().expect("blob");
        let short = &written.bytes[..(last.offset + last.len - 1) as usize];
        let err = Reader::new(&index, short).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::StaleIndex);
    }

    #[test]
    fn file_reader_detects_size_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.refl");
        Fixture::all_types(7).write_to(&path).expect("write");
        let index = IndexBuilder::default().build_path(&path).expect("build");

        let reader = Reader::open(&index, None, ReaderOptions::default()).expect("open");
        assert_eq!(reader.read_all("flags").expect("read").row_count(), 7);
        drop(reader);

        let file = OpenOptions::new().append(true).open(&path).expect("open");
        file.set_len(index.identity().size + 1).expect("grow");
        drop(file);
        let err = Reader::open(&index, None, ReaderOptions::default()).expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::StaleIndex);
        let err = Reader::map(&index, None, ReaderOptions::default()).expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::StaleIndex);
    }

    #[test]
    fn mapped_reader_matches_file_reader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.refl");
        let written = Fixture::all_types(40).write_to(&path).expect("write");
        let index = IndexBuilder::default().build_path(&path).expect("build");
        let mapped = Reader::map(&index, None, ReaderOptions::default()).expect("map");
        let file = Reader::open(&index, Some(path.as_path()), ReaderOptions::default()).expect("open");
        for column in index.columns() {
            let a = mapped.read(&column.name, 10..31).expect("mapped");
            let b = file.read(&column.name, 10..31).expect("file");
            assert_eq!(a, b);
            assert_eq!(a.bytes.len() as u64, 21 * column.elem_size() as u64);
        }
        assert_eq!(mapped.source().size().expect("size"), written.bytes.len() as u64);
    }

    #[test]
    fn shared_reader_serves_concurrent_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.refl");
        let written = Fixture::all_types(500).write_to(&path).expect("write");
        let index = IndexBuilder::default().build_path(&path).expect("build");
        let reader = Reader::open(&index, None, ReaderOptions::default()).expect("open");

        thread::scope(|scope| {
            for worker in 0..8u64 {
                let reader = &reader;
                let written = &written;
                scope.spawn(move || {
                    for column in reader.index().columns() {
                        let start = worker * 37 % 400;
                        let slice = reader.read(&column.name, start..start + 100).expect("read");
                        let elem = column.elem_size();
                        let reference = written.blob_bytes(&column.name);
                        assert_eq!(
                            slice.bytes,
                            &reference[start as usize * elem..(start as usize + 100) * elem]
                        );
                    }
                });
            }
        });
    }
}
