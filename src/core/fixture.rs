//! Purpose: Write synthetic reflection-table files for tests.
//! Exports: `Fixture`, `FixtureColumn`, `Packer`, `Width`, `Written`, `BlobSpan`, sample data helpers.
//! Role: Test-only MessagePack writer shared by unit tests and (via `#[path]`) integration tests.
//! Invariants: std-only; must not reference crate internals.
//! Invariants: `Written::blobs` records the offsets and lengths the writer actually produced.
#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::Path;

pub const DIALS_MAGIC: &[u8] = b"dials::af::reflection_table";

/// Encoding width policy for lengths and integers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Width {
    /// Smallest encoding that fits (what msgpack writers emit).
    Compact,
    /// 16-bit forms wherever the value fits, even when a smaller form exists.
    Wide16,
    /// 32-bit forms wherever the value fits.
    Wide32,
}

pub struct Packer {
    out: Vec<u8>,
    width: Width,
}

impl Packer {
    pub fn new(width: Width) -> Self {
        Self {
            out: Vec::new(),
            width,
        }
    }

    pub fn len(&self) -> u64 {
        self.out.len() as u64
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn array_len(&mut self, n: u32) {
        self.container(n, 0x90, 0xdc, 0xdd);
    }

    pub fn map_len(&mut self, n: u32) {
        self.container(n, 0x80, 0xde, 0xdf);
    }

    pub fn uint(&mut self, value: u64) {
        let width = self.width;
        match width {
            Width::Compact if value <= 0x7f => self.out.push(value as u8),
            Width::Compact if value <= 0xff => {
                self.out.push(0xcc);
                self.out.push(value as u8);
            }
            Width::Compact | Width::Wide16 if value <= 0xffff => {
                self.out.push(0xcd);
                self.out.extend_from_slice(&(value as u16).to_be_bytes());
            }
            _ if value <= u64::from(u32::MAX) => {
                self.out.push(0xce);
                self.out.extend_from_slice(&(value as u32).to_be_bytes());
            }
            _ => {
                self.out.push(0xcf);
                self.out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }

    pub fn int(&mut self, value: i64) {
        if value >= 0 {
            return self.uint(value as u64);
        }
        let width = self.width;
        match width {
            Width::Compact if value >= -32 => self.out.push(value as i8 as u8),
            Width::Compact if value >= i64::from(i8::MIN) => {
                self.out.push(0xd0);
                self.out.push(value as i8 as u8);
            }
            Width::Compact | Width::Wide16 if value >= i64::from(i16::MIN) => {
                self.out.push(0xd1);
                self.out.extend_from_slice(&(value as i16).to_be_bytes());
            }
            _ if value >= i64::from(i32::MIN) => {
                self.out.push(0xd2);
                self.out.extend_from_slice(&(value as i32).to_be_bytes());
            }
            _ => {
                self.out.push(0xd3);
                self.out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }

    pub fn str(&mut self, bytes: &[u8]) {
        let n = bytes.len();
        let width = self.width;
        match width {
            Width::Compact if n <= 31 => self.out.push(0xa0 | n as u8),
            Width::Compact if n <= 0xff => {
                self.out.push(0xd9);
                self.out.push(n as u8);
            }
            Width::Compact | Width::Wide16 if n <= 0xffff => {
                self.out.push(0xda);
                self.out.extend_from_slice(&(n as u16).to_be_bytes());
            }
            _ => {
                self.out.push(0xdb);
                self.out.extend_from_slice(&(n as u32).to_be_bytes());
            }
        }
        self.out.extend_from_slice(bytes);
    }

    /// Writes a bin header only; returns the offset of the first blob byte.
    pub fn bin_header(&mut self, n: u32) -> u64 {
        let width = self.width;
        match width {
            Width::Compact if n <= 0xff => {
                self.out.push(0xc4);
                self.out.push(n as u8);
            }
            Width::Compact | Width::Wide16 if n <= 0xffff => {
                self.out.push(0xc5);
                self.out.extend_from_slice(&(n as u16).to_be_bytes());
            }
            _ => {
                self.out.push(0xc6);
                self.out.extend_from_slice(&n.to_be_bytes());
            }
        }
        self.len()
    }

    /// Writes a bin token; returns the offset of the first blob byte.
    pub fn bin(&mut self, data: &[u8]) -> u64 {
        let offset = self.bin_header(data.len() as u32);
        self.out.extend_from_slice(data);
        offset
    }

    fn container(&mut self, n: u32, fix: u8, x16: u8, x32: u8) {
        let width = self.width;
        match width {
            Width::Compact if n <= 15 => self.out.push(fix | n as u8),
            Width::Compact | Width::Wide16 if n <= 0xffff => {
                self.out.push(x16);
                self.out.extend_from_slice(&(n as u16).to_be_bytes());
            }
            _ => {
                self.out.push(x32);
                self.out.extend_from_slice(&n.to_be_bytes());
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct FixtureColumn {
    pub name: String,
    pub tag: String,
    pub count: u64,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlobSpan {
    pub name: String,
    pub offset: u64,
    pub len: u64,
}

#[derive(Clone, Debug)]
pub struct Written {
    pub bytes: Vec<u8>,
    pub blobs: Vec<BlobSpan>,
}

impl Written {
    pub fn blob(&self, name: &str) -> &BlobSpan {
        self.blobs
            .iter()
            .find(|span| span.name == name)
            .unwrap_or_else(|| panic!("no blob named {name}"))
    }

    /// Reference slice of a column's blob, taken straight from the written bytes.
    pub fn blob_bytes(&self, name: &str) -> &[u8] {
        let span = self.blob(name);
        &self.bytes[span.offset as usize..(span.offset + span.len) as usize]
    }
}

#[derive(Clone, Debug)]
pub struct Fixture {
    pub magic: Vec<u8>,
    pub magic_as_bin: bool,
    pub version: i64,
    pub top_len: u32,
    pub nrows: u64,
    pub identifiers: Vec<(i64, String)>,
    pub key_order: Vec<String>,
    pub columns: Vec<FixtureColumn>,
    pub width: Width,
}

impl Fixture {
    pub fn new(nrows: u64) -> Self {
        Self {
            magic: DIALS_MAGIC.to_vec(),
            magic_as_bin: true,
            version: 1,
            top_len: 3,
            nrows,
            identifiers: (0..3).map(|i| (i, format!("uuid-{i:04}"))).collect(),
            key_order: ["identifiers", "nrows", "data"]
                .into_iter()
                .map(String::from)
                .collect(),
            columns: Vec::new(),
            width: Width::Compact,
        }
    }

    /// Seven columns, one per DIALS element type, with deterministic data.
    pub fn all_types(nrows: u64) -> Self {
        let mut fixture = Self::new(nrows);
        for (seed, (name, tag)) in DEFAULT_COLUMNS.iter().enumerate() {
            fixture = fixture.column(name, tag, sample_data(tag, nrows, seed as u64));
        }
        fixture
    }

    pub fn column(mut self, name: &str, tag: &str, data: Vec<u8>) -> Self {
        let count = self.nrows;
        self.columns.push(FixtureColumn {
            name: name.to_string(),
            tag: tag.to_string(),
            count,
            data,
        });
        self
    }

    pub fn with_width(mut self, width: Width) -> Self {
        self.width = width;
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_magic(mut self, magic: &[u8], as_bin: bool) -> Self {
        self.magic = magic.to_vec();
        self.magic_as_bin = as_bin;
        self
    }

    pub fn with_identifiers(mut self, count: usize) -> Self {
        self.identifiers = (0..count as i64)
            .map(|i| (i, format!("uuid-{i:04}")))
            .collect();
        self
    }

    pub fn with_key_order(mut self, keys: &[&str]) -> Self {
        self.key_order = keys.iter().map(|key| key.to_string()).collect();
        self
    }

    pub fn write(&self) -> Written {
        let mut p = Packer::new(self.width);
        let mut blobs = Vec::new();

        p.array_len(self.top_len);
        if self.magic_as_bin {
            p.bin(&self.magic);
        } else {
            p.str(&self.magic);
        }
        p.int(self.version);
        p.map_len(self.key_order.len() as u32);

        for key in &self.key_order {
            p.str(key.as_bytes());
            match key.as_str() {
                "identifiers" => {
                    p.map_len(self.identifiers.len() as u32);
                    for (id, uuid) in &self.identifiers {
                        p.int(*id);
                        p.str(uuid.as_bytes());
                    }
                }
                "nrows" => p.uint(self.nrows),
                "data" => {
                    p.map_len(self.columns.len() as u32);
                    for column in &self.columns {
                        p.str(column.name.as_bytes());
                        p.array_len(2);
                        p.str(column.tag.as_bytes());
                        p.array_len(2);
                        p.uint(column.count);
                        let offset = p.bin(&column.data);
                        blobs.push(BlobSpan {
                            name: column.name.clone(),
                            offset,
                            len: column.data.len() as u64,
                        });
                    }
                }
                _ => p.uint(0),
            }
        }

        Written {
            bytes: p.into_bytes(),
            blobs,
        }
    }

    pub fn write_to(&self, path: &Path) -> io::Result<Written> {
        let written = self.write();
        fs::write(path, &written.bytes)?;
        Ok(written)
    }
}

pub const DEFAULT_COLUMNS: [(&str, &str); 7] = [
    ("intensity.sum.value", "double"),
    ("flags", "int"),
    ("is_strong", "bool"),
    ("imageset_id", "std::size_t"),
    ("bbox", "int6"),
    ("xyzcal.px", "vec3<double>"),
    ("miller_index", "cctbx::miller::index<>"),
];

/// Row byte size for a DIALS tag, independent of the crate's registry.
pub fn elem_size(tag: &str) -> usize {
    match tag {
        "double" | "std::size_t" => 8,
        "int" => 4,
        "bool" => 1,
        "int6" | "vec3<double>" => 24,
        "cctbx::miller::index<>" => 12,
        other => panic!("unknown fixture tag {other}"),
    }
}

/// Deterministic little-endian column data for `nrows` rows of `tag`.
pub fn sample_data(tag: &str, nrows: u64, seed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(nrows as usize * elem_size(tag));
    for row in 0..nrows {
        match tag {
            "double" => f64_le(&mut out, row as f64 * 0.5 + seed as f64),
            "int" => i32_le(&mut out, (row * 7 + seed) as i32 - 50),
            "bool" => out.push(u8::from(row % 3 == 0)),
            "std::size_t" => out.extend_from_slice(&(row * 1000 + seed).to_le_bytes()),
            "int6" => {
                for comp in 0..6 {
                    i32_le(&mut out, (row * 6 + comp) as i32 - 100);
                }
            }
            "vec3<double>" => {
                for comp in 0..3 {
                    f64_le(&mut out, row as f64 + comp as f64 / 10.0);
                }
            }
            "cctbx::miller::index<>" => {
                for comp in 0..3 {
                    i32_le(&mut out, (row % 20) as i32 - 10 + comp as i32);
                }
            }
            other => panic!("unknown fixture tag {other}"),
        }
    }
    out
}

pub fn f64_column(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for value in values {
        f64_le(&mut out, *value);
    }
    out
}

pub fn i32_column(values: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        i32_le(&mut out, *value);
    }
    out
}

fn f64_le(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn i32_le(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}
