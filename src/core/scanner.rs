//! Purpose: Decode MessagePack structural tokens from a forward-only stream.
//! Exports: `Scanner`, `Token`.
//! Role: Leaf cursor for the index builder; never buffers blob payloads.
//! Invariants: `position()` is the absolute offset of the next unread byte.
//! Invariants: After a `Bin` token the cursor sits on the first blob byte.
//! Invariants: Only short strings (tags, names, keys) are materialized.
use std::io::{self, Read};

use crate::core::error::{Error, ErrorKind};
use crate::core::skip::BlobSkipper;

/// Upper bound for strings read into memory; real tags and names are tiny.
pub const MAX_STR_LEN: u32 = 1024 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    Array(u32),
    Map(u32),
    Uint(u64),
    Int(i64),
    Str(Vec<u8>),
    /// Length of a binary blob whose bytes have not been consumed.
    Bin(u32),
}

/// Token header: what follows a marker byte, before any string payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Header {
    Array(u32),
    Map(u32),
    Uint(u64),
    Int(i64),
    Str(u32),
    Bin(u32),
}

impl Header {
    fn kind_name(self) -> &'static str {
        match self {
            Header::Array(_) => "array",
            Header::Map(_) => "map",
            Header::Uint(_) | Header::Int(_) => "integer",
            Header::Str(_) => "str",
            Header::Bin(_) => "bin",
        }
    }

    fn describe(self) -> String {
        match self {
            Header::Array(len) => format!("array({len})"),
            Header::Map(len) => format!("map({len})"),
            Header::Uint(value) => format!("uint {value}"),
            Header::Int(value) => format!("int {value}"),
            Header::Str(len) => format!("str of {len} bytes"),
            Header::Bin(len) => format!("bin({len})"),
        }
    }
}

pub struct Scanner<R> {
    src: R,
    pos: u64,
    skipper: BlobSkipper,
}

impl<R: Read> Scanner<R> {
    pub fn new(src: R) -> Self {
        Self::with_skipper(src, BlobSkipper::new())
    }

    pub fn with_skipper(src: R, skipper: BlobSkipper) -> Self {
        Self {
            src,
            pos: 0,
            skipper,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Decodes the next token; string payloads are read, blob payloads are not.
    pub fn next_token(&mut self) -> Result<Token, Error> {
        let start = self.pos;
        let token = match self.read_header()? {
            Header::Array(len) => Token::Array(len),
            Header::Map(len) => Token::Map(len),
            Header::Uint(value) => Token::Uint(value),
            Header::Int(value) => Token::Int(value),
            Header::Bin(len) => Token::Bin(len),
            Header::Str(len) => Token::Str(self.read_payload(len, start)?),
        };
        Ok(token)
    }

    pub fn read_array_len(&mut self) -> Result<u32, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Array(len) => Ok(len),
            other => Err(kind_mismatch("array", other, start)),
        }
    }

    pub fn read_map_len(&mut self) -> Result<u32, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Map(len) => Ok(len),
            other => Err(kind_mismatch("map", other, start)),
        }
    }

    /// Reads any integer encoding that holds a non-negative value.
    pub fn read_uint(&mut self) -> Result<u64, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Uint(value) => Ok(value),
            Header::Int(value) if value >= 0 => Ok(value as u64),
            other => Err(kind_mismatch("unsigned integer", other, start)),
        }
    }

    /// Reads any integer encoding that fits in an `i64`.
    pub fn read_int(&mut self) -> Result<i64, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Int(value) => Ok(value),
            Header::Uint(value) => i64::try_from(value).map_err(|_| {
                Error::new(ErrorKind::Format)
                    .with_message("integer out of range")
                    .with_expected("signed 64-bit integer")
                    .with_found(format!("uint {value}"))
                    .with_offset(start)
            }),
            other => Err(kind_mismatch("integer", other, start)),
        }
    }

    pub fn read_str(&mut self) -> Result<Vec<u8>, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Str(len) => self.read_payload(len, start),
            other => Err(kind_mismatch("str", other, start)),
        }
    }

    /// Reads a short byte string encoded as either `str` or `bin`.
    pub fn read_str_or_bin(&mut self) -> Result<Vec<u8>, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Str(len) | Header::Bin(len) => self.read_payload(len, start),
            other => Err(kind_mismatch("str or bin", other, start)),
        }
    }

    /// Reads a blob-length token, leaving the cursor on the first blob byte.
    pub fn read_bin_len(&mut self) -> Result<u32, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Bin(len) => Ok(len),
            other => Err(kind_mismatch("bin", other, start)),
        }
    }

    /// Skips one string token without materializing it; returns its byte length.
    pub fn skip_str(&mut self) -> Result<u32, Error> {
        let start = self.pos;
        match self.read_header()? {
            Header::Str(len) => {
                self.skip(u64::from(len))?;
                Ok(len)
            }
            other => Err(kind_mismatch("str", other, start)),
        }
    }

    /// Advances past `count` raw bytes through the bounded skip buffer.
    pub fn skip(&mut self, count: u64) -> Result<(), Error> {
        let start = self.pos;
        self.skipper
            .skip(&mut self.src, count)
            .map_err(|err| err.with_offset(start))?;
        self.pos += count;
        Ok(())
    }

    /// Consumes one byte if any remain; used to detect trailing data.
    pub fn has_trailing_bytes(&mut self) -> Result<bool, Error> {
        let mut byte = [0u8; 1];
        loop {
            match self.src.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    self.pos += 1;
                    return Ok(true);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::io(err).with_offset(self.pos)),
            }
        }
    }

    fn read_header(&mut self) -> Result<Header, Error> {
        let start = self.pos;
        let [marker] = self.read_be::<1>(start)?;
        let header = match marker {
            0x00..=0x7f => Header::Uint(u64::from(marker)),
            0x80..=0x8f => Header::Map(u32::from(marker & 0x0f)),
            0x90..=0x9f => Header::Array(u32::from(marker & 0x0f)),
            0xa0..=0xbf => Header::Str(u32::from(marker & 0x1f)),
            0xc4 => Header::Bin(u32::from(self.read_be::<1>(start)?[0])),
            0xc5 => Header::Bin(u32::from(u16::from_be_bytes(self.read_be(start)?))),
            0xc6 => Header::Bin(u32::from_be_bytes(self.read_be(start)?)),
            0xcc => Header::Uint(u64::from(self.read_be::<1>(start)?[0])),
            0xcd => Header::Uint(u64::from(u16::from_be_bytes(self.read_be(start)?))),
            0xce => Header::Uint(u64::from(u32::from_be_bytes(self.read_be(start)?))),
            0xcf => Header::Uint(u64::from_be_bytes(self.read_be(start)?)),
            0xd0 => Header::Int(i64::from(i8::from_be_bytes(self.read_be(start)?))),
            0xd1 => Header::Int(i64::from(i16::from_be_bytes(self.read_be(start)?))),
            0xd2 => Header::Int(i64::from(i32::from_be_bytes(self.read_be(start)?))),
            0xd3 => Header::Int(i64::from_be_bytes(self.read_be(start)?)),
            0xd9 => Header::Str(u32::from(self.read_be::<1>(start)?[0])),
            0xda => Header::Str(u32::from(u16::from_be_bytes(self.read_be(start)?))),
            0xdb => Header::Str(u32::from_be_bytes(self.read_be(start)?)),
            0xdc => Header::Array(u32::from(u16::from_be_bytes(self.read_be(start)?))),
            0xdd => Header::Array(u32::from_be_bytes(self.read_be(start)?)),
            0xde => Header::Map(u32::from(u16::from_be_bytes(self.read_be(start)?))),
            0xdf => Header::Map(u32::from_be_bytes(self.read_be(start)?)),
            0xe0..=0xff => Header::Int(i64::from(marker as i8)),
            _ => {
                return Err(Error::new(ErrorKind::Format)
                    .with_message("unsupported token marker")
                    .with_found(format!("0x{marker:02x}"))
                    .with_offset(start));
            }
        };
        Ok(header)
    }

    fn read_payload(&mut self, len: u32, start: u64) -> Result<Vec<u8>, Error> {
        if len > MAX_STR_LEN {
            return Err(Error::new(ErrorKind::Format)
                .with_message("string token too long")
                .with_expected(format!("at most {MAX_STR_LEN} bytes"))
                .with_found(format!("{len} bytes"))
                .with_offset(start));
        }
        let mut buf = vec![0u8; len as usize];
        self.fill(&mut buf, start)?;
        Ok(buf)
    }

    fn read_be<const N: usize>(&mut self, start: u64) -> Result<[u8; N], Error> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, start)?;
        Ok(buf)
    }

    fn fill(&mut self, buf: &mut [u8], start: u64) -> Result<(), Error> {
        match self.src.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(Error::new(ErrorKind::Format)
                    .with_message("stream ended inside token")
                    .with_expected(format!("{} more bytes", buf.len()))
                    .with_offset(start)
                    .with_source(err))
            }
            Err(err) => Err(Error::io(err).with_offset(start)),
        }
    }
}

fn kind_mismatch(expected: &str, found: Header, offset: u64) -> Error {
    Error::new(ErrorKind::Format)
        .with_message(format!("expected {expected} token, found {}", found.kind_name()))
        .with_expected(expected)
        .with_found(found.describe())
        .with_offset(offset)
}
