// Bounded-buffer draining of blob payloads on a forward-only stream.
// Memory use is the buffer length, whatever the skip size.
use std::io::{self, Read};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_SKIP_BUFFER_LEN: usize = 64 * 1024;
pub const MIN_SKIP_BUFFER_LEN: usize = 16;

#[derive(Debug)]
pub struct BlobSkipper {
    buf: Box<[u8]>,
}

impl BlobSkipper {
    pub fn new() -> Self {
        Self::with_buffer_len(DEFAULT_SKIP_BUFFER_LEN)
    }

    pub fn with_buffer_len(len: usize) -> Self {
        let len = len.max(MIN_SKIP_BUFFER_LEN);
        Self {
            buf: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buf.len()
    }

    /// Consumes exactly `count` bytes from `src`.
    ///
    /// Fails with `Io` if the stream ends first; the error offset is the number
    /// of bytes that were actually skipped.
    pub fn skip<R: Read>(&mut self, src: &mut R, count: u64) -> Result<(), Error> {
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(self.buf.len() as u64) as usize;
            match src.read(&mut self.buf[..chunk]) {
                Ok(0) => {
                    return Err(Error::new(ErrorKind::Io)
                        .with_message("stream ended inside blob")
                        .with_expected(format!("{count} bytes"))
                        .with_found(format!("{} bytes", count - remaining))
                        .with_source(io::Error::from(io::ErrorKind::UnexpectedEof)));
                }
                Ok(n) => remaining -= n as u64,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::io(err).with_message("failed to skip blob")),
            }
        }
        Ok(())
    }
}

impl Default for BlobSkipper {
    fn default() -> Self {
        Self::new()
    }
}
