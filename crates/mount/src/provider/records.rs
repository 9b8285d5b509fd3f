//! Line-oriented scanning shared by the WARC and ARC providers.

use crate::BoxRead;
use crate::error::{ErrorKind, Result};
use arcache_compress::Compression;
use exn::ResultExt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

// Header blocks are short; anything longer is not a record header.
const MAX_LINE: u64 = 64 * 1024;

/// Walks a record-based archive while tracking the offset into the
/// decompressed stream.
pub(crate) struct RecordScanner {
    reader: BufReader<BoxRead>,
    position: u64,
    buf: Vec<u8>,
}
impl RecordScanner {
    pub(crate) fn open(path: &Path, compression: Compression) -> Result<Self> {
        let file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
        let reader = compression.wrap_reader(file).map_err(ErrorKind::compression)?;
        Ok(Self::new(reader))
    }

    pub(crate) fn new(reader: BoxRead) -> Self {
        Self { reader: BufReader::new(reader), position: 0, buf: Vec::new() }
    }

    /// Offset of the next unread byte.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    /// Read one line without its line terminator. `None` at end of stream.
    pub(crate) fn line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = (&mut self.reader)
            .take(MAX_LINE)
            .read_until(b'\n', &mut self.buf)
            .or_raise(|| ErrorKind::Malformed(format!("unreadable line at offset {}", self.position)))?;
        if read == 0 {
            return Ok(None);
        }
        if !self.buf.ends_with(b"\n") && read as u64 == MAX_LINE {
            exn::bail!(ErrorKind::Malformed(format!("line at offset {} exceeds {MAX_LINE} bytes", self.position)));
        }
        self.position += read as u64;
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Read the next line that isn't blank (records are separated by blank
    /// lines). `None` at end of stream.
    pub(crate) fn header_line(&mut self) -> Result<Option<String>> {
        while let Some(line) = self.line()? {
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// Discard `len` bytes of record body.
    pub(crate) fn skip(&mut self, len: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())
            .or_raise(|| ErrorKind::Malformed(format!("unreadable record body at offset {}", self.position)))?;
        self.position += skipped;
        if skipped < len {
            exn::bail!(ErrorKind::Malformed(format!("record body truncated at offset {}", self.position)));
        }
        Ok(())
    }
}
