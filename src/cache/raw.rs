//! cache/raw — positional reads over a borrowed file handle.
//!
//! The reader never owns or closes the handle; the borrow guarantees it stays
//! open for the reader's lifetime. Reads loop over partial results, so a short
//! count means end-of-file and nothing else. Every raw read feeds the metrics
//! counters and the attached read logger.

use std::fs::File;
use std::io;
use std::time::Instant;

use anyhow::{Context, Result};

use super::read_log::{LogParams, ReadLogger};
use super::OffsetLength;
use crate::metrics;

#[cfg(unix)]
fn positional_read(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Fill `buf` from `offset`, looping over partial reads; stops early only at
/// end-of-file.
fn read_full_at(file: &File, mut offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match positional_read(file, offset, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Thin offset-addressed reader with an instrumentation hook.
pub struct RawReader<'f> {
    file: &'f File,
    logger: ReadLogger,
}

impl<'f> RawReader<'f> {
    pub fn new(file: &'f File) -> Self {
        Self {
            file,
            logger: ReadLogger::new(),
        }
    }

    pub fn file(&self) -> &'f File {
        self.file
    }

    /// Read `buf.len()` bytes at `offset`. Returns the byte count actually
    /// available; fewer than requested means the file ends there.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let started = Instant::now();
        let n = read_full_at(self.file, offset, buf)
            .with_context(|| format!("raw read of {} bytes at offset {}", buf.len(), offset))?;
        let elapsed = started.elapsed();
        metrics::record_raw_read(n, elapsed.as_micros() as u64);
        self.logger.on_raw_read(offset, buf.len(), n, elapsed);
        Ok(n)
    }

    /// Swap read-log parameters; takes effect at the next read boundary.
    pub fn set_log(&mut self, params: LogParams) {
        self.logger.setup(params);
    }

    pub(crate) fn logger_wants_segments(&self) -> bool {
        self.logger.wants_segments()
    }

    pub(crate) fn log_read_begin(
        &mut self,
        offset: u64,
        requested: usize,
        cache_segments: Option<Vec<OffsetLength>>,
    ) {
        self.logger
            .on_read_begin(offset, requested, cache_segments.as_deref());
    }

    pub(crate) fn log_read_finish(&mut self, bytes_read: usize) {
        self.logger.on_read_finish(bytes_read);
    }
}
