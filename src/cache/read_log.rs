//! cache/read_log — CSV diagnostics for cache reads.
//!
//! One row per `read` call: sequence, offset, requested/returned byte counts,
//! raw I/O call count and bytes, raw I/O and cache-layer latency (µs), and the
//! request-vs-cache hit map. Purely observational: a failing writer is warned
//! about and detached, never surfaced to the read path.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::warn;

use super::hitmap::CacheHitMap;
use super::OffsetLength;
use crate::util::now_secs;

/// Read-log parameters. A `None` path disables logging.
#[derive(Debug, Clone)]
pub struct LogParams {
    pub path: Option<PathBuf>,
    pub append: bool,
    /// Flush after every N rows; 0 leaves flushing to the buffered writer.
    pub flush_every: u32,
    /// Free-form text recorded in the section header.
    pub metadata: Option<String>,
}

impl Default for LogParams {
    fn default() -> Self {
        Self {
            path: None,
            append: true,
            flush_every: 0,
            metadata: None,
        }
    }
}

pub struct ReadLogger {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    metadata: Option<String>,
    flush_every: u32,
    pending_since_flush: u32,
    sequence: u64,
    pending_setup: Option<LogParams>,

    // Per-read accumulators — reset in on_read_begin, written in on_read_finish.
    current_seq: u64,
    current_offset: u64,
    current_requested: usize,
    raw_count: u32,
    raw_bytes: u64,
    io_cost: Duration,
    started: Option<Instant>,
    hitmap: CacheHitMap,
}

impl ReadLogger {
    pub fn new() -> Self {
        Self {
            writer: None,
            path: None,
            metadata: None,
            flush_every: 0,
            pending_since_flush: 0,
            sequence: 0,
            pending_setup: None,
            current_seq: 0,
            current_offset: 0,
            current_requested: 0,
            raw_count: 0,
            raw_bytes: 0,
            io_cost: Duration::ZERO,
            started: None,
            hitmap: CacheHitMap::default(),
        }
    }

    /// Whether the caller should bother collecting cache segments for the
    /// next read.
    pub fn wants_segments(&self) -> bool {
        match &self.pending_setup {
            Some(p) => p.path.is_some(),
            None => self.writer.is_some(),
        }
    }

    /// Stash new parameters; they take effect at the next read boundary so
    /// the writer never switches mid-read.
    pub fn setup(&mut self, params: LogParams) {
        self.pending_setup = Some(params);
    }

    fn apply_pending_setup(&mut self) {
        let Some(p) = self.pending_setup.take() else {
            return;
        };
        self.flush_every = p.flush_every;

        let path = p.path;
        let path_changed = self.path != path;
        let metadata = p.metadata.filter(|m| !m.trim().is_empty());
        let header_due = path_changed || self.metadata != metadata;

        if path_changed {
            if let Some(w) = self.writer.as_mut() {
                let _ = w.flush();
            }
            self.writer = None;
            if let Some(target) = &path {
                let mut opts = OpenOptions::new();
                opts.create(true);
                if p.append {
                    opts.append(true);
                } else {
                    opts.write(true).truncate(true);
                }
                match opts.open(target) {
                    Ok(f) => self.writer = Some(BufWriter::new(f)),
                    Err(e) => warn!("read log {} not opened: {}", target.display(), e),
                }
            }
            self.pending_since_flush = 0;
            self.path = path;
        }

        if header_due && self.writer.is_some() {
            self.write_header(metadata.as_deref());
        }
        self.metadata = metadata;
    }

    /// CSV section header: version/metadata line plus the column line. Written
    /// when the path or metadata changes.
    fn write_header(&mut self, metadata: Option<&str>) {
        let mut line = format!("#v1 unit=us t={}", now_secs());
        if let Some(m) = metadata {
            line.push(' ');
            line.push_str(m);
        }
        self.emit(&line);
        self.emit("seq,offset,requested,bytes_read,raw_count,raw_bytes,io_us,cache_us,hitmap");
    }

    pub fn on_read_begin(
        &mut self,
        offset: u64,
        requested: usize,
        cache_segments: Option<&[OffsetLength]>,
    ) {
        self.apply_pending_setup();
        // The sequence counts every read, attached writer or not.
        self.current_seq = self.sequence;
        self.sequence += 1;
        self.current_offset = offset;
        self.current_requested = requested;
        self.raw_count = 0;
        self.raw_bytes = 0;
        self.io_cost = Duration::ZERO;
        // Rendered up front: the map reflects cache state when the read began.
        self.hitmap = match cache_segments {
            Some(segs) => CacheHitMap::render(offset, requested as u64, segs),
            None => CacheHitMap::default(),
        };
        self.started = Some(Instant::now());
    }

    pub fn on_raw_read(&mut self, _offset: u64, _requested: usize, bytes_read: usize, cost: Duration) {
        self.raw_count += 1;
        self.raw_bytes += bytes_read as u64;
        self.io_cost += cost;
    }

    pub fn on_read_finish(&mut self, bytes_read: usize) {
        let total = self.started.take().map(|t| t.elapsed()).unwrap_or_default();
        let cache_cost = total.saturating_sub(self.io_cost);
        if self.writer.is_none() {
            return;
        }
        let row = format!(
            "{},{},{},{},{},{},{},{},{}",
            self.current_seq,
            self.current_offset,
            self.current_requested,
            bytes_read,
            self.raw_count,
            self.raw_bytes,
            self.io_cost.as_micros(),
            cache_cost.as_micros(),
            self.hitmap
        );
        self.emit(&row);
        self.check_flush();
    }

    fn emit(&mut self, line: &str) {
        if let Some(w) = self.writer.as_mut() {
            if let Err(e) = writeln!(w, "{}", line) {
                warn!("read log write failed, detaching: {}", e);
                self.writer = None;
            }
        }
    }

    fn check_flush(&mut self) {
        if self.flush_every == 0 {
            return;
        }
        self.pending_since_flush += 1;
        if self.pending_since_flush >= self.flush_every {
            if let Some(w) = self.writer.as_mut() {
                if let Err(e) = w.flush() {
                    warn!("read log flush failed, detaching: {}", e);
                    self.writer = None;
                }
            }
            self.pending_since_flush = 0;
        }
    }
}

impl Default for ReadLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReadLogger {
    fn drop(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }
}
