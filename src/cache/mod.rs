//! cache — fixed-slot page cache tuned for tail-to-head reads.
//!
//! Design:
//! - One flat `slot_count × PAGE_SIZE` byte block; page metadata lives in
//!   parallel arrays (file page index or `NO_PAGE`, valid byte count), plus a
//!   fixed 2-page scratch buffer for cross-page reads.
//! - Eviction is Clock (second-chance): a u64 bitmap holds per-slot referenced
//!   bits, a rotating hand clears-and-skips referenced slots and recycles the
//!   first unreferenced one. The bitmap caps the slot count at 64.
//! - A read fills the output buffer tail-first from cached pages (on a reverse
//!   scan the previous read's page usually overlaps the new read's tail), then
//!   head-first, then fetches the remaining middle: one page goes into a cache
//!   slot, a two-page gap goes through the scratch buffer committing only the
//!   first page, anything wider passes straight through uncached.
//! - A slot's valid byte count is exactly what the last raw read returned for
//!   that page; a zero-byte read for a page believed live means the file was
//!   truncated underneath us, and the slot is dropped rather than trusted.
//!
//! Single-owner, no interior locking; the file handle is borrowed, never
//! closed here.

pub mod hitmap;
pub mod raw;
pub mod read_log;

use std::fs::File;

use anyhow::Result;
use log::{debug, warn};

use crate::config::CacheConfig;
use crate::consts::{
    DEFAULT_SLOT_COUNT_SHIFT, MAX_SLOT_COUNT_SHIFT, MIN_SLOT_COUNT_SHIFT, NO_PAGE, PAGE_MASK,
    PAGE_SHIFT, PAGE_SIZE,
};
use crate::metrics;
use raw::RawReader;
use read_log::LogParams;

/// A cached byte range of the underlying file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetLength {
    pub offset: u64,
    pub length: u64,
}

impl OffsetLength {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Where the middle-gap bytes of a read ended up.
enum MidSource {
    Slot(usize),
    Scratch,
}

pub struct ReverseReadCache<'f> {
    raw: RawReader<'f>,
    slot_count: usize,
    slot_mask: usize,

    // Page table — slot-indexed parallel arrays.
    page_data: Vec<u8>,
    slot_page: Vec<u64>,
    slot_valid: Vec<usize>,
    scratch: Vec<u8>,

    // Clock state.
    hand: usize,
    ref_bits: u64,
}

impl<'f> ReverseReadCache<'f> {
    pub fn new(file: &'f File) -> Self {
        Self::with_slot_shift(file, DEFAULT_SLOT_COUNT_SHIFT)
    }

    /// Cache with `2^slot_count_shift` slots; the shift is clamped to the
    /// bitmap-backed range [1, 6].
    pub fn with_slot_shift(file: &'f File, slot_count_shift: u32) -> Self {
        let shift = slot_count_shift.clamp(MIN_SLOT_COUNT_SHIFT, MAX_SLOT_COUNT_SHIFT);
        if shift != slot_count_shift {
            warn!("slot count shift {} clamped to {}", slot_count_shift, shift);
        }
        let slot_count = 1usize << shift;
        Self {
            raw: RawReader::new(file),
            slot_count,
            slot_mask: slot_count - 1,
            page_data: vec![0u8; slot_count * PAGE_SIZE],
            slot_page: vec![NO_PAGE; slot_count],
            slot_valid: vec![0usize; slot_count],
            scratch: vec![0u8; 2 * PAGE_SIZE],
            hand: 0,
            ref_bits: 0,
        }
    }

    pub fn with_config(file: &'f File, cfg: &CacheConfig) -> Self {
        let mut cache = Self::with_slot_shift(file, cfg.slot_count_shift);
        if let Some(path) = &cfg.read_log_path {
            cache.set_log(LogParams {
                path: Some(path.into()),
                flush_every: cfg.read_log_flush_every,
                ..Default::default()
            });
        }
        cache
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Swap read-log parameters; takes effect at the next read boundary.
    pub fn set_log(&mut self, params: LogParams) {
        self.raw.set_log(params);
    }

    /// Serve `out.len()` bytes at `offset`, preferring cached pages. The
    /// returned count is short only when the file ends inside the request.
    pub fn read(&mut self, offset: u64, out: &mut [u8]) -> Result<usize> {
        let segments = if self.raw.logger_wants_segments() {
            Some(self.cache_segments())
        } else {
            None
        };
        self.raw.log_read_begin(offset, out.len(), segments);
        let n = self.read_with_cache(offset, out)?;
        self.raw.log_read_finish(n);
        Ok(n)
    }

    fn read_with_cache(&mut self, mut offset: u64, out: &mut [u8]) -> Result<usize> {
        let total = out.len();
        let tail_filled = self.fill_tail_from_cache(offset, out);
        let out = &mut out[..total - tail_filled];

        let head_filled = self.fill_head_from_cache(offset, out);
        offset += head_filled as u64;
        let out = &mut out[head_filled..];

        metrics::record_cache_bytes_from_cache(head_filled + tail_filled);
        if out.is_empty() {
            return Ok(head_filled + tail_filled);
        }

        let st_page = offset >> PAGE_SHIFT;
        let ed_page = (offset + out.len() as u64 - 1) >> PAGE_SHIFT;

        // A gap wider than two pages gains nothing from a page-sized cache.
        if ed_page - st_page > 1 {
            let n = self.raw.read(offset, out)?;
            metrics::record_cache_bytes_from_disk(n);
            return Ok(head_filled + n + tail_filled);
        }

        let (mid_read, src) = if ed_page == st_page {
            self.read_one_page_into_cache(st_page)?
        } else {
            self.read_cross_page_with_scratch(st_page, offset, out.len())?
        };

        let in_page = (offset & PAGE_MASK) as usize;
        let avail = mid_read.saturating_sub(in_page);
        let copied = avail.min(out.len());
        if copied > 0 {
            let src_bytes = match src {
                MidSource::Slot(slot) => &self.page_data[slot * PAGE_SIZE + in_page..][..copied],
                MidSource::Scratch => &self.scratch[in_page..][..copied],
            };
            out[..copied].copy_from_slice(src_bytes);
        }
        metrics::record_cache_bytes_from_disk(copied);
        Ok(head_filled + copied + tail_filled)
    }

    /// Fill the trailing bytes of `out` from cached pages, walking backward
    /// from the last unfilled byte. Returns the filled byte count.
    fn fill_tail_from_cache(&mut self, offset: u64, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let range_end = offset + out.len() as u64; // exclusive end in file
        let mut filled = 0usize;

        while filled < out.len() {
            let tail_off = range_end - filled as u64 - 1; // last unfilled byte
            let page = tail_off >> PAGE_SHIFT;
            let slot = match self.find_cached_slot(page) {
                Some(s) => s,
                None => break,
            };

            let page_start = page << PAGE_SHIFT;
            let valid_end = page_start + self.slot_valid[slot] as u64; // exclusive
            if tail_off >= valid_end {
                break; // cache does not cover this byte
            }

            // Copy the intersection of this page with the unfilled region.
            let region_start = offset.max(page_start);
            let copy_len = (tail_off + 1 - region_start) as usize;
            let src_in_page = (region_start - page_start) as usize;
            let dst_in_buf = (region_start - offset) as usize;

            out[dst_in_buf..dst_in_buf + copy_len]
                .copy_from_slice(&self.page_data[slot * PAGE_SIZE + src_in_page..][..copy_len]);
            filled += copy_len;

            // region_start inside this page means we reached the buffer head.
            if region_start > page_start {
                break;
            }
        }

        filled
    }

    /// Fill the leading bytes of `out` from cached pages, walking forward from
    /// the first unfilled byte. Returns the filled byte count.
    fn fill_head_from_cache(&mut self, offset: u64, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let mut filled = 0usize;

        while filled < out.len() {
            let head_off = offset + filled as u64; // first unfilled byte
            let page = head_off >> PAGE_SHIFT;
            let slot = match self.find_cached_slot(page) {
                Some(s) => s,
                None => break,
            };

            let in_page = (head_off & PAGE_MASK) as usize;
            if self.slot_valid[slot] <= in_page {
                break; // EOF inside the cached page
            }
            let avail = self.slot_valid[slot] - in_page;
            let to_copy = avail.min(out.len() - filled);
            out[filled..filled + to_copy]
                .copy_from_slice(&self.page_data[slot * PAGE_SIZE + in_page..][..to_copy]);
            filled += to_copy;
        }

        filled
    }

    // ---------------- slot lookup / eviction ----------------

    fn find_cached_slot(&mut self, page: u64) -> Option<usize> {
        for slot in (0..self.slot_count).rev() {
            if self.slot_page[slot] == page {
                self.ref_bits |= 1u64 << slot; // Clock: mark referenced
                return Some(slot);
            }
        }
        None
    }

    /// Clock sweep: clear-and-skip referenced slots (second chance), recycle
    /// the first unreferenced one.
    fn acquire_eviction_slot(&mut self) -> usize {
        while self.ref_bits & (1u64 << self.hand) != 0 {
            self.ref_bits &= !(1u64 << self.hand);
            self.hand = (self.hand + 1) & self.slot_mask;
        }
        let slot = self.hand;
        self.hand = (self.hand + 1) & self.slot_mask;
        if self.slot_page[slot] != NO_PAGE {
            metrics::record_cache_eviction();
        }
        slot
    }

    /// Read one page into a recycled slot. Short reads are recorded as the
    /// slot's valid byte count; a zero-byte read drops the slot instead.
    fn read_one_page_into_cache(&mut self, page: u64) -> Result<(usize, MidSource)> {
        let slot = self.acquire_eviction_slot();
        let n = self
            .raw
            .read(page << PAGE_SHIFT, &mut self.page_data[slot * PAGE_SIZE..][..PAGE_SIZE])?;
        if n > 0 {
            self.slot_page[slot] = page;
            self.slot_valid[slot] = n;
            // ref bit stays clear — the fresh page has not been re-referenced
        } else {
            // Only an external truncation makes a believed-live page vanish.
            warn!("zero-byte read for page {}; dropping slot {}", page, slot);
            self.invalidate_slot(slot);
        }
        Ok((n, MidSource::Slot(slot)))
    }

    /// Read a two-page gap through the scratch buffer, committing only the
    /// first page touched into a cache slot.
    fn read_cross_page_with_scratch(
        &mut self,
        page: u64,
        offset: u64,
        length: usize,
    ) -> Result<(usize, MidSource)> {
        let page_start = page << PAGE_SHIFT;
        let read_len = ((offset + length as u64 - page_start) as usize).min(2 * PAGE_SIZE);
        let n = self.raw.read(page_start, &mut self.scratch[..read_len])?;

        // Zero bytes read: skip caching, no point evicting a slot for nothing.
        let valid = n.min(PAGE_SIZE);
        if valid > 0 {
            let slot = self.acquire_eviction_slot();
            self.page_data[slot * PAGE_SIZE..][..valid].copy_from_slice(&self.scratch[..valid]);
            self.slot_page[slot] = page;
            self.slot_valid[slot] = valid;
        }
        Ok((n, MidSource::Scratch))
    }

    // ---------------- invalidation ----------------

    fn invalidate_slot(&mut self, slot: usize) {
        self.slot_page[slot] = NO_PAGE;
        self.slot_valid[slot] = 0;
        self.ref_bits &= !(1u64 << slot);
    }

    /// Drop every slot holding a page at or after the page containing
    /// `offset`. Used when history from `offset` on is rewritten.
    pub fn invalidate_from(&mut self, offset: u64) {
        let boundary = offset >> PAGE_SHIFT;
        let mut dropped = 0usize;
        for slot in 0..self.slot_count {
            if self.slot_page[slot] != NO_PAGE && self.slot_page[slot] >= boundary {
                self.invalidate_slot(slot);
                dropped += 1;
            }
        }
        metrics::record_slots_invalidated(dropped);
        debug!("invalidate_from({}): dropped {} slot(s)", offset, dropped);
    }

    /// The file length changed: drop pages past the new end, and any partial
    /// page — a short page before the new end may have grown, one beyond it no
    /// longer exists.
    pub fn notify_file_length_changed(&mut self, new_length: u64) {
        let boundary = new_length >> PAGE_SHIFT;
        let mut dropped = 0usize;
        for slot in 0..self.slot_count {
            if self.slot_page[slot] == NO_PAGE {
                continue;
            }
            if self.slot_page[slot] >= boundary || self.slot_valid[slot] < PAGE_SIZE {
                self.invalidate_slot(slot);
                dropped += 1;
            }
        }
        metrics::record_slots_invalidated(dropped);
        debug!(
            "notify_file_length_changed({}): dropped {} slot(s)",
            new_length, dropped
        );
    }

    /// Currently cached byte ranges (diagnostics; feeds the hit map).
    pub fn cache_segments(&self) -> Vec<OffsetLength> {
        let mut segments = Vec::with_capacity(self.slot_count);
        for slot in (0..self.slot_count).rev() {
            if self.slot_page[slot] != NO_PAGE && self.slot_valid[slot] > 0 {
                segments.push(OffsetLength {
                    offset: self.slot_page[slot] << PAGE_SHIFT,
                    length: self.slot_valid[slot] as u64,
                });
            }
        }
        segments
    }
}
