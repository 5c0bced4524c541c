//! Lightweight global metrics for riffle.
//!
//! Thread-safe atomic counters, grouped by subsystem:
//! - Raw reader (positional file I/O)
//! - Reverse page cache (byte accounting, eviction, invalidation)
//! - Remainder tables
//!
//! Counters are process-wide and monotonic; call `snapshot()` for a consistent
//! point-in-time copy, or `snapshot_json()` for an export-friendly form.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ----- Raw reader -----
static RAW_READS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RAW_BYTES_READ: AtomicU64 = AtomicU64::new(0);
static RAW_READ_MICROS: AtomicU64 = AtomicU64::new(0);

// ----- Reverse page cache -----
static CACHE_BYTES_FROM_CACHE: AtomicU64 = AtomicU64::new(0);
static CACHE_BYTES_FROM_DISK: AtomicU64 = AtomicU64::new(0);
static CACHE_EVICTIONS: AtomicU64 = AtomicU64::new(0);
static CACHE_SLOTS_INVALIDATED: AtomicU64 = AtomicU64::new(0);

// ----- Remainder tables -----
static TABLES_BUILT: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Raw reader
    pub raw_reads_total: u64,
    pub raw_bytes_read: u64,
    pub raw_read_micros: u64,

    // Reverse page cache
    pub cache_bytes_from_cache: u64,
    pub cache_bytes_from_disk: u64,
    pub cache_evictions: u64,
    pub cache_slots_invalidated: u64,

    // Remainder tables
    pub tables_built: u64,
}

impl MetricsSnapshot {
    /// Fraction of served bytes that came out of cache slots.
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_bytes_from_cache + self.cache_bytes_from_disk;
        if total == 0 {
            0.0
        } else {
            self.cache_bytes_from_cache as f64 / total as f64
        }
    }

    /// Average raw read size in bytes.
    pub fn avg_raw_read_bytes(&self) -> f64 {
        if self.raw_reads_total == 0 {
            0.0
        } else {
            self.raw_bytes_read as f64 / self.raw_reads_total as f64
        }
    }
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        raw_reads_total: RAW_READS_TOTAL.load(Ordering::Relaxed),
        raw_bytes_read: RAW_BYTES_READ.load(Ordering::Relaxed),
        raw_read_micros: RAW_READ_MICROS.load(Ordering::Relaxed),

        cache_bytes_from_cache: CACHE_BYTES_FROM_CACHE.load(Ordering::Relaxed),
        cache_bytes_from_disk: CACHE_BYTES_FROM_DISK.load(Ordering::Relaxed),
        cache_evictions: CACHE_EVICTIONS.load(Ordering::Relaxed),
        cache_slots_invalidated: CACHE_SLOTS_INVALIDATED.load(Ordering::Relaxed),

        tables_built: TABLES_BUILT.load(Ordering::Relaxed),
    }
}

pub fn snapshot_json() -> String {
    serde_json::to_string(&snapshot()).unwrap_or_else(|_| "{}".to_string())
}

// ----- Recorders (raw reader) -----
pub fn record_raw_read(bytes: usize, micros: u64) {
    RAW_READS_TOTAL.fetch_add(1, Ordering::Relaxed);
    RAW_BYTES_READ.fetch_add(bytes as u64, Ordering::Relaxed);
    RAW_READ_MICROS.fetch_add(micros, Ordering::Relaxed);
}

// ----- Recorders (reverse page cache) -----
pub fn record_cache_bytes_from_cache(bytes: usize) {
    if bytes > 0 {
        CACHE_BYTES_FROM_CACHE.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

pub fn record_cache_bytes_from_disk(bytes: usize) {
    if bytes > 0 {
        CACHE_BYTES_FROM_DISK.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

pub fn record_cache_eviction() {
    CACHE_EVICTIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_slots_invalidated(count: usize) {
    if count > 0 {
        CACHE_SLOTS_INVALIDATED.fetch_add(count as u64, Ordering::Relaxed);
    }
}

// ----- Recorders (remainder tables) -----
pub fn record_table_built() {
    TABLES_BUILT.fetch_add(1, Ordering::Relaxed);
}
