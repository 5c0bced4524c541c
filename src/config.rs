//! Centralized configuration for the cache surface.
//!
//! Goals:
//! - Single place for tunables instead of scattered env lookups.
//! - `CacheConfig::from_env()` for drop-in configuration; fluent `with_*`
//!   setters for overrides in code.

use std::fmt;

use crate::consts::DEFAULT_SLOT_COUNT_SHIFT;

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Cache slot count as a power of two (2^shift slots).
    /// Env: RIFFLE_CACHE_SLOTS_SHIFT (default 4; the cache clamps to [1, 6]).
    pub slot_count_shift: u32,

    /// Read-diagnostics CSV path; None disables the read log.
    /// Env: RIFFLE_READ_LOG
    pub read_log_path: Option<String>,

    /// Flush the read log every N rows (0 = leave it to the buffered writer).
    /// Env: RIFFLE_READ_LOG_FLUSH_EVERY (default 0)
    pub read_log_flush_every: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            slot_count_shift: DEFAULT_SLOT_COUNT_SHIFT,
            read_log_path: None,
            read_log_flush_every: 0,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables; unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RIFFLE_CACHE_SLOTS_SHIFT") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.slot_count_shift = n;
            }
        }

        if let Ok(v) = std::env::var("RIFFLE_READ_LOG") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.read_log_path = Some(s.to_string());
            }
        }

        if let Ok(v) = std::env::var("RIFFLE_READ_LOG_FLUSH_EVERY") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.read_log_flush_every = n;
            }
        }

        cfg
    }

    // Fluent setters (builder-style).

    pub fn with_slot_count_shift(mut self, shift: u32) -> Self {
        self.slot_count_shift = shift;
        self
    }

    pub fn with_read_log<S: Into<String>>(mut self, path: Option<S>) -> Self {
        self.read_log_path = path.map(Into::into);
        self
    }

    pub fn with_read_log_flush_every(mut self, rows: u32) -> Self {
        self.read_log_flush_every = rows;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheConfig {{ slot_count_shift: {}, read_log_path: {}, read_log_flush_every: {} }}",
            self.slot_count_shift,
            self.read_log_path.as_deref().unwrap_or("disabled"),
            self.read_log_flush_every,
        )
    }
}
