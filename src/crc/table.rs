//! crc/table — per-window remainder table for O(1) rolling CRC-32C.
//!
//! CRC-32C is linear over GF(2): the residual contribution of a byte that is
//! about to leave a fixed-size window depends only on its value and its
//! distance to the window edge. `rem[lane][b]` holds the raw CRC of byte `b`
//! followed by `window_size - lane - 1` zero bytes (seeded from zero state),
//! so removing a byte is a single XOR, and removing a 2/4/8-byte word is an
//! XOR cascade across adjacent lanes.
//!
//! Tables are immutable after construction and memoized process-wide by
//! window size (`shared_table`).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use anyhow::{anyhow, Result};
use log::debug;

use super::{crc_forward_raw, crc_zero_advance, final_residue};
use crate::consts::{DEFAULT_FINAL_XOR, DEFAULT_INIT_VALUE};
use crate::metrics;

const ROW_COUNT: usize = 8;
const ROW_SIZE: usize = 256;

pub struct Table {
    window_size: usize,
    final_residue: u32,
    /// Correction folding the deferred init-value effect (init advanced through
    /// a window of zeros) together with the final complement.
    init_and_final_effect: u32,
    rem: [[u32; ROW_SIZE]; ROW_COUNT],
}

impl Table {
    /// Table for the standard CRC-32C seed/complement pair.
    pub fn new(window_size: usize) -> Result<Self> {
        Self::new_with(window_size, DEFAULT_INIT_VALUE, DEFAULT_FINAL_XOR)
    }

    pub fn new_with(window_size: usize, init: u32, final_xor: u32) -> Result<Self> {
        if window_size == 0 {
            return Err(anyhow!("rolling window size must be positive"));
        }

        let mut rem = [[0u32; ROW_SIZE]; ROW_COUNT];
        let max_row = ROW_COUNT.min(window_size) - 1;
        let min_zero_count = window_size - max_row - 1;

        for b in 0..ROW_SIZE {
            let mut crc = crc_forward_raw(0, &[b as u8]);
            crc = crc_zero_advance(crc, min_zero_count);
            rem[max_row][b] = crc;
            for row in (0..max_row).rev() {
                crc = crc_forward_raw(crc, &[0]);
                rem[row][b] = crc;
            }
        }

        Ok(Self {
            window_size,
            final_residue: final_residue(init, final_xor),
            init_and_final_effect: crc_zero_advance(init, window_size) ^ final_xor,
            rem,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn final_residue(&self) -> u32 {
        self.final_residue
    }

    // ---------------- roll out (cancel a departing value) ----------------

    #[inline]
    pub fn roll_out_u8(&self, raw: u32, outgoing: u8) -> u32 {
        raw ^ self.rem[0][outgoing as usize]
    }

    #[inline]
    pub fn roll_out_u16(&self, raw: u32, outgoing: u16) -> u32 {
        raw ^ self.rem[0][(outgoing & 0xFF) as usize] ^ self.rem[1][(outgoing >> 8) as usize]
    }

    #[inline]
    pub fn roll_out_u32(&self, raw: u32, outgoing: u32) -> u32 {
        raw ^ self.rem[0][(outgoing & 0xFF) as usize]
            ^ self.rem[1][((outgoing >> 8) & 0xFF) as usize]
            ^ self.rem[2][((outgoing >> 16) & 0xFF) as usize]
            ^ self.rem[3][(outgoing >> 24) as usize]
    }

    #[inline]
    pub fn roll_out_u64(&self, raw: u32, outgoing: u64) -> u32 {
        raw ^ self.rem[0][(outgoing & 0xFF) as usize]
            ^ self.rem[1][((outgoing >> 8) & 0xFF) as usize]
            ^ self.rem[2][((outgoing >> 16) & 0xFF) as usize]
            ^ self.rem[3][((outgoing >> 24) & 0xFF) as usize]
            ^ self.rem[4][((outgoing >> 32) & 0xFF) as usize]
            ^ self.rem[5][((outgoing >> 40) & 0xFF) as usize]
            ^ self.rem[6][((outgoing >> 48) & 0xFF) as usize]
            ^ self.rem[7][(outgoing >> 56) as usize]
    }

    // ---------------- roll in (fold an arriving value) ----------------

    #[inline]
    pub fn roll_in_u8(&self, raw: u32, incoming: u8) -> u32 {
        crc_forward_raw(raw, &[incoming])
    }

    #[inline]
    pub fn roll_in_u16(&self, raw: u32, incoming: u16) -> u32 {
        crc_forward_raw(raw, &incoming.to_le_bytes())
    }

    #[inline]
    pub fn roll_in_u32(&self, raw: u32, incoming: u32) -> u32 {
        crc_forward_raw(raw, &incoming.to_le_bytes())
    }

    #[inline]
    pub fn roll_in_u64(&self, raw: u32, incoming: u64) -> u32 {
        crc_forward_raw(raw, &incoming.to_le_bytes())
    }

    // ---------------- roll (out + in, one window step) ----------------

    #[inline]
    pub fn roll_u8(&self, raw: u32, outgoing: u8, incoming: u8) -> u32 {
        self.roll_in_u8(self.roll_out_u8(raw, outgoing), incoming)
    }

    #[inline]
    pub fn roll_u16(&self, raw: u32, outgoing: u16, incoming: u16) -> u32 {
        self.roll_in_u16(self.roll_out_u16(raw, outgoing), incoming)
    }

    #[inline]
    pub fn roll_u32(&self, raw: u32, outgoing: u32, incoming: u32) -> u32 {
        self.roll_in_u32(self.roll_out_u32(raw, outgoing), incoming)
    }

    #[inline]
    pub fn roll_u64(&self, raw: u32, outgoing: u64, incoming: u64) -> u32 {
        self.roll_in_u64(self.roll_out_u64(raw, outgoing), incoming)
    }

    // ---------------- checks ----------------

    /// Apply the deferred init/final correction to a raw rolling state.
    #[inline]
    pub fn raw_to_final(&self, raw: u32) -> u32 {
        raw ^ self.init_and_final_effect
    }

    /// Does the current window checksum to `dest_final`?
    #[inline]
    pub fn check(&self, raw: u32, dest_final: u32) -> bool {
        self.raw_to_final(raw) == dest_final
    }

    /// Does the current window end in its own sealed checksum field?
    #[inline]
    pub fn check_residue(&self, raw: u32) -> bool {
        self.raw_to_final(raw) == self.final_residue
    }
}

// ---------------- process-wide memoization ----------------

static SHARED: OnceLock<RwLock<HashMap<usize, Arc<Table>>>> = OnceLock::new();

/// Shared table for `window_size`, built lazily on first use and retained for
/// the process lifetime. Tables are immutable, so handing the same `Arc` to
/// every scanner (on any thread) is safe.
pub fn shared_table(window_size: usize) -> Result<Arc<Table>> {
    let map = SHARED.get_or_init(|| RwLock::new(HashMap::new()));

    if let Some(t) = map
        .read()
        .map_err(|_| anyhow!("remainder table registry poisoned"))?
        .get(&window_size)
    {
        return Ok(t.clone());
    }

    let mut w = map
        .write()
        .map_err(|_| anyhow!("remainder table registry poisoned"))?;
    // Lost the race? Someone else built it between the read and write locks.
    if let Some(t) = w.get(&window_size) {
        return Ok(t.clone());
    }

    let table = Arc::new(Table::new(window_size)?);
    w.insert(window_size, table.clone());
    metrics::record_table_built();
    debug!("built shared remainder table (window={})", window_size);
    Ok(table)
}
