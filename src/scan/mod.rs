//! scan — direction-generic rolling-window scanner for sealed codewords.
//!
//! Design:
//! - `Scanner<Forward>` walks a stream head-to-tail and recognizes frames that
//!   end in a little-endian CRC trailer; `Scanner<Backward>` walks tail-to-head
//!   and recognizes frames that begin with a big-endian CRC field. One
//!   remainder table serves both, because reversing a forward codeword yields
//!   a backward codeword.
//! - Direction is a zero-sized type parameter, so per-element work
//!   monomorphizes with no branch inside the hot loop.
//! - The window lives in a ring of `window_size + ALIGNMENT_ROOM` bytes. The
//!   cursor always marks the window byte with the lowest file offset: Forward
//!   claims the slot under the cursor and then advances, Backward retreats the
//!   cursor and claims the slot it lands on. Linearization is therefore one
//!   shared code path, and a backward match comes back in file order.
//! - Switching to 2/4/8-byte rolls realigns the cursor by shifting at most
//!   `ALIGNMENT_ROOM` bytes between the ring and its padding region, never by
//!   rotating the whole window.

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{bail, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::consts::{ALIGNMENT_ROOM, EMPTY_ROLLING_RAW};
use crate::crc::codeword::SEAL_LEN;
use crate::crc::{shared_table, Table};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Forward {}
    impl Sealed for super::Backward {}
}

/// Compile-time scan direction strategy. Implemented by [`Forward`] and
/// [`Backward`] only.
pub trait Direction: sealed::Sealed {
    const IS_BACKWARD: bool;

    /// Ring slot that receives the next value; advances the cursor by `step`.
    /// The cursor invariant (it marks the lowest-file-offset byte) is what
    /// makes linearization direction-agnostic.
    fn claim_slot(cursor: &mut usize, step: usize, window: usize) -> usize;

    /// Byte order of a multi-byte value as seen by the checksum: scanning
    /// backward folds the bytes of each word in reverse.
    fn order_u16(v: u16) -> u16;
    fn order_u32(v: u32) -> u32;
    fn order_u64(v: u64) -> u64;
}

/// Head-to-tail scanning; codewords end in a little-endian CRC trailer.
pub struct Forward;

/// Tail-to-head scanning; codewords begin with a big-endian CRC field.
pub struct Backward;

impl Direction for Forward {
    const IS_BACKWARD: bool = false;

    #[inline]
    fn claim_slot(cursor: &mut usize, step: usize, window: usize) -> usize {
        debug_assert_eq!(*cursor & (step - 1), 0, "cursor must be step-aligned");
        let slot = *cursor;
        let next = slot + step;
        *cursor = if next == window { 0 } else { next };
        slot
    }

    #[inline]
    fn order_u16(v: u16) -> u16 {
        v
    }
    #[inline]
    fn order_u32(v: u32) -> u32 {
        v
    }
    #[inline]
    fn order_u64(v: u64) -> u64 {
        v
    }
}

impl Direction for Backward {
    const IS_BACKWARD: bool = true;

    #[inline]
    fn claim_slot(cursor: &mut usize, step: usize, window: usize) -> usize {
        debug_assert_eq!(*cursor & (step - 1), 0, "cursor must be step-aligned");
        *cursor = if *cursor == 0 { window - step } else { *cursor - step };
        *cursor
    }

    #[inline]
    fn order_u16(v: u16) -> u16 {
        v.swap_bytes()
    }
    #[inline]
    fn order_u32(v: u32) -> u32 {
        v.swap_bytes()
    }
    #[inline]
    fn order_u64(v: u64) -> u64 {
        v.swap_bytes()
    }
}

/// Roll granularity: the element widths a scanner can consume.
trait Word: Copy {
    const SIZE: usize;
    fn read_le(buf: &[u8]) -> Self;
    fn write_le(self, buf: &mut [u8]);
    fn order<D: Direction>(self) -> Self;
    fn roll(table: &Table, raw: u32, outgoing: Self, incoming: Self) -> u32;
}

impl Word for u16 {
    const SIZE: usize = 2;
    fn read_le(buf: &[u8]) -> Self {
        LittleEndian::read_u16(buf)
    }
    fn write_le(self, buf: &mut [u8]) {
        LittleEndian::write_u16(buf, self)
    }
    fn order<D: Direction>(self) -> Self {
        D::order_u16(self)
    }
    fn roll(table: &Table, raw: u32, outgoing: Self, incoming: Self) -> u32 {
        table.roll_u16(raw, outgoing, incoming)
    }
}

impl Word for u32 {
    const SIZE: usize = 4;
    fn read_le(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
    fn write_le(self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, self)
    }
    fn order<D: Direction>(self) -> Self {
        D::order_u32(self)
    }
    fn roll(table: &Table, raw: u32, outgoing: Self, incoming: Self) -> u32 {
        table.roll_u32(raw, outgoing, incoming)
    }
}

impl Word for u64 {
    const SIZE: usize = 8;
    fn read_le(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
    fn write_le(self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, self)
    }
    fn order<D: Direction>(self) -> Self {
        D::order_u64(self)
    }
    fn roll(table: &Table, raw: u32, outgoing: Self, incoming: Self) -> u32 {
        table.roll_u64(raw, outgoing, incoming)
    }
}

/// Result of a successful [`Scanner::try_find_codeword`] call.
///
/// Borrows both the unconsumed remainder of the input chunk and the scanner's
/// linearized window (the matched frame, in file order).
pub struct CodewordMatch<'s, 'c, W = u8> {
    remain: &'c [W],
    processed: u64,
    codeword: &'s [u8],
    backward: bool,
}

impl<'s, 'c, W> CodewordMatch<'s, 'c, W> {
    /// Input elements strictly beyond the matched one, in scan direction.
    pub fn remain(&self) -> &'c [W] {
        self.remain
    }

    /// Scanner's `processed` count at match time.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// The matched frame's raw bytes, lowest file offset first.
    pub fn codeword(&self) -> &'s [u8] {
        self.codeword
    }

    pub fn is_backward(&self) -> bool {
        self.backward
    }

    /// Frame bytes without the embedded checksum field.
    pub fn payload(&self) -> &'s [u8] {
        if self.backward {
            &self.codeword[SEAL_LEN..]
        } else {
            &self.codeword[..self.codeword.len() - SEAL_LEN]
        }
    }

    /// The embedded checksum: trailing LE field forward, leading BE field
    /// backward.
    pub fn final_crc(&self) -> u32 {
        if self.backward {
            BigEndian::read_u32(&self.codeword[..SEAL_LEN])
        } else {
            LittleEndian::read_u32(&self.codeword[self.codeword.len() - SEAL_LEN..])
        }
    }
}

/// Rolling-window checksum scanner. Single-owner, per-traversal state; the
/// remainder table behind it is shared and immutable.
pub struct Scanner<D: Direction> {
    table: Arc<Table>,
    rolling_raw: u32,
    processed: u64,
    /// `window_size + ALIGNMENT_ROOM` bytes; the live ring is the
    /// `window_size` bytes starting at `ring_base`.
    buf: Vec<u8>,
    ring_base: usize,
    cursor: usize,
    at_match: bool,
    _direction: PhantomData<D>,
}

pub type ForwardScanner = Scanner<Forward>;
pub type BackwardScanner = Scanner<Backward>;

/// Forward scanner over the shared table for `window_size`.
pub fn forward_scanner(window_size: usize) -> Result<ForwardScanner> {
    Ok(Scanner::new(shared_table(window_size)?))
}

/// Backward scanner over the shared table for `window_size`.
pub fn backward_scanner(window_size: usize) -> Result<BackwardScanner> {
    Ok(Scanner::new(shared_table(window_size)?))
}

impl<D: Direction> Scanner<D> {
    pub fn new(table: Arc<Table>) -> Self {
        let buf = vec![0u8; table.window_size() + ALIGNMENT_ROOM];
        Self {
            table,
            rolling_raw: EMPTY_ROLLING_RAW,
            processed: 0,
            buf,
            ring_base: 0,
            cursor: 0,
            at_match: false,
            _direction: PhantomData,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn rolling_raw(&self) -> u32 {
        self.rolling_raw
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn window_size(&self) -> usize {
        self.table.window_size()
    }

    /// Checks are meaningless until a full window's worth has been consumed.
    pub fn is_filled(&self) -> bool {
        self.processed >= self.table.window_size() as u64
    }

    pub fn is_at_match(&self) -> bool {
        self.at_match
    }

    /// Consume one byte: evict the byte leaving the window, fold the incoming
    /// one, return the new raw rolling checksum.
    pub fn roll(&mut self, incoming: u8) -> u32 {
        self.processed += 1;
        let window = self.table.window_size();
        let slot = self.ring_base + D::claim_slot(&mut self.cursor, 1, window);
        let outgoing = self.buf[slot];
        self.rolling_raw = self.table.roll_u8(self.rolling_raw, outgoing, incoming);
        self.buf[slot] = incoming;
        self.rolling_raw
    }

    /// Roll one byte and test the window against the self-seal residue.
    pub fn rolling_check(&mut self, incoming: u8) -> bool {
        let raw = self.roll(incoming);
        self.table.check_residue(raw) && self.is_filled()
    }

    /// Roll one byte and test the window against an explicit target checksum.
    pub fn rolling_check_against(&mut self, incoming: u8, dest_final: u32) -> bool {
        let raw = self.roll(incoming);
        self.table.check(raw, dest_final) && self.is_filled()
    }

    fn roll_word<W: Word>(&mut self, incoming: W) -> u32 {
        self.processed += W::SIZE as u64;
        let window = self.table.window_size();
        let slot = self.ring_base + D::claim_slot(&mut self.cursor, W::SIZE, window);
        let outgoing = W::read_le(&self.buf[slot..slot + W::SIZE]);
        self.rolling_raw = W::roll(
            &self.table,
            self.rolling_raw,
            outgoing.order::<D>(),
            incoming.order::<D>(),
        );
        incoming.write_le(&mut self.buf[slot..slot + W::SIZE]);
        self.rolling_raw
    }

    fn rolling_check_word<W: Word>(&mut self, incoming: W) -> bool {
        let raw = self.roll_word(incoming);
        self.table.check_residue(raw) && self.is_filled()
    }

    /// Scan `chunk` element-by-element in this scanner's direction. On the
    /// first sealed window, returns the unconsumed remainder and the frame
    /// bytes; `None` when the chunk is exhausted without a match.
    pub fn try_find_codeword<'c>(&mut self, chunk: &'c [u8]) -> Option<CodewordMatch<'_, 'c, u8>> {
        let hit = if D::IS_BACKWARD {
            (0..chunk.len()).rev().find(|&i| self.rolling_check(chunk[i]))
        } else {
            (0..chunk.len()).find(|&i| self.rolling_check(chunk[i]))
        };
        self.at_match = hit.is_some();
        let i = hit?;
        Some(self.make_match(chunk, i))
    }

    /// 16-bit granularity scan. Realigns the cursor first; the window size
    /// must be a multiple of 2.
    pub fn try_find_codeword_u16<'c>(
        &mut self,
        chunk: &'c [u16],
    ) -> Result<Option<CodewordMatch<'_, 'c, u16>>> {
        self.find_word(chunk)
    }

    /// 32-bit granularity scan. Realigns the cursor first; the window size
    /// must be a multiple of 4.
    pub fn try_find_codeword_u32<'c>(
        &mut self,
        chunk: &'c [u32],
    ) -> Result<Option<CodewordMatch<'_, 'c, u32>>> {
        self.find_word(chunk)
    }

    /// 64-bit granularity scan. Realigns the cursor first; the window size
    /// must be a multiple of 8.
    pub fn try_find_codeword_u64<'c>(
        &mut self,
        chunk: &'c [u64],
    ) -> Result<Option<CodewordMatch<'_, 'c, u64>>> {
        self.find_word(chunk)
    }

    fn find_word<'c, W: Word>(
        &mut self,
        chunk: &'c [W],
    ) -> Result<Option<CodewordMatch<'_, 'c, W>>> {
        self.ensure_aligned(W::SIZE)?;
        let hit = if D::IS_BACKWARD {
            (0..chunk.len())
                .rev()
                .find(|&i| self.rolling_check_word(chunk[i]))
        } else {
            (0..chunk.len()).find(|&i| self.rolling_check_word(chunk[i]))
        };
        self.at_match = hit.is_some();
        match hit {
            Some(i) => Ok(Some(self.make_match(chunk, i))),
            None => Ok(None),
        }
    }

    fn make_match<'c, W>(&mut self, chunk: &'c [W], i: usize) -> CodewordMatch<'_, 'c, W> {
        let remain = if D::IS_BACKWARD {
            &chunk[..i]
        } else {
            &chunk[i + 1..]
        };
        CodewordMatch {
            remain,
            processed: self.processed,
            codeword: self.borrow_buffer_view(),
            backward: D::IS_BACKWARD,
        }
    }

    /// Linearize the ring in place (three-reversal rotation to logical
    /// position 0) and return the window, lowest file offset first. Consumes
    /// the current rotation state: the cursor is reset to 0.
    pub fn borrow_buffer_view(&mut self) -> &[u8] {
        let window = self.table.window_size();
        let base = self.ring_base;
        let cursor = self.cursor;
        if cursor > 0 {
            let ring = &mut self.buf[base..base + window];
            ring[..cursor].reverse();
            ring[cursor..].reverse();
            ring.reverse();
            self.cursor = 0;
        }
        &self.buf[base..base + window]
    }

    /// Copy the linearized window into `dest` without disturbing the ring.
    /// false when `dest` is too small.
    pub fn try_copy_to(&self, dest: &mut [u8]) -> bool {
        let window = self.table.window_size();
        if dest.len() < window {
            return false;
        }
        let ring = &self.buf[self.ring_base..self.ring_base + window];
        let cursor = self.cursor;
        let head_len = window - cursor;
        dest[..head_len].copy_from_slice(&ring[cursor..]);
        if cursor > 0 {
            dest[head_len..window].copy_from_slice(&ring[..cursor]);
        }
        true
    }

    /// Reinitialize in place, optionally switching to a different table.
    pub fn reset(&mut self, new_table: Option<Arc<Table>>) {
        if let Some(t) = new_table {
            self.table = t;
        }
        self.rolling_raw = EMPTY_ROLLING_RAW;
        self.processed = 0;
        let required = self.table.window_size() + ALIGNMENT_ROOM;
        if self.buf.len() != required {
            self.buf = vec![0u8; required];
        } else {
            self.buf.fill(0);
        }
        self.ring_base = 0;
        self.cursor = 0;
        self.at_match = false;
    }

    /// Make the cursor valid for `step`-sized rolls. The window size not being
    /// a multiple of `step` is a configuration error.
    fn ensure_aligned(&mut self, step: usize) -> Result<()> {
        debug_assert!(step.is_power_of_two() && step <= ALIGNMENT_ROOM);
        let window = self.table.window_size();
        if window & (step - 1) != 0 {
            bail!(
                "window size {} is not a multiple of roll step {}",
                window,
                step
            );
        }
        if self.cursor & (step - 1) != 0 {
            self.align_cursor(step);
        }
        Ok(())
    }

    /// Realign by shifting at most `ALIGNMENT_ROOM` bytes between the ring and
    /// its padding; never a full-window rotation.
    fn align_cursor(&mut self, step: usize) {
        let align_down = self.cursor & (step - 1);
        if align_down == 0 {
            return;
        }
        let window = self.table.window_size();
        if self.ring_base + align_down <= ALIGNMENT_ROOM {
            self.shift_base_up(align_down, window);
        } else {
            self.shift_base_down(step - align_down, window);
        }
    }

    /// Move the first n ring bytes past the ring end; the ring slides right.
    fn shift_base_up(&mut self, n: usize, window: usize) {
        debug_assert!(n > 0 && self.ring_base + n <= ALIGNMENT_ROOM);
        let base = self.ring_base;
        self.buf.copy_within(base..base + n, base + window);
        self.ring_base = base + n;
        self.cursor -= n;
    }

    /// Move the last n ring bytes before the ring start; the ring slides left.
    fn shift_base_down(&mut self, n: usize, window: usize) {
        debug_assert!(n > 0 && n <= self.ring_base);
        let base = self.ring_base;
        self.buf.copy_within(base + window - n..base + window, base - n);
        self.ring_base = base - n;
        self.cursor += n;
        if self.cursor >= window {
            self.cursor -= window;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of<D: Direction>(scanner: &Scanner<D>) -> Vec<u8> {
        let mut out = vec![0u8; scanner.window_size()];
        assert!(scanner.try_copy_to(&mut out));
        out
    }

    #[test]
    fn forward_window_tracks_stream_tail() {
        let mut s = Scanner::<Forward>::new(Arc::new(Table::new(8).unwrap()));
        let stream: Vec<u8> = (1u8..=20).collect();
        for &b in &stream {
            s.roll(b);
        }
        assert_eq!(window_of(&s), &stream[stream.len() - 8..]);
    }

    #[test]
    fn backward_window_is_file_order() {
        let mut s = Scanner::<Backward>::new(Arc::new(Table::new(8).unwrap()));
        // Backward consumption order c0..c7 corresponds to file bytes
        // [c7, c6, ..., c0]; the linearized window must come out in file order.
        let consumed: Vec<u8> = (10u8..18).collect();
        for &b in &consumed {
            s.roll(b);
        }
        let mut expected = consumed.clone();
        expected.reverse();
        assert_eq!(window_of(&s), expected);
        assert_eq!(s.borrow_buffer_view(), &expected[..]);
    }

    #[test]
    fn align_cursor_preserves_window_content() {
        let mut s = Scanner::<Forward>::new(Arc::new(Table::new(16).unwrap()));
        for i in 0..16u8 {
            s.roll(i.wrapping_mul(17).wrapping_add(5));
        }
        // Misalign to cursor 3.
        s.roll(0xAA);
        s.roll(0xBB);
        s.roll(0xCC);

        let before = window_of(&s);
        s.ensure_aligned(4).unwrap();
        assert_eq!(s.cursor & 3, 0);
        assert_eq!(window_of(&s), before);
    }

    #[test]
    fn align_cursor_continuous_usage() {
        let window = 32usize;
        let mut s = Scanner::<Forward>::new(Arc::new(Table::new(window).unwrap()));
        let mut model = vec![0u8; window];
        for i in 0..100u32 {
            let b = (i % 251) as u8;
            s.roll(b);
            model.rotate_left(1);
            model[window - 1] = b;

            s.ensure_aligned(8).unwrap();
            assert_eq!(s.cursor & 7, 0);
            assert_eq!(window_of(&s), model);
        }
    }

    #[test]
    fn align_cursor_mixed_step_sizes() {
        let mut s = Scanner::<Forward>::new(Arc::new(Table::new(32).unwrap()));
        s.roll(1);
        s.ensure_aligned(4).unwrap();
        s.roll(2);
        s.ensure_aligned(8).unwrap();
        // 8-aligned implies 4-aligned; must not shift again.
        let before = window_of(&s);
        s.ensure_aligned(4).unwrap();
        assert_eq!(window_of(&s), before);
    }

    #[test]
    fn misaligned_window_is_rejected() {
        let mut s = Scanner::<Forward>::new(Arc::new(Table::new(10).unwrap()));
        assert!(s.ensure_aligned(4).is_err());
        assert!(s.try_find_codeword_u32(&[0u32; 4]).is_err());
    }

    #[test]
    fn backward_align_keeps_file_order() {
        let window = 16usize;
        let mut s = Scanner::<Backward>::new(Arc::new(Table::new(window).unwrap()));
        let mut consumed = Vec::new();
        for i in 0..window as u8 + 5 {
            let b = i.wrapping_mul(31).wrapping_add(7);
            s.roll(b);
            consumed.push(b);
        }
        let mut expected: Vec<u8> = consumed[consumed.len() - window..].to_vec();
        expected.reverse();
        s.ensure_aligned(4).unwrap();
        assert_eq!(window_of(&s), expected);
    }
}
