//! crc — CRC-32C primitives under the rolling scanner and codeword helpers.
//!
//! Everything here works on *raw* (un-inverted) CRC state: the seed and final
//! complement are applied as explicit parameters or deferred corrections, which
//! is what lets the remainder table cancel byte contributions with plain XOR.

use byteorder::{ByteOrder, LittleEndian};

pub mod codeword;
pub mod table;

pub use codeword::{check_backward, check_forward, seal_backward, seal_forward};
pub use table::{shared_table, Table};

/// Advance a raw CRC-32C state over `bytes` in natural order.
///
/// `crc32c::crc32c_append` composes finalized values (`!update(!crc, data)`),
/// so a double inversion recovers the bare state transform.
#[inline]
pub fn crc_forward_raw(raw: u32, bytes: &[u8]) -> u32 {
    !crc32c::crc32c_append(!raw, bytes)
}

/// Advance a raw CRC-32C state over `bytes` from the last byte to the first.
pub fn crc_backward_raw(raw: u32, bytes: &[u8]) -> u32 {
    let mut crc = raw;
    for &b in bytes.iter().rev() {
        crc = crc_forward_raw(crc, &[b]);
    }
    crc
}

/// One-shot forward CRC-32C of `payload` with an explicit seed/complement pair.
pub fn crc_forward(payload: &[u8], init: u32, final_xor: u32) -> u32 {
    crc_forward_raw(init, payload) ^ final_xor
}

/// One-shot backward CRC-32C of `payload` (bytes folded last-to-first).
pub fn crc_backward(payload: &[u8], init: u32, final_xor: u32) -> u32 {
    crc_backward_raw(init, payload) ^ final_xor
}

/// Advance a raw state through `zero_count` zero bytes.
pub(crate) fn crc_zero_advance(raw: u32, zero_count: usize) -> u32 {
    const ZEROS: [u8; 64] = [0u8; 64];
    let mut crc = raw;
    let mut remain = zero_count;
    while remain > 0 {
        let n = remain.min(ZEROS.len());
        crc = crc_forward_raw(crc, &ZEROS[..n]);
        remain -= n;
    }
    crc
}

/// The checksum a window settles on when its trailing 4 bytes are the window's
/// own sealed checksum field. Payload-independent, which is what lets
/// `Table::check_residue` recognize a sealed frame without knowing its CRC.
pub fn final_residue(init: u32, final_xor: u32) -> u32 {
    let mut seal = [0u8; 4];
    LittleEndian::write_u32(&mut seal, init ^ final_xor);
    crc_forward_raw(init, &seal) ^ final_xor
}
