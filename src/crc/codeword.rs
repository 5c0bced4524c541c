//! crc/codeword — one-shot sealing and verification of self-describing frames.
//!
//! A forward codeword carries its checksum as a trailing little-endian field:
//! `[payload][crc32c LE]`. A backward codeword mirrors it, `[crc32c BE][payload]`
//! with the payload checksummed last byte first. Reversing the bytes of one
//! yields a valid instance of the other, which is the symmetry that lets a
//! single remainder table serve both scan directions.

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{crc_backward, crc_forward};
use crate::consts::{DEFAULT_FINAL_XOR, DEFAULT_INIT_VALUE};

/// Size of the embedded checksum field.
pub const SEAL_LEN: usize = 4;

/// Stamp the checksum of `codeword[..len-4]` into the trailing 4 bytes (LE).
/// Returns the written checksum.
pub fn seal_forward(codeword: &mut [u8]) -> Result<u32> {
    seal_forward_with(codeword, DEFAULT_INIT_VALUE, DEFAULT_FINAL_XOR)
}

pub fn seal_forward_with(codeword: &mut [u8], init: u32, final_xor: u32) -> Result<u32> {
    let n = codeword.len();
    if n < SEAL_LEN {
        return Err(anyhow!("codeword too small to seal ({} bytes)", n));
    }
    let crc = crc_forward(&codeword[..n - SEAL_LEN], init, final_xor);
    LittleEndian::write_u32(&mut codeword[n - SEAL_LEN..], crc);
    Ok(crc)
}

/// Recompute and compare the trailing checksum field. true = intact.
pub fn check_forward(codeword: &[u8]) -> Result<bool> {
    check_forward_with(codeword, DEFAULT_INIT_VALUE, DEFAULT_FINAL_XOR)
}

pub fn check_forward_with(codeword: &[u8], init: u32, final_xor: u32) -> Result<bool> {
    let n = codeword.len();
    if n < SEAL_LEN {
        return Err(anyhow!("codeword too small to check ({} bytes)", n));
    }
    let stored = LittleEndian::read_u32(&codeword[n - SEAL_LEN..]);
    Ok(crc_forward(&codeword[..n - SEAL_LEN], init, final_xor) == stored)
}

/// Stamp the backward checksum of `codeword[4..]` into the leading 4 bytes (BE).
/// Returns the written checksum.
pub fn seal_backward(codeword: &mut [u8]) -> Result<u32> {
    seal_backward_with(codeword, DEFAULT_INIT_VALUE, DEFAULT_FINAL_XOR)
}

pub fn seal_backward_with(codeword: &mut [u8], init: u32, final_xor: u32) -> Result<u32> {
    let n = codeword.len();
    if n < SEAL_LEN {
        return Err(anyhow!("codeword too small to seal ({} bytes)", n));
    }
    let crc = crc_backward(&codeword[SEAL_LEN..], init, final_xor);
    BigEndian::write_u32(&mut codeword[..SEAL_LEN], crc);
    Ok(crc)
}

/// Recompute and compare the leading checksum field. true = intact.
pub fn check_backward(codeword: &[u8]) -> Result<bool> {
    check_backward_with(codeword, DEFAULT_INIT_VALUE, DEFAULT_FINAL_XOR)
}

pub fn check_backward_with(codeword: &[u8], init: u32, final_xor: u32) -> Result<bool> {
    let n = codeword.len();
    if n < SEAL_LEN {
        return Err(anyhow!("codeword too small to check ({} bytes)", n));
    }
    let stored = BigEndian::read_u32(&codeword[..SEAL_LEN]);
    Ok(crc_backward(&codeword[SEAL_LEN..], init, final_xor) == stored)
}
