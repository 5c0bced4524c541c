//! Scanner behavior: finding sealed frames in streams, both directions, byte
//! and word granularity, chunked input, and composition with the page cache.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use riffle::consts::{DEFAULT_FINAL_XOR, DEFAULT_INIT_VALUE};
use riffle::crc::crc_forward;
use riffle::{backward_scanner, forward_scanner, seal_backward, seal_forward, ReverseReadCache};

fn fill_payload(buf: &mut [u8]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31).wrapping_add(7);
    }
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("riffle-{}-{}-{}", prefix, pid, t))
}

/// [junk(prefix)][forward codeword(payload+4)][junk(suffix)]
fn stream_with_forward_codeword(prefix: usize, payload: usize, suffix: usize) -> Result<Vec<u8>> {
    let codeword_size = payload + 4;
    let mut stream = vec![0u8; prefix + codeword_size + suffix];
    fill_payload(&mut stream);
    fill_payload(&mut stream[prefix..prefix + payload]);
    seal_forward(&mut stream[prefix..prefix + codeword_size])?;
    Ok(stream)
}

#[test]
fn forward_scanner_finds_planted_codeword() -> Result<()> {
    let (prefix, payload, suffix) = (10usize, 12usize, 10usize);
    let codeword_size = payload + 4;
    let stream = stream_with_forward_codeword(prefix, payload, suffix)?;

    let mut scanner = forward_scanner(codeword_size)?;
    let m = scanner
        .try_find_codeword(&stream)
        .expect("planted codeword must be found");

    assert_eq!(m.processed(), (prefix + codeword_size) as u64);
    assert!(!m.is_backward());
    assert_eq!(m.codeword(), &stream[prefix..prefix + codeword_size]);
    assert_eq!(m.payload(), &stream[prefix..prefix + payload]);
    assert_eq!(
        m.final_crc(),
        LittleEndian::read_u32(&stream[prefix + payload..])
    );
    assert_eq!(m.remain(), &stream[prefix + codeword_size..]);
    assert!(scanner.is_at_match());
    Ok(())
}

#[test]
fn forward_scanner_exact_codeword_round_trip() -> Result<()> {
    let payload = 12usize;
    let codeword_size = payload + 4;
    let mut codeword = vec![0u8; codeword_size];
    fill_payload(&mut codeword[..payload]);
    let sealed = seal_forward(&mut codeword)?;

    let mut scanner = forward_scanner(codeword_size)?;
    let m = scanner.try_find_codeword(&codeword).expect("must match");

    assert_eq!(m.codeword(), &codeword[..]);
    assert_eq!(m.payload(), &codeword[..payload]);
    assert_eq!(m.final_crc(), sealed);
    assert!(m.remain().is_empty());
    Ok(())
}

#[test]
fn forward_scanner_no_match_on_corrupted_window() -> Result<()> {
    let payload = 12usize;
    let codeword_size = payload + 4;
    let mut codeword = vec![0u8; codeword_size];
    fill_payload(&mut codeword[..payload]);
    seal_forward(&mut codeword)?;
    codeword[payload / 2] ^= 0xFF;

    // One window exactly: a corrupted seal cannot match anywhere.
    let mut scanner = forward_scanner(codeword_size)?;
    assert!(scanner.try_find_codeword(&codeword).is_none());
    assert!(!scanner.is_at_match());
    assert_eq!(scanner.processed(), codeword_size as u64);
    Ok(())
}

#[test]
fn forward_scanner_byte_and_u32_spans_agree() -> Result<()> {
    let (prefix, payload, suffix) = (8usize, 12usize, 8usize);
    let codeword_size = payload + 4;
    let stream = stream_with_forward_codeword(prefix, payload, suffix)?;
    assert_eq!(stream.len() % 4, 0);

    let mut by_byte = forward_scanner(codeword_size)?;
    let processed_byte = {
        let m = by_byte.try_find_codeword(&stream).expect("byte scan match");
        (m.processed(), m.final_crc())
    };

    let words: Vec<u32> = stream.chunks_exact(4).map(LittleEndian::read_u32).collect();
    let mut by_word = forward_scanner(codeword_size)?;
    let m = by_word
        .try_find_codeword_u32(&words)?
        .expect("u32 scan match");
    assert_eq!((m.processed(), m.final_crc()), processed_byte);
    Ok(())
}

#[test]
fn forward_scanner_across_chunk_boundaries() -> Result<()> {
    let (prefix, payload, suffix) = (20usize, 12usize, 5usize);
    let codeword_size = payload + 4;
    let stream = stream_with_forward_codeword(prefix, payload, suffix)?;

    let mut scanner = forward_scanner(codeword_size)?;
    let (first, second) = stream.split_at(prefix + 3); // split inside the frame
    assert!(scanner.try_find_codeword(first).is_none());
    let m = scanner
        .try_find_codeword(second)
        .expect("match in second chunk");
    assert_eq!(m.processed(), (prefix + codeword_size) as u64);
    assert_eq!(m.codeword(), &stream[prefix..prefix + codeword_size]);
    Ok(())
}

#[test]
fn backward_scanner_finds_frame_from_file_tail() -> Result<()> {
    // [junk][backward codeword][junk]; the scanner consumes file bytes from
    // the end, so the match fires at the frame's first byte.
    let (prefix, payload, suffix) = (10usize, 12usize, 10usize);
    let codeword_size = payload + 4;
    let mut file = vec![0xEE; prefix + codeword_size + suffix];
    fill_payload(&mut file[prefix + 4..prefix + codeword_size]);
    seal_backward(&mut file[prefix..prefix + codeword_size])?;

    let mut scanner = backward_scanner(codeword_size)?;
    let m = scanner
        .try_find_codeword(&file)
        .expect("backward frame must be found");

    assert!(m.is_backward());
    assert_eq!(m.processed(), (suffix + codeword_size) as u64);
    // File order, so the leading BE field reads back directly.
    assert_eq!(m.codeword(), &file[prefix..prefix + codeword_size]);
    assert_eq!(m.payload(), &file[prefix + 4..prefix + codeword_size]);
    assert_eq!(m.final_crc(), BigEndian::read_u32(&file[prefix..]));
    assert_eq!(m.remain(), &file[..prefix]);
    Ok(())
}

#[test]
fn backward_scanner_exact_codeword_round_trip() -> Result<()> {
    let payload = 12usize;
    let codeword_size = payload + 4;
    let mut codeword = vec![0u8; codeword_size];
    fill_payload(&mut codeword[4..]);
    let sealed = seal_backward(&mut codeword)?;

    let mut scanner = backward_scanner(codeword_size)?;
    let m = scanner.try_find_codeword(&codeword).expect("must match");

    assert_eq!(m.codeword(), &codeword[..]);
    assert_eq!(m.payload(), &codeword[4..]);
    assert_eq!(m.final_crc(), sealed);
    assert!(m.remain().is_empty());
    Ok(())
}

#[test]
fn backward_scanner_finds_reversed_forward_stream() -> Result<()> {
    let (prefix, payload, suffix) = (10usize, 12usize, 10usize);
    let codeword_size = payload + 4;
    let stream = stream_with_forward_codeword(prefix, payload, suffix)?;

    let mut reversed = stream.clone();
    reversed.reverse();

    let mut scanner = backward_scanner(codeword_size)?;
    let m = scanner
        .try_find_codeword(&reversed)
        .expect("reversed forward codeword is a backward codeword");
    assert!(m.is_backward());
    assert_eq!(m.processed(), (suffix + codeword_size) as u64);
    Ok(())
}

#[test]
fn backward_scanner_no_match_on_corrupted_window() -> Result<()> {
    let payload = 12usize;
    let codeword_size = payload + 4;
    let mut codeword = vec![0u8; codeword_size];
    fill_payload(&mut codeword[4..]);
    seal_backward(&mut codeword)?;
    codeword[1] ^= 0xFF; // inside the CRC field

    let mut scanner = backward_scanner(codeword_size)?;
    assert!(scanner.try_find_codeword(&codeword).is_none());
    Ok(())
}

#[test]
fn rolling_state_matches_tail_checksum() -> Result<()> {
    // After consuming all of P, the scanner's window is P's tail and its state
    // checks true against the one-shot checksum of that tail.
    let window = 16usize;
    let mut payload = vec![0u8; 100];
    fill_payload(&mut payload);

    let mut scanner = forward_scanner(window)?;
    for &b in &payload {
        scanner.roll(b);
    }
    assert_eq!(scanner.processed(), payload.len() as u64);
    let tail_crc = crc_forward(
        &payload[payload.len() - window..],
        DEFAULT_INIT_VALUE,
        DEFAULT_FINAL_XOR,
    );
    assert!(scanner.table().check(scanner.rolling_raw(), tail_crc));
    Ok(())
}

#[test]
fn rolling_check_against_explicit_target() -> Result<()> {
    let window = 20usize;
    let mut payload = vec![0u8; window];
    fill_payload(&mut payload);
    let target = crc_forward(&payload, DEFAULT_INIT_VALUE, DEFAULT_FINAL_XOR);

    let mut scanner = forward_scanner(window)?;
    for &b in &payload[..window - 1] {
        scanner.roll(b);
    }
    assert!(scanner.rolling_check_against(payload[window - 1], target));
    Ok(())
}

#[test]
fn reset_reuses_scanner() -> Result<()> {
    let payload = 12usize;
    let codeword_size = payload + 4;
    let stream = stream_with_forward_codeword(6, payload, 6)?;

    let mut scanner = forward_scanner(codeword_size)?;
    assert!(scanner.try_find_codeword(&stream).is_some());

    scanner.reset(None);
    assert_eq!(scanner.processed(), 0);
    assert!(!scanner.is_filled());
    let m = scanner.try_find_codeword(&stream).expect("match after reset");
    assert_eq!(m.processed(), (6 + codeword_size) as u64);
    Ok(())
}

#[test]
fn scanner_consumes_cache_supplied_bytes() -> Result<()> {
    // The composition the two primitives exist for: a cache feeding a scanner.
    let (prefix, payload, suffix) = (100usize, 28usize, 50usize);
    let codeword_size = payload + 4;
    let stream = stream_with_forward_codeword(prefix, payload, suffix)?;

    let root = unique_root("scan-cache");
    fs::create_dir_all(&root)?;
    let path = root.join("frames.log");
    fs::write(&path, &stream)?;

    let file = fs::File::open(&path)?;
    let mut cache = ReverseReadCache::with_slot_shift(&file, 2);
    let mut scanner = forward_scanner(codeword_size)?;

    let mut offset = 0u64;
    let mut chunk = vec![0u8; 24];
    let mut found = None;
    while found.is_none() {
        let n = cache.read(offset, &mut chunk)?;
        if n == 0 {
            break;
        }
        offset += n as u64;
        if let Some(m) = scanner.try_find_codeword(&chunk[..n]) {
            found = Some((m.processed(), m.codeword().to_vec()));
        }
    }

    let (processed, codeword) = found.expect("frame must be discovered through the cache");
    assert_eq!(processed, (prefix + codeword_size) as u64);
    assert_eq!(codeword, &stream[prefix..prefix + codeword_size]);

    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn backward_scanner_consumes_cache_supplied_bytes() -> Result<()> {
    // Tail-to-head replay: read decreasing-offset chunks, scan each backward.
    let (prefix, payload, suffix) = (150usize, 28usize, 60usize);
    let codeword_size = payload + 4;
    let mut stream = vec![0xEE; prefix + codeword_size + suffix];
    fill_payload(&mut stream[prefix + 4..prefix + codeword_size]);
    seal_backward(&mut stream[prefix..prefix + codeword_size])?;

    let root = unique_root("scan-cache-rev");
    fs::create_dir_all(&root)?;
    let path = root.join("frames.log");
    fs::write(&path, &stream)?;

    let file = fs::File::open(&path)?;
    let mut cache = ReverseReadCache::with_slot_shift(&file, 2);
    let mut scanner = backward_scanner(codeword_size)?;

    let chunk_size = 32u64;
    let mut end = stream.len() as u64;
    let mut found = None;
    while found.is_none() && end > 0 {
        let start = end.saturating_sub(chunk_size);
        let mut chunk = vec![0u8; (end - start) as usize];
        let n = cache.read(start, &mut chunk)?;
        assert_eq!(n, chunk.len());
        if let Some(m) = scanner.try_find_codeword(&chunk) {
            found = Some((m.processed(), m.codeword().to_vec()));
        }
        end = start;
    }

    let (processed, codeword) = found.expect("frame must be discovered through the cache");
    assert_eq!(processed, (suffix + codeword_size) as u64);
    assert_eq!(codeword, &stream[prefix..prefix + codeword_size]);

    fs::remove_dir_all(&root)?;
    Ok(())
}
