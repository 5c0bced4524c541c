//! Read-log diagnostics: CSV shape, per-read rows, and hit-map rendering.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use riffle::consts::PAGE_SIZE;
use riffle::{LogParams, ReverseReadCache};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("riffle-{}-{}-{}", prefix, pid, t))
}

#[test]
fn read_log_writes_header_and_rows() -> Result<()> {
    let root = unique_root("read-log");
    fs::create_dir_all(&root)?;
    let path = root.join("data.bin");
    let data: Vec<u8> = (0..2 * PAGE_SIZE).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &data)?;
    let log_path = root.join("reads.csv");

    let file = fs::File::open(&path)?;
    let mut cache = ReverseReadCache::with_slot_shift(&file, 2);
    cache.set_log(LogParams {
        path: Some(log_path.clone()),
        append: false,
        flush_every: 1,
        metadata: Some("case=read_log".to_string()),
    });

    let mut buf = vec![0u8; 20];
    let offset = PAGE_SIZE as u64 - 10;
    cache.read(offset, &mut buf)?; // cross-page, all from disk
    cache.read(offset, &mut buf)?; // partially cached now
    let mut small = vec![0u8; 10];
    cache.read(0, &mut small)?; // fully cached
    drop(cache);

    let text = fs::read_to_string(&log_path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5, "header (2 lines) + 3 rows:\n{}", text);

    assert!(lines[0].starts_with("#v1 "), "version line: {}", lines[0]);
    assert!(lines[0].contains("case=read_log"));
    assert_eq!(
        lines[1],
        "seq,offset,requested,bytes_read,raw_count,raw_bytes,io_us,cache_us,hitmap"
    );

    // First read: nothing cached, one raw cross-page read, all-miss map.
    let row0: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(row0.len(), 9);
    assert_eq!(row0[0], "0");
    assert_eq!(row0[1], offset.to_string());
    assert_eq!(row0[2], "20");
    assert_eq!(row0[3], "20");
    assert_eq!(row0[4], "1");
    assert!(row0[8].starts_with('M'), "hitmap: {}", row0[8]);

    // Third read: served entirely from the cached first page.
    let row2: Vec<&str> = lines[4].split(',').collect();
    assert_eq!(row2.len(), 9);
    assert_eq!(row2[0], "2");
    assert_eq!(row2[4], "0", "no raw reads on a full hit");
    assert_eq!(row2[5], "0");
    assert!(row2[8].contains('H'), "hitmap: {}", row2[8]);

    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn disabled_logger_writes_nothing() -> Result<()> {
    let root = unique_root("read-log-off");
    fs::create_dir_all(&root)?;
    let path = root.join("data.bin");
    fs::write(&path, vec![0x42; 1024])?;
    let log_path = root.join("reads.csv");

    let file = fs::File::open(&path)?;
    let mut cache = ReverseReadCache::with_slot_shift(&file, 2);
    let mut buf = vec![0u8; 16];
    cache.read(0, &mut buf)?;

    // Attach, log one read, then detach again.
    cache.set_log(LogParams {
        path: Some(log_path.clone()),
        append: false,
        flush_every: 1,
        metadata: None,
    });
    cache.read(100, &mut buf)?;
    cache.set_log(LogParams::default());
    cache.read(200, &mut buf)?;
    drop(cache);

    let text = fs::read_to_string(&log_path)?;
    let rows = text.lines().filter(|l| !l.starts_with('#')).count();
    assert_eq!(rows, 2, "columns line + exactly one logged row:\n{}", text);

    fs::remove_dir_all(&root)?;
    Ok(())
}
