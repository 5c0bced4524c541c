//! riffle — locating self-sealed frame boundaries in append-only binary logs.
//!
//! Two composable primitives:
//! - a rolling CRC-32C scanner that recognizes checksum-sealed frames while
//!   walking a byte stream forward or backward, in O(1) per element, and
//! - a fixed-slot page cache tuned for reads whose offsets decrease over time
//!   (tail-to-head replay), with Clock eviction.
//!
//! The scanner consumes bytes the cache produces; there is no further
//! coupling between them.

// Base modules
pub mod config;
pub mod consts;
pub mod metrics;

// Subsystems (folders with mod.rs)
pub mod cache; // src/cache/{mod,raw,hitmap,read_log}.rs
pub mod crc; // src/crc/{mod,table,codeword}.rs
pub mod scan; // src/scan/mod.rs

// Utilities
pub mod util; // src/util/mod.rs

// Convenience re-exports
pub use cache::hitmap::CacheHitMap;
pub use cache::raw::RawReader;
pub use cache::read_log::LogParams;
pub use cache::{OffsetLength, ReverseReadCache};
pub use config::CacheConfig;
pub use crc::{
    check_backward, check_forward, crc_backward, crc_forward, final_residue, seal_backward,
    seal_forward, shared_table, Table,
};
pub use scan::{
    backward_scanner, forward_scanner, Backward, BackwardScanner, CodewordMatch, Direction,
    Forward, ForwardScanner, Scanner,
};
