//! cache/hitmap — request-vs-cache topology rendering for read diagnostics.
//!
//! Segment types: `M` = miss, `H` = hit, `C` = cache outside the request,
//! `_` = gap. Adjacent same-type runs merge; each run is encoded as the type
//! char plus a 36-level log-scale length character ('0' = shortest run,
//! 'z' = longest), with the reference lengths appended as `[min;max]`.

use std::fmt;

use super::OffsetLength;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHitMap {
    map: Option<String>,
    seg_min: u64,
    seg_max: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    kind: char,
    length: u64,
}

#[derive(Debug, Clone, Copy)]
struct StartEnd {
    start: u64,
    end: u64,
}

impl CacheHitMap {
    pub fn map(&self) -> Option<&str> {
        self.map.as_deref()
    }

    pub fn seg_min(&self) -> u64 {
        self.seg_min
    }

    pub fn seg_max(&self) -> u64 {
        self.seg_max
    }

    /// Render the topology of one request against the cached segments.
    pub fn render(req_offset: u64, req_length: u64, cache_segments: &[OffsetLength]) -> Self {
        let segments = sweep(req_offset, req_length, cache_segments);
        if segments.is_empty() {
            return Self::default();
        }

        let mut l_min = u64::MAX;
        let mut l_max = 0u64;
        for seg in &segments {
            l_min = l_min.min(seg.length);
            l_max = l_max.max(seg.length);
        }

        let log_den = if l_max > l_min {
            (l_max as f64 / l_min as f64).ln()
        } else {
            0.0
        };

        let mut map = String::with_capacity(segments.len() * 2);
        for seg in &segments {
            map.push(seg.kind);
            map.push(scale_to_level(seg.length, l_min, log_den));
        }
        Self {
            map: Some(map),
            seg_min: l_min,
            seg_max: l_max,
        }
    }
}

impl fmt::Display for CacheHitMap {
    /// Compact form `H0MzC0[100;8092]`; empty when nothing was rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.map {
            Some(map) => write!(f, "{}[{};{}]", map, self.seg_min, self.seg_max),
            None => Ok(()),
        }
    }
}

/// Overlay the request interval on the merged cache intervals and produce the
/// typed segment run. The request is a single contiguous interval, so one
/// linear pass over the sorted cache segments suffices.
fn sweep(req_offset: u64, req_length: u64, cache_segments: &[OffsetLength]) -> Vec<Segment> {
    let merged = merge_cache(cache_segments);
    let mut segments = Vec::new();
    let req = StartEnd {
        start: req_offset,
        end: req_offset + req_length,
    };

    if req_length == 0 && merged.is_empty() {
        return segments;
    }

    // Start from the earliest boundary among request and cache.
    let mut cursor = match merged.first() {
        Some(first) if req_length > 0 => req.start.min(first.start),
        Some(first) => first.start,
        None => req.start,
    };

    for cache in &merged {
        // Gap before this cache interval.
        if cursor < cache.start {
            emit_interval(cursor, cache.start, req, 'M', '_', &mut segments);
        }

        // The cache interval itself.
        let actual_start = cursor.max(cache.start);
        if actual_start < cache.end {
            emit_interval(actual_start, cache.end, req, 'H', 'C', &mut segments);
        }

        cursor = cursor.max(cache.end);
    }

    // Remaining request tail not covered by any cache.
    if req_length > 0 && cursor < req.end {
        emit_interval(cursor, req.end, req, 'M', '_', &mut segments);
    }

    segments
}

/// Split [from, to) on the request boundaries: parts inside the request get
/// `kind_inside`, parts outside get `kind_outside`. At most 3 pieces; adjacent
/// same-type pieces merge through `append_segment`.
fn emit_interval(
    mut from: u64,
    to: u64,
    request: StartEnd,
    kind_inside: char,
    kind_outside: char,
    segments: &mut Vec<Segment>,
) {
    // Before the request.
    if from < request.start {
        let end = to.min(request.start);
        append_segment(kind_outside, end - from, segments);
        from = end;
    }
    // Inside the request.
    if from < to && from < request.end {
        let end = to.min(request.end);
        append_segment(kind_inside, end - from, segments);
        from = end;
    }
    // After the request.
    if from < to {
        append_segment(kind_outside, to - from, segments);
    }
}

fn append_segment(kind: char, length: u64, segments: &mut Vec<Segment>) {
    if length == 0 {
        return;
    }
    if let Some(last) = segments.last_mut() {
        if last.kind == kind {
            last.length += length;
            return;
        }
    }
    segments.push(Segment { kind, length });
}

/// Sort cache segments and merge overlapping/touching intervals into a
/// non-overlapping ordered list.
fn merge_cache(cache_segments: &[OffsetLength]) -> Vec<StartEnd> {
    let mut valid: Vec<OffsetLength> = cache_segments
        .iter()
        .copied()
        .filter(|s| s.length > 0)
        .collect();
    if valid.is_empty() {
        return Vec::new();
    }
    valid.sort_by_key(|s| s.offset);

    let mut result = Vec::new();
    let mut cur = StartEnd {
        start: valid[0].offset,
        end: valid[0].end(),
    };
    for seg in &valid[1..] {
        if seg.offset <= cur.end {
            cur.end = cur.end.max(seg.end());
        } else {
            result.push(cur);
            cur = StartEnd {
                start: seg.offset,
                end: seg.end(),
            };
        }
    }
    result.push(cur);
    result
}

/// Log-scale mapping: shortest run → '0', longest → 'z' (36 levels).
fn scale_to_level(length: u64, l_min: u64, log_den: f64) -> char {
    if log_den <= 0.0 {
        return '0';
    }
    let ratio = (length as f64 / l_min as f64).ln() / log_den;
    let level = (ratio * 35.0 + 0.5) as i64;
    let level = level.clamp(0, 35) as u32;
    if level < 10 {
        char::from_digit(level, 10).unwrap_or('0')
    } else {
        char::from_u32('a' as u32 + level - 10).unwrap_or('z')
    }
}
