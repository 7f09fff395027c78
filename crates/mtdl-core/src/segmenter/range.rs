//! Segment type and range planning.

/// A single segment: byte range [start, end] (both inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset.
    pub end: u64,
}

impl Segment {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Length of this segment in bytes.
    pub fn len(&self) -> u64 {
        self.end + 1 - self.start
    }

    /// `start-end`, the part of `Range: bytes=start-end` libcurl takes.
    pub fn byte_range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// The tail of this segment starting `done` bytes in, or `None` if nothing remains.
    pub fn remainder(&self, done: u64) -> Option<Segment> {
        let start = self.start.checked_add(done)?;
        if start > self.end {
            return None;
        }
        Some(Segment { start, end: self.end })
    }
}

/// Splits `total_size` bytes into `split` inclusive segments.
///
/// Segment 0 is `[0, L/S]`, segment `i > 0` is `[L*i/S + 1, L*(i+1)/S]`, and the
/// last segment always ends at `L - 1`. When `total_size <= split` the formula
/// cannot yield `split` non-empty ranges, so every byte becomes its own segment.
/// Returns an empty vec if `total_size` is 0 or `split` is 0.
pub fn plan_segments(total_size: u64, split: usize) -> Vec<Segment> {
    if total_size == 0 || split == 0 {
        return Vec::new();
    }

    let split = split as u64;
    if total_size <= split {
        return (0..total_size).map(|b| Segment::new(b, b)).collect();
    }

    // u128 keeps L * (i + 1) from overflowing for very large resources.
    let bound = |i: u64| ((total_size as u128 * i as u128) / split as u128) as u64;
    let last = total_size - 1;

    let mut out = Vec::with_capacity(split as usize);
    for i in 0..split {
        let start = if i == 0 { 0 } else { bound(i) + 1 };
        let end = if i + 1 == split { last } else { bound(i + 1) };
        out.push(Segment::new(start, end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(segs: &[Segment], total: u64) {
        assert_eq!(segs.first().unwrap().start, 0);
        assert_eq!(segs.last().unwrap().end, total - 1);
        for pair in segs.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start, "gap or overlap at {:?}", pair);
        }
        for s in segs {
            assert!(s.start <= s.end, "empty segment {:?}", s);
        }
        let sum: u64 = segs.iter().map(Segment::len).sum();
        assert_eq!(sum, total);
    }

    #[test]
    fn plan_segments_thousand_by_four() {
        let segs = plan_segments(1000, 4);
        assert_eq!(
            segs,
            vec![
                Segment::new(0, 250),
                Segment::new(251, 500),
                Segment::new(501, 750),
                Segment::new(751, 999),
            ]
        );
    }

    #[test]
    fn plan_segments_uneven() {
        let segs = plan_segments(10, 3);
        // 10/3 = 3, 20/3 = 6
        assert_eq!(
            segs,
            vec![Segment::new(0, 3), Segment::new(4, 6), Segment::new(7, 9)]
        );
        assert_exact_cover(&segs, 10);
    }

    #[test]
    fn plan_segments_single_split_ends_before_length() {
        let segs = plan_segments(100, 1);
        assert_eq!(segs, vec![Segment::new(0, 99)]);
    }

    #[test]
    fn plan_segments_length_equal_to_split() {
        let segs = plan_segments(4, 4);
        assert_eq!(segs.len(), 4);
        assert_exact_cover(&segs, 4);
    }

    #[test]
    fn plan_segments_shorter_than_split() {
        let segs = plan_segments(3, 8);
        assert_eq!(segs.len(), 3);
        assert_exact_cover(&segs, 3);
    }

    #[test]
    fn plan_segments_empty() {
        assert!(plan_segments(0, 4).is_empty());
        assert!(plan_segments(100, 0).is_empty());
    }

    #[test]
    fn plan_segments_cover_exactly_for_many_shapes() {
        for total in 1..=300u64 {
            for split in 1..=17usize {
                let segs = plan_segments(total, split);
                assert_eq!(segs.len() as u64, (split as u64).min(total));
                assert_exact_cover(&segs, total);
            }
        }
    }

    #[test]
    fn plan_segments_huge_length_does_not_overflow() {
        let total = u64::MAX / 2;
        let segs = plan_segments(total, 8);
        assert_eq!(segs.len(), 8);
        assert_exact_cover(&segs, total);
    }

    #[test]
    fn segment_range_header() {
        let s = Segment::new(0, 99);
        assert_eq!(s.byte_range(), "0-99");
        assert_eq!(s.len(), 100);
    }

    #[test]
    fn segment_range_header_single_byte() {
        let s = Segment::new(42, 42);
        assert_eq!(s.byte_range(), "42-42");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn remainder_skips_sent_bytes() {
        let s = Segment::new(100, 199);
        assert_eq!(s.remainder(0), Some(s));
        assert_eq!(s.remainder(40), Some(Segment::new(140, 199)));
        assert_eq!(s.remainder(99), Some(Segment::new(199, 199)));
        assert_eq!(s.remainder(100), None);
    }
}
