//! Interval-encoded sets of trixel ids.
//!
//! Region queries touch large contiguous runs of trixels (every leaf under a
//! fully covered node), so results are accumulated as sorted, disjoint,
//! non-adjacent `[lo, hi]` intervals and only expanded to individual ids when
//! iterated.
//!
//! ```
//! use celestial_htm::HtmRange;
//!
//! let mut range = HtmRange::new();
//! range.merge_range(10, 12);
//! range.merge_range(13, 15);
//! range.merge_range(3, 3);
//! assert_eq!(range.ranges(), &[(3, 3), (10, 15)]);
//! assert_eq!(range.iter().collect::<Vec<_>>(), vec![3, 10, 11, 12, 13, 14, 15]);
//! ```

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmRange {
    ranges: Vec<(u64, u64)>,
}

impl HtmRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `[lo, hi]`, coalescing with any overlapping or adjacent intervals.
    ///
    /// Swapped bounds are reordered.
    pub fn merge_range(&mut self, lo: u64, hi: u64) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };

        // Traversal emits ids in ascending order, so appending is the common case.
        if let Some(last) = self.ranges.last_mut() {
            if lo > last.1 && lo - last.1 > 1 {
                self.ranges.push((lo, hi));
                return;
            }
            if lo >= last.0 {
                last.1 = last.1.max(hi);
                return;
            }
        } else {
            self.ranges.push((lo, hi));
            return;
        }

        // First interval that could touch `[lo, hi]`.
        let start = self
            .ranges
            .partition_point(|&(_, h)| h < lo && lo - h > 1);
        let mut end = start;
        let mut new_lo = lo;
        let mut new_hi = hi;
        while end < self.ranges.len() {
            let (l, h) = self.ranges[end];
            if l > new_hi && l - new_hi > 1 {
                break;
            }
            new_lo = new_lo.min(l);
            new_hi = new_hi.max(h);
            end += 1;
        }
        self.ranges.splice(start..end, std::iter::once((new_lo, new_hi)));
    }

    pub fn add(&mut self, id: u64) {
        self.merge_range(id, id);
    }

    pub fn contains(&self, id: u64) -> bool {
        let i = self.ranges.partition_point(|&(_, h)| h < id);
        self.ranges.get(i).is_some_and(|&(l, _)| l <= id)
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of ids covered.
    pub fn num_ids(&self) -> u64 {
        self.ranges.iter().map(|&(l, h)| h - l + 1).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            ranges: &self.ranges,
            index: 0,
            next: self.ranges.first().map(|&(l, _)| l),
        }
    }
}

impl fmt::Display for HtmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (l, h)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}-{}", l, h)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a HtmRange {
    type Item = u64;
    type IntoIter = RangeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walks every id of an [`HtmRange`] in ascending order.
#[derive(Debug, Clone)]
pub struct RangeIter<'a> {
    ranges: &'a [(u64, u64)],
    index: usize,
    next: Option<u64>,
}

impl Iterator for RangeIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = self.next?;
        let (_, hi) = self.ranges[self.index];
        self.next = if current < hi {
            Some(current + 1)
        } else {
            self.index += 1;
            self.ranges.get(self.index).map(|&(l, _)| l)
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let Some(current) = self.next else {
            return (0, Some(0));
        };
        let remaining = (self.ranges[self.index].1 - current + 1)
            + self.ranges[self.index + 1..]
                .iter()
                .map(|&(l, h)| h - l + 1)
                .sum::<u64>();
        let n = usize::try_from(remaining).unwrap_or(usize::MAX);
        (n, usize::try_from(remaining).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_overlapping_and_adjacent() {
        let mut r = HtmRange::new();
        r.merge_range(5, 10);
        r.merge_range(11, 12);
        r.merge_range(8, 9);
        assert_eq!(r.ranges(), &[(5, 12)]);
    }

    #[test]
    fn keeps_gaps_separate() {
        let mut r = HtmRange::new();
        r.merge_range(5, 10);
        r.merge_range(12, 12);
        assert_eq!(r.num_ranges(), 2);
        assert!(!r.contains(11));
        assert!(r.contains(12));
    }

    #[test]
    fn out_of_order_insert_bridges_intervals() {
        let mut r = HtmRange::new();
        r.merge_range(0, 1);
        r.merge_range(10, 11);
        r.merge_range(20, 21);
        r.merge_range(30, 31);
        r.merge_range(2, 19);
        assert_eq!(r.ranges(), &[(0, 21), (30, 31)]);
        r.merge_range(25, 25);
        assert_eq!(r.ranges(), &[(0, 21), (25, 25), (30, 31)]);
    }

    #[test]
    fn insert_before_first() {
        let mut r = HtmRange::new();
        r.merge_range(10, 11);
        r.merge_range(1, 2);
        assert_eq!(r.ranges(), &[(1, 2), (10, 11)]);
    }

    #[test]
    fn swapped_bounds_are_reordered() {
        let mut r = HtmRange::new();
        r.merge_range(9, 4);
        assert_eq!(r.ranges(), &[(4, 9)]);
    }

    #[test]
    fn counts_and_iterates() {
        let mut r = HtmRange::new();
        r.merge_range(0, 2);
        r.add(7);
        assert_eq!(r.num_ids(), 4);
        let ids: Vec<u64> = r.iter().collect();
        assert_eq!(ids, vec![0, 1, 2, 7]);
        assert_eq!(r.iter().size_hint(), (4, Some(4)));
        assert_eq!(r.to_string(), "0-2 7-7");
    }

    #[test]
    fn empty_range_iterates_nothing() {
        let r = HtmRange::new();
        assert!(r.is_empty());
        assert_eq!(r.iter().next(), None);
        assert!(!r.contains(0));
    }
}
