//! Convex ∩ quad-tree traversal.

use super::{split, SpatialIndex};
use crate::constants::ROOT_COUNT;
use crate::geometry::{Convex, Markup, SpatialVector};
use crate::range::HtmRange;

impl SpatialIndex {
    /// Collects every query-level trixel overlapping `convex` into `range`.
    ///
    /// Fully covered nodes contribute their whole leaf interval at once,
    /// rejected nodes are pruned, and partially covered nodes are split until
    /// the query level is reached. The convex is simplified first.
    pub fn intersect(&self, convex: &mut Convex, range: &mut HtmRange) {
        convex.simplify();
        if convex.is_empty() {
            return;
        }
        for root in 0..ROOT_COUNT {
            self.test_stored(root, convex, range);
        }
    }

    fn test_stored(&self, index: usize, convex: &Convex, range: &mut HtmRange) {
        let node = &self.nodes[index];
        let [v0, v1, v2] = self.corners(node);
        match convex.classify(v0, v1, v2) {
            Markup::Reject => {}
            Markup::Full => self.save_trixel(node.id, range),
            Markup::Partial => match node.children {
                Some(children) => {
                    for child in children {
                        self.test_stored(child, convex, range);
                    }
                }
                None if self.level > self.build_level => {
                    self.test_computed(self.level - self.build_level, node.id, [v0, v1, v2], convex, range);
                }
                None => self.save_trixel(node.id, range),
            },
        }
    }

    /// Descends below the stored tree; `depth` levels remain to the query level.
    fn test_computed(
        &self,
        depth: u32,
        id: u64,
        [v0, v1, v2]: [&SpatialVector; 3],
        convex: &Convex,
        range: &mut HtmRange,
    ) {
        let children = split(v0, v1, v2);
        for (k, [c0, c1, c2]) in children.iter().enumerate() {
            let child_id = (id << 2) + k as u64;
            match convex.classify(c0, c1, c2) {
                Markup::Reject => {}
                Markup::Full => self.save_trixel(child_id, range),
                Markup::Partial if depth > 1 => {
                    self.test_computed(depth - 1, child_id, [c0, c1, c2], convex, range);
                }
                Markup::Partial => self.save_trixel(child_id, range),
            }
        }
    }

    /// Records `id` as the interval of query-level leaves beneath it.
    fn save_trixel(&self, id: u64, range: &mut HtmRange) {
        let level = level_of(id);
        if level < self.level {
            let shifts = 2 * (self.level - level);
            let lo = id << shifts;
            range.merge_range(lo, lo + (1u64 << shifts) - 1);
        } else {
            range.merge_range(id, id);
        }
    }
}

/// Level encoded in an internal id's bit length.
pub(crate) fn level_of(id: u64) -> u32 {
    (64 - id.leading_zeros()) / 2 - 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::trixels_at_level;

    #[test]
    fn level_from_bit_length() {
        assert_eq!(level_of(8), 0);
        assert_eq!(level_of(15), 0);
        assert_eq!(level_of(32), 1);
        assert_eq!(level_of(63), 1);
        assert_eq!(level_of(trixels_at_level(7)), 7);
    }

    #[test]
    fn unconstrained_convex_covers_everything() {
        let index = SpatialIndex::new(3, 2).unwrap();
        let mut range = HtmRange::new();
        index.intersect(&mut Convex::new(), &mut range);
        assert_eq!(range.ranges(), &[(512, 1023)]);
    }

    #[test]
    fn circle_result_contains_center_and_no_far_trixels() {
        let index = SpatialIndex::new(5, 3).unwrap();
        let center = SpatialVector::from_radec(123.0, -34.0);
        let mut convex = Convex::circle(&center, 3.0);
        let mut range = HtmRange::new();
        index.intersect(&mut convex, &mut range);

        assert!(range.contains(index.id_by_point(&center)));
        let far = index.id_by_point(&SpatialVector::from_radec(303.0, 34.0));
        assert!(!range.contains(far));
        for id in range.iter() {
            let p = index.point_by_id(id).unwrap();
            // Level 5 trixels are a few degrees across, so centroids stay near the cap.
            assert!(p.separation(&center) < 3.0 + 4.0);
        }
    }

    #[test]
    fn stored_and_computed_traversals_agree() {
        let stored = SpatialIndex::new(4, 4).unwrap();
        let shallow = SpatialIndex::new(4, 1).unwrap();
        let center = SpatialVector::from_radec(10.0, 60.0);

        let mut a = HtmRange::new();
        stored.intersect(&mut Convex::circle(&center, 7.5), &mut a);
        let mut b = HtmRange::new();
        shallow.intersect(&mut Convex::circle(&center, 7.5), &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_convex_yields_nothing() {
        let index = SpatialIndex::new(3, 3).unwrap();
        let mut convex = Convex::circle(&SpatialVector::from_radec(0.0, 0.0), 2.0);
        convex.add(crate::Constraint::circle(&SpatialVector::from_radec(180.0, 0.0), 2.0));
        let mut range = HtmRange::new();
        index.intersect(&mut convex, &mut range);
        assert!(range.is_empty());
    }
}
