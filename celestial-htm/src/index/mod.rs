//! The quad-tree over the 8 root trixels.
//!
//! The sphere is first split into the 8 faces of an octahedron (`S0..S3` below
//! the equator, `N0..N3` above it). Each face is then recursively split into 4
//! children by joining the normalized midpoints of its edges:
//!
//! ```text
//!            v2
//!           /  \
//!          / c2 \
//!        w1 ---- w0
//!        / \ c3 / \
//!       / c0\  / c1\
//!     v0 --- w2 --- v1
//! ```
//!
//! Child `k` of a trixel with internal id `p` gets id `(p << 2) + k`. Roots are
//! `8..=15`, so at level `L` the ids run from `8·4^L` to `16·4^L - 1` and the
//! HTM name can be read straight off the bits (see [`name`]).
//!
//! Only levels up to `build_level` are stored in the node arena; deeper levels
//! are computed on the fly from the stored leaf's corners. All ids handled by
//! this module are internal ids; the mesh façade shifts them to the dense
//! `0..8·4^L` range callers see.

pub mod name;
mod query;

use crate::constants::{trixels_at_level, GEOMETRY_EPSILON, MAX_BUILD_LEVEL, MAX_LEVEL, ROOT_COUNT};
use crate::errors::{HtmError, HtmResult};
use crate::geometry::SpatialVector;
use log::debug;
use std::collections::HashMap;

/// Octahedron corners: +Z, +X, +Y, -X, -Y, -Z.
const OCTAHEDRON: [[f64; 3]; 6] = [
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, -1.0],
];

/// Root faces as `(corner indices, internal id)`, in S0..S3, N0..N3 order.
const ROOTS: [([usize; 3], u64); ROOT_COUNT] = [
    ([1, 5, 2], 8),
    ([2, 5, 3], 9),
    ([3, 5, 4], 10),
    ([4, 5, 1], 11),
    ([1, 0, 4], 12),
    ([4, 0, 3], 13),
    ([3, 0, 2], 14),
    ([2, 0, 1], 15),
];

/// One stored trixel. Corner and midpoint entries index the vertex table.
#[derive(Debug, Clone)]
pub struct QuadNode {
    pub id: u64,
    pub vertices: [usize; 3],
    /// Edge midpoints `w0, w1, w2`, present once the node has been split.
    pub midpoints: Option<[usize; 3]>,
    pub children: Option<[usize; 4]>,
    pub parent: Option<usize>,
}

/// Bookkeeping for one stored level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    pub level: u32,
    pub vertex_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub first_node: usize,
    pub first_vertex: usize,
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    level: u32,
    build_level: u32,
    layers: Vec<Layer>,
    nodes: Vec<QuadNode>,
    vertices: Vec<SpatialVector>,
}

impl SpatialIndex {
    /// Builds the tree down to `build_level`, answering queries at `level`.
    ///
    /// A `build_level` of 0 or above `level` means "store everything".
    pub fn new(level: u32, build_level: u32) -> HtmResult<Self> {
        if level > MAX_LEVEL {
            return Err(HtmError::invalid_level(level, "level must be at most 24"));
        }
        let build_level = if build_level == 0 || build_level > level {
            level
        } else {
            build_level
        };
        if build_level > MAX_BUILD_LEVEL {
            return Err(HtmError::invalid_level(
                build_level,
                "build level must be at most 7",
            ));
        }

        let mut index = Self {
            level,
            build_level,
            layers: Vec::with_capacity(build_level as usize + 1),
            nodes: Vec::new(),
            vertices: OCTAHEDRON
                .iter()
                .map(|&[x, y, z]| SpatialVector::new(x, y, z))
                .collect(),
        };

        for (corners, id) in ROOTS {
            index.nodes.push(QuadNode {
                id,
                vertices: corners,
                midpoints: None,
                children: None,
                parent: None,
            });
        }
        index.layers.push(Layer {
            level: 0,
            vertex_count: 6,
            node_count: ROOT_COUNT,
            edge_count: 12,
            first_node: 0,
            first_vertex: 0,
        });

        for _ in 0..build_level {
            index.split_last_layer();
        }

        debug!(
            "built HTM index: level {}, build level {}, {} nodes, {} vertices",
            level,
            build_level,
            index.nodes.len(),
            index.vertices.len()
        );
        Ok(index)
    }

    fn split_last_layer(&mut self) {
        let Some(&old) = self.layers.last() else {
            return;
        };
        let vertex_count = old.vertex_count + old.edge_count;
        let node_count = 4 * old.node_count;
        let layer = Layer {
            level: old.level + 1,
            vertex_count,
            node_count,
            edge_count: node_count + vertex_count - 2,
            first_node: self.nodes.len(),
            first_vertex: old.vertex_count,
        };

        // Neighbouring triangles share edges, so midpoints are shared too.
        let mut edge_midpoints: HashMap<(usize, usize), usize> =
            HashMap::with_capacity(old.edge_count);

        for parent in old.first_node..old.first_node + old.node_count {
            let [v0, v1, v2] = self.nodes[parent].vertices;
            let w0 = self.midpoint(&mut edge_midpoints, v1, v2);
            let w1 = self.midpoint(&mut edge_midpoints, v0, v2);
            let w2 = self.midpoint(&mut edge_midpoints, v0, v1);

            let base = self.nodes[parent].id << 2;
            let first_child = self.nodes.len();
            for (k, vertices) in [[v0, w2, w1], [v1, w0, w2], [v2, w1, w0], [w0, w1, w2]]
                .into_iter()
                .enumerate()
            {
                self.nodes.push(QuadNode {
                    id: base + k as u64,
                    vertices,
                    midpoints: None,
                    children: None,
                    parent: Some(parent),
                });
            }
            let node = &mut self.nodes[parent];
            node.midpoints = Some([w0, w1, w2]);
            node.children = Some([first_child, first_child + 1, first_child + 2, first_child + 3]);
        }

        self.layers.push(layer);
    }

    fn midpoint(&mut self, cache: &mut HashMap<(usize, usize), usize>, a: usize, b: usize) -> usize {
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&w) = cache.get(&key) {
            return w;
        }
        let w = (&self.vertices[a] + &self.vertices[b]).normalized();
        self.vertices.push(w);
        let idx = self.vertices.len() - 1;
        cache.insert(key, idx);
        idx
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn build_level(&self) -> u32 {
        self.build_level
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn nodes(&self) -> &[QuadNode] {
        &self.nodes
    }

    pub fn vertices(&self) -> &[SpatialVector] {
        &self.vertices
    }

    /// Number of trixels at the query level.
    pub fn leaf_count(&self) -> u64 {
        trixels_at_level(self.level)
    }

    /// Number of trixels stored in the arena's deepest layer.
    pub fn stored_leaf_count(&self) -> u64 {
        trixels_at_level(self.build_level)
    }

    pub(crate) fn corners(&self, node: &QuadNode) -> [&SpatialVector; 3] {
        node.vertices.map(|i| &self.vertices[i])
    }

    /// Internal id of the query-level trixel containing `v`.
    pub fn id_by_point(&self, v: &SpatialVector) -> u64 {
        let mut node = &self.nodes[pick_child(v, (0..ROOT_COUNT).map(|i| self.corners(&self.nodes[i])))];
        while let Some(children) = node.children {
            let k = pick_child(v, children.iter().map(|&c| self.corners(&self.nodes[c])));
            node = &self.nodes[children[k]];
        }

        let mut id = node.id;
        let [a, b, c] = self.corners(node);
        let mut tri = [a.clone(), b.clone(), c.clone()];
        for _ in self.build_level..self.level {
            let [v0, v1, v2] = &tri;
            let children = split(v0, v1, v2);
            let k = pick_child(v, children.iter().map(|[a, b, c]| [a, b, c]));
            id = (id << 2) | k as u64;
            tri = take_child(children, k);
        }
        id
    }

    /// Corners of the query-level trixel with internal id `id`.
    pub fn node_vertices(&self, id: u64) -> HtmResult<[SpatialVector; 3]> {
        let first = trixels_at_level(self.level);
        if id < first || id >= 2 * first {
            return Err(HtmError::InvalidTrixel {
                trixel: id,
                size: first,
            });
        }

        let extra = 2 * (self.level - self.build_level);
        let stored_id = id >> extra;
        let Some(last) = self.layers.last() else {
            return Err(HtmError::InvalidTrixel {
                trixel: id,
                size: first,
            });
        };
        let offset = (stored_id - self.stored_leaf_count()) as usize;
        let node = &self.nodes[last.first_node + offset];
        let [a, b, c] = self.corners(node);
        let mut corners = [a.clone(), b.clone(), c.clone()];

        for depth in (0..self.level - self.build_level).rev() {
            let k = ((id >> (2 * depth)) & 3) as usize;
            let [v0, v1, v2] = &corners;
            corners = take_child(split(v0, v1, v2), k);
        }
        Ok(corners)
    }

    /// Normalized centroid of the query-level trixel `id`.
    pub fn point_by_id(&self, id: u64) -> HtmResult<SpatialVector> {
        let [v0, v1, v2] = self.node_vertices(id)?;
        Ok((&(&v0 + &v1) + &v2).normalized())
    }
}

/// The four children of a triangle, in child-number order.
pub(crate) fn split(v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> [[SpatialVector; 3]; 4] {
    let w0 = (v1 + v2).normalized();
    let w1 = (v0 + v2).normalized();
    let w2 = (v0 + v1).normalized();
    [
        [v0.clone(), w2.clone(), w1.clone()],
        [v1.clone(), w0.clone(), w2.clone()],
        [v2.clone(), w1.clone(), w0.clone()],
        [w0, w1, w2],
    ]
}

fn take_child(children: [[SpatialVector; 3]; 4], k: usize) -> [SpatialVector; 3] {
    let [c0, c1, c2, c3] = children;
    match k {
        0 => c0,
        1 => c1,
        2 => c2,
        _ => c3,
    }
}

/// Smallest signed edge distance of `v` from triangle `(v0, v1, v2)`.
/// Non-negative (within tolerance) means inside.
fn edge_margin(v: &SpatialVector, [v0, v1, v2]: [&SpatialVector; 3]) -> f64 {
    v0.cross(v1)
        .dot(v)
        .min(v1.cross(v2).dot(v))
        .min(v2.cross(v0).dot(v))
}

/// Position of the first candidate containing `v`, falling back to the one
/// `v` is closest to being inside when rounding leaves it in none.
fn pick_child<'a, I>(v: &SpatialVector, candidates: I) -> usize
where
    I: Iterator<Item = [&'a SpatialVector; 3]>,
{
    let mut best = (0, f64::NEG_INFINITY);
    for (k, tri) in candidates.enumerate() {
        let margin = edge_margin(v, tri);
        if margin >= -GEOMETRY_EPSILON {
            return k;
        }
        if margin > best.1 {
            best = (k, margin);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_counts_follow_recurrence() {
        let index = SpatialIndex::new(3, 3).unwrap();
        let layers = index.layers();
        assert_eq!(layers.len(), 4);
        assert_eq!(layers[0].vertex_count, 6);
        assert_eq!(layers[1].vertex_count, 18);
        assert_eq!(layers[1].node_count, 32);
        assert_eq!(layers[1].edge_count, 48);
        assert_eq!(layers[3].node_count, 512);
        assert_eq!(layers[2].first_vertex, 18);
        assert_eq!(index.vertices().len(), layers[3].vertex_count);
        assert_eq!(index.nodes().len(), 8 + 32 + 128 + 512);
    }

    #[test]
    fn leaves_are_contiguous_and_ascending() {
        let index = SpatialIndex::new(2, 2).unwrap();
        let last = index.layers().last().copied().unwrap();
        let ids: Vec<u64> = index.nodes()[last.first_node..].iter().map(|n| n.id).collect();
        let expected: Vec<u64> = (128..256).collect();
        assert_eq!(ids, expected);
        assert!(index.nodes()[last.first_node..].iter().all(|n| n.children.is_none()));
    }

    #[test]
    fn parents_link_back() {
        let index = SpatialIndex::new(2, 2).unwrap();
        for (i, node) in index.nodes().iter().enumerate() {
            if let Some(children) = node.children {
                for c in children {
                    assert_eq!(index.nodes()[c].parent, Some(i));
                    assert_eq!(index.nodes()[c].id >> 2, node.id);
                }
            }
        }
    }

    #[test]
    fn build_level_is_clamped() {
        let index = SpatialIndex::new(4, 0).unwrap();
        assert_eq!(index.build_level(), 4);
        let index = SpatialIndex::new(4, 9).unwrap();
        assert_eq!(index.build_level(), 4);
        assert!(SpatialIndex::new(25, 3).is_err());
        assert!(SpatialIndex::new(10, 10).is_err());
    }

    #[test]
    fn root_lookup() {
        let index = SpatialIndex::new(0, 0).unwrap();
        // N3 covers the octant x, y, z > 0.
        assert_eq!(index.id_by_point(&SpatialVector::from_radec(45.0, 45.0)), 15);
        // S0 covers x > 0, y > 0, z < 0.
        assert_eq!(index.id_by_point(&SpatialVector::from_radec(45.0, -45.0)), 8);
        // N1 covers x < 0, y < 0, z > 0.
        assert_eq!(index.id_by_point(&SpatialVector::from_radec(225.0, 45.0)), 13);
    }

    #[test]
    fn on_the_fly_descent_matches_stored_tree() {
        let stored = SpatialIndex::new(5, 5).unwrap();
        let shallow = SpatialIndex::new(5, 2).unwrap();
        for i in 0..200 {
            let ra = (i as f64 * 37.3) % 360.0;
            let dec = ((i as f64 * 13.7) % 180.0) - 90.0;
            let v = SpatialVector::from_radec(ra, dec);
            assert_eq!(stored.id_by_point(&v), shallow.id_by_point(&v), "ra={ra} dec={dec}");
        }
    }

    #[test]
    fn point_lies_in_its_trixel() {
        let index = SpatialIndex::new(6, 3).unwrap();
        for i in 0..100 {
            let v = SpatialVector::from_radec((i as f64 * 71.1) % 360.0, ((i as f64 * 29.9) % 170.0) - 85.0);
            let id = index.id_by_point(&v);
            let [a, b, c] = index.node_vertices(id).unwrap();
            assert!(edge_margin(&v, [&a, &b, &c]) >= -1e-12);
        }
    }

    #[test]
    fn vertices_agree_between_build_levels() {
        let stored = SpatialIndex::new(4, 4).unwrap();
        let shallow = SpatialIndex::new(4, 1).unwrap();
        for id in [2048u64, 2049, 3000, 4095] {
            let a = stored.node_vertices(id).unwrap();
            let b = shallow.node_vertices(id).unwrap();
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).length() < 1e-14);
            }
        }
    }

    #[test]
    fn node_vertices_rejects_foreign_ids() {
        let index = SpatialIndex::new(2, 2).unwrap();
        assert!(index.node_vertices(127).is_err());
        assert!(index.node_vertices(256).is_err());
    }

    #[test]
    fn centroid_maps_back_to_its_trixel() {
        let index = SpatialIndex::new(5, 2).unwrap();
        for id in [8192u64, 9000, 12345, 16383] {
            let p = index.point_by_id(id).unwrap();
            assert_eq!(index.id_by_point(&p), id);
        }
    }
}
