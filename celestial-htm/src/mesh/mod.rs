//! The mesh façade: RA/Dec in, dense trixel ids out.
//!
//! [`HtMesh`] wraps a [`SpatialIndex`] with the operations a sky renderer or
//! catalog loader needs:
//!
//! | Operation | Region |
//! |-----------|--------|
//! | [`index`](HtMesh::index) | the single trixel containing a point |
//! | [`intersect_circle`](HtMesh::intersect_circle) | a cap of given radius |
//! | [`intersect_point`](HtMesh::intersect_point) | a tiny cap around a point |
//! | [`intersect_line`](HtMesh::intersect_line) | a thin triangle along a great-circle segment |
//! | [`intersect_triangle`](HtMesh::intersect_triangle) | a spherical triangle |
//! | [`intersect_quad`](HtMesh::intersect_quad) | a spherical quadrilateral |
//! | [`intersect_polyline`](HtMesh::intersect_polyline) | the union of a chain of segments |
//! | [`intersect_polygon`](HtMesh::intersect_polygon) | a polygon fanned into quads and triangles |
//!
//! Region results go into one of several [`ResultBuffer`]s addressed by
//! [`BufferId`], so a caller can keep e.g. the field of view in buffer 0
//! while indexing constellation lines through buffer 1.
//!
//! # Degenerate input
//!
//! Two vertices whose `|Δra| + |Δdec|` is below 1e-6 degrees are the same
//! vertex. A quadrilateral with such a pair becomes the triangle on the other
//! three corners, a triangle with such a pair becomes a line, and a line
//! shorter than a tenth of a trixel edge becomes a point query.
//!
//! ```
//! use celestial_htm::{BufferId, HtMesh};
//!
//! let mut mesh = HtMesh::new(4, 4, 2).unwrap();
//! let fov = BufferId::new(0);
//! mesh.intersect_circle(83.6, -5.4, 2.0, fov).unwrap();
//! let center = mesh.index(83.6, -5.4);
//! assert!(mesh.buffer(fov).unwrap().as_slice().contains(&center));
//! ```

mod buffer;

pub use buffer::{BufferId, ResultBuffer, Trixel};

use crate::config::MeshConfig;
use crate::constants::{trixels_at_level, DEG_TO_RAD, GEOMETRY_EPSILON, VERTEX_EPSILON_DEG};
use crate::errors::{HtmError, HtmResult};
use crate::geometry::{Convex, SpatialVector};
use crate::index::{name, SpatialIndex};
use crate::range::HtmRange;
use log::{debug, warn};

/// Converts between the index's internal ids and the dense ids callers see.
///
/// Internal ids at level `L` start at `8·4^L`; public ids start at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    magic: u64,
}

impl Translation {
    pub fn new(level: u32) -> Self {
        Self {
            magic: trixels_at_level(level),
        }
    }

    /// Number of public ids, which equals the first internal id.
    pub fn size(self) -> u64 {
        self.magic
    }

    pub fn to_public(self, internal: u64) -> Trixel {
        internal - self.magic
    }

    pub fn to_internal(self, trixel: Trixel) -> HtmResult<u64> {
        if trixel >= self.magic {
            return Err(HtmError::InvalidTrixel {
                trixel,
                size: self.magic,
            });
        }
        Ok(trixel + self.magic)
    }
}

pub struct HtMesh {
    index: SpatialIndex,
    translation: Translation,
    buffers: Vec<ResultBuffer>,
    scratch: HtmRange,
    /// Approximate trixel edge length in degrees.
    edge: f64,
    /// A tenth of the edge, in degrees: the point-query radius and line width.
    edge10: f64,
}

impl HtMesh {
    /// Builds a mesh answering queries at `level`, storing the tree down to
    /// `build_level`, with `num_buffers` result buffers sized to the whole mesh.
    pub fn new(level: u32, build_level: u32, num_buffers: usize) -> HtmResult<Self> {
        Self::from_config(&MeshConfig::new(level, build_level, num_buffers))
    }

    pub fn from_config(config: &MeshConfig) -> HtmResult<Self> {
        config.validate()?;
        let index = SpatialIndex::new(config.level, config.effective_build_level())?;
        let translation = Translation::new(config.level);
        let capacity = config
            .buffer_capacity
            .unwrap_or_else(|| usize::try_from(translation.size()).unwrap_or(usize::MAX));
        let edge = 90.0 / f64::from(1u32 << config.level.min(31));

        debug!(
            "mesh ready: {} trixels, {} buffers of {} slots, edge {:.4}°",
            translation.size(),
            config.buffers,
            capacity,
            edge
        );

        Ok(Self {
            index,
            translation,
            buffers: (0..config.buffers).map(|_| ResultBuffer::new(capacity)).collect(),
            scratch: HtmRange::new(),
            edge,
            edge10: edge / 10.0,
        })
    }

    pub fn level(&self) -> u32 {
        self.index.level()
    }

    pub fn build_level(&self) -> u32 {
        self.index.build_level()
    }

    /// Number of trixels, `8·4^level`.
    pub fn size(&self) -> u64 {
        self.translation.size()
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Approximate trixel edge length in degrees.
    pub fn edge(&self) -> f64 {
        self.edge
    }

    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn translation(&self) -> Translation {
        self.translation
    }

    /// The trixel containing (`ra`, `dec`), in degrees.
    pub fn index(&self, ra: f64, dec: f64) -> Trixel {
        self.index_vector(&SpatialVector::from_radec(ra, dec))
    }

    pub fn index_vector(&self, v: &SpatialVector) -> Trixel {
        self.translation.to_public(self.index.id_by_point(v))
    }

    /// Corners of `trixel` as (ra, dec) pairs in degrees.
    pub fn vertices(&self, trixel: Trixel) -> HtmResult<[(f64, f64); 3]> {
        let corners = self.index.node_vertices(self.translation.to_internal(trixel)?)?;
        Ok(corners.map(|v| v.radec()))
    }

    /// Centre of `trixel` as (ra, dec) in degrees.
    pub fn center(&self, trixel: Trixel) -> HtmResult<(f64, f64)> {
        let p = self.index.point_by_id(self.translation.to_internal(trixel)?)?;
        Ok(p.radec())
    }

    /// HTM name of `trixel`, e.g. `N3120`.
    pub fn trixel_name(&self, trixel: Trixel) -> HtmResult<String> {
        name::name_by_id(self.translation.to_internal(trixel)?)
    }

    /// Parses an HTM name of this mesh's level.
    pub fn trixel_by_name(&self, trixel_name: &str) -> HtmResult<Trixel> {
        let id = name::id_by_name(trixel_name)?;
        let first = self.translation.size();
        if id < first || id >= 2 * first {
            return Err(HtmError::InvalidName(trixel_name.to_string()));
        }
        Ok(self.translation.to_public(id))
    }

    pub fn buffer(&self, buf: BufferId) -> HtmResult<&ResultBuffer> {
        self.buffers.get(buf.index()).ok_or(HtmError::InvalidBuffer {
            buffer: buf.index(),
            count: self.buffers.len(),
        })
    }

    /// Number of trixels stored by the last query into `buf`.
    pub fn intersect_size(&self, buf: BufferId) -> HtmResult<usize> {
        Ok(self.buffer(buf)?.len())
    }

    /// Every trixel overlapping the circle of `radius` degrees around (`ra`, `dec`).
    ///
    /// For `radius` above 90° the cap is concave and undecided trixels are kept,
    /// so the result can include trixels lying entirely outside the circle, up
    /// to about a trixel edge beyond it. No overlapping trixel is ever missed.
    pub fn intersect_circle(&mut self, ra: f64, dec: f64, radius: f64, buf: BufferId) -> HtmResult<()> {
        self.buffer(buf)?;
        let convex = Convex::circle(&SpatialVector::from_radec(ra, dec), radius);
        self.run(vec![convex], buf)
    }

    /// Trixels within a tenth of a trixel edge of (`ra`, `dec`).
    pub fn intersect_point(&mut self, ra: f64, dec: f64, buf: BufferId) -> HtmResult<()> {
        self.intersect_circle(ra, dec, self.edge10, buf)
    }

    /// Trixels along the great-circle segment between the two points.
    pub fn intersect_line(&mut self, ra1: f64, dec1: f64, ra2: f64, dec2: f64, buf: BufferId) -> HtmResult<()> {
        self.buffer(buf)?;
        let convex = self.line_convex((ra1, dec1), (ra2, dec2));
        self.run(vec![convex], buf)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn intersect_triangle(
        &mut self,
        ra1: f64,
        dec1: f64,
        ra2: f64,
        dec2: f64,
        ra3: f64,
        dec3: f64,
        buf: BufferId,
    ) -> HtmResult<()> {
        self.buffer(buf)?;
        let convex = self.triangle_convex((ra1, dec1), (ra2, dec2), (ra3, dec3));
        self.run(vec![convex], buf)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn intersect_quad(
        &mut self,
        ra1: f64,
        dec1: f64,
        ra2: f64,
        dec2: f64,
        ra3: f64,
        dec3: f64,
        ra4: f64,
        dec4: f64,
        buf: BufferId,
    ) -> HtmResult<()> {
        self.buffer(buf)?;
        let convex = self.quad_convex((ra1, dec1), (ra2, dec2), (ra3, dec3), (ra4, dec4));
        self.run(vec![convex], buf)
    }

    /// Union of the line queries between consecutive `points`.
    ///
    /// A single point is a point query; no points clears the buffer.
    pub fn intersect_polyline(&mut self, points: &[(f64, f64)], buf: BufferId) -> HtmResult<()> {
        self.buffer(buf)?;
        let convexes = match points {
            [] => Vec::new(),
            [p] => vec![self.point_convex(*p)],
            _ => points
                .windows(2)
                .map(|w| self.line_convex(w[0], w[1]))
                .collect(),
        };
        self.run(convexes, buf)
    }

    /// Union of quads (and a closing triangle) fanned out from the first vertex.
    ///
    /// Fewer than three points clears the buffer.
    pub fn intersect_polygon(&mut self, points: &[(f64, f64)], buf: BufferId) -> HtmResult<()> {
        self.buffer(buf)?;
        let mut convexes = Vec::new();
        if let Some((&start, rest)) = points.split_first() {
            let mut p = 0;
            while p + 1 < rest.len() {
                if p + 2 < rest.len() {
                    convexes.push(self.quad_convex(start, rest[p], rest[p + 1], rest[p + 2]));
                } else {
                    convexes.push(self.triangle_convex(start, rest[p], rest[p + 1]));
                }
                p += 2;
            }
        }
        self.run(convexes, buf)
    }

    fn point_convex(&self, (ra, dec): (f64, f64)) -> Convex {
        Convex::circle(&SpatialVector::from_radec(ra, dec), self.edge10)
    }

    fn line_convex(&self, p1: (f64, f64), p2: (f64, f64)) -> Convex {
        let v1 = SpatialVector::from_radec(p1.0, p1.1);
        let v2 = SpatialVector::from_radec(p2.0, p2.1);
        let d = &v1 - &v2;
        let l1 = d.x().abs() + d.y().abs() + d.z().abs();
        if coincident(p1, p2) || l1 < self.edge10 * DEG_TO_RAD {
            return self.point_convex(p1);
        }

        let apex = self.thin_apex(&v1, &v2);
        let convex = Convex::from_triangle(&v1, &v2, &apex);
        if convex.constraints().is_empty() {
            return self.point_convex(p1);
        }
        convex
    }

    /// Third corner of the sliver triangle standing in for segment `v1`–`v2`.
    fn thin_apex(&self, v1: &SpatialVector, v2: &SpatialVector) -> SpatialVector {
        let mut mid = v1 + v2;
        if mid.length() <= GEOMETRY_EPSILON {
            mid = perpendicular(v1);
        }
        mid.normalize();
        let mut normal = v1.cross(v2);
        if normal.length() <= GEOMETRY_EPSILON {
            normal = v1.cross(&mid);
        }
        let offset = &normal * (self.edge10 * DEG_TO_RAD / normal.length());
        (&mid + &offset).normalized()
    }

    fn triangle_convex(&self, p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)) -> Convex {
        if coincident(p1, p2) {
            return self.line_convex(p1, p3);
        }
        if coincident(p2, p3) || coincident(p3, p1) {
            return self.line_convex(p1, p2);
        }

        let vs = [p1, p2, p3].map(|(ra, dec)| SpatialVector::from_radec(ra, dec));
        let convex = Convex::from_triangle(&vs[0], &vs[1], &vs[2]);
        if convex.constraints().is_empty() {
            // Three distinct points on one great circle.
            let (a, b) = farthest_pair(&[p1, p2, p3], &vs);
            return self.line_convex(a, b);
        }
        convex
    }

    fn quad_convex(&self, p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), p4: (f64, f64)) -> Convex {
        if coincident(p1, p2) {
            return self.triangle_convex(p1, p3, p4);
        }
        if coincident(p2, p3) {
            return self.triangle_convex(p1, p2, p4);
        }
        if coincident(p3, p4) {
            return self.triangle_convex(p1, p2, p3);
        }
        if coincident(p4, p1) {
            return self.triangle_convex(p1, p2, p3);
        }

        let vs = [p1, p2, p3, p4].map(|(ra, dec)| SpatialVector::from_radec(ra, dec));
        let convex = Convex::from_quad(&vs[0], &vs[1], &vs[2], &vs[3]);
        if convex.constraints().len() < 3 {
            let (a, b) = farthest_pair(&[p1, p2, p3, p4], &vs);
            return self.line_convex(a, b);
        }
        convex
    }

    /// Evaluates `convexes` as one union and stores the result in `buf`.
    fn run(&mut self, convexes: Vec<Convex>, buf: BufferId) -> HtmResult<()> {
        self.scratch.clear();
        for mut convex in convexes {
            self.index.intersect(&mut convex, &mut self.scratch);
        }

        let translation = self.translation;
        let count = self.buffers.len();
        let buffer = self
            .buffers
            .get_mut(buf.index())
            .ok_or(HtmError::InvalidBuffer {
                buffer: buf.index(),
                count,
            })?;
        buffer.reset();
        for id in self.scratch.iter() {
            buffer.push(translation.to_public(id));
        }

        if buffer.overflow() > 0 {
            let requested = buffer.len() + buffer.overflow();
            warn!(
                "{} overflowed: kept {} of {} trixels",
                buf,
                buffer.len(),
                requested
            );
            return Err(HtmError::BufferOverflow {
                buffer: buf.index(),
                requested,
                dropped: buffer.overflow(),
            });
        }
        Ok(())
    }
}

fn coincident(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() + (a.1 - b.1).abs() < VERTEX_EPSILON_DEG
}

/// Some unit vector orthogonal to `v`.
fn perpendicular(v: &SpatialVector) -> SpatialVector {
    let axis = if v.x().abs() < 0.9 {
        SpatialVector::new(1.0, 0.0, 0.0)
    } else {
        SpatialVector::new(0.0, 1.0, 0.0)
    };
    v.cross(&axis).normalized()
}

fn farthest_pair(points: &[(f64, f64)], vs: &[SpatialVector]) -> ((f64, f64), (f64, f64)) {
    let mut best = (0, 1, f64::INFINITY);
    for i in 0..vs.len() {
        for j in (i + 1)..vs.len() {
            let dot = vs[i].dot(&vs[j]);
            if dot < best.2 {
                best = (i, j, dot);
            }
        }
    }
    (points[best.0], points[best.1])
}

#[cfg(test)]
mod tests {
    use super::*;

    const B0: BufferId = BufferId::new(0);
    const B1: BufferId = BufferId::new(1);

    fn sorted(mesh: &HtMesh, buf: BufferId) -> Vec<Trixel> {
        let mut v = mesh.buffer(buf).unwrap().as_slice().to_vec();
        v.sort_unstable();
        v
    }

    #[test]
    fn translation_round_trip() {
        let t = Translation::new(2);
        assert_eq!(t.size(), 128);
        assert_eq!(t.to_public(128), 0);
        assert_eq!(t.to_internal(127).unwrap(), 255);
        assert!(t.to_internal(128).is_err());
    }

    #[test]
    fn mesh_shape() {
        let mesh = HtMesh::new(3, 2, 3).unwrap();
        assert_eq!(mesh.size(), 512);
        assert_eq!(mesh.level(), 3);
        assert_eq!(mesh.build_level(), 2);
        assert_eq!(mesh.num_buffers(), 3);
        assert!((mesh.edge() - 11.25).abs() < 1e-12);
    }

    #[test]
    fn index_is_deterministic_and_in_range() {
        let mesh = HtMesh::new(5, 3, 1).unwrap();
        for i in 0..50 {
            let ra = i as f64 * 7.2;
            let dec = (i as f64 * 3.3) % 180.0 - 90.0;
            let t = mesh.index(ra, dec);
            assert!(t < mesh.size());
            assert_eq!(t, mesh.index(ra, dec));
        }
    }

    #[test]
    fn invalid_buffer_is_rejected() {
        let mut mesh = HtMesh::new(3, 3, 1).unwrap();
        let err = mesh.intersect_circle(0.0, 0.0, 1.0, B1).unwrap_err();
        assert!(matches!(err, HtmError::InvalidBuffer { buffer: 1, count: 1 }));
        assert!(mesh.intersect_size(B1).is_err());
    }

    #[test]
    fn buffers_are_independent() {
        let mut mesh = HtMesh::new(4, 4, 2).unwrap();
        mesh.intersect_circle(10.0, 10.0, 3.0, B0).unwrap();
        let first = sorted(&mesh, B0);
        mesh.intersect_circle(200.0, -40.0, 3.0, B1).unwrap();
        assert_eq!(sorted(&mesh, B0), first);
        assert_ne!(sorted(&mesh, B1), first);
    }

    #[test]
    fn degenerate_triangle_matches_line() {
        let mut mesh = HtMesh::new(5, 3, 2).unwrap();
        mesh.intersect_triangle(10.0, 20.0, 10.0, 20.0, 25.0, 30.0, B0).unwrap();
        mesh.intersect_line(10.0, 20.0, 25.0, 30.0, B1).unwrap();
        assert_eq!(sorted(&mesh, B0), sorted(&mesh, B1));
        assert!(mesh.intersect_size(B0).unwrap() > 0);
    }

    #[test]
    fn degenerate_quad_matches_triangle() {
        let mut mesh = HtMesh::new(4, 4, 2).unwrap();
        mesh.intersect_quad(0.0, 0.0, 20.0, 0.0, 20.0, 0.0, 10.0, 15.0, B0).unwrap();
        mesh.intersect_triangle(0.0, 0.0, 20.0, 0.0, 10.0, 15.0, B1).unwrap();
        assert_eq!(sorted(&mesh, B0), sorted(&mesh, B1));
    }

    #[test]
    fn short_line_is_point_query() {
        let mut mesh = HtMesh::new(4, 4, 2).unwrap();
        mesh.intersect_line(50.0, 50.0, 50.0, 50.0 + 1e-4, B0).unwrap();
        mesh.intersect_point(50.0, 50.0, B1).unwrap();
        assert_eq!(sorted(&mesh, B0), sorted(&mesh, B1));
        assert!(sorted(&mesh, B1).contains(&mesh.index(50.0, 50.0)));
    }

    #[test]
    fn line_covers_its_endpoints() {
        let mut mesh = HtMesh::new(5, 3, 1).unwrap();
        mesh.intersect_line(100.0, -10.0, 130.0, 15.0, B0).unwrap();
        let got = sorted(&mesh, B0);
        assert!(got.contains(&mesh.index(100.0, -10.0)));
        assert!(got.contains(&mesh.index(130.0, 15.0)));
    }

    #[test]
    fn antipodal_line_does_not_panic() {
        let mut mesh = HtMesh::new(3, 3, 1).unwrap();
        mesh.intersect_line(0.0, 0.0, 180.0, 0.0, B0).unwrap();
        assert!(mesh.intersect_size(B0).unwrap() > 0);
    }

    #[test]
    fn collinear_triangle_becomes_line() {
        let mut mesh = HtMesh::new(4, 4, 2).unwrap();
        mesh.intersect_triangle(0.0, 0.0, 10.0, 0.0, 20.0, 0.0, B0).unwrap();
        mesh.intersect_line(0.0, 0.0, 20.0, 0.0, B1).unwrap();
        assert_eq!(sorted(&mesh, B0), sorted(&mesh, B1));
    }

    #[test]
    fn overflow_is_soft() {
        let config = MeshConfig::new(4, 4, 1).with_buffer_capacity(5);
        let mut mesh = HtMesh::from_config(&config).unwrap();
        let err = mesh.intersect_circle(0.0, 0.0, 20.0, B0).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(mesh.intersect_size(B0).unwrap(), 5);
        assert!(mesh.buffer(B0).unwrap().overflow() > 0);
        // The mesh stays usable.
        mesh.intersect_circle(33.3, 21.7, 0.01, B0).unwrap();
    }

    #[test]
    fn polyline_is_union_of_segments() {
        let mut mesh = HtMesh::new(4, 4, 2).unwrap();
        let pts = [(10.0, 10.0), (20.0, 12.0), (25.0, 25.0)];
        mesh.intersect_polyline(&pts, B0).unwrap();
        let union = sorted(&mesh, B0);

        let mut expected = Vec::new();
        for w in pts.windows(2) {
            mesh.intersect_line(w[0].0, w[0].1, w[1].0, w[1].1, B1).unwrap();
            expected.extend(sorted(&mesh, B1));
        }
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(union, expected);
    }

    #[test]
    fn polygon_covers_quad() {
        let mut mesh = HtMesh::new(4, 4, 2).unwrap();
        let pts = [(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)];
        mesh.intersect_polygon(&pts, B0).unwrap();
        mesh.intersect_quad(0.0, 0.0, 20.0, 0.0, 20.0, 20.0, 0.0, 20.0, B1).unwrap();
        assert_eq!(sorted(&mesh, B0), sorted(&mesh, B1));
        mesh.intersect_polygon(&pts[..2], B0).unwrap();
        assert_eq!(mesh.intersect_size(B0).unwrap(), 0);
    }

    #[test]
    fn names_round_trip() {
        let mesh = HtMesh::new(3, 3, 1).unwrap();
        let t = mesh.index(45.0, 45.0);
        let name = mesh.trixel_name(t).unwrap();
        assert!(name.starts_with("N3"));
        assert_eq!(name.len(), 5);
        assert_eq!(mesh.trixel_by_name(&name).unwrap(), t);
        assert!(mesh.trixel_by_name("N3").is_err());
    }

    #[test]
    fn vertices_surround_center() {
        let mesh = HtMesh::new(4, 2, 1).unwrap();
        let t = mesh.index(300.0, -60.0);
        let (ra, dec) = mesh.center(t).unwrap();
        assert_eq!(mesh.index(ra, dec), t);
        let corners = mesh.vertices(t).unwrap();
        for (cra, cdec) in corners {
            let sep = SpatialVector::from_radec(cra, cdec).separation(&SpatialVector::from_radec(ra, dec));
            assert!(sep < mesh.edge() * 1.5);
        }
        assert!(mesh.vertices(mesh.size()).is_err());
    }
}
