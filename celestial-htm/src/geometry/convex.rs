//! Convex regions: intersections of spherical caps.
//!
//! A [`Convex`] is the AND of its [`Constraint`]s. Region queries build one
//! from a circle (one positive cap), a triangle or a quadrilateral (one
//! great-circle hemisphere per edge) and hand it to
//! [`SpatialIndex::intersect`](crate::SpatialIndex::intersect).
//!
//! Before a convex is evaluated against the mesh it is [simplified](Convex::simplify):
//! redundant caps are removed, empty regions are detected, and for convexes made
//! purely of great circles the polygon corners and a bounding circle are
//! computed. Each mesh triangle is then [classified](Convex::classify) as
//! [`Markup::Full`], [`Markup::Partial`] or [`Markup::Reject`].
//!
//! ```
//! use celestial_htm::{Convex, Sign, SpatialVector};
//!
//! let tri = Convex::from_triangle(
//!     &SpatialVector::from_radec(0.0, 0.0),
//!     &SpatialVector::from_radec(10.0, 0.0),
//!     &SpatialVector::from_radec(5.0, 8.0),
//! );
//! assert_eq!(tri.sign(), Sign::Zero);
//! assert!(tri.contains(&SpatialVector::from_radec(5.0, 2.0)));
//! ```

use super::constraint::{Constraint, Sign};
use super::vector::SpatialVector;
use crate::constants::GEOMETRY_EPSILON;
use std::f64::consts::PI;

/// Slack used when deciding whether a corner lies on the region boundary.
const CORNER_TOLERANCE: f64 = 1.0e-12;

/// Outcome of testing one mesh triangle against a convex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    /// Triangle lies entirely outside the region.
    Reject,
    /// Triangle straddles the boundary, or the tests could not decide.
    Partial,
    /// Triangle lies entirely inside the region.
    Full,
}

/// Relative position of two caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapRelation {
    Intersect,
    Disjoint,
    SecondInsideFirst,
    FirstInsideSecond,
}

#[derive(Debug, Clone)]
pub struct Convex {
    constraints: Vec<Constraint>,
    corners: Vec<SpatialVector>,
    bounding_circle: Option<Constraint>,
    sign: Sign,
    empty: bool,
    simplified: bool,
}

impl Default for Convex {
    fn default() -> Self {
        Self::new()
    }
}

impl Convex {
    /// An unconstrained convex, i.e. the whole sphere.
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
            corners: Vec::new(),
            bounding_circle: None,
            sign: Sign::Zero,
            empty: false,
            simplified: false,
        }
    }

    /// A single cap of `radius_deg` degrees around `center`.
    pub fn circle(center: &SpatialVector, radius_deg: f64) -> Self {
        let mut convex = Self::new();
        convex.add(Constraint::circle(center, radius_deg));
        convex
    }

    /// The spherical triangle with corners `v1`, `v2`, `v3` in either winding.
    ///
    /// Collinear corners produce no constraints.
    pub fn from_triangle(v1: &SpatialVector, v2: &SpatialVector, v3: &SpatialVector) -> Self {
        let mut convex = Self::new();
        let mut normals = [v2.cross(v3), v3.cross(v1), v1.cross(v2)];
        let det = normals[0].dot(v1);
        if det.abs() <= GEOMETRY_EPSILON {
            return convex;
        }
        for normal in &mut normals {
            if det < 0.0 {
                *normal = -&*normal;
            }
            convex
                .constraints
                .push(Constraint::great_circle(normal.clone()));
        }
        convex
    }

    /// The spherical quadrilateral spanned by four corners in any order.
    ///
    /// Edges are the corner pairs with both remaining corners strictly on the
    /// same side. If one corner lies inside the triangle of the other three
    /// only that triangle's three edges survive.
    pub fn from_quad(
        v1: &SpatialVector,
        v2: &SpatialVector,
        v3: &SpatialVector,
        v4: &SpatialVector,
    ) -> Self {
        let corners = [v1, v2, v3, v4];
        let mut pairs: Vec<(SpatialVector, [f64; 2])> = Vec::with_capacity(6);
        for i in 0..4 {
            for j in (i + 1)..4 {
                let d = corners[i].cross(corners[j]).normalized();
                let mut s = [0.0; 2];
                let others = (0..4).filter(|&l| l != i && l != j);
                for (slot, l) in s.iter_mut().zip(others) {
                    *slot = d.dot(corners[l]);
                }
                pairs.push((d, s));
            }
        }

        let mut convex = Self::new();
        for (d, s) in &pairs {
            let same_side = (s[0] > GEOMETRY_EPSILON && s[1] > GEOMETRY_EPSILON)
                || (s[0] < -GEOMETRY_EPSILON && s[1] < -GEOMETRY_EPSILON);
            if same_side {
                let normal = if s[0] > 0.0 { d.clone() } else { -d };
                convex.constraints.push(Constraint::great_circle(normal));
            }
        }

        // Three aligned corners leave only two edges: the line through them
        // shows up as a pair with one corner on it.
        if convex.constraints.len() == 2 {
            let aligned = pairs
                .iter()
                .find(|pair| pair.1.iter().any(|s| s.abs() <= GEOMETRY_EPSILON));
            if let Some((d, s)) = aligned {
                let normal = if s[0] + s[1] > 0.0 { d.clone() } else { -d };
                convex.constraints.push(Constraint::great_circle(normal));
            }
        }
        convex
    }

    /// Adds a constraint, keeping the list ordered by ascending opening angle.
    pub fn add(&mut self, constraint: Constraint) {
        let sign = constraint.sign();
        self.constraints.push(constraint);
        let mut i = self.constraints.len() - 1;
        while i > 0 && self.constraints[i].angle() < self.constraints[i - 1].angle() {
            self.constraints.swap(i, i - 1);
            i -= 1;
        }
        self.sign = if self.constraints.len() == 1 {
            sign
        } else {
            self.sign.combine(sign)
        };
        self.simplified = false;
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Polygon corners, counter-clockwise. Only populated for simplified
    /// great-circle convexes with three or more edges.
    pub fn corners(&self) -> &[SpatialVector] {
        &self.corners
    }

    pub fn bounding_circle(&self) -> Option<&Constraint> {
        self.bounding_circle.as_ref()
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// True once simplification proved the region empty.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn contains(&self, v: &SpatialVector) -> bool {
        !self.empty && self.constraints.iter().all(|c| c.contains(v))
    }

    fn mark_empty(&mut self) {
        self.constraints.clear();
        self.corners.clear();
        self.bounding_circle = None;
        self.empty = true;
    }

    /// Removes redundant constraints and precomputes what classification needs.
    ///
    /// Idempotent; adding a constraint re-arms it.
    pub fn simplify(&mut self) {
        if self.simplified {
            return;
        }
        self.simplified = true;
        self.corners.clear();
        self.bounding_circle = None;

        if self.constraints.is_empty() {
            return;
        }
        if self.sign == Sign::Zero {
            self.simplify_zero();
            return;
        }

        'scan: loop {
            for i in 0..self.constraints.len() {
                for j in 0..i {
                    let si = self.constraints[i].sign();
                    let sj = self.constraints[j].sign();
                    let relation = relate(&self.constraints[i], &self.constraints[j]);
                    let is_cap = |s: Sign| matches!(s, Sign::Positive | Sign::Zero);

                    let drop = match (si, sj) {
                        (Sign::Zero, Sign::Zero) => None,
                        (a, b) if is_cap(a) && is_cap(b) => match relation {
                            CapRelation::Intersect => None,
                            CapRelation::Disjoint => {
                                self.mark_empty();
                                return;
                            }
                            CapRelation::SecondInsideFirst => Some(i),
                            CapRelation::FirstInsideSecond => Some(j),
                        },
                        (Sign::Negative, Sign::Negative) => match relation {
                            CapRelation::Intersect | CapRelation::Disjoint => None,
                            CapRelation::SecondInsideFirst => Some(j),
                            CapRelation::FirstInsideSecond => Some(i),
                        },
                        _ => {
                            let hole_inside_cap = (si == Sign::Negative
                                && relation == CapRelation::FirstInsideSecond)
                                || (sj == Sign::Negative
                                    && relation == CapRelation::SecondInsideFirst);
                            match relation {
                                CapRelation::Intersect => None,
                                CapRelation::Disjoint if si == Sign::Negative => Some(i),
                                CapRelation::Disjoint => Some(j),
                                _ if hole_inside_cap => None,
                                _ => {
                                    self.mark_empty();
                                    return;
                                }
                            }
                        }
                    };

                    if let Some(k) = drop {
                        self.constraints.remove(k);
                        continue 'scan;
                    }
                }
            }
            break;
        }

        self.sign = self
            .constraints
            .iter()
            .skip(1)
            .fold(self.constraints[0].sign(), |acc, c| acc.combine(c.sign()));

        if self.sign == Sign::Zero {
            self.simplify_zero();
        } else if self.constraints.len() == 1 || self.sign == Sign::Positive {
            self.bounding_circle = Some(self.constraints[0].clone());
        }
    }

    fn simplify_zero(&mut self) {
        let mut unique: Vec<Constraint> = Vec::with_capacity(self.constraints.len());
        for c in self.constraints.drain(..) {
            let dir = c.direction();
            if unique.iter().any(|u| u.direction().dot(dir) <= -1.0 + CORNER_TOLERANCE) {
                self.empty = true;
            }
            if !unique
                .iter()
                .any(|u| u.direction().dot(dir) >= 1.0 - CORNER_TOLERANCE)
            {
                unique.push(c);
            }
        }
        if self.empty {
            self.mark_empty();
            return;
        }
        self.constraints = unique;

        match self.constraints.len() {
            1 => {
                self.bounding_circle = Some(self.constraints[0].clone());
                return;
            }
            2 => {
                let sum = self.constraints[0].direction() + self.constraints[1].direction();
                self.bounding_circle = Some(Constraint::great_circle(sum));
                return;
            }
            _ => {}
        }

        let n = self.constraints.len();
        let mut used = vec![false; n];
        let mut corners: Vec<SpatialVector> = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let p = self.constraints[i]
                    .direction()
                    .cross(self.constraints[j].direction())
                    .normalized();
                for candidate in [p.clone(), -&p] {
                    let inside_others = (0..n).filter(|&k| k != i && k != j).all(|k| {
                        candidate.dot(self.constraints[k].direction()) >= -CORNER_TOLERANCE
                    });
                    if !inside_others {
                        continue;
                    }
                    used[i] = true;
                    used[j] = true;
                    if !corners
                        .iter()
                        .any(|c| c.dot(&candidate) >= 1.0 - CORNER_TOLERANCE)
                    {
                        corners.push(candidate);
                    }
                }
            }
        }

        if corners.is_empty() {
            self.mark_empty();
            return;
        }

        let mut k = 0;
        self.constraints.retain(|_| {
            let keep = used[k];
            k += 1;
            keep
        });

        let center = corners
            .iter()
            .fold(SpatialVector::new(0.0, 0.0, 0.0), |acc, c| &acc + c);
        if center.length() <= GEOMETRY_EPSILON || corners.len() < 3 {
            // A lune: the corners are antipodal and there is no useful centre.
            self.corners = corners;
            return;
        }
        let center = center.normalized();
        sort_counter_clockwise(&mut corners, &center);

        let d = corners
            .iter()
            .map(|c| c.dot(&center))
            .fold(f64::INFINITY, f64::min);
        if d >= 0.0 {
            self.bounding_circle = Some(Constraint::new(center, d));
        }
        self.corners = corners;
    }

    /// Classifies the mesh triangle `(v0, v1, v2)`, wound counter-clockwise.
    ///
    /// Call [`simplify`](Self::simplify) first; an unsimplified convex is still
    /// classified soundly but rejects less.
    pub fn classify(&self, v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> Markup {
        if self.empty {
            return Markup::Reject;
        }
        if self.constraints.is_empty() {
            return Markup::Full;
        }

        let inside = [v0, v1, v2].iter().filter(|v| self.contains(v)).count();
        match inside {
            1 | 2 => Markup::Partial,
            3 => {
                if matches!(self.sign, Sign::Positive | Sign::Zero)
                    || !(self.test_hole(v0, v1, v2) || self.test_edge(v0, v1, v2))
                {
                    Markup::Full
                } else {
                    Markup::Partial
                }
            }
            _ => self.classify_outside(v0, v1, v2),
        }
    }

    /// No triangle corner is inside the region.
    fn classify_outside(&self, v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> Markup {
        if !self.test_bounding_circle(v0, v1, v2) {
            return Markup::Reject;
        }

        let capped = matches!(self.sign, Sign::Positive | Sign::Mixed)
            || (self.sign == Sign::Zero && self.constraints.len() <= 2);

        if capped {
            let definite = matches!(self.sign, Sign::Positive | Sign::Zero);
            if self.test_edge_constraint(v0, v1, v2, 0) {
                if let Some(k) = self.test_other_positive_none(v0, v1, v2) {
                    if test_vector_inside(v0, v1, v2, self.constraints[k].direction())
                        || self.constraints[k].contains(v0)
                    {
                        return Markup::Partial;
                    }
                    return Markup::Reject;
                }
                return Markup::Partial;
            }
            if definite && !test_vector_inside(v0, v1, v2, self.constraints[0].direction()) {
                return Markup::Reject;
            }
            return Markup::Partial;
        }

        if self.sign == Sign::Zero {
            if self.corners.len() < 3 {
                return Markup::Partial;
            }
            if self.test_edge_zero(v0, v1, v2) {
                return Markup::Partial;
            }
            return Markup::Reject;
        }

        Markup::Partial
    }

    /// A negative constraint whose hole centre lies inside the triangle.
    fn test_hole(&self, v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> bool {
        self.constraints
            .iter()
            .filter(|c| c.sign() == Sign::Negative)
            .any(|c| {
                let a = c.direction();
                v0.cross(v1).dot(a) <= 0.0 && v1.cross(v2).dot(a) <= 0.0 && v2.cross(v0).dot(a) <= 0.0
            })
    }

    /// A negative constraint crossing any triangle edge.
    fn test_edge(&self, v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> bool {
        (0..self.constraints.len())
            .filter(|&i| self.constraints[i].sign() == Sign::Negative)
            .any(|i| self.test_edge_constraint(v0, v1, v2, i))
    }

    fn test_edge_constraint(
        &self,
        v0: &SpatialVector,
        v1: &SpatialVector,
        v2: &SpatialVector,
        index: usize,
    ) -> bool {
        let c = &self.constraints[index];
        edge_crosses(v0, v1, c) || edge_crosses(v1, v2, c) || edge_crosses(v2, v0, c)
    }

    /// Index of another positive constraint (after the smallest) that misses every edge.
    fn test_other_positive_none(
        &self,
        v0: &SpatialVector,
        v1: &SpatialVector,
        v2: &SpatialVector,
    ) -> Option<usize> {
        (1..self.constraints.len())
            .take_while(|&i| self.constraints[i].sign() == Sign::Positive)
            .find(|&i| !self.test_edge_constraint(v0, v1, v2, i))
    }

    fn test_bounding_circle(&self, v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> bool {
        let normal = (v1 - v0).cross(&(v2 - v1)).normalized();
        let radius = safe_acos(normal.dot(v0));
        let separated = |cap: &Constraint| {
            let cos = normal.dot(cap.direction());
            let phi = if cos < -1.0 + GEOMETRY_EPSILON {
                PI
            } else {
                safe_acos(cos)
            };
            phi > radius + cap.angle()
        };

        if self.sign == Sign::Zero {
            return match &self.bounding_circle {
                Some(bc) => !separated(bc),
                None => true,
            };
        }
        !self.constraints.iter().any(separated)
    }

    /// A polygon side crosses a triangle edge, or the polygon sits inside the triangle.
    fn test_edge_zero(&self, v0: &SpatialVector, v1: &SpatialVector, v2: &SpatialVector) -> bool {
        let edges = [(v0, v1), (v1, v2), (v2, v0)];
        let n = self.corners.len();
        for i in 0..n {
            let ci = &self.corners[i];
            let cj = &self.corners[(i + 1) % n];
            let side_len = safe_acos(ci.dot(cj));
            let side_normal = ci.cross(cj);

            for (e1, e2) in edges {
                let edge_len = safe_acos(e1.dot(e2));
                let hit = e1.cross(e2).cross(&side_normal).normalized();
                for p in [hit.clone(), -&hit] {
                    let on_side = safe_acos(ci.dot(&p)) - side_len <= GEOMETRY_EPSILON
                        && safe_acos(cj.dot(&p)) - side_len <= GEOMETRY_EPSILON;
                    let on_edge = safe_acos(e1.dot(&p)) - edge_len <= GEOMETRY_EPSILON
                        && safe_acos(e2.dot(&p)) - edge_len <= GEOMETRY_EPSILON;
                    if on_side && on_edge {
                        return true;
                    }
                }
            }
        }
        test_vector_inside(v0, v1, v2, &self.corners[0])
    }
}

fn safe_acos(x: f64) -> f64 {
    libm::acos(x.clamp(-1.0, 1.0))
}

/// Compares two caps, seeing negative constraints through their holes.
fn relate(first: &Constraint, second: &Constraint) -> CapRelation {
    let facing = |c: &Constraint| {
        if c.sign() == Sign::Negative {
            -c.direction()
        } else {
            c.direction().clone()
        }
    };
    let radius = |c: &Constraint| {
        if c.sign() == Sign::Positive {
            c.angle()
        } else {
            PI - c.angle()
        }
    };

    let cos = facing(first).dot(&facing(second));
    let phi = if cos <= -1.0 + GEOMETRY_EPSILON {
        PI
    } else {
        safe_acos(cos)
    };
    let (a1, a2) = (radius(first), radius(second));

    if phi > a1 + a2 {
        CapRelation::Disjoint
    } else if a1 > phi + a2 {
        CapRelation::SecondInsideFirst
    } else if a2 > phi + a1 {
        CapRelation::FirstInsideSecond
    } else {
        CapRelation::Intersect
    }
}

/// True if `v` lies inside the counter-clockwise triangle `(v0, v1, v2)`.
pub(crate) fn test_vector_inside(
    v0: &SpatialVector,
    v1: &SpatialVector,
    v2: &SpatialVector,
    v: &SpatialVector,
) -> bool {
    v0.cross(v1).dot(v) >= 0.0 && v1.cross(v2).dot(v) >= 0.0 && v2.cross(v0).dot(v) >= 0.0
}

/// Does the cap boundary cross the great-circle arc from `v1` to `v2`?
///
/// Parametrises the arc and solves the resulting quadratic, accepting any
/// root in `[0, 1]`.
fn edge_crosses(v1: &SpatialVector, v2: &SpatialVector, cap: &Constraint) -> bool {
    let gamma1 = v1.dot(cap.direction());
    let gamma2 = v2.dot(cap.direction());
    let mu = v1.dot(v2);
    if 1.0 + mu <= GEOMETRY_EPSILON {
        return true;
    }
    let u2 = (1.0 - mu) / (1.0 + mu);
    let d = cap.distance();

    let a = -u2 * (gamma1 + d);
    let b = gamma1 * (u2 - 1.0) + gamma2 * (u2 + 1.0);
    let c = gamma1 - d;

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return false;
    }

    let q = -0.5 * (b + b.signum() * libm::sqrt(disc));
    let in_unit = |r: f64| (0.0..=1.0).contains(&r);

    (a.abs() > GEOMETRY_EPSILON && in_unit(q / a)) || (q.abs() > GEOMETRY_EPSILON && in_unit(c / q))
}

fn sort_counter_clockwise(corners: &mut [SpatialVector], center: &SpatialVector) {
    let first = &corners[0];
    let e1 = (first - &(center * center.dot(first))).normalized();
    let e2 = center.cross(&e1);
    let angle = |p: &SpatialVector| libm::atan2(p.dot(&e2), p.dot(&e1));
    corners.sort_by(|a, b| angle(a).total_cmp(&angle(b)));
}
