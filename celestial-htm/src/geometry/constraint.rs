//! Half-space caps on the unit sphere.
//!
//! A [`Constraint`] is the set of unit vectors `v` with `direction · v >= distance`.
//! Geometrically that is a spherical cap centred on `direction` with opening
//! angle `acos(distance)`:
//!
//! | distance | opening angle | [`Sign`] |
//! |----------|---------------|----------|
//! | `> 0` | `< 90°` | [`Positive`](Sign::Positive) (a small cap) |
//! | `= 0` | `= 90°` | [`Zero`](Sign::Zero) (a hemisphere, bounded by a great circle) |
//! | `< 0` | `> 90°` | [`Negative`](Sign::Negative) (the sky minus a small hole) |
//!
//! Triangles and quadrilaterals are built from [`Zero`](Sign::Zero) constraints
//! (one great circle per edge), circles from a single [`Positive`](Sign::Positive) one.

use super::vector::SpatialVector;
use crate::constants::{DEG_TO_RAD, GEOMETRY_EPSILON};
use std::fmt;

/// Classification of a constraint, or of a whole convex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sign {
    Negative,
    Zero,
    Positive,
    /// Only meaningful for a convex holding both positive and negative constraints.
    Mixed,
}

impl Sign {
    fn of_distance(distance: f64) -> Self {
        if distance < -GEOMETRY_EPSILON {
            Sign::Negative
        } else if distance > GEOMETRY_EPSILON {
            Sign::Positive
        } else {
            Sign::Zero
        }
    }

    /// Sign of a convex after adding a constraint of sign `other`.
    pub(crate) fn combine(self, other: Sign) -> Sign {
        match (self, other) {
            (Sign::Negative, Sign::Positive) | (Sign::Positive, Sign::Negative) => Sign::Mixed,
            (Sign::Zero, s) => s,
            (s, _) => s,
        }
    }
}

/// A spherical cap: `direction · v >= distance`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    direction: SpatialVector,
    distance: f64,
    angle: f64,
    sign: Sign,
}

impl Constraint {
    /// Builds a cap around `direction` (normalized here) at plane distance `distance`.
    pub fn new(direction: SpatialVector, distance: f64) -> Self {
        let direction = direction.normalized();
        let distance = distance.clamp(-1.0, 1.0);
        Self {
            direction,
            distance,
            angle: libm::acos(distance),
            sign: Sign::of_distance(distance),
        }
    }

    /// A circle of `radius_deg` degrees around `center`.
    pub fn circle(center: &SpatialVector, radius_deg: f64) -> Self {
        Self::new(center.clone(), libm::cos(radius_deg * DEG_TO_RAD))
    }

    /// The hemisphere on the positive side of the great circle with pole `normal`.
    pub fn great_circle(normal: SpatialVector) -> Self {
        Self::new(normal, 0.0)
    }

    pub fn direction(&self) -> &SpatialVector {
        &self.direction
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Opening angle in radians.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn contains(&self, v: &SpatialVector) -> bool {
        let dot = self.direction.dot(v);
        match self.sign {
            Sign::Negative => dot > self.distance,
            _ => dot >= self.distance,
        }
    }

    /// Same cap seen from the other side: the excluded hole of a negative
    /// constraint as a positive cap.
    pub fn complement(&self) -> Self {
        Self::new(-&self.direction, -self.distance)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.12}", self.direction, self.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sign_classification() {
        let v = SpatialVector::new(0.0, 0.0, 1.0);
        assert_eq!(Constraint::new(v.clone(), 0.5).sign(), Sign::Positive);
        assert_eq!(Constraint::new(v.clone(), -0.5).sign(), Sign::Negative);
        assert_eq!(Constraint::new(v.clone(), 0.0).sign(), Sign::Zero);
        assert_eq!(Constraint::new(v, 1e-16).sign(), Sign::Zero);
    }

    #[test]
    fn direction_is_normalized() {
        let c = Constraint::new(SpatialVector::new(0.0, 0.0, 5.0), 0.0);
        assert_abs_diff_eq!(c.direction().length(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn circle_contains_center_and_edge() {
        let center = SpatialVector::from_radec(10.0, 20.0);
        let c = Constraint::circle(&center, 5.0);
        assert_eq!(c.sign(), Sign::Positive);
        assert!(c.contains(&center));
        assert!(c.contains(&SpatialVector::from_radec(10.0, 24.9)));
        assert!(!c.contains(&SpatialVector::from_radec(10.0, 25.1)));
        assert_abs_diff_eq!(c.angle(), 5.0 * DEG_TO_RAD, epsilon = 1e-12);
    }

    #[test]
    fn hemisphere_boundary_is_inside() {
        let c = Constraint::great_circle(SpatialVector::new(0.0, 0.0, 1.0));
        assert!(c.contains(&SpatialVector::from_radec(45.0, 0.0)));
        assert!(!c.contains(&SpatialVector::from_radec(45.0, -0.001)));
    }

    #[test]
    fn negative_boundary_is_outside() {
        let c = Constraint::new(SpatialVector::new(1.0, 0.0, 0.0), -0.5);
        assert!(!c.contains(&SpatialVector::new(-0.5, libm::sqrt(0.75), 0.0)));
        assert!(c.contains(&SpatialVector::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn complement_flips_cap() {
        let c = Constraint::new(SpatialVector::new(1.0, 0.0, 0.0), -0.5);
        let hole = c.complement();
        assert_eq!(hole.sign(), Sign::Positive);
        assert_abs_diff_eq!(hole.distance(), 0.5);
        assert_abs_diff_eq!(hole.direction().x(), -1.0);
    }

    #[test]
    fn sign_combination() {
        assert_eq!(Sign::Zero.combine(Sign::Positive), Sign::Positive);
        assert_eq!(Sign::Positive.combine(Sign::Negative), Sign::Mixed);
        assert_eq!(Sign::Negative.combine(Sign::Zero), Sign::Negative);
        assert_eq!(Sign::Mixed.combine(Sign::Zero), Sign::Mixed);
    }
}
