//! Spherical geometry: vectors, caps and convex regions.

pub mod constraint;
pub mod convex;
pub mod vector;

pub use constraint::{Constraint, Sign};
pub use convex::{Convex, Markup};
pub use vector::SpatialVector;
