//! Numeric constants shared by the mesh geometry and the catalog format.

pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Tolerance for sign classification and point-in-triangle tests.
pub const GEOMETRY_EPSILON: f64 = 1.0e-15;

/// Vertices closer than this (|Δra| + |Δdec|, degrees) are treated as one.
pub const VERTEX_EPSILON_DEG: f64 = 1.0e-6;

/// Deepest mesh level whose internal ids still fit in a `u64`
/// with room for the subtree shifts used during traversal.
pub const MAX_LEVEL: u32 = 24;

/// Deepest level the quad-tree arena is allowed to materialize.
pub const MAX_BUILD_LEVEL: u32 = 7;

/// Number of root trixels (S0..S3, N0..N3).
pub const ROOT_COUNT: usize = 8;

/// Internal id of the first root trixel (`S0`).
pub const FIRST_ROOT_ID: u64 = 8;

/// Total trixels at `level`, which is also the first internal id of that level.
#[inline]
pub const fn trixels_at_level(level: u32) -> u64 {
    8u64 << (2 * level)
}
