//! Unit vectors on the celestial sphere.
//!
//! Every corner, midpoint and constraint direction in the mesh is a
//! [`SpatialVector`]. Positions come in as RA/Dec degrees, are converted to
//! Cartesian once, and all subsequent math (dot products for containment,
//! cross products for great-circle normals) is done in Cartesian form.
//!
//! RA/Dec are only recomputed when somebody asks for them, and the result is
//! remembered, so a vector that is never displayed never pays for `atan2`.
//!
//! ```
//! use celestial_htm::SpatialVector;
//!
//! let v = SpatialVector::from_radec(90.0, 0.0);
//! assert!((v.y() - 1.0).abs() < 1e-15);
//! assert!((v.ra() - 90.0).abs() < 1e-12);
//! ```

use crate::constants::{DEG_TO_RAD, RAD_TO_DEG};
use std::cell::OnceCell;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A 3D direction with a lazily cached RA/Dec.
///
/// Equality compares the Cartesian components only; the cache is ignored.
#[derive(Clone, Default)]
pub struct SpatialVector {
    x: f64,
    y: f64,
    z: f64,
    radec: OnceCell<(f64, f64)>,
}

impl SpatialVector {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            radec: OnceCell::new(),
        }
    }

    /// Unit vector pointing at (`ra`, `dec`), both in degrees.
    pub fn from_radec(ra: f64, dec: f64) -> Self {
        let (sin_ra, cos_ra) = libm::sincos(ra * DEG_TO_RAD);
        let (sin_dec, cos_dec) = libm::sincos(dec * DEG_TO_RAD);
        let v = Self::new(cos_ra * cos_dec, sin_ra * cos_dec, sin_dec);
        let _ = v.radec.set((normalize_ra(ra), dec));
        v
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.z
    }

    #[inline]
    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[inline]
    pub fn length(&self) -> f64 {
        libm::sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    /// Scales the vector to unit length in place. A zero vector is left alone.
    pub fn normalize(&mut self) {
        let len = self.length();
        if len > 0.0 {
            self.x /= len;
            self.y /= len;
            self.z /= len;
        }
        self.radec = OnceCell::new();
    }

    pub fn normalized(&self) -> Self {
        let mut v = Self::new(self.x, self.y, self.z);
        v.normalize();
        v
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Right ascension in degrees, `[0, 360)`.
    pub fn ra(&self) -> f64 {
        self.radec().0
    }

    /// Declination in degrees, `[-90, 90]`.
    pub fn dec(&self) -> f64 {
        self.radec().1
    }

    pub fn radec(&self) -> (f64, f64) {
        *self.radec.get_or_init(|| {
            let rho = libm::sqrt(self.x * self.x + self.y * self.y);
            let dec = libm::atan2(self.z, rho) * RAD_TO_DEG;
            let ra = if rho == 0.0 {
                0.0
            } else {
                normalize_ra(libm::atan2(self.y, self.x) * RAD_TO_DEG)
            };
            (ra, dec)
        })
    }

    /// Angular distance to `other` in degrees.
    pub fn separation(&self, other: &Self) -> f64 {
        let c = self.cross(other).length();
        libm::atan2(c, self.dot(other)) * RAD_TO_DEG
    }
}

fn normalize_ra(ra: f64) -> f64 {
    let r = ra % 360.0;
    if r < 0.0 {
        r + 360.0
    } else {
        r
    }
}

impl PartialEq for SpatialVector {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }
}

impl fmt::Debug for SpatialVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialVector")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("z", &self.z)
            .finish()
    }
}

impl fmt::Display for SpatialVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.12}, {:.12}, {:.12})", self.x, self.y, self.z)
    }
}

impl Add for &SpatialVector {
    type Output = SpatialVector;

    fn add(self, rhs: Self) -> SpatialVector {
        SpatialVector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for &SpatialVector {
    type Output = SpatialVector;

    fn sub(self, rhs: Self) -> SpatialVector {
        SpatialVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for &SpatialVector {
    type Output = SpatialVector;

    fn mul(self, rhs: f64) -> SpatialVector {
        SpatialVector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for &SpatialVector {
    type Output = SpatialVector;

    fn neg(self) -> SpatialVector {
        SpatialVector::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for SpatialVector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SpatialVector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [x, y, z] = <[f64; 3]>::deserialize(deserializer)?;
        Ok(Self::new(x, y, z))
    }
}
