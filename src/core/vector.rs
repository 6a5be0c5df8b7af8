//! 2D Vector
//!
//! Plain `f64` vector used for positions, per-step movements and kicks.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use serde::{Serialize, Deserialize};

/// 2D point or direction in meters.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    /// X component (along the pitch length)
    pub x: f64,
    /// Y component (along the pitch width)
    pub y: f64,
}

impl Vector {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    #[inline]
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Both components are finite (not NaN, not infinite).
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// True for the exact zero vector.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Unit vector in the same direction. Returns ZERO if length is zero.
    #[inline]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Same direction, given length. ZERO stays ZERO.
    #[inline]
    pub fn with_length(self, length: f64) -> Self {
        self.normalized() * length
    }

    /// Shorten to `max` if longer, direction preserved.
    #[inline]
    pub fn clamp_length(self, max: f64) -> Self {
        if self.length() > max {
            self.with_length(max)
        } else {
            self
        }
    }

    /// Rotate counter-clockwise by `angle` radians.
    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
        )
    }
}

impl Add for Vector {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vector {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vector {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vector {
    type Output = Self;
    #[inline]
    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl Neg for Vector {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector({:.3}, {:.3})", self.x, self.y)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_length_and_distance() {
        assert!((Vector::new(3.0, 4.0).length() - 5.0).abs() < EPS);
        let a = Vector::new(1.0, 1.0);
        let b = Vector::new(4.0, 5.0);
        assert!((a.distance(b) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vector::ZERO.normalized(), Vector::ZERO);
        assert_eq!(Vector::ZERO.with_length(3.0), Vector::ZERO);
    }

    #[test]
    fn test_clamp_length() {
        let v = Vector::new(6.0, 8.0);
        let clamped = v.clamp_length(5.0);
        assert!((clamped.length() - 5.0).abs() < EPS);
        assert!((clamped.x - 3.0).abs() < EPS);

        // Shorter vectors are untouched
        assert_eq!(Vector::new(1.0, 0.0).clamp_length(5.0), Vector::new(1.0, 0.0));
    }

    #[test]
    fn test_rotation() {
        let v = Vector::new(1.0, 0.0).rotated(FRAC_PI_2);
        assert!(v.x.abs() < EPS);
        assert!((v.y - 1.0).abs() < EPS);

        // Rotation keeps length
        let w = Vector::new(2.0, -7.0).rotated(0.3);
        assert!((w.length() - Vector::new(2.0, -7.0).length()).abs() < EPS);
    }

    #[test]
    fn test_finite_check() {
        assert!(Vector::new(1.0, 2.0).is_finite());
        assert!(!Vector::new(f64::NAN, 0.0).is_finite());
        assert!(!Vector::new(0.0, f64::INFINITY).is_finite());
    }
}
