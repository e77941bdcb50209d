//! Planar rotations and poses.

use std::ops::Mul;

use glam::Vec2;

/// A rotation stored as a unit complex number (cos, sin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub cos: f32,
    pub sin: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rotation {
    pub const IDENTITY: Self = Self { cos: 1.0, sin: 0.0 };

    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { cos, sin }
    }

    /// Angle in radians, in `(-PI, PI]`.
    #[inline]
    pub fn angle(&self) -> f32 {
        self.sin.atan2(self.cos)
    }

    #[inline]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    #[inline]
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }

    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            cos: self.cos,
            sin: -self.sin,
        }
    }

    /// Advance the rotation by `delta` radians and renormalize.
    ///
    /// Uses the first-order update `q + dq * i * q`, which keeps the result on the
    /// unit circle after normalization without calling trig functions.
    #[inline]
    pub fn integrate(&self, delta: f32) -> Self {
        let cos = self.cos - delta * self.sin;
        let sin = self.sin + delta * self.cos;
        let mag = (cos * cos + sin * sin).sqrt();
        if mag > 0.0 {
            Self {
                cos: cos / mag,
                sin: sin / mag,
            }
        } else {
            Self::IDENTITY
        }
    }
}

impl Mul for Rotation {
    type Output = Rotation;

    #[inline]
    fn mul(self, rhs: Rotation) -> Rotation {
        Rotation {
            cos: self.cos * rhs.cos - self.sin * rhs.sin,
            sin: self.sin * rhs.cos + self.cos * rhs.sin,
        }
    }
}

/// Rigid pose: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform2d {
    pub position: Vec2,
    pub rotation: Rotation,
}

impl Transform2d {
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: Rotation::IDENTITY,
    };

    #[inline]
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            position,
            rotation: Rotation::from_angle(angle),
        }
    }

    #[inline]
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            rotation: Rotation::IDENTITY,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        self.rotation.rotate(p) + self.position
    }

    #[inline]
    pub fn inv_transform_point(&self, p: Vec2) -> Vec2 {
        self.rotation.inv_rotate(p - self.position)
    }

    #[inline]
    pub fn transform_vector(&self, v: Vec2) -> Vec2 {
        self.rotation.rotate(v)
    }

    #[inline]
    pub fn inv_transform_vector(&self, v: Vec2) -> Vec2 {
        self.rotation.inv_rotate(v)
    }
}
