//! Math utilities and types
//!
//! Provides the fundamental math types used by the collision cache. Poses are
//! rigid: a translation and a unit quaternion, no scale.

use std::ops::Mul;

pub use nalgebra::{
    Vector3,
    Matrix3,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Rigid transform: rotation followed by translation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Create a transform with only rotation
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Default::default()
        }
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Point3) -> Point3 {
        Point3::from(self.rotation * point.coords + self.position)
    }

    /// Apply this transform to a vector (rotation only)
    pub fn transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// Rotation as a 3x3 matrix
    pub fn rotation_matrix(&self) -> Mat3 {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transform, such that `t.inverse() * t` is the identity
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: -(inv_rotation * self.position),
            rotation: inv_rotation,
        }
    }
}

impl Mul for Transform {
    type Output = Self;

    /// Compose two transforms: `(a * b).transform_point(p) == a.transform_point(b.transform_point(p))`
    fn mul(self, rhs: Self) -> Self {
        Self {
            position: self.rotation * rhs.position + self.position,
            rotation: self.rotation * rhs.rotation,
        }
    }
}

/// Component-wise absolute value of a matrix, used to project box extents
pub fn abs_matrix(m: &Mat3) -> Mat3 {
    m.map(f32::abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_compose_applies_right_hand_side_first() {
        let parent = Transform::from_position_rotation(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2),
        );
        let child = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));

        let composed = parent * child;
        let point = composed.transform_point(&Point3::origin());

        assert_relative_eq!(point.coords, Vec3::new(1.0, 1.0, 0.0), epsilon = EPSILON);
    }

    #[test]
    fn test_inverse_round_trip() {
        let transform = Transform::from_position_rotation(
            Vec3::new(3.0, -2.0, 0.5),
            Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
        );
        let identity = transform.inverse() * transform;

        assert_relative_eq!(identity.position, Vec3::zeros(), epsilon = EPSILON);
        assert_relative_eq!(identity.rotation, Quat::identity(), epsilon = EPSILON);
    }
}
