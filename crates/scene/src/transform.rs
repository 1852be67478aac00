//! Transform component for game objects.
//!
//! Rotation is stored as Tait-Bryan angles applied in Y (yaw), X (pitch),
//! Z (roll) order, which is what the movement controller edits directly.
//!
//! # Example
//!
//! ```
//! use starlight_scene::TransformComponent;
//! use glam::Vec3;
//!
//! let transform = TransformComponent {
//!     translation: Vec3::new(0.0, 0.0, 2.5),
//!     scale: Vec3::splat(0.5),
//!     ..Default::default()
//! };
//!
//! let world = transform.mat4().transform_point3(Vec3::new(1.0, 0.0, 0.0));
//! assert!((world - Vec3::new(0.5, 0.0, 2.5)).length() < 1e-6);
//! ```

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Translation, scale and YXZ Euler rotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformComponent {
    pub translation: Vec3,
    pub scale: Vec3,
    /// Radians around X, Y and Z; applied as Y, then X, then Z.
    pub rotation: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl TransformComponent {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Rotation as a quaternion (`Ry * Rx * Rz`).
    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z)
    }

    /// Model matrix: `translate * Ry * Rx * Rz * scale`.
    pub fn mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.translation)
    }

    /// Matrix for transforming normals: `R * S^-1`.
    ///
    /// A zero scale component maps to zero instead of infinity.
    pub fn normal_matrix(&self) -> Mat3 {
        let inverse_scale = Vec3::select(
            self.scale.cmpeq(Vec3::ZERO),
            Vec3::ZERO,
            self.scale.recip(),
        );
        Mat3::from_quat(self.rotation_quat()) * Mat3::from_diagonal(inverse_scale)
    }

    /// Forward direction with yaw only (the XZ plane).
    pub fn forward_xz(&self) -> Vec3 {
        let yaw = self.rotation.y;
        Vec3::new(-yaw.sin(), 0.0, -yaw.cos())
    }

    /// Right direction with yaw only (the XZ plane).
    pub fn right_xz(&self) -> Vec3 {
        let forward = self.forward_xz();
        Vec3::new(-forward.z, 0.0, forward.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < EPSILON
    }

    #[test]
    fn test_identity() {
        let transform = TransformComponent::default();
        assert!(transform.mat4().abs_diff_eq(Mat4::IDENTITY, EPSILON));
        assert!(transform.normal_matrix().abs_diff_eq(Mat3::IDENTITY, EPSILON));
    }

    #[test]
    fn test_translation_and_scale() {
        let transform = TransformComponent {
            translation: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::new(2.0, 2.0, 2.0),
            ..Default::default()
        };
        let point = transform.mat4().transform_point3(Vec3::new(1.0, 1.0, 1.0));
        assert!(approx_eq(point, Vec3::new(3.0, 4.0, 5.0)));
    }

    #[test]
    fn test_yaw_rotates_forward() {
        let transform = TransformComponent {
            rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
            ..Default::default()
        };
        let forward = transform.mat4().transform_vector3(Vec3::NEG_Z);
        assert!(approx_eq(forward, Vec3::new(-1.0, 0.0, 0.0)));
        assert!(approx_eq(forward, transform.forward_xz()));
        assert!(approx_eq(transform.right_xz(), Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_rotation_order_is_yxz() {
        let transform = TransformComponent {
            rotation: Vec3::new(0.3, 0.7, -0.2),
            ..Default::default()
        };
        let expected = Mat4::from_rotation_y(0.7)
            * Mat4::from_rotation_x(0.3)
            * Mat4::from_rotation_z(-0.2);
        assert!(transform.mat4().abs_diff_eq(expected, EPSILON));
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let transform = TransformComponent {
            scale: Vec3::new(2.0, 1.0, 0.5),
            rotation: Vec3::new(0.1, 0.4, 0.0),
            ..Default::default()
        };
        let expected = Mat3::from_mat4(transform.mat4()).inverse().transpose();
        assert!(transform.normal_matrix().abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn test_zero_scale_normal_matrix_is_finite() {
        let transform = TransformComponent {
            scale: Vec3::new(0.0, 1.0, 1.0),
            ..Default::default()
        };
        assert!(transform.normal_matrix().is_finite());
    }
}
