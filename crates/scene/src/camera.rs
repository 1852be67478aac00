//! View and projection matrices.
//!
//! Right-handed world space with +Y up and the camera looking down -Z.
//! Projections target Vulkan clip space: depth in `[0, 1]` and Y flipped.

use glam::{Mat4, Vec3};

/// Camera holding a projection, a view matrix and its inverse.
#[derive(Clone, Debug)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

fn flip_y(mut projection: Mat4) -> Mat4 {
    projection.y_axis.y *= -1.0;
    projection
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = flip_y(Mat4::orthographic_rh(left, right, bottom, top, near, far));
    }

    /// # Panics
    ///
    /// Panics if `aspect` is zero.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        assert!(
            aspect.abs() > f32::EPSILON,
            "perspective aspect ratio must be non-zero"
        );
        self.projection = flip_y(Mat4::perspective_rh(fov_y, aspect, near, far));
    }

    /// Looks from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        self.view = Mat4::look_to_rh(position, direction.normalize(), up);
        self.inverse_view = self.view.inverse();
    }

    /// Looks from `position` towards `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View of an object at `position` with YXZ Euler `rotation`.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        self.inverse_view = Mat4::from_translation(position)
            * Mat4::from_rotation_y(rotation.y)
            * Mat4::from_rotation_x(rotation.x)
            * Mat4::from_rotation_z(rotation.z);
        self.view = self.inverse_view.inverse();
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_view_target_moves_target_onto_negative_z() {
        let mut camera = Camera::new();
        let position = Vec3::new(-1.0, -2.0, 2.0);
        let target = Vec3::new(0.0, 0.0, 2.5);
        camera.set_view_target(position, target, Vec3::Y);

        let in_view = camera.view().transform_point3(target);
        assert!(in_view.x.abs() < EPSILON && in_view.y.abs() < EPSILON);
        assert!(in_view.z < 0.0);
        assert!((camera.position() - position).length() < EPSILON);
    }

    #[test]
    fn test_view_yxz_matches_inverse() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.2, 1.1, 0.0));
        let product = camera.view() * camera.inverse_view();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert!((camera.position() - Vec3::new(1.0, 2.0, 3.0)).length() < EPSILON);
    }

    #[test]
    fn test_view_yxz_identity_looks_down_negative_z() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::ZERO, Vec3::ZERO);
        let mut direction_camera = Camera::new();
        direction_camera.set_view_direction(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        assert!(camera.view().abs_diff_eq(direction_camera.view(), EPSILON));
    }

    #[test]
    fn test_perspective_depth_range_and_y_flip() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(50f32.to_radians(), 800.0 / 600.0, 0.1, 10.0);

        let near = camera.projection() * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = camera.projection() * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert!((near.z / near.w).abs() < EPSILON);
        assert!((far.z / far.w - 1.0).abs() < EPSILON);

        let above = camera.projection() * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(above.y / above.w < 0.0);
    }

    #[test]
    #[should_panic(expected = "aspect ratio must be non-zero")]
    fn test_zero_aspect_panics() {
        Camera::new().set_perspective_projection(1.0, 0.0, 0.1, 10.0);
    }
}
