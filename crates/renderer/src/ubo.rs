//! Uniform and push-constant layouts shared with the GLSL shaders.
//!
//! `#[repr(C)]` with std140-compatible ordering: matrices and `vec4`s first,
//! scalars padded out to 16 bytes.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Must match `MAX_LIGHTS` in the shaders.
pub const MAX_LIGHTS: usize = 10;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    /// `w` is unused.
    pub position: Vec4,
    /// `w` is intensity.
    pub color: Vec4,
}

/// Per-frame global data bound at set 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    /// `w` is intensity.
    pub ambient_light_color: Vec4,
    pub point_lights: [PointLight; MAX_LIGHTS],
    pub num_lights: u32,
    pub _padding: [u32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light_color: Vec4::new(1.0, 1.0, 1.0, 0.02),
            point_lights: [PointLight::default(); MAX_LIGHTS],
            num_lights: 0,
            _padding: [0; 3],
        }
    }
}

/// Push constants for [`MeshRenderSystem`](crate::systems::MeshRenderSystem).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub model_matrix: Mat4,
    /// Upper 3x3 is the normal matrix.
    pub normal_matrix: Mat4,
}

/// Push constants for [`PointLightSystem`](crate::systems::PointLightSystem).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    pub position: Vec4,
    pub color: Vec4,
    pub radius: f32,
    pub _padding: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_global_ubo_layout() {
        assert_eq!(offset_of!(GlobalUbo, view), 64);
        assert_eq!(offset_of!(GlobalUbo, inverse_view), 128);
        assert_eq!(offset_of!(GlobalUbo, ambient_light_color), 192);
        assert_eq!(offset_of!(GlobalUbo, point_lights), 208);
        assert_eq!(offset_of!(GlobalUbo, num_lights), 208 + 32 * MAX_LIGHTS);
        assert_eq!(size_of::<GlobalUbo>() % 16, 0);
    }

    #[test]
    fn test_push_constant_sizes_fit_minimum_limit() {
        assert_eq!(size_of::<MeshPushConstants>(), 128);
        assert!(size_of::<PointLightPushConstants>() <= 128);
        assert_eq!(size_of::<PointLightPushConstants>() % 16, 0);
    }

    #[test]
    fn test_default_ambient() {
        let ubo = GlobalUbo::default();
        assert_eq!(ubo.ambient_light_color.w, 0.02);
        assert_eq!(ubo.num_lights, 0);
    }
}
