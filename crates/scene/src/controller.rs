//! Keyboard fly-camera controller.

use glam::Vec3;
use starlight_platform::{InputState, KeyCode};

use crate::transform::TransformComponent;

/// Pitch limit in radians (about 85 degrees).
pub const MAX_PITCH: f32 = 1.5;

/// Keys driving [`KeyboardMovementController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub look_left: KeyCode,
    pub look_right: KeyCode,
    pub look_up: KeyCode,
    pub look_down: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::KeyE,
            move_down: KeyCode::KeyQ,
            look_left: KeyCode::ArrowLeft,
            look_right: KeyCode::ArrowRight,
            look_up: KeyCode::ArrowUp,
            look_down: KeyCode::ArrowDown,
        }
    }
}

/// Moves a transform in the XZ plane from an input snapshot.
#[derive(Clone, Copy, Debug)]
pub struct KeyboardMovementController {
    pub keys: KeyMappings,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per second.
    pub look_speed: f32,
}

impl Default for KeyboardMovementController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

fn axis(input: &InputState, positive: KeyCode, negative: KeyCode) -> f32 {
    let mut value = 0.0;
    if input.is_key_pressed(positive) {
        value += 1.0;
    }
    if input.is_key_pressed(negative) {
        value -= 1.0;
    }
    value
}

impl KeyboardMovementController {
    pub fn new(move_speed: f32, look_speed: f32) -> Self {
        Self {
            move_speed,
            look_speed,
            ..Default::default()
        }
    }

    /// Applies one frame of look and movement input to `transform`.
    ///
    /// Pitch is clamped to `±MAX_PITCH` and yaw wrapped into `[0, 2π)`.
    pub fn move_in_plane_xz(&self, input: &InputState, dt: f32, transform: &mut TransformComponent) {
        let keys = &self.keys;

        let rotate = Vec3::new(
            axis(input, keys.look_up, keys.look_down),
            axis(input, keys.look_left, keys.look_right),
            0.0,
        );
        if rotate.length_squared() > f32::EPSILON {
            transform.rotation += self.look_speed * dt * rotate.normalize();
        }

        transform.rotation.x = transform.rotation.x.clamp(-MAX_PITCH, MAX_PITCH);
        transform.rotation.y = transform.rotation.y.rem_euclid(std::f32::consts::TAU);

        let forward = transform.forward_xz();
        let right = transform.right_xz();

        let movement = forward * axis(input, keys.move_forward, keys.move_backward)
            + right * axis(input, keys.move_right, keys.move_left)
            + Vec3::Y * axis(input, keys.move_up, keys.move_down);
        if movement.length_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * movement.normalize();
        }
    }
}
