//! Keyboard and mouse input.
//!
//! [`InputTracker`] is fed window events by the event loop. Once per frame it
//! produces an [`InputState`], an immutable snapshot handed to update code
//! such as the movement controller.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Input as it was at the start of a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    mouse_position: (f32, f32),
    mouse_delta: (f32, f32),
    scroll_delta: (f32, f32),
}

impl InputState {
    /// Snapshot with nothing pressed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot with exactly `keys` held down.
    pub fn with_keys(keys: impl IntoIterator<Item = KeyCode>) -> Self {
        Self {
            pressed_keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True only in the first snapshot after the key went down.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> (f32, f32) {
        self.scroll_delta
    }
}

/// Accumulates window events between snapshots.
#[derive(Debug, Default)]
pub struct InputTracker {
    current: InputState,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the tracked state from a window event. Returns whether the
    /// event was an input event.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                match state {
                    ElementState::Pressed if !repeat => self.key_pressed(*code),
                    ElementState::Pressed => {}
                    ElementState::Released => self.key_released(*code),
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(*button) {
                    match state {
                        ElementState::Pressed => self.current.pressed_buttons.insert(button),
                        ElementState::Released => self.current.pressed_buttons.remove(&button),
                    };
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse_moved(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (x, y) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (*x, *y),
                    MouseScrollDelta::PixelDelta(pos) => (pos.x as f32, pos.y as f32),
                };
                self.current.scroll_delta.0 += x;
                self.current.scroll_delta.1 += y;
                true
            }
            WindowEvent::Focused(false) => {
                self.current.pressed_keys.clear();
                self.current.pressed_buttons.clear();
                true
            }
            _ => false,
        }
    }

    pub fn key_pressed(&mut self, key: KeyCode) {
        if self.current.pressed_keys.insert(key) {
            self.current.just_pressed_keys.insert(key);
        }
    }

    pub fn key_released(&mut self, key: KeyCode) {
        self.current.pressed_keys.remove(&key);
    }

    pub fn mouse_moved(&mut self, x: f32, y: f32) {
        let (old_x, old_y) = self.current.mouse_position;
        self.current.mouse_position = (x, y);
        self.current.mouse_delta.0 += x - old_x;
        self.current.mouse_delta.1 += y - old_y;
    }

    /// Returns the state accumulated since the previous snapshot and clears
    /// the per-frame parts (just-pressed keys, deltas).
    pub fn snapshot(&mut self) -> InputState {
        let snapshot = self.current.clone();
        self.current.just_pressed_keys.clear();
        self.current.mouse_delta = (0.0, 0.0);
        self.current.scroll_delta = (0.0, 0.0);
        snapshot
    }
}
