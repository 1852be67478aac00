//! Platform layer: window, Vulkan surface and input.
//!
//! - [`Window`] exposes the drawable extent, surface creation and the resize
//!   flag polled by the renderer
//! - [`InputTracker`] collects winit events into per-frame [`InputState`]
//!   snapshots

mod input;
mod window;

pub use input::{InputState, InputTracker, KeyCode, MouseButton};
pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
