//! Shared foundations for the Starlight workspace.
//!
//! - [`Error`] and [`Result`] used at crate boundaries
//! - [`init_logging`] for the `tracing` subscriber
//! - [`FrameTimer`] for per-frame delta time
//! - [`RendererConfig`] describing window, swapchain and splat options

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{RendererConfig, SplatFilter};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::FrameTimer;
