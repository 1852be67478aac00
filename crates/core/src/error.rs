//! Error types shared across the workspace.

use thiserror::Error;

/// Top-level error type.
///
/// Lower layers carry their own richer errors (`RhiError`, `ResourceError`);
/// they are folded into this one where a crate boundary only needs a message.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected configuration value.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
