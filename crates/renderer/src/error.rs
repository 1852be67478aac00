//! Renderer error type.

use ash::vk;
use starlight_resources::ResourceError;
use starlight_rhi::RhiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Platform(#[from] starlight_core::Error),

    /// A rebuilt swapchain picked different color or depth formats, which
    /// would invalidate every pipeline built against the render pass.
    #[error("Swapchain image or depth format has changed ({old_color:?}/{old_depth:?} -> {new_color:?}/{new_depth:?})")]
    SwapchainFormatChanged {
        old_color: vk::Format,
        old_depth: vk::Format,
        new_color: vk::Format,
        new_depth: vk::Format,
    },
}

pub type RendererResult<T> = Result<T, RendererError>;
