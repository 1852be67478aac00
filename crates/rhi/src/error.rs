//! RHI error types.
//!
//! Everything here is fatal from the renderer's point of view. The
//! recoverable swapchain conditions (out-of-date, suboptimal) are reported
//! through [`AcquireOutcome`](crate::swapchain::AcquireOutcome) and
//! [`PresentOutcome`](crate::swapchain::PresentOutcome) instead.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type matches both the resource requirements and the
    /// requested property flags.
    #[error("No memory type for bits {type_bits:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("None of the candidate formats {0:?} is supported")]
    UnsupportedFormat(Vec<vk::Format>),

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Buffer is not mapped")]
    BufferNotMapped,

    #[error("Buffer is already mapped")]
    BufferAlreadyMapped,

    #[error("Buffer memory is not host visible")]
    BufferNotHostVisible,

    #[error("{len} bytes at offset {offset} exceed buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("Command pool lock poisoned")]
    CommandPoolPoisoned,
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
