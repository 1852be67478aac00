//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a thin RAII layer over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Buffer and image allocation through `gpu-allocator`
//! - Swapchain, render pass and frame synchronization
//! - Command buffer recording
//! - Descriptor sets, shaders and graphics pipelines

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
