//! Frame orchestration and rendering on top of `starlight-rhi`.
//!
//! - [`Renderer`] sequences begin/end frame and swapchain recreation over a
//!   [`FrameBackend`]
//! - [`drawable`] holds GPU geometry uploaded through staging buffers
//! - [`systems`] record draws into the swapchain render pass
//! - [`RenderContext`] brings up instance, surface and device for a window

pub mod backend;
pub mod context;
pub mod drawable;
mod error;
pub mod frame;
pub mod renderer;
pub mod systems;
pub mod ubo;

pub use backend::{FrameBackend, VulkanBackend};
pub use context::RenderContext;
pub use drawable::{Drawable, Ellipsoids, Model, PointCloud};
pub use error::{RendererError, RendererResult};
pub use frame::FrameInfo;
pub use renderer::Renderer;
pub use starlight_rhi::sync::MAX_FRAMES_IN_FLIGHT;
pub use systems::{EllipsoidSystem, MeshRenderSystem, PointCloudSystem, PointLightSystem};
pub use ubo::{GlobalUbo, MAX_LIGHTS, MeshPushConstants, PointLight, PointLightPushConstants};
