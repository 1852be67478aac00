//! The swapchain-facing half of frame orchestration.
//!
//! [`Renderer`](crate::Renderer) only sequences calls; everything that talks
//! to the driver sits behind [`FrameBackend`], so the frame state machine can
//! be driven without a GPU.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use starlight_platform::Window;
use starlight_rhi::command::{CommandBuffer, full_scissor, full_viewport};
use starlight_rhi::device::Device;
use starlight_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use starlight_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::error::{RendererError, RendererResult};

/// Swapchain, command buffers and window state as seen by the renderer.
pub trait FrameBackend {
    /// Waits for the current frame slot, then acquires a presentable image.
    fn acquire_next_image(&mut self) -> RendererResult<AcquireOutcome>;

    /// Command buffer owned by `frame_index`.
    fn command_buffer(&self, frame_index: usize) -> vk::CommandBuffer;

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> RendererResult<()>;

    fn end_commands(&self, cmd: vk::CommandBuffer) -> RendererResult<()>;

    /// Submits `cmd` for `image_index` and presents.
    fn submit(&mut self, cmd: vk::CommandBuffer, image_index: u32)
    -> RendererResult<PresentOutcome>;

    /// Begins the swapchain render pass on `image_index`'s framebuffer and
    /// sets a full-extent viewport and scissor.
    fn begin_render_pass(&self, cmd: vk::CommandBuffer, image_index: u32);

    fn end_render_pass(&self, cmd: vk::CommandBuffer);

    /// Returns and clears the window's resize flag.
    fn take_resized(&self) -> bool;

    /// Rebuilds the swapchain for the current drawable extent.
    ///
    /// Returns `Ok(false)` without touching anything while the extent is
    /// zero.
    fn recreate_swapchain(&mut self) -> RendererResult<bool>;

    fn aspect_ratio(&self) -> f32;
}

/// [`FrameBackend`] over a real swapchain.
pub struct VulkanBackend {
    device: Arc<Device>,
    window: Arc<Window>,
    swapchain: Option<Swapchain>,
    command_buffers: Vec<vk::CommandBuffer>,
    clear_color: [f32; 4],
    vsync: bool,
}

impl VulkanBackend {
    /// Builds the initial swapchain and one command buffer per frame slot.
    pub fn new(
        device: Arc<Device>,
        window: Arc<Window>,
        clear_color: [f32; 4],
        vsync: bool,
    ) -> RendererResult<Self> {
        let mut backend = Self {
            device,
            window,
            swapchain: None,
            command_buffers: Vec::new(),
            clear_color,
            vsync,
        };

        let extent = backend.window.drawable_extent();
        let swapchain = Swapchain::new(backend.device.clone(), extent, vsync)?;
        backend.swapchain = Some(swapchain);
        backend.reallocate_command_buffers()?;

        Ok(backend)
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// The current swapchain.
    ///
    /// # Panics
    ///
    /// Panics if called while a recreation is in progress.
    pub fn swapchain(&self) -> &Swapchain {
        self.swapchain
            .as_ref()
            .expect("swapchain is only absent during recreation")
    }

    fn swapchain_mut(&mut self) -> &mut Swapchain {
        self.swapchain
            .as_mut()
            .expect("swapchain is only absent during recreation")
    }

    /// Wraps a raw handle for recording.
    pub fn wrap(&self, cmd: vk::CommandBuffer) -> CommandBuffer {
        CommandBuffer::from_handle(self.device.clone(), cmd)
    }

    fn reallocate_command_buffers(&mut self) -> RendererResult<()> {
        if self.command_buffers.len() == MAX_FRAMES_IN_FLIGHT {
            return Ok(());
        }

        if !self.command_buffers.is_empty() {
            self.device.free_command_buffers(&self.command_buffers);
        }
        self.command_buffers = self
            .device
            .allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        debug!(
            "Allocated {} command buffers",
            self.command_buffers.len()
        );
        Ok(())
    }
}

impl FrameBackend for VulkanBackend {
    fn acquire_next_image(&mut self) -> RendererResult<AcquireOutcome> {
        Ok(self.swapchain_mut().acquire_next_image()?)
    }

    fn command_buffer(&self, frame_index: usize) -> vk::CommandBuffer {
        self.command_buffers[frame_index]
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> RendererResult<()> {
        Ok(self.wrap(cmd).begin()?)
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> RendererResult<()> {
        Ok(self.wrap(cmd).end()?)
    }

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> RendererResult<PresentOutcome> {
        Ok(self
            .swapchain_mut()
            .submit_command_buffers(&[cmd], image_index)?)
    }

    fn begin_render_pass(&self, cmd: vk::CommandBuffer, image_index: u32) {
        let swapchain = self.swapchain();
        let extent = swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let recorder = self.wrap(cmd);
        recorder.begin_render_pass(
            swapchain.render_pass(),
            swapchain.framebuffer(image_index),
            full_scissor(extent),
            &clear_values,
        );
        recorder.set_viewport(&full_viewport(extent));
        recorder.set_scissor(&full_scissor(extent));
    }

    fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.wrap(cmd).end_render_pass();
    }

    fn take_resized(&self) -> bool {
        self.window.take_resized()
    }

    fn recreate_swapchain(&mut self) -> RendererResult<bool> {
        let extent = self.window.drawable_extent();
        if extent.width == 0 || extent.height == 0 {
            debug!("Drawable extent is zero, deferring swapchain recreation");
            return Ok(false);
        }

        self.device.wait_idle()?;

        let previous = self.swapchain.take();
        let previous_formats = previous.as_ref().map(Swapchain::formats);
        let swapchain = Swapchain::with_previous(self.device.clone(), extent, previous, self.vsync)?;

        let new = swapchain.formats();
        self.swapchain = Some(swapchain);
        self.reallocate_command_buffers()?;

        if let Some(old) = previous_formats
            && !self.swapchain().compare_swap_formats(&old)
        {
            return Err(RendererError::SwapchainFormatChanged {
                old_color: old.image_format,
                old_depth: old.depth_format,
                new_color: new.image_format,
                new_depth: new.depth_format,
            });
        }

        let swapchain = self.swapchain();
        info!(
            "Swapchain recreated: {}x{}, {} images",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );
        Ok(true)
    }

    fn aspect_ratio(&self) -> f32 {
        self.swapchain().extent_aspect_ratio()
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if !self.command_buffers.is_empty() {
            self.device.free_command_buffers(&self.command_buffers);
        }
    }
}
