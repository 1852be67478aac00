//! Swapchain and everything sized by it.
//!
//! A [`Swapchain`] owns the presentable images and their views, the render
//! pass that targets them, one depth image and framebuffer per swapchain
//! image, and the per-slot synchronization objects. These are created in
//! that order and rebuilt together: a resize replaces the whole
//! [`Swapchain`], handing the old one to [`Swapchain::with_previous`] so the
//! driver can recycle its images.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use starlight_rhi::device::Device;
//! use starlight_rhi::swapchain::{AcquireOutcome, Swapchain};
//!
//! # fn example(device: Arc<Device>, cmd: vk::CommandBuffer) -> Result<(), starlight_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(device, vk::Extent2D { width: 800, height: 600 }, false)?;
//! if let AcquireOutcome::Acquired { image_index, .. } = swapchain.acquire_next_image()? {
//!     // ... record `cmd` against swapchain.framebuffer(image_index) ...
//!     let _outcome = swapchain.submit_command_buffers(&[cmd], image_index)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::Image;
use crate::sync::{Fence, FrameSync, InFlightFrames, MAX_FRAMES_IN_FLIGHT};

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Color and depth formats of a swapchain; a rebuilt swapchain must match
/// them or every pipeline built against the render pass becomes invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainFormats {
    pub image_format: vk::Format,
    pub depth_format: vk::Format,
}

/// Result of [`Swapchain::acquire_next_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready. `suboptimal` images may still be rendered to.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; rebuild before rendering.
    OutOfDate,
}

/// Result of presenting in [`Swapchain::submit_command_buffers`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Optimal)
    }
}

/// Vulkan swapchain with its render pass, depth buffers, framebuffers and
/// frame pacing.
///
/// Not thread-safe; only the render thread should touch it.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    image_format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    window_extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    render_pass: vk::RenderPass,
    depth_images: Vec<Image>,
    framebuffers: Vec<vk::Framebuffer>,
    frame_syncs: Vec<FrameSync>,
    in_flight: InFlightFrames<Fence>,
}

impl Swapchain {
    /// Creates a swapchain for a window of `window_extent`.
    ///
    /// `prefer_vsync` forces FIFO even when mailbox is available.
    pub fn new(
        device: Arc<Device>,
        window_extent: vk::Extent2D,
        prefer_vsync: bool,
    ) -> RhiResult<Self> {
        Self::with_previous(device, window_extent, None, prefer_vsync)
    }

    /// Creates a swapchain, passing `previous` to the driver as the retired
    /// swapchain. `previous` is destroyed once the new one exists and its
    /// frame slot position is carried over.
    ///
    /// The caller must make sure nothing recorded against `previous` is
    /// still executing.
    pub fn with_previous(
        device: Arc<Device>,
        window_extent: vk::Extent2D,
        previous: Option<Swapchain>,
        prefer_vsync: bool,
    ) -> RhiResult<Self> {
        let support = device.swapchain_support()?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, prefer_vsync);
        let extent = choose_extent(&support.capabilities, window_extent);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let (surface, _) = device.surface().ok_or_else(|| {
            RhiError::SurfaceError("device was created without a surface".to_string())
        })?;

        let queue_families = device.queue_families();
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families.present_family.unwrap_or(graphics_family);
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = previous
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |previous| previous.swapchain);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain_loader = ash::khr::swapchain::Device::new(device.instance(), device.handle());
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

        let image_views = create_image_views(&device, &images, surface_format.format)?;
        let depth_format = device.find_depth_format()?;
        let render_pass = create_render_pass(&device, surface_format.format, depth_format)?;
        let depth_images = images
            .iter()
            .map(|_| Image::new_depth(device.clone(), extent, depth_format))
            .collect::<RhiResult<Vec<_>>>()?;
        let framebuffers =
            create_framebuffers(&device, render_pass, &image_views, &depth_images, extent)?;

        let frame_syncs = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        let fences = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<RhiResult<Vec<_>>>()?;
        let mut in_flight = InFlightFrames::new(fences, images.len());

        if let Some(previous) = previous {
            in_flight.set_current_frame(previous.current_frame());
            drop(previous);
        }

        info!(
            "Swapchain ready: {} images, depth format {:?}",
            images.len(),
            depth_format
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            image_format: surface_format.format,
            color_space: surface_format.color_space,
            depth_format,
            extent,
            window_extent,
            present_mode,
            render_pass,
            depth_images,
            framebuffers,
            frame_syncs,
            in_flight,
        })
    }

    /// Waits for the current frame slot to retire, then acquires an image.
    ///
    /// Out-of-date is reported as an outcome, not an error.
    pub fn acquire_next_image(&mut self) -> RhiResult<AcquireOutcome> {
        self.in_flight.wait_current()?;

        let semaphore = self.frame_syncs[self.in_flight.current_frame()].image_available();
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Submits `command_buffers` for `image_index` and presents it.
    ///
    /// Waits for any earlier frame still rendering into the same image,
    /// then submits on the graphics queue (waiting for image availability at
    /// color attachment output, signaling render-finished and the slot
    /// fence) and presents. The frame slot advances even when presenting
    /// reports the surface out of date.
    pub fn submit_command_buffers(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        image_index: u32,
    ) -> RhiResult<PresentOutcome> {
        self.in_flight.claim_image(image_index as usize)?;

        let sync = &self.frame_syncs[self.in_flight.current_frame()];
        let wait_semaphores = [sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                self.in_flight.current_fence().handle(),
            )?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        self.in_flight.advance();

        match result {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Formats to compare against a rebuilt swapchain.
    #[inline]
    pub fn formats(&self) -> SwapchainFormats {
        SwapchainFormats {
            image_format: self.image_format,
            depth_format: self.depth_format,
        }
    }

    /// Returns `true` when this swapchain uses the same color and depth
    /// formats as `previous`.
    pub fn compare_swap_formats(&self, previous: &SwapchainFormats) -> bool {
        let same = self.formats() == *previous;
        if !same {
            warn!(
                "Swapchain formats changed: {:?} -> {:?}",
                previous,
                self.formats()
            );
        }
        same
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, index: u32) -> vk::Framebuffer {
        self.framebuffers[index as usize]
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Extent the window asked for; may differ from [`extent`](Self::extent)
    /// when the surface dictates its own size.
    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    #[inline]
    pub fn depth_image(&self, index: usize) -> &Image {
        &self.depth_images[index]
    }

    /// Frame slot the next acquire will use.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.in_flight.current_frame()
    }

    #[inline]
    pub fn extent_aspect_ratio(&self) -> f32 {
        aspect_ratio(self.extent)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.handle();
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);
            for &image_view in &self.image_views {
                device.destroy_image_view(image_view, None);
            }
            // Images belong to the swapchain.
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Width over height; zero height yields zero.
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        return 0.0;
    }
    extent.width as f32 / extent.height as f32
}

/// B8G8R8A8_SRGB with SRGB_NONLINEAR when offered, else the first format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        return format;
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// MAILBOX unless vsync is forced; FIFO is always available.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_vsync: bool,
) -> vk::PresentModeKHR {
    if !prefer_vsync && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// The surface's current extent, or `window_extent` clamped to the
/// surface limits when the surface leaves the size to the swapchain.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = unsafe {
            device
                .handle()
                .create_image_view(&create_info, None)
                .map_err(|e| {
                    RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
                })?
        };

        image_views.push(image_view);
    }

    Ok(image_views)
}

/// Single subpass: color cleared and presented, depth cleared and discarded.
fn create_render_pass(
    device: &Device,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> RhiResult<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
    Ok(render_pass)
}

fn create_framebuffers(
    device: &Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    depth_images: &[Image],
    extent: vk::Extent2D,
) -> RhiResult<Vec<vk::Framebuffer>> {
    image_views
        .iter()
        .zip(depth_images)
        .map(|(&color_view, depth)| {
            let attachments = [color_view, depth.view()];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
            Ok(framebuffer)
        })
        .collect()
}
