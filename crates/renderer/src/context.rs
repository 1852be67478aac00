//! Instance, surface and device bring-up for a window.

use std::sync::Arc;

use tracing::info;

use starlight_core::RendererConfig;
use starlight_platform::{Surface, Window};
use starlight_rhi::device::Device;
use starlight_rhi::instance::{Instance, InstanceDesc};
use starlight_rhi::physical_device::{SurfaceTarget, select_physical_device};

use crate::error::RendererResult;

/// The Vulkan objects that live as long as the window.
///
/// Fields drop in declaration order: device, then surface, then instance.
/// Everything holding an `Arc<Device>` must be dropped before this.
pub struct RenderContext {
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl RenderContext {
    pub fn new(window: &Window, config: &RendererConfig) -> RendererResult<Self> {
        let instance = Instance::new(&InstanceDesc {
            application_name: config.title.clone(),
            enable_validation: config.validation,
            extensions: window.required_extensions()?,
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let target = SurfaceTarget {
            surface: surface.handle(),
            loader: surface.loader(),
        };

        let physical_device = select_physical_device(instance.handle(), Some(target))?;
        info!(
            "Using {} ({})",
            physical_device.device_name(),
            physical_device.device_type_name()
        );

        let device = Device::new(&instance, &physical_device, Some(target))?;

        Ok(Self {
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}
