//! Vulkan logical device, queues, command pool and memory allocation.
//!
//! The [`Device`] is the leaf of every GPU resource: buffers, images,
//! swapchains and pipelines all hold an `Arc<Device>` and are destroyed
//! before it. It also owns the command pool used for both the per-frame
//! command buffers and the blocking one-shot uploads.
//!
//! # Example
//!
//! ```no_run
//! use starlight_rhi::device::Device;
//! use starlight_rhi::instance::Instance;
//! use starlight_rhi::physical_device::select_physical_device;
//!
//! # fn example() -> Result<(), starlight_rhi::RhiError> {
//! let instance = Instance::headless()?;
//! let info = select_physical_device(instance.handle(), None)?;
//! let device = Device::new(&instance, &info, None)?;
//! let depth = device.find_depth_format()?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, SurfaceTarget};
use crate::swapchain::SwapchainSupportDetails;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Returns the first memory type index allowed by `type_bits` whose property
/// flags contain all of `properties`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
}

/// Maps requested memory properties onto a gpu-allocator location.
pub fn memory_location_for(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if !properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::GpuOnly
    } else if properties.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::CpuToGpu
    }
}

/// Returns the first candidate whose tiling features include `features`.
pub fn pick_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    format_properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = format_properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Logical device wrapper.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    command_pool: Mutex<vk::CommandPool>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    surface: Option<(vk::SurfaceKHR, ash::khr::surface::Instance)>,
}

impl Device {
    /// Creates the logical device, its queues, the command pool and the
    /// allocator.
    ///
    /// Pass the same `surface` that was used for selection; it enables the
    /// swapchain extension and [`swapchain_support`](Self::swapchain_support).
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        surface: Option<SurfaceTarget<'_>>,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families.present_family.unwrap_or(graphics_family);
        let compute_family = queue_families.compute_family.unwrap_or(graphics_family);

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let supported = &physical_device_info.features;
        let features = vk::PhysicalDeviceFeatures::default()
            .large_points(supported.large_points == vk::TRUE)
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);

        let extension_names: Vec<*const std::ffi::c_char> = if surface.is_some() {
            vec![ash::khr::swapchain::NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created on '{}' with {} extension(s)",
            physical_device_info.device_name(),
            extension_names.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let compute_queue = unsafe { device.get_device_queue(compute_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::TRANSIENT,
            );
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(command_pool, None);
                    device.destroy_device(None);
                }
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            memory_properties: physical_device_info.memory_properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            command_pool: Mutex::new(command_pool),
            graphics_queue,
            present_queue,
            compute_queue,
            queue_families,
            surface: surface.map(|target| (target.surface, target.loader.clone())),
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Dedicated compute queue, or the graphics queue when there is none.
    #[inline]
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Surface handle and loader, when the device was created for presenting.
    pub fn surface(&self) -> Option<(vk::SurfaceKHR, &ash::khr::surface::Instance)> {
        self.surface
            .as_ref()
            .map(|(surface, loader)| (*surface, loader))
    }

    /// Queries capabilities, formats and present modes of the attached surface.
    pub fn swapchain_support(&self) -> RhiResult<SwapchainSupportDetails> {
        let (surface, loader) = self.surface().ok_or_else(|| {
            RhiError::SurfaceError("device was created without a surface".to_string())
        })?;
        SwapchainSupportDetails::query(self.physical_device, surface, loader)
    }

    /// See [`find_memory_type_index`].
    ///
    /// # Errors
    ///
    /// [`RhiError::NoSuitableMemoryType`]; callers treat this as fatal.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        find_memory_type_index(&self.memory_properties, type_bits, properties).ok_or(
            RhiError::NoSuitableMemoryType {
                type_bits,
                properties,
            },
        )
    }

    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        pick_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })
        .ok_or_else(|| RhiError::UnsupportedFormat(candidates.to_vec()))
    }

    pub fn find_depth_format(&self) -> RhiResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
        linear: bool,
    ) -> RhiResult<Allocation> {
        // Capability check first so a missing memory type is reported as such.
        self.find_memory_type(requirements.memory_type_bits, properties)?;

        let mut allocator = self.allocator.lock().unwrap();
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: memory_location_for(properties),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    /// Returns an allocation to the allocator.
    pub fn free_allocation(&self, allocation: Allocation) {
        let mut allocator = self.allocator.lock().unwrap();
        if let Err(e) = allocator.free(allocation) {
            error!("Failed to free allocation: {:?}", e);
        }
    }

    /// Creates a buffer and binds freshly allocated memory to it.
    pub fn create_buffer(
        &self,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<(vk::Buffer, Allocation)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(name, requirements, properties, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            self.free_allocation(allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok((buffer, allocation))
    }

    /// Creates an image from `image_info` and binds memory with `properties`.
    pub fn create_image_with_info(
        &self,
        name: &str,
        image_info: &vk::ImageCreateInfo<'_>,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(image_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let linear = image_info.tiling == vk::ImageTiling::LINEAR;
        let allocation = match self.allocate(name, requirements, properties, linear) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            self.free_allocation(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(e.into());
        }

        Ok((image, allocation))
    }

    /// Allocates primary command buffers from the device command pool.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let pool = lock_command_pool(&self.command_pool)?;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        Ok(buffers)
    }

    /// Returns command buffers to the device command pool.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        let pool = self
            .command_pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        unsafe { self.device.free_command_buffers(*pool, buffers) };
    }

    /// Allocates a one-shot command buffer and begins recording.
    ///
    /// Must be paired with [`end_single_time_commands`](Self::end_single_time_commands).
    /// Prefer [`run_single_time_commands`](Self::run_single_time_commands),
    /// which cannot leak the buffer.
    pub fn begin_single_time_commands(&self) -> RhiResult<vk::CommandBuffer> {
        let command_buffer = self.allocate_command_buffers(1)?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(e) = unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
        } {
            self.free_command_buffers(&[command_buffer]);
            return Err(e.into());
        }

        Ok(command_buffer)
    }

    /// Ends, submits and waits for a buffer from
    /// [`begin_single_time_commands`](Self::begin_single_time_commands).
    ///
    /// The buffer is freed whether or not submission succeeds. Blocks on
    /// queue idle.
    pub fn end_single_time_commands(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        let result = self.submit_and_wait(command_buffer);
        self.free_command_buffers(&[command_buffer]);
        result
    }

    fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device.end_command_buffer(command_buffer)?;
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())?;
            self.device.queue_wait_idle(self.graphics_queue)?;
        }
        Ok(())
    }

    /// Records `record` into a one-shot command buffer, submits it and waits.
    ///
    /// The buffer is freed on every path, including when `record` fails.
    pub fn run_single_time_commands<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(vk::CommandBuffer) -> RhiResult<()>,
    {
        let command_buffer = self.begin_single_time_commands()?;
        if let Err(e) = record(command_buffer) {
            self.free_command_buffers(&[command_buffer]);
            return Err(e);
        }
        self.end_single_time_commands(command_buffer)
    }

    /// Copies `size` bytes between two buffers and waits for completion.
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> RhiResult<()> {
        self.run_single_time_commands(|cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
            Ok(())
        })
    }

    /// Blocks until all queues are idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            if let Ok(pool) = self.command_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }

            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// ash::Device and the loaders are Send + Sync; the allocator and the command
// pool are behind mutexes; the rest are plain handles.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

/// Locks the command pool, reporting a poisoned lock as an error.
fn lock_command_pool(
    pool: &Mutex<vk::CommandPool>,
) -> RhiResult<MutexGuard<'_, vk::CommandPool>> {
    pool.lock().map_err(|_| RhiError::CommandPoolPoisoned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisoned_command_pool_lock_is_an_error() {
        let pool = Arc::new(Mutex::new(vk::CommandPool::null()));
        assert!(lock_command_pool(&pool).is_ok());

        let poisoner = pool.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(
            lock_command_pool(&pool),
            Err(RhiError::CommandPoolPoisoned)
        ));
    }

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn test_find_memory_type_requires_superset() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type_index(&props, 0b111, wanted), Some(2));
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(
            find_memory_type_index(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
    }

    #[test]
    fn test_find_memory_type_none() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type_index(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
        // Bits beyond memory_type_count are ignored.
        assert_eq!(
            find_memory_type_index(&props, 0b10, vk::MemoryPropertyFlags::empty()),
            None
        );
    }

    #[test]
    fn test_memory_location_mapping() {
        assert_eq!(
            memory_location_for(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location_for(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location_for(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED
            ),
            MemoryLocation::GpuToCpu
        );
    }

    #[test]
    fn test_pick_supported_format_order() {
        let pick = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| {
                let mut props = vk::FormatProperties::default();
                if format != vk::Format::D32_SFLOAT {
                    props.optimal_tiling_features =
                        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
                }
                props
            },
        );
        assert_eq!(pick, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_pick_supported_format_checks_tiling() {
        let pick = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        );
        assert_eq!(pick, None);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
