//! Buffer tests against a real (headless) Vulkan device.
//!
//! Skipped when no Vulkan loader or GPU is available.

use std::sync::Arc;

use starlight_rhi::RhiError;
use starlight_rhi::buffer::Buffer;
use starlight_rhi::device::Device;
use starlight_rhi::instance::Instance;
use starlight_rhi::physical_device::select_physical_device;
use starlight_rhi::vk;

fn headless_device() -> Option<(Instance, Arc<Device>)> {
    let instance = match Instance::headless() {
        Ok(instance) => instance,
        Err(e) => {
            println!("Skipping test: no Vulkan instance ({e})");
            return None;
        }
    };
    let info = match select_physical_device(instance.handle(), None) {
        Ok(info) => info,
        Err(e) => {
            println!("Skipping test: no suitable GPU ({e})");
            return None;
        }
    };
    let device = Device::new(&instance, &info, None).expect("Failed to create device");
    Some((instance, device))
}

#[test]
fn test_staging_upload_round_trip() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };

    let data: Vec<u8> = (0..64u32).flat_map(|i| (i * 3).to_le_bytes()).collect();
    let uploaded = Buffer::upload_via_staging(
        &device,
        &data,
        16,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
    )
    .expect("Upload failed");
    assert_eq!(uploaded.instance_count(), 16);
    assert_eq!(uploaded.buffer_size(), data.len() as u64);

    let mut readback = Buffer::new(
        device.clone(),
        16,
        16,
        vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        0,
    )
    .expect("Failed to create readback buffer");

    device
        .copy_buffer(uploaded.handle(), readback.handle(), uploaded.buffer_size())
        .expect("Copy failed");

    readback.map(vk::WHOLE_SIZE, 0).expect("Map failed");
    readback.invalidate(vk::WHOLE_SIZE, 0).expect("Invalidate failed");
    let bytes = readback
        .read_from_buffer(data.len() as u64, 0)
        .expect("Read failed");
    assert_eq!(bytes, data);
}

#[test]
fn test_mapped_writes_respect_alignment() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };

    let mut buffer = Buffer::new(
        device.clone(),
        12,
        4,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        16,
    )
    .expect("Failed to create buffer");
    assert_eq!(buffer.alignment_size(), 16);
    assert_eq!(buffer.buffer_size(), 64);

    assert!(buffer.write_to_index(&[1; 12], 0).is_err());

    buffer.map(vk::WHOLE_SIZE, 0).expect("Map failed");
    assert!(buffer.map(vk::WHOLE_SIZE, 0).is_err());
    buffer.write_to_index(&[7; 12], 2).expect("Write failed");
    buffer.flush_index(2).expect("Flush failed");

    assert_eq!(buffer.read_from_buffer(12, 32).unwrap(), vec![7; 12]);
    assert_eq!(buffer.descriptor_info_for_index(2).offset, 32);
    assert_eq!(buffer.descriptor_info_for_index(2).range, 16);

    buffer.unmap();
    buffer.unmap();
    assert!(!buffer.is_mapped());
}

#[test]
fn test_device_local_buffer_requires_map_before_write() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };

    let mut buffer = Buffer::new(
        device,
        4,
        8,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        0,
    )
    .expect("Failed to create buffer");

    assert!(matches!(
        buffer.write_to_buffer(&[0; 4], 4, 0),
        Err(RhiError::BufferNotMapped)
    ));

    // Device-local memory may still be host visible (UMA, ReBAR, software
    // drivers), in which case mapping succeeds.
    match buffer.map(vk::WHOLE_SIZE, 0) {
        Ok(()) => buffer.write_to_buffer(&[1; 4], 4, 0).expect("Write failed"),
        Err(e) => assert!(matches!(e, RhiError::BufferNotHostVisible)),
    }
}

#[test]
fn test_write_past_address_space_is_out_of_bounds() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };

    let mut buffer = Buffer::new(
        device,
        16,
        1,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        0,
    )
    .expect("Failed to create buffer");
    buffer.map(vk::WHOLE_SIZE, 0).expect("Map failed");

    assert!(matches!(
        buffer.write_to_buffer(&[0; 4], 4, u64::MAX - 1),
        Err(RhiError::OutOfBounds { .. })
    ));
    assert!(matches!(
        buffer.read_from_buffer(4, u64::MAX - 1),
        Err(RhiError::OutOfBounds { .. })
    ));
}
