//! GPU buffer management.
//!
//! A [`Buffer`] holds `instance_count` elements of `instance_size` bytes, each
//! padded to a common alignment so any element can be bound on its own as a
//! dynamic uniform or a per-frame slice. Memory comes from gpu-allocator.
//!
//! Host-visible allocations are persistently mapped by the allocator;
//! [`Buffer::map`] and [`Buffer::unmap`] only open and close the window in
//! which writes and reads are allowed, so at most one mapping is active.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use starlight_rhi::buffer::Buffer;
//! use starlight_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), starlight_rhi::RhiError> {
//! let positions: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let bytes: Vec<u8> = positions.iter().flat_map(|p| p.to_ne_bytes()).collect();
//! let vertex_buffer = Buffer::upload_via_staging(
//!     &device,
//!     &bytes,
//!     8,
//!     vk::BufferUsageFlags::VERTEX_BUFFER,
//! )?;
//! assert_eq!(vertex_buffer.instance_count(), 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `instance_size` up to a multiple of `min_offset_alignment`.
///
/// An alignment of zero leaves the size unchanged. Vulkan alignments are
/// powers of two.
#[inline]
pub fn alignment_size(
    instance_size: vk::DeviceSize,
    min_offset_alignment: vk::DeviceSize,
) -> vk::DeviceSize {
    if min_offset_alignment > 0 {
        (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
    } else {
        instance_size
    }
}

/// Expands `offset..offset + size` outward to multiples of `atom`.
fn atom_aligned_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    limit: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    if atom <= 1 {
        return (offset, size);
    }
    let start = offset / atom * atom;
    let end = (offset + size).div_ceil(atom) * atom;
    if end > limit {
        // Rounding would leave the allocation, which may be the end of the
        // memory block.
        return (start, vk::WHOLE_SIZE);
    }
    (start, end - start)
}

/// GPU buffer with allocator-managed memory.
///
/// Not thread-safe; synchronize access externally when sharing.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    /// Active mapping window, as `(offset, size)` in bytes.
    mapped: Option<(vk::DeviceSize, vk::DeviceSize)>,
    buffer_size: vk::DeviceSize,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    usage_flags: vk::BufferUsageFlags,
    memory_property_flags: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Creates a buffer of `instance_count` aligned elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, no memory type satisfies
    /// `memory_property_flags`, or allocation fails.
    pub fn new(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage_flags: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if instance_size == 0 || instance_count == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let alignment_size = alignment_size(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * instance_count as vk::DeviceSize;

        let name = if memory_property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            "host buffer"
        } else {
            "device buffer"
        };
        let (buffer, allocation) =
            device.create_buffer(name, buffer_size, usage_flags, memory_property_flags)?;

        debug!(
            "Created buffer: {} x {} bytes (aligned to {}), usage {:?}",
            instance_count, instance_size, alignment_size, usage_flags
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            mapped: None,
            buffer_size,
            instance_size,
            instance_count,
            alignment_size,
            usage_flags,
            memory_property_flags,
        })
    }

    /// Uploads `data` into a new device-local buffer through a staging buffer.
    ///
    /// The staging buffer is host visible and coherent; the destination gets
    /// `usage | TRANSFER_DST`. The copy is blocking and the staging buffer is
    /// released before returning.
    pub fn upload_via_staging(
        device: &Arc<Device>,
        data: &[u8],
        instance_size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> RhiResult<Self> {
        if instance_size == 0 || data.is_empty() || data.len() as u64 % instance_size != 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Upload of {} bytes is not a whole number of {}-byte elements",
                data.len(),
                instance_size
            )));
        }
        let instance_count = (data.len() as u64 / instance_size) as u32;

        let mut staging = Self::new(
            Arc::clone(device),
            instance_size,
            instance_count,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            0,
        )?;
        staging.map(vk::WHOLE_SIZE, 0)?;
        staging.write_to_buffer(data, vk::WHOLE_SIZE, 0)?;
        staging.unmap();

        let target = Self::new(
            Arc::clone(device),
            instance_size,
            instance_count,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            0,
        )?;
        device.copy_buffer(staging.handle(), target.handle(), target.buffer_size())?;

        debug!(
            "Uploaded {} element(s) ({} bytes) via staging",
            instance_count,
            data.len()
        );

        Ok(target)
    }

    fn allocation(&self) -> RhiResult<&Allocation> {
        self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })
    }

    fn resolve_range(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> RhiResult<(vk::DeviceSize, vk::DeviceSize)> {
        let len = if size == vk::WHOLE_SIZE {
            self.buffer_size.saturating_sub(offset)
        } else {
            size
        };
        if offset.checked_add(len).is_none_or(|end| end > self.buffer_size) {
            return Err(RhiError::OutOfBounds {
                offset,
                len,
                size: self.buffer_size,
            });
        }
        Ok((offset, len))
    }

    /// Opens a mapping window over `size` bytes at `offset`.
    ///
    /// Pass [`vk::WHOLE_SIZE`] to map the whole buffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferNotHostVisible`] for device-local memory,
    /// [`RhiError::BufferAlreadyMapped`] if a window is already open.
    pub fn map(&mut self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        if self.allocation()?.mapped_ptr().is_none() {
            return Err(RhiError::BufferNotHostVisible);
        }
        if self.mapped.is_some() {
            return Err(RhiError::BufferAlreadyMapped);
        }
        self.mapped = Some(self.resolve_range(size, offset)?);
        Ok(())
    }

    /// Closes the mapping window. Does nothing when not mapped.
    pub fn unmap(&mut self) {
        self.mapped = None;
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Returns a pointer to byte `offset` after checking the range lies in the
    /// open mapping window.
    fn mapped_ptr_at(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> RhiResult<*mut u8> {
        let (map_offset, map_size) = self.mapped.ok_or(RhiError::BufferNotMapped)?;
        if offset < map_offset
            || offset
                .checked_add(len)
                .is_none_or(|end| end > map_offset + map_size)
        {
            return Err(RhiError::OutOfBounds {
                offset,
                len,
                size: map_offset + map_size,
            });
        }
        let base = self
            .allocation()?
            .mapped_ptr()
            .ok_or(RhiError::BufferNotHostVisible)?;
        Ok(unsafe { (base.as_ptr() as *mut u8).add(offset as usize) })
    }

    /// Copies `size` bytes of `data` into the buffer at `offset`.
    ///
    /// [`vk::WHOLE_SIZE`] copies `buffer_size()` bytes starting at the
    /// beginning of the buffer, ignoring `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferNotMapped`] when no mapping window is open, and
    /// [`RhiError::OutOfBounds`] when `data` is too short or the range
    /// leaves the window.
    pub fn write_to_buffer(
        &mut self,
        data: &[u8],
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> RhiResult<()> {
        if self.mapped.is_none() {
            return Err(RhiError::BufferNotMapped);
        }

        let (offset, len) = if size == vk::WHOLE_SIZE {
            (0, self.buffer_size)
        } else {
            (offset, size)
        };
        if (data.len() as vk::DeviceSize) < len {
            return Err(RhiError::OutOfBounds {
                offset: 0,
                len,
                size: data.len() as vk::DeviceSize,
            });
        }

        let dst = self.mapped_ptr_at(offset, len)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, len as usize);
        }
        Ok(())
    }

    /// Reads `len` bytes at `offset` from the open mapping window.
    pub fn read_from_buffer(
        &self,
        len: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> RhiResult<Vec<u8>> {
        let src = self.mapped_ptr_at(offset, len)?;
        let mut out = vec![0u8; len as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), len as usize);
        }
        Ok(out)
    }

    fn mapped_memory_range(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> RhiResult<vk::MappedMemoryRange<'static>> {
        let (offset, len) = self.resolve_range(size, offset)?;
        let allocation = self.allocation()?;
        let atom = self.device.properties().limits.non_coherent_atom_size;
        let base = allocation.offset();
        let (start, len) = atom_aligned_range(base + offset, len, atom, base + allocation.size());
        Ok(vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(len))
    }

    fn is_coherent(&self) -> bool {
        self.allocation.as_ref().is_some_and(|allocation| {
            allocation
                .memory_properties()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        })
    }

    /// Makes host writes in the range visible to the device.
    ///
    /// A no-op for coherent memory.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        if self.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_memory_range(size, offset)?;
        unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    /// Makes device writes in the range visible to the host.
    ///
    /// A no-op for coherent memory.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        if self.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_memory_range(size, offset)?;
        unsafe {
            self.device
                .handle()
                .invalidate_mapped_memory_ranges(&[range])?
        };
        Ok(())
    }

    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(size)
    }

    /// Byte offset of element `index`.
    #[inline]
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        index as vk::DeviceSize * self.alignment_size
    }

    fn check_index(&self, index: u32) -> RhiResult<()> {
        if index >= self.instance_count {
            return Err(RhiError::OutOfBounds {
                offset: self.index_offset(index),
                len: self.alignment_size,
                size: self.buffer_size,
            });
        }
        Ok(())
    }

    /// Writes one element (`instance_size` bytes) at `index`.
    pub fn write_to_index(&mut self, data: &[u8], index: u32) -> RhiResult<()> {
        self.check_index(index)?;
        self.write_to_buffer(data, self.instance_size, self.index_offset(index))
    }

    pub fn flush_index(&self, index: u32) -> RhiResult<()> {
        self.check_index(index)?;
        self.flush(self.alignment_size, self.index_offset(index))
    }

    pub fn invalidate_index(&self, index: u32) -> RhiResult<()> {
        self.check_index(index)?;
        self.invalidate(self.alignment_size, self.index_offset(index))
    }

    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.alignment_size, self.index_offset(index))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Total size in bytes: `alignment_size * instance_count`.
    #[inline]
    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    #[inline]
    pub fn usage_flags(&self) -> vk::BufferUsageFlags {
        self.usage_flags
    }

    #[inline]
    pub fn memory_property_flags(&self) -> vk::MemoryPropertyFlags {
        self.memory_property_flags
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        // Free allocation first, then destroy buffer
        if let Some(allocation) = self.allocation.take() {
            self.device.free_allocation(allocation);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed buffer ({} bytes)", self.buffer_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_size_rounds_up() {
        assert_eq!(alignment_size(100, 64), 128);
        assert_eq!(alignment_size(128, 64), 128);
        assert_eq!(alignment_size(1, 256), 256);
        assert_eq!(alignment_size(257, 256), 512);
    }

    #[test]
    fn test_alignment_size_zero_alignment() {
        assert_eq!(alignment_size(100, 0), 100);
        assert_eq!(alignment_size(248, 0), 248);
    }

    #[test]
    fn test_total_size_from_alignment() {
        let aligned = alignment_size(100, 64);
        assert_eq!(aligned * 3, 384);
    }

    #[test]
    fn test_atom_aligned_range() {
        assert_eq!(atom_aligned_range(10, 20, 64, 256), (0, 64));
        assert_eq!(atom_aligned_range(64, 64, 64, 256), (64, 64));
        assert_eq!(atom_aligned_range(60, 10, 64, 256), (0, 128));
        assert_eq!(atom_aligned_range(7, 3, 1, 256), (7, 3));
        assert_eq!(atom_aligned_range(7, 3, 0, 256), (7, 3));
    }

    #[test]
    fn test_atom_aligned_range_stays_inside_allocation() {
        // Allocation [192, 200) rounded to 256 would overrun a 200-byte block.
        assert_eq!(atom_aligned_range(192, 8, 64, 200), (192, vk::WHOLE_SIZE));
        assert_eq!(atom_aligned_range(128, 64, 64, 192), (128, 64));
    }
}
