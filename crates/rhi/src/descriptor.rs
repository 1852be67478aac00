//! Descriptor set layouts, pools and writers.
//!
//! - [`DescriptorSetLayout`] knows its bindings, so a [`DescriptorWriter`]
//!   can check every write against them
//! - [`DescriptorPool`] allocates sets
//! - [`DescriptorWriter`] collects buffer writes and applies them to a new
//!   or existing set
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use starlight_rhi::buffer::Buffer;
//! use starlight_rhi::device::Device;
//! use starlight_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, ubo: &Buffer) -> Result<(), starlight_rhi::RhiError> {
//! let layout = DescriptorSetLayout::builder()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
//!     .build(device.clone())?;
//!
//! let pool = DescriptorPool::builder()
//!     .max_sets(2)
//!     .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .build(device.clone())?;
//!
//! let set = DescriptorWriter::new(&layout)
//!     .write_buffer(0, ubo.descriptor_info(vk::WHOLE_SIZE, 0))
//!     .build(&pool)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Collects bindings for a [`DescriptorSetLayout`].
#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: HashMap<u32, vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    /// # Panics
    ///
    /// Panics if `binding` was already added.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        assert!(
            !self.bindings.contains_key(&binding),
            "binding {binding} already in use"
        );
        self.bindings.insert(
            binding,
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    pub fn bindings(&self) -> &HashMap<u32, vk::DescriptorSetLayoutBinding<'static>> {
        &self.bindings
    }

    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        let mut bindings: Vec<_> = self.bindings.values().copied().collect();
        bindings.sort_by_key(|binding| binding.binding);

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper.
///
/// Immutable after creation; share it through `Arc` or references.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: HashMap<u32, vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayout {
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::default()
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn binding(&self, binding: u32) -> Option<&vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings.get(&binding)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Collects sizes and limits for a [`DescriptorPool`].
#[derive(Clone, Debug)]
pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            pool_sizes: Vec::new(),
            max_sets: 1000,
        }
    }
}

impl DescriptorPoolBuilder {
    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(descriptor_type)
                .descriptor_count(count),
        );
        self
    }

    pub fn max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            self.max_sets,
            self.pool_sizes.len()
        );

        Ok(DescriptorPool {
            device,
            pool,
            max_sets: self.max_sets,
        })
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// Not thread-safe; synchronize access externally when sharing.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Allocates one set with `layout`.
    ///
    /// # Errors
    ///
    /// Fails when the pool is exhausted.
    pub fn allocate_descriptor(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Buffer writes for one descriptor set, checked against its layout.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    writes: Vec<(u32, vk::DescriptorType, vk::DescriptorBufferInfo)>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            writes: Vec::new(),
        }
    }

    /// # Panics
    ///
    /// Panics if the layout has no such binding or the binding is an array.
    pub fn write_buffer(mut self, binding: u32, buffer_info: vk::DescriptorBufferInfo) -> Self {
        let description = self
            .layout
            .binding(binding)
            .unwrap_or_else(|| panic!("layout does not contain binding {binding}"));
        assert_eq!(
            description.descriptor_count, 1,
            "binding {binding} expects multiple descriptors"
        );
        self.writes
            .push((binding, description.descriptor_type, buffer_info));
        self
    }

    /// Allocates a set from `pool` and writes into it.
    pub fn build(self, pool: &DescriptorPool) -> RhiResult<vk::DescriptorSet> {
        let set = pool.allocate_descriptor(self.layout.handle())?;
        self.overwrite(set);
        Ok(set)
    }

    /// Writes into an existing set.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> =
            self.writes.iter().map(|(_, _, info)| [*info]).collect();

        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .zip(&buffer_infos)
            .map(|((binding, descriptor_type, _), info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*descriptor_type)
                    .buffer_info(info)
            })
            .collect();

        if writes.is_empty() {
            return;
        }

        unsafe {
            self.layout
                .device
                .handle()
                .update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder_records_bindings() {
        let builder = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .add_binding(
                2,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                4,
            );

        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(
            bindings[&0].descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(bindings[&2].descriptor_count, 4);
        assert_eq!(bindings[&2].stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    #[should_panic(expected = "binding 0 already in use")]
    fn test_layout_builder_rejects_duplicate_binding() {
        let _ = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            );
    }

    #[test]
    fn test_pool_builder_defaults() {
        let builder = DescriptorPool::builder()
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
            .max_sets(2);
        assert_eq!(builder.max_sets, 2);
        assert_eq!(builder.pool_sizes.len(), 1);
        assert_eq!(builder.pool_sizes[0].descriptor_count, 2);
    }
}
