//! GPU-resident geometry.
//!
//! Every drawable uploads its data once through a staging buffer into
//! device-local vertex (and index) buffers, then binds and draws from them.

use std::mem::{offset_of, size_of};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use starlight_resources::{MeshData, MeshVertex, SplatPoint, SplatStreams};
use starlight_rhi::RhiResult;
use starlight_rhi::buffer::Buffer;
use starlight_rhi::command::CommandBuffer;
use starlight_rhi::device::Device;

/// Geometry that can bind its vertex streams and issue a draw.
pub trait Drawable {
    /// Binds vertex (and index) buffers starting at `first_binding`.
    fn bind(&self, cmd: &CommandBuffer, first_binding: u32);

    fn draw(&self, cmd: &CommandBuffer, instance_count: u32);
}

fn attribute(
    location: u32,
    binding: u32,
    format: vk::Format,
    offset: usize,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding,
        format,
        offset: offset as u32,
    }
}

fn per_vertex_binding(binding: u32, stride: usize) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding,
        stride: stride as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Triangle mesh with an optional `u32` index buffer.
pub struct Model {
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
}

impl Model {
    /// # Panics
    ///
    /// Panics if `data` has fewer than three vertices.
    pub fn new(device: &Arc<Device>, data: &MeshData) -> RhiResult<Self> {
        let vertex_count = data.vertices.len() as u32;
        assert!(vertex_count >= 3, "vertex count must be at least 3");

        let vertex_buffer = Buffer::upload_via_staging(
            device,
            bytemuck::cast_slice(&data.vertices),
            size_of::<MeshVertex>() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let index_buffer = if data.is_indexed() {
            Some(Buffer::upload_via_staging(
                device,
                bytemuck::cast_slice(&data.indices),
                size_of::<u32>() as vk::DeviceSize,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?)
        } else {
            None
        };

        debug!(
            "Model uploaded: {} vertices, {} indices",
            vertex_count,
            data.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![per_vertex_binding(0, size_of::<MeshVertex>())]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(MeshVertex, position)),
            attribute(1, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(MeshVertex, color)),
            attribute(2, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(MeshVertex, normal)),
            attribute(3, 0, vk::Format::R32G32_SFLOAT, offset_of!(MeshVertex, uv)),
        ]
    }
}

impl Drawable for Model {
    fn bind(&self, cmd: &CommandBuffer, first_binding: u32) {
        cmd.bind_vertex_buffers(first_binding, &[self.vertex_buffer.handle()], &[0]);
        if let Some(index_buffer) = &self.index_buffer {
            cmd.bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT32);
        }
    }

    fn draw(&self, cmd: &CommandBuffer, instance_count: u32) {
        if self.index_buffer.is_some() {
            cmd.draw_indexed(self.index_count, instance_count, 0, 0, 0);
        } else {
            cmd.draw(self.vertex_count, instance_count, 0, 0);
        }
    }
}

/// Splats as one packed stream of raw [`SplatPoint`] records.
pub struct PointCloud {
    vertex_buffer: Buffer,
    count: u32,
}

impl PointCloud {
    /// # Panics
    ///
    /// Panics if `points` is empty.
    pub fn new(device: &Arc<Device>, points: &[SplatPoint]) -> RhiResult<Self> {
        let count = points.len() as u32;
        assert!(count > 0, "point cloud must contain at least one point");

        let vertex_buffer = Buffer::upload_via_staging(
            device,
            bytemuck::cast_slice(points),
            size_of::<SplatPoint>() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        debug!("Point cloud uploaded: {} points", count);

        Ok(Self {
            vertex_buffer,
            count,
        })
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![per_vertex_binding(0, size_of::<SplatPoint>())]
    }

    /// Position, SH DC colour, opacity, scale and rotation. The higher-order
    /// SH coefficients stay in the buffer but are not fed to the shader.
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(SplatPoint, position)),
            attribute(1, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(SplatPoint, sh)),
            attribute(2, 0, vk::Format::R32_SFLOAT, offset_of!(SplatPoint, opacity)),
            attribute(3, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(SplatPoint, scale)),
            attribute(4, 0, vk::Format::R32G32B32A32_SFLOAT, offset_of!(SplatPoint, rotation)),
        ]
    }
}

impl Drawable for PointCloud {
    fn bind(&self, cmd: &CommandBuffer, first_binding: u32) {
        cmd.bind_vertex_buffers(first_binding, &[self.vertex_buffer.handle()], &[0]);
    }

    fn draw(&self, cmd: &CommandBuffer, instance_count: u32) {
        cmd.draw(self.count, instance_count, 0, 0);
    }
}

/// Activated splat attributes in five device-local streams: position,
/// scale, colour, rotation and alpha.
pub struct Ellipsoids {
    positions: Buffer,
    scales: Buffer,
    colors: Buffer,
    rotations: Buffer,
    alphas: Buffer,
    count: u32,
}

impl Ellipsoids {
    pub const STREAM_COUNT: u32 = 5;

    /// # Panics
    ///
    /// Panics if `streams` is empty.
    pub fn new(device: &Arc<Device>, streams: &SplatStreams) -> RhiResult<Self> {
        let count = streams.len() as u32;
        assert!(count > 0, "point cloud must contain at least one point");

        let vec4_stream = |data: &[[f32; 4]]| {
            Buffer::upload_via_staging(
                device,
                bytemuck::cast_slice(data),
                size_of::<[f32; 4]>() as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )
        };

        let positions = vec4_stream(&streams.positions)?;
        let scales = vec4_stream(&streams.scales)?;
        let colors = vec4_stream(&streams.colors)?;
        let rotations = vec4_stream(&streams.rotations)?;
        let alphas = Buffer::upload_via_staging(
            device,
            bytemuck::cast_slice(&streams.alphas),
            size_of::<f32>() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        debug!("Ellipsoids uploaded: {} splats in 5 streams", count);

        Ok(Self {
            positions,
            scales,
            colors,
            rotations,
            alphas,
            count,
        })
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        let vec4 = size_of::<[f32; 4]>();
        vec![
            per_vertex_binding(0, vec4),
            per_vertex_binding(1, vec4),
            per_vertex_binding(2, vec4),
            per_vertex_binding(3, vec4),
            per_vertex_binding(4, size_of::<f32>()),
        ]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, 0, vk::Format::R32G32B32A32_SFLOAT, 0),
            attribute(1, 1, vk::Format::R32G32B32A32_SFLOAT, 0),
            attribute(2, 2, vk::Format::R32G32B32A32_SFLOAT, 0),
            attribute(3, 3, vk::Format::R32G32B32A32_SFLOAT, 0),
            attribute(4, 4, vk::Format::R32_SFLOAT, 0),
        ]
    }
}

impl Drawable for Ellipsoids {
    fn bind(&self, cmd: &CommandBuffer, first_binding: u32) {
        let buffers = [
            self.positions.handle(),
            self.scales.handle(),
            self.colors.handle(),
            self.rotations.handle(),
            self.alphas.handle(),
        ];
        cmd.bind_vertex_buffers(first_binding, &buffers, &[0; 5]);
    }

    fn draw(&self, cmd: &CommandBuffer, instance_count: u32) {
        cmd.draw(self.count, instance_count, 0, 0);
    }
}
