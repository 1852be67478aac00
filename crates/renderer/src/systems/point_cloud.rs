use std::path::Path;
use std::sync::Arc;

use ash::vk;

use starlight_rhi::RhiResult;
use starlight_rhi::device::Device;
use starlight_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, PrimitiveTopology};

use super::load_shader_pair;
use crate::drawable::{Drawable, PointCloud};
use crate::frame::FrameInfo;

/// Draws raw splat records as alpha-blended points.
pub struct PointCloudSystem {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
}

impl PointCloudSystem {
    pub fn new(
        device: &Arc<Device>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let pipeline_layout = PipelineLayout::new(device.clone(), &[global_set_layout], &[])?;

        let (vertex, fragment) = load_shader_pair(device, shader_dir, "point_cloud")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .vertex_bindings(&PointCloud::binding_descriptions())
            .vertex_attributes(&PointCloud::attribute_descriptions())
            .topology(PrimitiveTopology::PointList)
            .alpha_blend()
            .build(device.clone(), &pipeline_layout, render_pass)?;

        Ok(Self {
            pipeline,
            pipeline_layout,
        })
    }

    pub fn render(&self, frame: &FrameInfo<'_>, cloud: &PointCloud) {
        let cmd = frame.command_buffer;
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[frame.global_descriptor_set],
            &[],
        );

        cloud.bind(cmd, 0);
        cloud.draw(cmd, 1);
    }
}
