use std::path::Path;
use std::sync::Arc;

use ash::vk;

use starlight_rhi::RhiResult;
use starlight_rhi::device::Device;
use starlight_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, PrimitiveTopology};

use super::load_shader_pair;
use crate::drawable::{Drawable, Ellipsoids};
use crate::frame::FrameInfo;

/// Draws activated splats from their five attribute streams. The vertex
/// shader sizes each point from its largest projected scale.
pub struct EllipsoidSystem {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
}

impl EllipsoidSystem {
    pub fn new(
        device: &Arc<Device>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let pipeline_layout = PipelineLayout::new(device.clone(), &[global_set_layout], &[])?;

        let (vertex, fragment) = load_shader_pair(device, shader_dir, "ellipsoid")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .vertex_bindings(&Ellipsoids::binding_descriptions())
            .vertex_attributes(&Ellipsoids::attribute_descriptions())
            .topology(PrimitiveTopology::PointList)
            .alpha_blend()
            .depth_test(true, false)
            .build(device.clone(), &pipeline_layout, render_pass)?;

        Ok(Self {
            pipeline,
            pipeline_layout,
        })
    }

    pub fn render(&self, frame: &FrameInfo<'_>, ellipsoids: &Ellipsoids) {
        let cmd = frame.command_buffer;
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[frame.global_descriptor_set],
            &[],
        );

        ellipsoids.bind(cmd, 0);
        ellipsoids.draw(cmd, 1);
    }
}
