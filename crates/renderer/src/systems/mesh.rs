use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;

use starlight_rhi::RhiResult;
use starlight_rhi::device::Device;
use starlight_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};

use super::load_shader_pair;
use crate::drawable::{Drawable, Model};
use crate::frame::FrameInfo;
use crate::ubo::MeshPushConstants;

/// Lit triangle meshes, one draw per game object that has a model.
pub struct MeshRenderSystem {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
}

impl MeshRenderSystem {
    pub fn new(
        device: &Arc<Device>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<MeshPushConstants>() as u32);

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[global_set_layout], &[push_constant_range])?;

        let (vertex, fragment) = load_shader_pair(device, shader_dir, "mesh")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .vertex_bindings(&Model::binding_descriptions())
            .vertex_attributes(&Model::attribute_descriptions())
            .build(device.clone(), &pipeline_layout, render_pass)?;

        Ok(Self {
            pipeline,
            pipeline_layout,
        })
    }

    pub fn render(&self, frame: &FrameInfo<'_>) {
        let cmd = frame.command_buffer;
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[frame.global_descriptor_set],
            &[],
        );

        for object in frame.game_objects.iter() {
            let Some(model) = &object.model else {
                continue;
            };

            let push = MeshPushConstants {
                model_matrix: object.transform.mat4(),
                normal_matrix: Mat4::from_mat3(object.transform.normal_matrix()),
            };
            cmd.push_constants(
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&push),
            );

            model.bind(cmd, 0);
            model.draw(cmd, 1);
        }
    }
}
