use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};

use starlight_rhi::RhiResult;
use starlight_rhi::device::Device;
use starlight_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use starlight_scene::GameObjectMap;

use super::load_shader_pair;
use crate::drawable::Model;
use crate::frame::FrameInfo;
use crate::ubo::{GlobalUbo, MAX_LIGHTS, PointLight, PointLightPushConstants};

/// Radians per second the lights orbit the Y axis.
const ORBIT_SPEED: f32 = 0.5;

/// Copies every point light into `ubo` in id order and sets `num_lights`.
///
/// # Panics
///
/// Panics if there are more than [`MAX_LIGHTS`] point lights.
pub fn write_point_lights(objects: &GameObjectMap<Model>, ubo: &mut GlobalUbo) {
    let mut count = 0;
    for (object, light) in objects.point_lights() {
        assert!(count < MAX_LIGHTS, "Point lights exceed maximum specified");
        ubo.point_lights[count] = PointLight {
            position: object.transform.translation.extend(1.0),
            color: object.color.extend(light.light_intensity),
        };
        count += 1;
    }
    ubo.num_lights = count as u32;
}

/// Camera-facing light billboards, drawn back to front.
pub struct PointLightSystem {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
}

impl PointLightSystem {
    pub fn new(
        device: &Arc<Device>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<PointLightPushConstants>() as u32);

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[global_set_layout], &[push_constant_range])?;

        let (vertex, fragment) = load_shader_pair(device, shader_dir, "point_light")?;
        // Billboard corners come from gl_VertexIndex; no vertex input.
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .alpha_blend()
            .build(device.clone(), &pipeline_layout, render_pass)?;

        Ok(Self {
            pipeline,
            pipeline_layout,
        })
    }

    /// Orbits the lights around the Y axis and writes them into `ubo`.
    pub fn update(&self, frame: &mut FrameInfo<'_>, ubo: &mut GlobalUbo) {
        let rotation = Mat4::from_axis_angle(Vec3::NEG_Y, ORBIT_SPEED * frame.frame_time);
        for object in frame.game_objects.point_lights_mut() {
            let position = rotation * object.transform.translation.extend(1.0);
            object.transform.translation = position.truncate();
        }
        write_point_lights(frame.game_objects, ubo);
    }

    pub fn render(&self, frame: &FrameInfo<'_>) {
        let camera_position = frame.camera.position();

        let mut lights: Vec<(f32, PointLightPushConstants)> = frame
            .game_objects
            .point_lights()
            .map(|(object, light)| {
                let distance = camera_position.distance_squared(object.transform.translation);
                let push = PointLightPushConstants {
                    position: object.transform.translation.extend(1.0),
                    color: object.color.extend(light.light_intensity),
                    radius: object.transform.scale.x,
                    _padding: [0.0; 3],
                };
                (distance, push)
            })
            .collect();
        // Farthest first for alpha blending.
        lights.sort_by(|a, b| b.0.total_cmp(&a.0));

        let cmd = frame.command_buffer;
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[frame.global_descriptor_set],
            &[],
        );

        for (_, push) in &lights {
            cmd.push_constants(
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(push),
            );
            cmd.draw(6, 1, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_point_lights_in_id_order() {
        let mut objects: GameObjectMap<Model> = GameObjectMap::new();
        objects.create();
        let red = objects.create_point_light(0.5, 0.1, Vec3::X).id();
        objects
            .get_mut(red)
            .unwrap()
            .transform
            .translation = Vec3::new(1.0, -1.0, 0.0);
        objects.create_point_light(0.2, 0.1, Vec3::Y);

        let mut ubo = GlobalUbo::default();
        write_point_lights(&objects, &mut ubo);

        assert_eq!(ubo.num_lights, 2);
        assert_eq!(ubo.point_lights[0].position, Vec4::new(1.0, -1.0, 0.0, 1.0));
        assert_eq!(ubo.point_lights[0].color, Vec4::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(ubo.point_lights[1].color.w, 0.2);
    }

    #[test]
    fn test_write_point_lights_clears_count() {
        let objects: GameObjectMap<Model> = GameObjectMap::new();
        let mut ubo = GlobalUbo {
            num_lights: 4,
            ..Default::default()
        };
        write_point_lights(&objects, &mut ubo);
        assert_eq!(ubo.num_lights, 0);
    }

    #[test]
    #[should_panic(expected = "exceed maximum")]
    fn test_too_many_lights_panics() {
        let mut objects: GameObjectMap<Model> = GameObjectMap::new();
        for _ in 0..=MAX_LIGHTS {
            objects.create_point_light(1.0, 0.1, Vec3::ONE);
        }
        write_point_lights(&objects, &mut GlobalUbo::default());
    }
}
