//! Per-frame data handed to render systems.

use ash::vk;
use starlight_rhi::command::CommandBuffer;
use starlight_scene::{Camera, GameObjectMap};

use crate::drawable::Model;

/// Everything a render system needs to record one frame.
pub struct FrameInfo<'a> {
    /// Frame slot, in `0..MAX_FRAMES_IN_FLIGHT`.
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub command_buffer: &'a CommandBuffer,
    pub camera: &'a Camera,
    pub global_descriptor_set: vk::DescriptorSet,
    pub game_objects: &'a mut GameObjectMap<Model>,
}
