//! Render systems. Each owns one pipeline and records its draws into the
//! render pass the [`Renderer`](crate::Renderer) has already begun.

mod ellipsoid;
mod mesh;
mod point_cloud;
mod point_light;

pub use ellipsoid::EllipsoidSystem;
pub use mesh::MeshRenderSystem;
pub use point_cloud::PointCloudSystem;
pub use point_light::{PointLightSystem, write_point_lights};

use std::path::Path;
use std::sync::Arc;

use starlight_rhi::RhiResult;
use starlight_rhi::device::Device;
use starlight_rhi::shader::{Shader, ShaderStage};

/// Loads `<name>.vert.spv` and `<name>.frag.spv` from `shader_dir`.
fn load_shader_pair(
    device: &Arc<Device>,
    shader_dir: &Path,
    name: &str,
) -> RhiResult<(Shader, Shader)> {
    let vertex = Shader::from_spirv_file(
        device.clone(),
        &shader_dir.join(format!("{name}.vert.spv")),
        ShaderStage::Vertex,
    )?;
    let fragment = Shader::from_spirv_file(
        device.clone(),
        &shader_dir.join(format!("{name}.frag.spv")),
        ShaderStage::Fragment,
    )?;
    Ok((vertex, fragment))
}
