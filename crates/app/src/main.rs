//! Starlight: Gaussian-splat point cloud viewer.
//!
//! Opens a window, uploads a splat PLY as either raw points or activated
//! ellipsoids, and renders it next to a lit cube and a ring of point lights.
//! WASD/QE move the camera, the arrow keys look around.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use starlight_core::{FrameTimer, RendererConfig, SplatFilter};
use starlight_platform::{InputTracker, Window};
use starlight_renderer::{
    EllipsoidSystem, Ellipsoids, FrameInfo, GlobalUbo, MAX_FRAMES_IN_FLIGHT, MeshRenderSystem,
    Model, PointCloud, PointCloudSystem, PointLightSystem, RenderContext, Renderer,
    VulkanBackend,
};
use starlight_resources::{MeshData, SplatPoint, SplatStreams, filter_points, load_splats};
use starlight_rhi::buffer::Buffer;
use starlight_rhi::command::CommandBuffer;
use starlight_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use starlight_rhi::device::Device;
use starlight_rhi::vk;
use starlight_scene::{Camera, GameObjectMap, KeyboardMovementController, TransformComponent};

const DEFAULT_POINT_CLOUD: &str = "assets/point_clouds/default.ply";
const FOV_Y_DEGREES: f32 = 50.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, clap::ValueEnum)]
enum CliLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl CliLogLevel {
    fn filter(self) -> &'static str {
        match self {
            CliLogLevel::Trace => "trace",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Info => "info",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Error => "error",
        }
    }
}

/// How splats are drawn.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, clap::ValueEnum)]
enum CloudMode {
    /// Raw records as single-pixel points.
    Points,
    /// Activated attributes sized by scale.
    #[default]
    Ellipsoids,
}

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct CliArgs {
    /// Gaussian-splat PLY file to display.
    point_cloud: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,
    #[arg(short, long, value_enum, default_value_t = CloudMode::Ellipsoids)]
    mode: CloudMode,
    /// Drop splats whose opacity is below this value.
    #[arg(long, default_value_t = 0.0)]
    alpha_cutoff: f32,
    /// Drop splats with any axis scale below this value.
    #[arg(long)]
    min_scale: Option<f32>,
    #[arg(long)]
    vsync: bool,
    /// Enable the Vulkan validation layer (always on in debug builds).
    #[arg(long)]
    validation: bool,
    #[arg(long, default_value = "shaders")]
    shader_dir: PathBuf,
}

impl CliArgs {
    fn into_config(self) -> RendererConfig {
        let point_cloud = self.point_cloud.or_else(|| {
            warn!(
                "No point cloud given, falling back to {}",
                DEFAULT_POINT_CLOUD
            );
            Some(PathBuf::from(DEFAULT_POINT_CLOUD))
        });

        let defaults = RendererConfig::default();
        RendererConfig {
            validation: self.validation || defaults.validation,
            vsync: self.vsync,
            shader_dir: self.shader_dir,
            point_cloud,
            splat_filter: SplatFilter {
                alpha_cutoff: self.alpha_cutoff,
                min_scale: self.min_scale,
            },
            ..defaults
        }
    }
}

enum CloudDrawable {
    Points(PointCloud),
    Ellipsoids(Ellipsoids),
}

/// Everything that exists only while the window does.
///
/// Fields drop in declaration order; `context` owns the device and must go
/// last.
struct Gpu {
    cloud: Option<CloudDrawable>,
    game_objects: GameObjectMap<Model>,
    mesh_system: MeshRenderSystem,
    point_light_system: PointLightSystem,
    point_cloud_system: PointCloudSystem,
    ellipsoid_system: EllipsoidSystem,
    global_sets: Vec<vk::DescriptorSet>,
    ubo_buffer: Buffer,
    _global_pool: DescriptorPool,
    _global_layout: DescriptorSetLayout,
    renderer: Renderer<VulkanBackend>,
    context: RenderContext,
}

impl Gpu {
    fn new(window: Arc<Window>, config: &RendererConfig, mode: CloudMode) -> Result<Self> {
        let context = RenderContext::new(&window, config)?;
        let device = context.device().clone();

        let backend = VulkanBackend::new(device.clone(), window, config.clear_color, config.vsync)?;
        let renderer = Renderer::new(backend);
        let render_pass = renderer.backend().swapchain().render_pass();

        let mut ubo_buffer = Buffer::new(
            device.clone(),
            size_of::<GlobalUbo>() as vk::DeviceSize,
            MAX_FRAMES_IN_FLIGHT as u32,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            device.properties().limits.min_uniform_buffer_offset_alignment,
        )?;
        ubo_buffer.map(vk::WHOLE_SIZE, 0)?;

        let global_layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .build(device.clone())?;
        let global_pool = DescriptorPool::builder()
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, MAX_FRAMES_IN_FLIGHT as u32)
            .build(device.clone())?;
        let global_sets = (0..MAX_FRAMES_IN_FLIGHT as u32)
            .map(|slot| {
                DescriptorWriter::new(&global_layout)
                    .write_buffer(0, ubo_buffer.descriptor_info_for_index(slot))
                    .build(&global_pool)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let shader_dir = config.shader_dir.as_path();
        let set_layout = global_layout.handle();
        let mesh_system = MeshRenderSystem::new(&device, render_pass, set_layout, shader_dir)?;
        let point_light_system =
            PointLightSystem::new(&device, render_pass, set_layout, shader_dir)?;
        let point_cloud_system =
            PointCloudSystem::new(&device, render_pass, set_layout, shader_dir)?;
        let ellipsoid_system = EllipsoidSystem::new(&device, render_pass, set_layout, shader_dir)?;

        let cloud = match &config.point_cloud {
            Some(path) => match load_splats(path) {
                Ok(points) => upload_cloud(&device, &points, &config.splat_filter, mode)?,
                Err(e) => {
                    warn!("Could not load point cloud {:?}: {}", path, e);
                    None
                }
            },
            None => None,
        };

        let game_objects = build_scene(&device)?;

        info!(
            "Scene ready: {} objects, point cloud {}",
            game_objects.len(),
            if cloud.is_some() { "loaded" } else { "absent" }
        );

        Ok(Self {
            cloud,
            game_objects,
            mesh_system,
            point_light_system,
            point_cloud_system,
            ellipsoid_system,
            global_sets,
            ubo_buffer,
            _global_pool: global_pool,
            _global_layout: global_layout,
            renderer,
            context,
        })
    }

    fn draw_frame(&mut self, camera: &mut Camera, viewer: &TransformComponent, dt: f32) -> Result<()> {
        camera.set_view_yxz(viewer.translation, viewer.rotation);
        camera.set_perspective_projection(
            FOV_Y_DEGREES.to_radians(),
            self.renderer.aspect_ratio(),
            NEAR_PLANE,
            FAR_PLANE,
        );

        let Some(handle) = self.renderer.begin_frame()? else {
            return Ok(());
        };
        let frame_index = self.renderer.frame_index();
        let cmd = CommandBuffer::from_handle(self.context.device().clone(), handle);

        let mut frame = FrameInfo {
            frame_index,
            frame_time: dt,
            command_buffer: &cmd,
            camera,
            global_descriptor_set: self.global_sets[frame_index],
            game_objects: &mut self.game_objects,
        };

        let mut ubo = GlobalUbo {
            projection: camera.projection(),
            view: camera.view(),
            inverse_view: camera.inverse_view(),
            ..GlobalUbo::default()
        };
        self.point_light_system.update(&mut frame, &mut ubo);
        self.ubo_buffer
            .write_to_index(bytemuck::bytes_of(&ubo), frame_index as u32)?;
        self.ubo_buffer.flush_index(frame_index as u32)?;

        self.renderer.begin_swapchain_render_pass(handle);
        self.mesh_system.render(&frame);
        match &self.cloud {
            Some(CloudDrawable::Points(cloud)) => self.point_cloud_system.render(&frame, cloud),
            Some(CloudDrawable::Ellipsoids(ellipsoids)) => {
                self.ellipsoid_system.render(&frame, ellipsoids)
            }
            None => {}
        }
        self.point_light_system.render(&frame);
        self.renderer.end_swapchain_render_pass(handle);

        self.renderer.end_frame()?;
        Ok(())
    }
}

/// Uploads the splats that pass `filter`, or `None` if the filter drops all of them.
fn upload_cloud(
    device: &Arc<Device>,
    points: &[SplatPoint],
    filter: &SplatFilter,
    mode: CloudMode,
) -> Result<Option<CloudDrawable>> {
    let drawable = match mode {
        CloudMode::Points => {
            let kept = filter_points(points, filter);
            if kept.is_empty() {
                warn!("Splat filter dropped every point");
                return Ok(None);
            }
            CloudDrawable::Points(PointCloud::new(device, &kept)?)
        }
        CloudMode::Ellipsoids => {
            let streams = SplatStreams::extract(points, filter);
            if streams.is_empty() {
                warn!("Splat filter dropped every point");
                return Ok(None);
            }
            CloudDrawable::Ellipsoids(Ellipsoids::new(device, &streams)?)
        }
    };
    Ok(Some(drawable))
}

/// A cube at the origin and a ring of coloured point lights around it.
fn build_scene(device: &Arc<Device>) -> Result<GameObjectMap<Model>> {
    let mut game_objects = GameObjectMap::new();

    let cube = Arc::new(Model::new(device, &MeshData::cube(Vec3::ZERO))?);
    let object = game_objects.create();
    object.model = Some(cube);
    object.transform.translation = Vec3::new(0.0, 0.5, 0.0);
    object.transform.scale = Vec3::splat(0.25);

    let light_colors = [
        Vec3::new(1.0, 0.1, 0.1),
        Vec3::new(0.1, 0.1, 1.0),
        Vec3::new(0.1, 1.0, 0.1),
        Vec3::new(1.0, 1.0, 0.1),
        Vec3::new(0.1, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
    ];
    for (i, color) in light_colors.iter().enumerate() {
        let angle = i as f32 * std::f32::consts::TAU / light_colors.len() as f32;
        let light = game_objects.create_point_light(0.2, 0.1, *color);
        light.transform.translation = Vec3::new(angle.sin(), -1.0, angle.cos());
    }

    Ok(game_objects)
}

struct App {
    config: RendererConfig,
    mode: CloudMode,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    input: InputTracker,
    timer: FrameTimer,
    camera: Camera,
    viewer: TransformComponent,
    controller: KeyboardMovementController,
    /// Fatal error that ended the event loop.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig, mode: CloudMode) -> Self {
        let controller = KeyboardMovementController::new(config.move_speed, config.look_speed);
        Self {
            config,
            mode,
            window: None,
            gpu: None,
            input: InputTracker::new(),
            timer: FrameTimer::new(),
            camera: Camera::new(),
            viewer: TransformComponent::from_translation(Vec3::new(0.0, 0.0, 2.5)),
            controller,
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(Window::new(
            event_loop,
            self.config.width,
            self.config.height,
            &self.config.title,
        )?);
        let gpu = Gpu::new(window.clone(), &self.config, self.mode)
            .context("Failed to initialize renderer")?;

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.timer.reset();
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(e) = gpu.context.device().wait_idle() {
                error!("Failed to wait for device idle: {}", e);
            }
            drop(gpu);
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("{:#}", e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = &self.window {
                    window.notify_resized();
                }
            }
            WindowEvent::RedrawRequested => {
                let dt = self.timer.tick();
                let input = self.input.snapshot();
                self.controller
                    .move_in_plane_xz(&input, dt, &mut self.viewer);

                if let Some(gpu) = &mut self.gpu
                    && let Err(e) = gpu.draw_frame(&mut self.camera, &self.viewer, dt)
                {
                    error!("Render error: {:#}", e);
                    self.failure = Some(e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    starlight_core::init_logging(args.log_level.filter());
    info!("Starting Starlight");

    let mode = args.mode;
    let config = args.into_config();
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, mode);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
