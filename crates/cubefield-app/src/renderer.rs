//! Frame driver for the cube grid and heightmap scenes.
//!
//! [`CubeGridRenderer`] owns the regeneration pipeline, the camera and the
//! accumulated model rotation. The host calls the three surface callbacks on
//! the render thread and the request operations from anywhere it holds the
//! renderer.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use cubefield_config::{Config, Scene};
use cubefield_mesh::{DEFAULT_SIZE_PER_SIDE, GridFactor, LayoutStrategy, generate_height_map};
use cubefield_render::{
    ErrorHandler, ErrorType, FrameUniforms, GpuBufferApi, HeightMap, Program, StorageStrategy,
};
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::input::RotationDeltas;
use crate::pipeline::{GenerationRequest, RegenerationPipeline};

const EYE: Vec3 = Vec3::new(0.0, 0.0, -0.5);
const LOOK_AT: Vec3 = Vec3::new(0.0, 0.0, -5.0);
const NEAR: f32 = 1.0;
const FAR: f32 = 1000.0;

/// Where a scene puts its model and its light, in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SceneLayout {
    model_translation: Vec3,
    light_position: Vec3,
}

impl SceneLayout {
    fn for_scene(scene: Scene) -> Self {
        match scene {
            Scene::Cubes => Self {
                model_translation: Vec3::new(0.0, 0.0, -3.5),
                light_position: Vec3::new(0.0, 0.0, -1.0),
            },
            Scene::HeightMap => Self {
                model_translation: Vec3::new(0.0, 0.0, -12.0),
                light_position: Vec3::new(0.0, 7.5, -8.0),
            },
        }
    }
}

/// Drives one scene: regeneration requests, rotation input and per-frame
/// uniforms.
pub struct CubeGridRenderer {
    scene: Scene,
    layout: SceneLayout,
    pipeline: RegenerationPipeline,
    height_map: Option<HeightMap>,
    height_map_size: u32,
    error_handler: Arc<dyn ErrorHandler>,
    rotation_input: Arc<RotationDeltas>,
    accumulated_rotation: Mat4,
    view: Mat4,
    projection: Mat4,
    uniforms: FrameUniforms,
    initial_grid_factor: GridFactor,
    min_grid_factor: GridFactor,
    max_grid_factor: GridFactor,
    last_requested: Option<GridFactor>,
}

impl CubeGridRenderer {
    /// Create the renderer and start its generator thread.
    pub fn new(config: &Config, error_handler: Arc<dyn ErrorHandler>) -> Result<Self, PipelineError> {
        let generation = &config.generation;
        let pipeline = RegenerationPipeline::new(
            StorageStrategy::from_vbo_flag(generation.use_vbos),
            LayoutStrategy::from_stride_flag(generation.use_stride),
            generation.coalesce_requests,
            Arc::clone(&error_handler),
        )?;

        let min_grid_factor = clamp_grid_factor(generation.min_grid_factor);
        let max_grid_factor = clamp_grid_factor(generation.max_grid_factor).max(min_grid_factor);

        Ok(Self {
            scene: config.render.scene,
            layout: SceneLayout::for_scene(config.render.scene),
            pipeline,
            height_map: None,
            height_map_size: config.render.height_map_size,
            error_handler,
            rotation_input: Arc::new(RotationDeltas::new()),
            accumulated_rotation: Mat4::IDENTITY,
            view: Mat4::look_at_rh(EYE, LOOK_AT, Vec3::Y),
            projection: projection(config.surface.width, config.surface.height),
            uniforms: FrameUniforms::default(),
            initial_grid_factor: clamp_grid_factor(generation.clamped_initial_grid_factor())
                .clamp(min_grid_factor, max_grid_factor),
            min_grid_factor,
            max_grid_factor,
            last_requested: None,
        })
    }

    /// Surface (re)created: request the first lattice, or upload the
    /// heightmap for that scene.
    pub fn on_surface_created(&mut self, gpu: &mut dyn GpuBufferApi) {
        match self.scene {
            Scene::Cubes => {
                self.request(GenerationRequest::resize(self.initial_grid_factor));
            }
            Scene::HeightMap => {
                if let Some(mut previous) = self.height_map.take() {
                    previous.release(gpu);
                }
                let size = u16::try_from(self.height_map_size).unwrap_or_else(|_| {
                    warn!(
                        size = self.height_map_size,
                        "Heightmap size out of range, using {DEFAULT_SIZE_PER_SIDE}"
                    );
                    DEFAULT_SIZE_PER_SIDE
                });
                match generate_height_map(size) {
                    Ok(mesh) => {
                        let map = HeightMap::build(gpu, &mesh, self.error_handler.as_ref());
                        if map.is_usable() {
                            info!(size, indices = map.index_count(), "Heightmap uploaded");
                        }
                        self.height_map = Some(map);
                    }
                    Err(e) => {
                        error!("Failed to generate heightmap: {e}");
                        self.error_handler
                            .handle_error(ErrorType::BufferCreationError, &e.to_string());
                    }
                }
            }
        }
    }

    /// Surface resized: rebuild the projection for the new aspect ratio.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        self.projection = projection(width, height);
        debug!(width, height, "Projection updated");
    }

    /// Draw one frame. Finished generations are swapped in first.
    pub fn on_draw_frame(&mut self, gpu: &mut dyn GpuBufferApi) {
        gpu.begin_frame();

        if self.scene == Scene::Cubes {
            self.pipeline.poll(gpu);
        }

        let (dx, dy) = self.rotation_input.take();
        let current = Mat4::from_rotation_y(dx.to_radians()) * Mat4::from_rotation_x(dy.to_radians());
        self.accumulated_rotation = current * self.accumulated_rotation;

        let model = Mat4::from_translation(self.layout.model_translation) * self.accumulated_rotation;
        let mv = self.view * model;
        let light = self.view * Vec4::from((self.layout.light_position, 1.0));
        self.uniforms = FrameUniforms {
            mvp: self.projection * mv,
            mv,
            light_pos_eye: light.truncate(),
        };
        gpu.set_frame_uniforms(&self.uniforms);

        match self.scene {
            Scene::Cubes => {
                gpu.use_program(Some(Program::Cubes));
                self.pipeline.render(gpu);
            }
            Scene::HeightMap => {
                gpu.use_program(Some(Program::HeightMap));
                if let Some(map) = &self.height_map {
                    map.render(gpu);
                }
            }
        }

        gpu.end_frame();
    }

    /// Request one more cube per axis. Does nothing at the upper bound.
    pub fn increase_cube_count(&mut self) -> bool {
        let current = self.current_request_factor();
        if current >= self.max_grid_factor {
            return false;
        }
        match GridFactor::new(current.get() + 1) {
            Some(next) => self.request(GenerationRequest::resize(next)),
            None => false,
        }
    }

    /// Request one fewer cube per axis. Does nothing at the lower bound.
    pub fn decrease_cube_count(&mut self) -> bool {
        let current = self.current_request_factor();
        if current <= self.min_grid_factor {
            return false;
        }
        match GridFactor::new(current.get() - 1) {
            Some(next) => self.request(GenerationRequest::resize(next)),
            None => false,
        }
    }

    /// Regenerate at the current size with storage flipped.
    pub fn toggle_vbos(&mut self) -> bool {
        self.request(GenerationRequest {
            grid_factor: self.current_request_factor(),
            toggle_vbos: true,
            toggle_stride: false,
        })
    }

    /// Regenerate at the current size with layout flipped.
    pub fn toggle_stride(&mut self) -> bool {
        self.request(GenerationRequest {
            grid_factor: self.current_request_factor(),
            toggle_vbos: false,
            toggle_stride: true,
        })
    }

    fn current_request_factor(&self) -> GridFactor {
        self.last_requested.unwrap_or(self.initial_grid_factor)
    }

    fn request(&mut self, request: GenerationRequest) -> bool {
        if self.scene != Scene::Cubes {
            debug!(?request, "Ignoring cube request in heightmap scene");
            return false;
        }
        let queued = self.pipeline.submit(request);
        if queued {
            self.last_requested = Some(request.grid_factor);
        }
        queued
    }

    /// Adopt the live-reloadable parts of a reloaded config: grid factor
    /// bounds and request coalescing. Scene, surface and strategy flags only
    /// apply at startup.
    pub fn apply_config(&mut self, config: &Config) {
        let generation = &config.generation;
        self.min_grid_factor = clamp_grid_factor(generation.min_grid_factor);
        self.max_grid_factor = clamp_grid_factor(generation.max_grid_factor).max(self.min_grid_factor);
        self.pipeline.set_coalescing(generation.coalesce_requests);
        if config.render.scene != self.scene {
            warn!(scene = ?config.render.scene, "Scene change needs a restart");
        }
        info!(
            min = %self.min_grid_factor,
            max = %self.max_grid_factor,
            coalesce = generation.coalesce_requests,
            "Applied reloaded config"
        );
    }

    /// Shared handle for an input thread to feed drag deltas into.
    pub fn rotation_input(&self) -> Arc<RotationDeltas> {
        Arc::clone(&self.rotation_input)
    }

    pub fn pipeline(&self) -> &RegenerationPipeline {
        &self.pipeline
    }

    pub fn scene(&self) -> Scene {
        self.scene
    }

    pub fn height_map(&self) -> Option<&HeightMap> {
        self.height_map.as_ref()
    }

    /// Uniforms computed by the last frame.
    pub fn frame_uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    pub fn accumulated_rotation(&self) -> Mat4 {
        self.accumulated_rotation
    }

    /// Grid factor of the most recent queued request.
    pub fn last_requested(&self) -> Option<GridFactor> {
        self.last_requested
    }

    /// Release every GPU buffer the renderer owns. Call on the render thread
    /// before the context is destroyed.
    pub fn release(&mut self, gpu: &mut dyn GpuBufferApi) {
        self.pipeline.release_active(gpu);
        if let Some(mut map) = self.height_map.take() {
            map.release(gpu);
        }
    }

    /// Stop the generator thread after it finishes queued requests.
    pub fn shutdown(&mut self) {
        self.pipeline.shutdown();
    }
}

fn clamp_grid_factor(n: u32) -> GridFactor {
    GridFactor::new(n.clamp(GridFactor::MIN.get(), GridFactor::MAX.get())).unwrap_or(GridFactor::MIN)
}

/// 90° vertical field of view, near plane 1, far plane 1000.
fn projection(width: u32, height: u32) -> Mat4 {
    let aspect = if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    };
    Mat4::perspective_rh(FRAC_PI_2, aspect, NEAR, FAR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubefield_render::{HeadlessGpu, LoggingErrorHandler};

    fn renderer(scene: Scene) -> CubeGridRenderer {
        let mut config = Config::default();
        config.render.scene = scene;
        config.render.height_map_size = 8;
        CubeGridRenderer::new(&config, Arc::new(LoggingErrorHandler)).unwrap()
    }

    #[test]
    fn test_clamp_grid_factor() {
        assert_eq!(clamp_grid_factor(0), GridFactor::MIN);
        assert_eq!(clamp_grid_factor(99), GridFactor::MAX);
        assert_eq!(clamp_grid_factor(7).get(), 7);
    }

    #[test]
    fn test_projection_handles_zero_height() {
        let m = projection(640, 0);
        assert!(m.is_finite());
    }

    #[test]
    fn test_light_in_eye_space() {
        let mut r = renderer(Scene::Cubes);
        let mut gpu = HeadlessGpu::new();
        r.on_draw_frame(&mut gpu);
        // Eye at z = -0.5 looking down -Z: the light at z = -1 sits 0.5 ahead.
        let light = r.frame_uniforms().light_pos_eye;
        assert!((light - Vec3::new(0.0, 0.0, -0.5)).length() < 1e-5);
        assert_eq!(gpu.uniforms(), Some(r.frame_uniforms()));
        assert_eq!(gpu.program(), Some(Program::Cubes));
    }

    #[test]
    fn test_apply_config_updates_bounds_and_coalescing() {
        let mut r = renderer(Scene::Cubes);
        assert!(!r.pipeline().coalesces());

        let mut config = Config::default();
        config.generation.max_grid_factor = 3;
        config.generation.coalesce_requests = true;
        r.apply_config(&config);

        assert!(r.pipeline().coalesces());
        // Initial factor 3 now sits at the upper bound.
        assert!(!r.increase_cube_count());
        assert!(r.decrease_cube_count());
        assert_eq!(r.last_requested(), Some(GridFactor::new(2).unwrap()));
        r.shutdown();
    }

    #[test]
    fn test_height_map_scene_uploads_on_surface_created() {
        let mut r = renderer(Scene::HeightMap);
        let mut gpu = HeadlessGpu::new();
        r.on_surface_created(&mut gpu);
        assert!(r.height_map().is_some_and(HeightMap::is_usable));
        assert!(!r.increase_cube_count());

        r.on_draw_frame(&mut gpu);
        assert_eq!(gpu.frame_draws().len(), 1);
        assert_eq!(gpu.program(), Some(Program::HeightMap));

        r.release(&mut gpu);
        assert_eq!(gpu.live_buffer_count(), 0);
    }
}
