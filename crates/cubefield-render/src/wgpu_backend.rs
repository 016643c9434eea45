//! [`GpuBufferApi`] on a real device, rendering into an offscreen target.
//!
//! Buffer handles map to `wgpu::Buffer`s created on first upload. Host
//! vertex sources are copied into transient vertex buffers on every draw,
//! which is the wgpu equivalent of client-side arrays. Render pipelines are
//! built lazily per attribute layout and cached.

use std::collections::HashMap;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::{
    BufferHandle, BufferTarget, DrawCall, FrameUniforms, GpuBufferApi, GpuError, Primitive,
    Program, ProgramAttributes, VertexSource,
};

/// WGSL for [`Program::Cubes`].
pub const CUBES_SHADER_SOURCE: &str = include_str!("cubes.wgsl");
/// WGSL for [`Program::HeightMap`].
pub const HEIGHT_MAP_SHADER_SOURCE: &str = include_str!("height_map.wgsl");

/// Error type for device initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum WgpuInitError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Error type for reading back the offscreen target.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("readback callback dropped")]
    Disconnected,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FrameUniformData {
    mvp: [[f32; 4]; 4],
    mv: [[f32; 4]; 4],
    light_pos: [f32; 4],
}

impl From<&FrameUniforms> for FrameUniformData {
    fn from(uniforms: &FrameUniforms) -> Self {
        Self {
            mvp: uniforms.mvp.to_cols_array_2d(),
            mv: uniforms.mv.to_cols_array_2d(),
            light_pos: uniforms.light_pos_eye.extend(1.0).to_array(),
        }
    }
}

const FRAME_UNIFORM_SIZE: u64 = std::mem::size_of::<FrameUniformData>() as u64;

#[derive(Debug)]
struct StoredBuffer {
    buffer: wgpu::Buffer,
    target: BufferTarget,
}

/// Attribute layout of one vertex buffer slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SlotLayout {
    stride: u64,
    /// `(location, components, offset)`.
    attributes: Vec<(u32, u32, u64)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: Program,
    primitive: Primitive,
    slots: Vec<SlotLayout>,
}

/// Identity of a vertex source, used to group attributes into slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceKey {
    Host(usize, usize),
    Buffer(BufferHandle),
}

impl SourceKey {
    fn of(source: &VertexSource<'_>) -> Self {
        match source {
            VertexSource::Host(floats) => SourceKey::Host(floats.as_ptr() as usize, floats.len()),
            VertexSource::Buffer(handle) => SourceKey::Buffer(*handle),
        }
    }
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    cleared: bool,
}

/// Offscreen wgpu backend.
pub struct WgpuGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    clear_color: wgpu::Color,
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    pipeline_layout: wgpu::PipelineLayout,
    cube_shader: wgpu::ShaderModule,
    height_map_shader: wgpu::ShaderModule,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    buffers: HashMap<BufferHandle, Option<StoredBuffer>>,
    next_handle: u32,
    program: Option<Program>,
    frame: Option<Frame>,
}

impl WgpuGpu {
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Block on [`WgpuGpu::new_async`].
    pub fn new(width: u32, height: u32, clear_color: [f32; 4]) -> Result<Self, WgpuInitError> {
        pollster::block_on(Self::new_async(width, height, clear_color))
    }

    /// Pick an adapter, open a device and allocate a `width × height` target.
    pub async fn new_async(
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    ) -> Result<Self, WgpuInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| WgpuInitError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("cubefield-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self::from_device(device, queue, width, height, clear_color))
    }

    /// Build on an existing device.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let (color_texture, color_view, depth_view) = create_targets(&device, width, height);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniforms"),
            size: FRAME_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bind-group-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(FRAME_UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cubefield-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let cube_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cubes-shader"),
            source: wgpu::ShaderSource::Wgsl(CUBES_SHADER_SOURCE.into()),
        });
        let height_map_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("height-map-shader"),
            source: wgpu::ShaderSource::Wgsl(HEIGHT_MAP_SHADER_SOURCE.into()),
        });

        let [r, g, b, a] = clear_color.map(f64::from);

        Self {
            device,
            queue,
            width,
            height,
            clear_color: wgpu::Color { r, g, b, a },
            color_texture,
            color_view,
            depth_view,
            uniform_buffer,
            uniform_bind_group,
            pipeline_layout,
            cube_shader,
            height_map_shader,
            pipelines: HashMap::new(),
            buffers: HashMap::new(),
            next_handle: 1,
            program: None,
            frame: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reallocate the offscreen target. Any frame in progress is submitted first.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.end_frame();
        let (color_texture, color_view, depth_view) = create_targets(&self.device, width, height);
        self.color_texture = color_texture;
        self.color_view = color_view;
        self.depth_view = depth_view;
        self.width = width;
        self.height = height;
        log::debug!("Resized offscreen target to {width}x{height}");
    }

    /// Buffers with a live handle.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Copy the color target to host memory as tightly packed RGBA8 rows.
    pub fn read_pixels(&mut self) -> Result<Vec<u8>, ReadbackError> {
        self.end_frame();

        let bytes_per_pixel = 4u32;
        let unpadded = self.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixel-readback"),
            size: u64::from(padded * self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixel-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        rx.recv().map_err(|_| ReadbackError::Disconnected)??;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        for row in 0..self.height {
            let start = (row * padded) as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded as usize]);
        }
        drop(mapped);
        readback.unmap();

        Ok(pixels)
    }

    fn ensure_frame(&mut self) -> &mut Frame {
        let device = &self.device;
        self.frame.get_or_insert_with(|| Frame {
            encoder: device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            }),
            cleared: false,
        })
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let pipeline = self.create_pipeline(key);
        log::debug!(
            "Created {:?} pipeline for {} vertex buffer slot(s)",
            key.program,
            key.slots.len()
        );
        self.pipelines.insert(key.clone(), pipeline);
    }

    fn create_pipeline(&self, key: &PipelineKey) -> wgpu::RenderPipeline {
        let shader = match key.program {
            Program::Cubes => &self.cube_shader,
            Program::HeightMap => &self.height_map_shader,
        };

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .slots
            .iter()
            .map(|slot| {
                slot.attributes
                    .iter()
                    .map(|&(location, components, offset)| wgpu::VertexAttribute {
                        format: float_format(components).unwrap_or(wgpu::VertexFormat::Float32x4),
                        offset,
                        shader_location: location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .slots
            .iter()
            .zip(&attributes)
            .map(|(slot, attributes)| wgpu::VertexBufferLayout {
                array_stride: slot.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let (topology, strip_index_format) = match key.primitive {
            Primitive::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
            Primitive::TriangleStrip => (
                wgpu::PrimitiveTopology::TriangleStrip,
                Some(wgpu::IndexFormat::Uint16),
            ),
        };

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cubefield-pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: Self::DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: Self::COLOR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
    }

    fn stored(&self, handle: BufferHandle) -> Result<&StoredBuffer, GpuError> {
        match self.buffers.get(&handle) {
            Some(Some(stored)) => Ok(stored),
            Some(None) => Err(GpuError::EmptyBuffer(handle)),
            None => Err(GpuError::UnknownBuffer(handle)),
        }
    }

    fn clear_pass(&mut self) {
        let clear_color = self.clear_color;
        let Self {
            frame,
            color_view,
            depth_view,
            ..
        } = self;
        let Some(frame) = frame.as_mut() else {
            return;
        };
        let pass = begin_pass(
            &mut frame.encoder,
            color_view,
            depth_view,
            Some(clear_color),
        );
        drop(pass);
        frame.cleared = true;
    }
}

impl GpuBufferApi for WgpuGpu {
    fn gen_buffer(&mut self) -> Option<BufferHandle> {
        let handle = BufferHandle::new(self.next_handle)?;
        self.next_handle = self.next_handle.checked_add(1)?;
        self.buffers.insert(handle, None);
        Some(handle)
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        handle: BufferHandle,
        data: &[u8],
    ) -> Result<(), GpuError> {
        if !self.buffers.contains_key(&handle) {
            return Err(GpuError::UnknownBuffer(handle));
        }
        let max = self.device.limits().max_buffer_size;
        if data.len() as u64 > max {
            return Err(GpuError::OutOfMemory {
                requested: data.len() as u64,
                available: max,
            });
        }

        let usage = match target {
            BufferTarget::Array => wgpu::BufferUsages::VERTEX,
            BufferTarget::ElementArray => wgpu::BufferUsages::INDEX,
        };
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match target {
                    BufferTarget::Array => "cubefield-vertices",
                    BufferTarget::ElementArray => "cubefield-indices",
                }),
                contents: data,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        if let Some(error) = pollster::block_on(scope.pop()) {
            buffer.destroy();
            return Err(GpuError::AllocationFailed {
                requested: data.len() as u64,
                message: error.to_string(),
            });
        }
        self.buffers
            .insert(handle, Some(StoredBuffer { buffer, target }));
        Ok(())
    }

    fn delete_buffers(&mut self, handles: &[BufferHandle]) {
        for handle in handles {
            match self.buffers.remove(handle) {
                Some(Some(stored)) => stored.buffer.destroy(),
                Some(None) => {}
                None => log::warn!("Deleting buffer {handle} that is not live"),
            }
        }
    }

    fn use_program(&mut self, program: Option<Program>) {
        self.program = program;
    }

    fn attribute_locations(&self) -> Option<ProgramAttributes> {
        self.program.map(ProgramAttributes::for_program)
    }

    fn set_frame_uniforms(&mut self, uniforms: &FrameUniforms) {
        let data = FrameUniformData::from(uniforms);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[data]));
    }

    fn begin_frame(&mut self) {
        self.ensure_frame();
    }

    fn end_frame(&mut self) {
        if self.frame.as_ref().is_some_and(|f| !f.cleared) {
            self.clear_pass();
        }
        if let Some(frame) = self.frame.take() {
            self.queue.submit([frame.encoder.finish()]);
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), GpuError> {
        let program = self.program.ok_or(GpuError::NoProgram)?;
        if call.count == 0 {
            return Ok(());
        }

        // Group attributes that read from the same source into one slot.
        let mut sources: Vec<(SourceKey, VertexSource<'_>)> = Vec::new();
        let mut slots: Vec<SlotLayout> = Vec::new();
        for binding in call.attributes {
            let key = SourceKey::of(&binding.source);
            let stride = u64::from(binding.effective_stride());
            let attribute = (binding.location, binding.components, u64::from(binding.offset));
            let existing = sources
                .iter()
                .zip(&slots)
                .position(|((k, _), slot)| *k == key && slot.stride == stride);
            match existing {
                Some(i) => slots[i].attributes.push(attribute),
                None => {
                    sources.push((key, binding.source));
                    slots.push(SlotLayout {
                        stride,
                        attributes: vec![attribute],
                    });
                }
            }
            float_format(binding.components)?;
        }

        let mut vertex_buffers = Vec::with_capacity(sources.len());
        for (_, source) in &sources {
            let buffer = match source {
                VertexSource::Host(floats) => {
                    if floats.is_empty() {
                        return Ok(());
                    }
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("client-side-vertices"),
                            contents: bytemuck::cast_slice(floats),
                            usage: wgpu::BufferUsages::VERTEX,
                        })
                }
                VertexSource::Buffer(handle) => {
                    let stored = self.stored(*handle)?;
                    if stored.target != BufferTarget::Array || stored.buffer.size() == 0 {
                        return Err(GpuError::EmptyBuffer(*handle));
                    }
                    stored.buffer.clone()
                }
            };
            vertex_buffers.push(buffer);
        }
        let index_buffer = match call.indices {
            Some(handle) => {
                let stored = self.stored(handle)?;
                if stored.buffer.size() == 0 {
                    return Err(GpuError::EmptyBuffer(handle));
                }
                Some(stored.buffer.clone())
            }
            None => None,
        };

        let key = PipelineKey {
            program,
            primitive: call.primitive,
            slots,
        };
        self.ensure_pipeline(&key);
        self.ensure_frame();

        let clear_color = self.clear_color;
        let Self {
            frame,
            color_view,
            depth_view,
            uniform_bind_group,
            pipelines,
            ..
        } = self;
        let (Some(frame), Some(pipeline)) = (frame.as_mut(), pipelines.get(&key)) else {
            return Ok(());
        };

        let clear = (!frame.cleared).then_some(clear_color);
        {
            let mut pass = begin_pass(&mut frame.encoder, color_view, depth_view, clear);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &*uniform_bind_group, &[]);
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            match &index_buffer {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(0..call.count, 0, 0..1);
                }
                None => pass.draw(0..call.count, 0..1),
            }
        }
        frame.cleared = true;
        Ok(())
    }
}

fn float_format(components: u32) -> Result<wgpu::VertexFormat, GpuError> {
    match components {
        1 => Ok(wgpu::VertexFormat::Float32),
        2 => Ok(wgpu::VertexFormat::Float32x2),
        3 => Ok(wgpu::VertexFormat::Float32x3),
        4 => Ok(wgpu::VertexFormat::Float32x4),
        components => Err(GpuError::UnsupportedComponents(components)),
    }
}

fn begin_pass<'encoder>(
    encoder: &'encoder mut wgpu::CommandEncoder,
    color_view: &'encoder wgpu::TextureView,
    depth_view: &'encoder wgpu::TextureView,
    clear: Option<wgpu::Color>,
) -> wgpu::RenderPass<'encoder> {
    let (color_load, depth_load) = match clear {
        Some(color) => (wgpu::LoadOp::Clear(color), wgpu::LoadOp::Clear(1.0)),
        None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
    };
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("cubefield-pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

fn create_targets(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen-color"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: WgpuGpu::COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen-depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: WgpuGpu::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
    (color, color_view, depth_view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube_set::CubeSet;
    use crate::storage::StorageStrategy;
    use cubefield_mesh::{GridFactor, LayoutStrategy, generate_cube_grid};
    use glam::{Mat4, Vec3};

    const SIZE: u32 = 64;

    fn create_test_gpu() -> Option<WgpuGpu> {
        WgpuGpu::new(SIZE, SIZE, [0.0, 0.0, 0.0, 1.0]).ok()
    }

    fn lesson_uniforms() -> FrameUniforms {
        let view = Mat4::look_at_rh(
            Vec3::new(0.0, 0.0, -0.5),
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::Y,
        );
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 1000.0);
        let model = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.5));
        let mv = view * model;
        FrameUniforms {
            mvp: projection * mv,
            mv,
            light_pos_eye: (mv * Vec3::new(0.0, 0.0, -1.0).extend(1.0)).truncate(),
        }
    }

    #[test]
    fn test_uniform_layout_size() {
        assert_eq!(FRAME_UNIFORM_SIZE, 144);
    }

    #[test]
    fn test_float_formats() {
        assert_eq!(float_format(3).unwrap(), wgpu::VertexFormat::Float32x3);
        assert!(float_format(5).is_err());
    }

    #[test]
    fn test_empty_frame_clears_to_color() {
        let Some(mut gpu) = create_test_gpu() else {
            return;
        };
        gpu.begin_frame();
        gpu.end_frame();
        let pixels = gpu.read_pixels().unwrap();
        assert_eq!(pixels.len(), (SIZE * SIZE * 4) as usize);
        assert!(pixels.chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
    }

    #[test]
    fn test_storage_strategies_render_identical_pixels() {
        let Some(mut gpu) = create_test_gpu() else {
            return;
        };
        gpu.use_program(Some(Program::Cubes));
        gpu.set_frame_uniforms(&lesson_uniforms());
        let attrs = generate_cube_grid(GridFactor::new(2).unwrap()).unwrap();

        let mut images = Vec::new();
        for layout in [LayoutStrategy::Separate, LayoutStrategy::Interleaved] {
            for storage in [StorageStrategy::ClientSide, StorageStrategy::ServerSide] {
                let mut set = CubeSet::build(&mut gpu, &attrs, layout, storage).unwrap();
                gpu.begin_frame();
                set.render(&mut gpu);
                gpu.end_frame();
                images.push(gpu.read_pixels().unwrap());
                set.release(&mut gpu);
            }
        }
        assert!(images[0].chunks_exact(4).any(|p| p != [0, 0, 0, 255]));
        for image in &images[1..] {
            assert_eq!(image, &images[0]);
        }
        assert_eq!(gpu.live_buffer_count(), 0);
    }

    #[test]
    fn test_failed_upload_leaves_device_usable() {
        let Some(mut gpu) = create_test_gpu() else {
            return;
        };
        let max = gpu.device.limits().max_buffer_size;
        if max > 1 << 30 {
            return;
        }
        let handle = gpu.gen_buffer().unwrap();
        let too_large = vec![0u8; (max + 4) as usize];
        let err = gpu
            .buffer_data(BufferTarget::Array, handle, &too_large)
            .unwrap_err();
        assert!(matches!(err, GpuError::OutOfMemory { .. }));
        drop(too_large);

        // Error scopes stay balanced across uploads.
        for _ in 0..3 {
            gpu.buffer_data(BufferTarget::Array, handle, &[0u8; 48])
                .unwrap();
        }
        assert_eq!(gpu.live_buffer_count(), 1);
        gpu.delete_buffers(&[handle]);
        assert_eq!(gpu.live_buffer_count(), 0);
    }

    #[test]
    fn test_resize_changes_readback_size() {
        let Some(mut gpu) = create_test_gpu() else {
            return;
        };
        gpu.resize(32, 16);
        assert_eq!(gpu.size(), (32, 16));
        assert_eq!(gpu.read_pixels().unwrap().len(), 32 * 16 * 4);
    }
}
