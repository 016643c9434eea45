//! GPU-resident heightmap: one vertex buffer, one index buffer.

use cubefield_mesh::{
    BYTES_PER_FLOAT, COLOR_DATA_SIZE, HEIGHT_MAP_STRIDE_BYTES, HeightMapMesh, NORMAL_DATA_SIZE,
    POSITION_DATA_SIZE,
};

use crate::error::{ErrorHandler, ErrorType, RenderError};
use crate::gpu::{
    AttributeBinding, BufferHandle, BufferTarget, DrawCall, GpuBufferApi, Primitive,
    VertexSource,
};
use crate::storage::gen_buffers;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeightMapBuffers {
    vbo: BufferHandle,
    ibo: BufferHandle,
}

/// Uploaded heightmap. Unusable when construction failed; rendering an
/// unusable map does nothing.
#[derive(Debug)]
pub struct HeightMap {
    buffers: Option<HeightMapBuffers>,
    index_count: u32,
}

impl HeightMap {
    /// Upload `mesh`. Failures are reported to `error_handler` as
    /// [`ErrorType::BufferCreationError`] and produce an unusable map.
    pub fn build(
        gpu: &mut dyn GpuBufferApi,
        mesh: &HeightMapMesh,
        error_handler: &dyn ErrorHandler,
    ) -> Self {
        match upload(gpu, mesh) {
            Ok(buffers) => Self {
                buffers: Some(buffers),
                index_count: mesh.index_count() as u32,
            },
            Err(e) => {
                log::error!("Error while building heightmap: {e}");
                error_handler.handle_error(ErrorType::BufferCreationError, &e.to_string());
                Self {
                    buffers: None,
                    index_count: 0,
                }
            }
        }
    }

    pub fn is_usable(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Draw the indexed triangle strip with the bound program.
    pub fn render(&self, gpu: &mut dyn GpuBufferApi) {
        let Some(HeightMapBuffers { vbo, ibo }) = self.buffers else {
            return;
        };
        let Some(program) = gpu.attribute_locations() else {
            log::warn!("No program bound, skipping heightmap draw");
            return;
        };

        let strided = |location, components: usize, offset: usize| AttributeBinding {
            location,
            components: components as u32,
            stride: HEIGHT_MAP_STRIDE_BYTES as u32,
            offset: (offset * BYTES_PER_FLOAT) as u32,
            source: VertexSource::Buffer(vbo),
        };
        let mut bindings = vec![strided(program.position, POSITION_DATA_SIZE, 0)];
        if let Some(location) = program.normal {
            bindings.push(strided(location, NORMAL_DATA_SIZE, POSITION_DATA_SIZE));
        }
        if let Some(location) = program.color {
            bindings.push(strided(
                location,
                COLOR_DATA_SIZE,
                POSITION_DATA_SIZE + NORMAL_DATA_SIZE,
            ));
        }

        let call = DrawCall {
            primitive: Primitive::TriangleStrip,
            attributes: &bindings,
            count: self.index_count,
            indices: Some(ibo),
        };
        if let Err(e) = gpu.draw(&call) {
            log::warn!("Heightmap draw failed: {e}");
        }
    }

    /// Delete both buffers. Safe to call more than once.
    pub fn release(&mut self, gpu: &mut dyn GpuBufferApi) {
        if let Some(HeightMapBuffers { vbo, ibo }) = self.buffers.take() {
            gpu.delete_buffers(&[vbo, ibo]);
        }
    }
}

fn upload(gpu: &mut dyn GpuBufferApi, mesh: &HeightMapMesh) -> Result<HeightMapBuffers, RenderError> {
    let [vbo, ibo] = gen_buffers::<2>(gpu, "heightmap")?;

    let result = gpu
        .buffer_data(
            BufferTarget::Array,
            vbo,
            bytemuck::cast_slice(mesh.vertices()),
        )
        .map_err(|e| RenderError::upload("heightmap vertices", e))
        .and_then(|()| {
            gpu.buffer_data(
                BufferTarget::ElementArray,
                ibo,
                bytemuck::cast_slice(mesh.indices()),
            )
            .map_err(|e| RenderError::upload("heightmap indices", e))
        });

    match result {
        Ok(()) => Ok(HeightMapBuffers { vbo, ibo }),
        Err(e) => {
            gpu.delete_buffers(&[vbo, ibo]);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Program;
    use crate::headless::HeadlessGpu;
    use cubefield_mesh::generate_height_map;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler(Mutex<Vec<ErrorType>>);

    impl ErrorHandler for RecordingHandler {
        fn handle_error(&self, error_type: ErrorType, _cause: &str) {
            self.0.lock().unwrap().push(error_type);
        }
    }

    #[test]
    fn test_build_and_render_strip() {
        let mesh = generate_height_map(8).unwrap();
        let handler = RecordingHandler::default();
        let mut gpu = HeadlessGpu::new();
        gpu.use_program(Some(Program::HeightMap));

        let mut map = HeightMap::build(&mut gpu, &mesh, &handler);
        assert!(map.is_usable());
        assert_eq!(gpu.live_buffer_count(), 2);

        gpu.begin_frame();
        map.render(&mut gpu);
        let draw = &gpu.frame_draws()[0];
        assert_eq!(draw.primitive, Primitive::TriangleStrip);
        assert_eq!(draw.vertex_count, mesh.index_count());
        // Colour stream of the first strip vertex is vertex 0's colour.
        assert_eq!(&draw.attributes[&2][..4], &mesh.vertex(0).unwrap()[6..]);

        map.release(&mut gpu);
        map.release(&mut gpu);
        assert_eq!(gpu.delete_count(), 2);
        assert_eq!(gpu.invalid_delete_count(), 0);
        assert!(handler.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_generation_failure_reports_once_and_disables_render() {
        let mesh = generate_height_map(4).unwrap();
        let handler = RecordingHandler::default();
        let mut gpu = HeadlessGpu::new();
        gpu.use_program(Some(Program::HeightMap));
        gpu.fail_gen_after(1);

        let map = HeightMap::build(&mut gpu, &mesh, &handler);
        assert!(!map.is_usable());
        assert_eq!(
            *handler.0.lock().unwrap(),
            vec![ErrorType::BufferCreationError]
        );
        assert_eq!(gpu.live_buffer_count(), 0);

        gpu.begin_frame();
        map.render(&mut gpu);
        assert!(gpu.frame_draws().is_empty());
    }

    #[test]
    fn test_upload_failure_reports_buffer_creation() {
        let mesh = generate_height_map(16).unwrap();
        let handler = RecordingHandler::default();
        let mut gpu = HeadlessGpu::new();
        gpu.set_memory_budget(Some(64));

        let map = HeightMap::build(&mut gpu, &mesh, &handler);
        assert!(!map.is_usable());
        assert_eq!(handler.0.lock().unwrap().len(), 1);
        assert_eq!(gpu.live_buffer_count(), 0);
    }
}
