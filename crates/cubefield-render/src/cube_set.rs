//! A drawable cube lattice: one layout combined with one storage strategy.

use cubefield_mesh::{
    GridFactor, LayoutStrategy, NORMAL_DATA_SIZE, NORMAL_OFFSET_BYTES, PackedBuffer,
    POSITION_DATA_SIZE, STRIDE_BYTES, TEXTURE_COORDINATE_DATA_SIZE,
    TEXTURE_COORDINATE_OFFSET_BYTES, VertexAttributeSet,
};

use crate::error::RenderError;
use crate::gpu::{
    AttributeBinding, BufferHandle, DrawCall, GpuBufferApi, Primitive, ProgramAttributes,
    VertexSource,
};
use crate::storage::{CubeStorage, ServerBuffers, StorageStrategy};

/// Packed cube geometry ready to draw.
///
/// Owns either host arrays or GPU buffer handles. Call [`CubeSet::release`]
/// before dropping a server-side set, otherwise its buffers leak.
#[derive(Debug)]
pub struct CubeSet {
    grid_factor: GridFactor,
    layout: LayoutStrategy,
    storage_strategy: StorageStrategy,
    storage: Option<CubeStorage>,
}

impl CubeSet {
    /// Pack `attributes` with `layout` and store it per `storage`.
    pub fn build(
        gpu: &mut dyn GpuBufferApi,
        attributes: &VertexAttributeSet,
        layout: LayoutStrategy,
        storage: StorageStrategy,
    ) -> Result<Self, RenderError> {
        let packed = layout.pack(attributes)?;
        let grid_factor = attributes.grid_factor();

        let cube_storage = match storage {
            StorageStrategy::ClientSide => CubeStorage::Client(packed),
            StorageStrategy::ServerSide => CubeStorage::Server(ServerBuffers::upload(gpu, packed)?),
        };

        log::debug!(
            "Built cube set: {} cubes, {layout:?}, {storage:?}",
            grid_factor.cube_count()
        );

        Ok(Self {
            grid_factor,
            layout,
            storage_strategy: cube_storage.strategy(),
            storage: Some(cube_storage),
        })
    }

    pub fn grid_factor(&self) -> GridFactor {
        self.grid_factor
    }

    pub fn layout(&self) -> LayoutStrategy {
        self.layout
    }

    pub fn storage(&self) -> StorageStrategy {
        self.storage_strategy
    }

    pub fn is_released(&self) -> bool {
        self.storage.is_none()
    }

    /// GPU buffers currently owned. Empty for client-side or released sets.
    pub fn buffer_handles(&self) -> Vec<BufferHandle> {
        match &self.storage {
            Some(CubeStorage::Server(buffers)) => buffers.handles(),
            _ => Vec::new(),
        }
    }

    /// Draw every cube as a triangle list with the bound program.
    pub fn render(&self, gpu: &mut dyn GpuBufferApi) {
        let Some(storage) = &self.storage else {
            return;
        };
        let Some(program) = gpu.attribute_locations() else {
            log::warn!("No program bound, skipping cube draw");
            return;
        };

        let bindings = match storage {
            CubeStorage::Client(PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            }) => separate_bindings(
                &program,
                [
                    VertexSource::Host(positions),
                    VertexSource::Host(normals),
                    VertexSource::Host(texture_coordinates),
                ],
            ),
            CubeStorage::Client(PackedBuffer::Interleaved { data, .. }) => {
                interleaved_bindings(&program, VertexSource::Host(data))
            }
            CubeStorage::Server(ServerBuffers::Separate {
                positions,
                normals,
                texture_coordinates,
            }) => separate_bindings(
                &program,
                [
                    VertexSource::Buffer(*positions),
                    VertexSource::Buffer(*normals),
                    VertexSource::Buffer(*texture_coordinates),
                ],
            ),
            CubeStorage::Server(ServerBuffers::Interleaved { data }) => {
                interleaved_bindings(&program, VertexSource::Buffer(*data))
            }
        };

        let call = DrawCall {
            primitive: Primitive::Triangles,
            attributes: &bindings,
            count: u32::try_from(self.grid_factor.vertex_count()).unwrap_or(u32::MAX),
            indices: None,
        };
        if let Err(e) = gpu.draw(&call) {
            log::warn!("Cube draw failed: {e}");
        }
    }

    /// Free host arrays or delete GPU buffers. Safe to call more than once.
    pub fn release(&mut self, gpu: &mut dyn GpuBufferApi) {
        match self.storage.take() {
            Some(CubeStorage::Client(mut packed)) => packed.release(),
            Some(CubeStorage::Server(buffers)) => gpu.delete_buffers(&buffers.handles()),
            None => {}
        }
    }
}

fn separate_bindings<'a>(
    program: &ProgramAttributes,
    [positions, normals, texture_coordinates]: [VertexSource<'a>; 3],
) -> Vec<AttributeBinding<'a>> {
    let tight = |location, components: usize, source| AttributeBinding {
        location,
        components: components as u32,
        stride: 0,
        offset: 0,
        source,
    };
    let mut bindings = vec![tight(program.position, POSITION_DATA_SIZE, positions)];
    if let Some(location) = program.normal {
        bindings.push(tight(location, NORMAL_DATA_SIZE, normals));
    }
    if let Some(location) = program.texture_coordinate {
        bindings.push(tight(location, TEXTURE_COORDINATE_DATA_SIZE, texture_coordinates));
    }
    bindings
}

fn interleaved_bindings<'a>(
    program: &ProgramAttributes,
    source: VertexSource<'a>,
) -> Vec<AttributeBinding<'a>> {
    let strided = |location, components: usize, offset: usize| AttributeBinding {
        location,
        components: components as u32,
        stride: STRIDE_BYTES as u32,
        offset: offset as u32,
        source,
    };
    let mut bindings = vec![strided(program.position, POSITION_DATA_SIZE, 0)];
    if let Some(location) = program.normal {
        bindings.push(strided(location, NORMAL_DATA_SIZE, NORMAL_OFFSET_BYTES));
    }
    if let Some(location) = program.texture_coordinate {
        bindings.push(strided(
            location,
            TEXTURE_COORDINATE_DATA_SIZE,
            TEXTURE_COORDINATE_OFFSET_BYTES,
        ));
    }
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Program;
    use crate::headless::HeadlessGpu;
    use cubefield_mesh::generate_cube_grid;

    const ALL_COMBINATIONS: [(LayoutStrategy, StorageStrategy); 4] = [
        (LayoutStrategy::Separate, StorageStrategy::ClientSide),
        (LayoutStrategy::Separate, StorageStrategy::ServerSide),
        (LayoutStrategy::Interleaved, StorageStrategy::ClientSide),
        (LayoutStrategy::Interleaved, StorageStrategy::ServerSide),
    ];

    fn attributes(n: u32) -> VertexAttributeSet {
        generate_cube_grid(GridFactor::new(n).unwrap()).unwrap()
    }

    fn cube_gpu() -> HeadlessGpu {
        let mut gpu = HeadlessGpu::new();
        gpu.use_program(Some(Program::Cubes));
        gpu
    }

    #[test]
    fn test_all_strategies_draw_identical_streams() {
        let attrs = attributes(3);
        let mut streams = Vec::new();
        for (layout, storage) in ALL_COMBINATIONS {
            let mut gpu = cube_gpu();
            let mut set = CubeSet::build(&mut gpu, &attrs, layout, storage).unwrap();
            gpu.begin_frame();
            set.render(&mut gpu);
            gpu.end_frame();
            let draws = gpu.frame_draws();
            assert_eq!(draws.len(), 1);
            assert_eq!(draws[0].vertex_count, 27 * 36);
            streams.push(draws[0].cube_vertices(&ProgramAttributes::for_program(Program::Cubes)));
            set.release(&mut gpu);
        }
        for stream in &streams[1..] {
            assert_eq!(stream, &streams[0]);
        }
    }

    #[test]
    fn test_release_deletes_every_handle_once() {
        let attrs = attributes(2);
        for (layout, storage) in ALL_COMBINATIONS {
            let mut gpu = cube_gpu();
            let mut set = CubeSet::build(&mut gpu, &attrs, layout, storage).unwrap();
            let expected = set.buffer_handles().len();
            set.release(&mut gpu);
            set.release(&mut gpu);
            assert!(set.is_released());
            assert_eq!(gpu.gen_count(), expected);
            assert_eq!(gpu.delete_count(), expected);
            assert_eq!(gpu.invalid_delete_count(), 0);
            assert_eq!(gpu.live_buffer_count(), 0);
        }
    }

    #[test]
    fn test_server_side_handle_counts() {
        let attrs = attributes(1);
        let mut gpu = cube_gpu();
        let separate = CubeSet::build(
            &mut gpu,
            &attrs,
            LayoutStrategy::Separate,
            StorageStrategy::ServerSide,
        )
        .unwrap();
        let interleaved = CubeSet::build(
            &mut gpu,
            &attrs,
            LayoutStrategy::Interleaved,
            StorageStrategy::ServerSide,
        )
        .unwrap();
        assert_eq!(separate.buffer_handles().len(), 3);
        assert_eq!(interleaved.buffer_handles().len(), 1);
    }

    #[test]
    fn test_render_without_program_is_skipped() {
        let attrs = attributes(1);
        let mut gpu = HeadlessGpu::new();
        let set = CubeSet::build(
            &mut gpu,
            &attrs,
            LayoutStrategy::Interleaved,
            StorageStrategy::ClientSide,
        )
        .unwrap();
        gpu.begin_frame();
        set.render(&mut gpu);
        gpu.end_frame();
        assert!(gpu.frame_draws().is_empty());
    }

    #[test]
    fn test_render_after_release_is_noop() {
        let attrs = attributes(1);
        let mut gpu = cube_gpu();
        let mut set = CubeSet::build(
            &mut gpu,
            &attrs,
            LayoutStrategy::Separate,
            StorageStrategy::ServerSide,
        )
        .unwrap();
        set.release(&mut gpu);
        gpu.begin_frame();
        set.render(&mut gpu);
        gpu.end_frame();
        assert!(gpu.frame_draws().is_empty());
    }

    #[test]
    fn test_program_locations_drive_bindings() {
        let attrs = attributes(1);
        let mut gpu = HeadlessGpu::new();
        gpu.set_program_attributes(
            Program::Cubes,
            ProgramAttributes {
                position: 5,
                normal: None,
                texture_coordinate: Some(3),
                color: None,
            },
        );
        gpu.use_program(Some(Program::Cubes));
        let set = CubeSet::build(
            &mut gpu,
            &attrs,
            LayoutStrategy::Interleaved,
            StorageStrategy::ServerSide,
        )
        .unwrap();
        gpu.begin_frame();
        set.render(&mut gpu);
        let draws = gpu.frame_draws();
        let mut locations: Vec<u32> = draws[0].attributes.keys().copied().collect();
        locations.sort_unstable();
        assert_eq!(locations, vec![3, 5]);
        assert_eq!(draws[0].attributes[&5].len(), 36 * 3);
        assert_eq!(draws[0].attributes[&3].len(), 36 * 2);
    }

    #[test]
    fn test_build_failure_reports_buffer_creation() {
        let attrs = attributes(2);
        let mut gpu = cube_gpu();
        gpu.fail_gen_after(0);
        let err = CubeSet::build(
            &mut gpu,
            &attrs,
            LayoutStrategy::Interleaved,
            StorageStrategy::ServerSide,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::BufferCreation { .. }));
        assert_eq!(gpu.live_buffer_count(), 0);
    }
}
