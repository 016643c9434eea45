//! Where packed vertex data lives: host memory or GPU buffer objects.

use cubefield_mesh::PackedBuffer;

use crate::error::RenderError;
use crate::gpu::{BufferHandle, BufferTarget, GpuBufferApi};

/// Client-side arrays re-submitted on every draw, or server-side buffers
/// uploaded once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageStrategy {
    ClientSide,
    ServerSide,
}

impl StorageStrategy {
    /// `ServerSide` when `use_vbos` is set.
    pub fn from_vbo_flag(use_vbos: bool) -> Self {
        if use_vbos {
            StorageStrategy::ServerSide
        } else {
            StorageStrategy::ClientSide
        }
    }

    pub fn uses_vbos(self) -> bool {
        self == StorageStrategy::ServerSide
    }

    pub fn toggled(self) -> Self {
        match self {
            StorageStrategy::ClientSide => StorageStrategy::ServerSide,
            StorageStrategy::ServerSide => StorageStrategy::ClientSide,
        }
    }
}

/// GPU buffer objects holding a packed cube set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerBuffers {
    /// One buffer per attribute.
    Separate {
        positions: BufferHandle,
        normals: BufferHandle,
        texture_coordinates: BufferHandle,
    },
    /// One interleaved buffer.
    Interleaved { data: BufferHandle },
}

impl ServerBuffers {
    /// Generate buffers for `packed`, upload it and drop the host copy.
    ///
    /// On failure every handle generated so far is deleted before returning.
    pub fn upload(gpu: &mut dyn GpuBufferApi, packed: PackedBuffer) -> Result<Self, RenderError> {
        match packed {
            PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            } => {
                let handles = gen_buffers::<3>(gpu, "separate cube attributes")?;
                let uploads = [
                    ("cube positions", positions.as_slice()),
                    ("cube normals", normals.as_slice()),
                    ("cube texture coordinates", texture_coordinates.as_slice()),
                ];
                for (handle, (what, data)) in handles.iter().zip(uploads) {
                    if let Err(e) =
                        gpu.buffer_data(BufferTarget::Array, *handle, bytemuck::cast_slice(data))
                    {
                        gpu.delete_buffers(&handles);
                        return Err(RenderError::upload(what, e));
                    }
                }
                let [positions, normals, texture_coordinates] = handles;
                Ok(ServerBuffers::Separate {
                    positions,
                    normals,
                    texture_coordinates,
                })
            }
            PackedBuffer::Interleaved { data, .. } => {
                let [handle] = gen_buffers::<1>(gpu, "interleaved cube vertices")?;
                if let Err(e) =
                    gpu.buffer_data(BufferTarget::Array, handle, bytemuck::cast_slice(&data))
                {
                    gpu.delete_buffers(&[handle]);
                    return Err(RenderError::upload("interleaved cube vertices", e));
                }
                Ok(ServerBuffers::Interleaved { data: handle })
            }
        }
    }

    pub fn handles(&self) -> Vec<BufferHandle> {
        match *self {
            ServerBuffers::Separate {
                positions,
                normals,
                texture_coordinates,
            } => vec![positions, normals, texture_coordinates],
            ServerBuffers::Interleaved { data } => vec![data],
        }
    }
}

/// Generate `N` buffer names, deleting the ones already made if any fails.
pub(crate) fn gen_buffers<const N: usize>(
    gpu: &mut dyn GpuBufferApi,
    what: &'static str,
) -> Result<[BufferHandle; N], RenderError> {
    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        match gpu.gen_buffer() {
            Some(handle) => handles.push(handle),
            None => {
                gpu.delete_buffers(&handles);
                return Err(RenderError::BufferCreation { what });
            }
        }
    }
    handles
        .try_into()
        .map_err(|_| RenderError::BufferCreation { what })
}

/// Vertex data owned by a cube set.
#[derive(Debug)]
pub(crate) enum CubeStorage {
    Client(PackedBuffer),
    Server(ServerBuffers),
}

impl CubeStorage {
    pub(crate) fn strategy(&self) -> StorageStrategy {
        match self {
            CubeStorage::Client(_) => StorageStrategy::ClientSide,
            CubeStorage::Server(_) => StorageStrategy::ServerSide,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;
    use cubefield_mesh::{GridFactor, LayoutStrategy, generate_cube_grid};

    fn packed(layout: LayoutStrategy) -> PackedBuffer {
        let attrs = generate_cube_grid(GridFactor::new(2).unwrap()).unwrap();
        layout.pack(&attrs).unwrap()
    }

    #[test]
    fn test_toggle_round_trip() {
        assert_eq!(
            StorageStrategy::ServerSide.toggled(),
            StorageStrategy::ClientSide
        );
        assert_eq!(
            StorageStrategy::from_vbo_flag(true).toggled().toggled(),
            StorageStrategy::ServerSide
        );
    }

    #[test]
    fn test_separate_upload_uses_three_buffers() {
        let mut gpu = HeadlessGpu::new();
        let buffers = ServerBuffers::upload(&mut gpu, packed(LayoutStrategy::Separate)).unwrap();
        assert_eq!(buffers.handles().len(), 3);
        assert_eq!(gpu.live_buffer_count(), 3);
        // 8 cubes × 36 vertices × (3 + 3 + 2) floats × 4 bytes.
        assert_eq!(gpu.live_bytes(), 8 * 36 * 8 * 4);
    }

    #[test]
    fn test_interleaved_upload_uses_one_buffer() {
        let mut gpu = HeadlessGpu::new();
        let buffers =
            ServerBuffers::upload(&mut gpu, packed(LayoutStrategy::Interleaved)).unwrap();
        assert_eq!(buffers.handles().len(), 1);
        assert_eq!(gpu.live_bytes(), 8 * 36 * 32);
    }

    #[test]
    fn test_partial_generation_failure_cleans_up() {
        let mut gpu = HeadlessGpu::new();
        gpu.fail_gen_after(2);
        let err = ServerBuffers::upload(&mut gpu, packed(LayoutStrategy::Separate)).unwrap_err();
        assert!(matches!(err, RenderError::BufferCreation { .. }));
        assert_eq!(gpu.gen_count(), 2);
        assert_eq!(gpu.delete_count(), 2);
        assert_eq!(gpu.live_buffer_count(), 0);
    }

    #[test]
    fn test_upload_out_of_memory_cleans_up() {
        let mut gpu = HeadlessGpu::new();
        gpu.set_memory_budget(Some(1024));
        let err = ServerBuffers::upload(&mut gpu, packed(LayoutStrategy::Separate)).unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(gpu.live_buffer_count(), 0);
        assert_eq!(gpu.live_bytes(), 0);
    }
}
