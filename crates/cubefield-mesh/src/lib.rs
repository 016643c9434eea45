//! Cube-grid and heightmap geometry: attribute generation and buffer layouts.

pub mod cube;
pub mod error;
pub mod grid;
pub mod heightmap;
pub mod layout;
pub mod vertex_format;

pub use cube::{CUBE_NORMALS, CUBE_TEXTURE_COORDINATES, CubeFace, generate_cube_data};
pub use error::MeshError;
pub use grid::{GridFactor, VertexAttributeSet, generate_cube_grid};
pub use heightmap::{
    COLOR_DATA_SIZE, DEFAULT_SIZE_PER_SIDE, HEIGHT_MAP_FLOATS_PER_VERTEX, HEIGHT_MAP_STRIDE_BYTES,
    HeightMapMesh, generate_height_map, height_map_index_count,
};
pub use layout::{LayoutStrategy, PackedBuffer};
pub use vertex_format::{
    BYTES_PER_FLOAT, CubeVertex, FLOATS_PER_VERTEX, NORMAL_DATA_SIZE, NORMAL_OFFSET_BYTES,
    POSITION_DATA_SIZE, STRIDE_BYTES, TEXTURE_COORDINATE_DATA_SIZE, TEXTURE_COORDINATE_OFFSET_BYTES,
    VERTICES_PER_CUBE,
};
