//! Paraboloid heightmap drawn as one indexed triangle strip.
//!
//! Vertices are laid out row by row, top row first, so that each strip
//! segment winds counter-clockwise. Rows are joined with degenerate
//! triangles: the first index of every row after the first is repeated, and
//! so is the last index of every row before the last.

use glam::Vec3;

use crate::error::{MeshError, try_float_vec};
use crate::vertex_format::{BYTES_PER_FLOAT, NORMAL_DATA_SIZE, POSITION_DATA_SIZE};

/// Floats per colour.
pub const COLOR_DATA_SIZE: usize = 4;

/// Floats in one heightmap vertex: position, normal, colour.
pub const HEIGHT_MAP_FLOATS_PER_VERTEX: usize =
    POSITION_DATA_SIZE + NORMAL_DATA_SIZE + COLOR_DATA_SIZE;

/// Byte stride of one heightmap vertex.
pub const HEIGHT_MAP_STRIDE_BYTES: usize = HEIGHT_MAP_FLOATS_PER_VERTEX * BYTES_PER_FLOAT;

/// Default vertices per side.
pub const DEFAULT_SIZE_PER_SIDE: u16 = 32;

const MIN_POSITION: f32 = -5.0;
const POSITION_RANGE: f32 = 10.0;

/// Generated heightmap vertex and index data.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightMapMesh {
    size_per_side: usize,
    vertices: Vec<f32>,
    indices: Vec<u16>,
}

impl HeightMapMesh {
    pub fn size_per_side(&self) -> usize {
        self.size_per_side
    }

    /// `[position(3), normal(3), color(4)]` per vertex.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / HEIGHT_MAP_FLOATS_PER_VERTEX
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// The `[position, normal, color]` record of vertex `index`.
    pub fn vertex(&self, index: usize) -> Option<&[f32]> {
        let base = index * HEIGHT_MAP_FLOATS_PER_VERTEX;
        self.vertices.get(base..base + HEIGHT_MAP_FLOATS_PER_VERTEX)
    }
}

/// Expected index count for a `size × size` strip. Zero below two vertices
/// per side.
pub const fn height_map_index_count(size_per_side: usize) -> usize {
    let strips = size_per_side.saturating_sub(1);
    let degenerates = 2 * strips.saturating_sub(1);
    2 * size_per_side * strips + degenerates
}

/// Build a `size_per_side × size_per_side` heightmap over `[-5, 5]²` with
/// height `(x² + y²) / 10`.
///
/// `size_per_side` must be at least 2. `u16` indices cap it at 256.
pub fn generate_height_map(size_per_side: u16) -> Result<HeightMapMesh, MeshError> {
    let size = usize::from(size_per_side);
    if !(2..=256).contains(&size) {
        return Err(MeshError::InvalidHeightMapSize { size });
    }

    let mut vertices = try_float_vec(
        "heightmap vertices",
        size * size * HEIGHT_MAP_FLOATS_PER_VERTEX,
    )?;
    let last = (size - 1) as f32;

    for y in 0..size {
        for x in 0..size {
            let x_ratio = x as f32 / last;
            let y_ratio = 1.0 - y as f32 / last;

            let x_position = MIN_POSITION + x_ratio * POSITION_RANGE;
            let y_position = MIN_POSITION + y_ratio * POSITION_RANGE;
            let height = (x_position * x_position + y_position * y_position) / 10.0;

            // d/dx and d/dy of the height function.
            let x_slope = 2.0 * x_position / 10.0;
            let y_slope = 2.0 * y_position / 10.0;
            let normal = Vec3::new(1.0, 0.0, x_slope)
                .cross(Vec3::new(0.0, 1.0, y_slope))
                .normalize();

            vertices.extend_from_slice(&[x_position, y_position, height]);
            vertices.extend_from_slice(&normal.to_array());
            vertices.extend_from_slice(&[x_ratio, y_ratio, 0.5, 1.0]);
        }
    }

    let index_count = height_map_index_count(size);
    let mut indices = Vec::new();
    indices
        .try_reserve_exact(index_count)
        .map_err(|source| MeshError::OutOfMemory {
            what: "heightmap indices",
            elements: index_count,
            source,
        })?;

    let index = |row: usize, column: usize| (row * size + column) as u16;
    for y in 0..size - 1 {
        if y > 0 {
            indices.push(index(y, 0));
        }
        for x in 0..size {
            indices.push(index(y, x));
            indices.push(index(y + 1, x));
        }
        if y < size - 2 {
            indices.push(index(y + 1, size - 1));
        }
    }
    debug_assert_eq!(indices.len(), index_count);

    log::debug!(
        "Generated {size}x{size} heightmap ({} vertices, {} indices)",
        size * size,
        indices.len()
    );

    Ok(HeightMapMesh {
        size_per_side: size,
        vertices,
        indices,
    })
}
