//! Attribute layouts: three separate buffers, or one interleaved buffer.

use crate::error::{MeshError, try_float_vec};
use crate::grid::{GridFactor, VertexAttributeSet};
use crate::vertex_format::{
    CubeVertex, FLOATS_PER_VERTEX, NORMAL_DATA_SIZE, POSITION_DATA_SIZE,
    TEXTURE_COORDINATE_DATA_SIZE, VERTICES_PER_CUBE,
};

/// How per-vertex attributes are arranged in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutStrategy {
    /// Positions, normals and texture coordinates in three buffers.
    Separate,
    /// One buffer of `[position, normal, texcoord]` records, 32-byte stride.
    Interleaved,
}

impl LayoutStrategy {
    /// `Interleaved` when `use_stride` is set.
    pub fn from_stride_flag(use_stride: bool) -> Self {
        if use_stride {
            LayoutStrategy::Interleaved
        } else {
            LayoutStrategy::Separate
        }
    }

    pub fn uses_stride(self) -> bool {
        self == LayoutStrategy::Interleaved
    }

    /// The other layout.
    pub fn toggled(self) -> Self {
        match self {
            LayoutStrategy::Separate => LayoutStrategy::Interleaved,
            LayoutStrategy::Interleaved => LayoutStrategy::Separate,
        }
    }

    /// Pack raw attributes into this layout.
    pub fn pack(self, attributes: &VertexAttributeSet) -> Result<PackedBuffer, MeshError> {
        match self {
            LayoutStrategy::Separate => pack_separate(attributes),
            LayoutStrategy::Interleaved => pack_interleaved(attributes),
        }
    }
}

/// Host-side vertex data in one of the two layouts.
#[derive(Clone, Debug, PartialEq)]
pub enum PackedBuffer {
    Separate {
        grid_factor: GridFactor,
        positions: Vec<f32>,
        normals: Vec<f32>,
        texture_coordinates: Vec<f32>,
    },
    Interleaved {
        grid_factor: GridFactor,
        data: Vec<f32>,
    },
}

impl PackedBuffer {
    pub fn layout(&self) -> LayoutStrategy {
        match self {
            PackedBuffer::Separate { .. } => LayoutStrategy::Separate,
            PackedBuffer::Interleaved { .. } => LayoutStrategy::Interleaved,
        }
    }

    pub fn grid_factor(&self) -> GridFactor {
        match self {
            PackedBuffer::Separate { grid_factor, .. }
            | PackedBuffer::Interleaved { grid_factor, .. } => *grid_factor,
        }
    }

    /// Number of complete vertices currently held. Zero after [`release`](Self::release).
    pub fn vertex_count(&self) -> usize {
        match self {
            PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            } => (positions.len() / POSITION_DATA_SIZE)
                .min(normals.len() / NORMAL_DATA_SIZE)
                .min(texture_coordinates.len() / TEXTURE_COORDINATE_DATA_SIZE),
            PackedBuffer::Interleaved { data, .. } => data.len() / FLOATS_PER_VERTEX,
        }
    }

    /// Total floats across all buffers.
    pub fn float_count(&self) -> usize {
        match self {
            PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            } => positions.len() + normals.len() + texture_coordinates.len(),
            PackedBuffer::Interleaved { data, .. } => data.len(),
        }
    }

    /// Decode vertex `index`.
    pub fn vertex(&self, index: usize) -> Option<CubeVertex> {
        if index >= self.vertex_count() {
            return None;
        }
        let vertex = match self {
            PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            } => {
                let p = index * POSITION_DATA_SIZE;
                let n = index * NORMAL_DATA_SIZE;
                let t = index * TEXTURE_COORDINATE_DATA_SIZE;
                CubeVertex {
                    position: [positions[p], positions[p + 1], positions[p + 2]],
                    normal: [normals[n], normals[n + 1], normals[n + 2]],
                    uv: [texture_coordinates[t], texture_coordinates[t + 1]],
                }
            }
            PackedBuffer::Interleaved { data, .. } => {
                let base = index * FLOATS_PER_VERTEX;
                CubeVertex::from_record(&data[base..base + FLOATS_PER_VERTEX])
            }
        };
        Some(vertex)
    }

    /// Decode every vertex.
    pub fn unpack(&self) -> Vec<CubeVertex> {
        (0..self.vertex_count())
            .filter_map(|i| self.vertex(i))
            .collect()
    }

    /// Truncate and free every buffer so no host memory is retained.
    pub fn release(&mut self) {
        match self {
            PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            } => {
                for buffer in [positions, normals, texture_coordinates] {
                    buffer.clear();
                    buffer.shrink_to_fit();
                }
            }
            PackedBuffer::Interleaved { data, .. } => {
                data.clear();
                data.shrink_to_fit();
            }
        }
    }
}

fn pack_separate(attributes: &VertexAttributeSet) -> Result<PackedBuffer, MeshError> {
    let cubes = attributes.grid_factor().cube_count();

    let mut positions = try_float_vec("separate positions", attributes.positions().len())?;
    positions.extend_from_slice(attributes.positions());

    let mut normals = try_float_vec("separate normals", attributes.expanded_normal_len())?;
    let mut texture_coordinates = try_float_vec(
        "separate texture coordinates",
        attributes.expanded_texture_coordinate_len(),
    )?;
    for _ in 0..cubes {
        normals.extend_from_slice(attributes.cube_normals());
        texture_coordinates.extend_from_slice(attributes.cube_texture_coordinates());
    }

    Ok(PackedBuffer::Separate {
        grid_factor: attributes.grid_factor(),
        positions,
        normals,
        texture_coordinates,
    })
}

fn pack_interleaved(attributes: &VertexAttributeSet) -> Result<PackedBuffer, MeshError> {
    let grid_factor = attributes.grid_factor();
    let positions = attributes.positions();
    let normals = attributes.cube_normals();
    let texture_coordinates = attributes.cube_texture_coordinates();

    let mut data = try_float_vec(
        "interleaved vertices",
        grid_factor.vertex_count().saturating_mul(FLOATS_PER_VERTEX),
    )?;

    let mut position_offset = 0;
    for _ in 0..grid_factor.cube_count() {
        // Normals and texture coordinates repeat per cube; positions do not.
        let mut normal_offset = 0;
        let mut texture_offset = 0;
        for _ in 0..VERTICES_PER_CUBE {
            data.extend_from_slice(&positions[position_offset..position_offset + POSITION_DATA_SIZE]);
            position_offset += POSITION_DATA_SIZE;
            data.extend_from_slice(&normals[normal_offset..normal_offset + NORMAL_DATA_SIZE]);
            normal_offset += NORMAL_DATA_SIZE;
            data.extend_from_slice(
                &texture_coordinates[texture_offset..texture_offset + TEXTURE_COORDINATE_DATA_SIZE],
            );
            texture_offset += TEXTURE_COORDINATE_DATA_SIZE;
        }
    }

    Ok(PackedBuffer::Interleaved { grid_factor, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::generate_cube_grid;

    fn attributes(n: u32) -> VertexAttributeSet {
        generate_cube_grid(GridFactor::new(n).unwrap()).unwrap()
    }

    #[test]
    fn test_separate_sizes_single_cube() {
        let packed = LayoutStrategy::Separate.pack(&attributes(1)).unwrap();
        match &packed {
            PackedBuffer::Separate {
                positions,
                normals,
                texture_coordinates,
                ..
            } => {
                assert_eq!(positions.len(), 108);
                assert_eq!(normals.len(), 108);
                assert_eq!(texture_coordinates.len(), 72);
            }
            PackedBuffer::Interleaved { .. } => panic!("expected separate layout"),
        }
        assert_eq!(packed.vertex_count(), 36);
    }

    #[test]
    fn test_interleaved_size() {
        let packed = LayoutStrategy::Interleaved.pack(&attributes(2)).unwrap();
        assert_eq!(packed.float_count(), 8 * 36 * 8);
        assert_eq!(packed.vertex_count(), 8 * 36);
    }

    #[test]
    fn test_layouts_decode_identically_for_all_factors() {
        for n in GridFactor::MIN.get()..=GridFactor::MAX.get() {
            let set = attributes(n);
            let separate = LayoutStrategy::Separate.pack(&set).unwrap();
            let interleaved = LayoutStrategy::Interleaved.pack(&set).unwrap();
            assert_eq!(separate.vertex_count(), interleaved.vertex_count());
            assert_eq!(separate.unpack(), interleaved.unpack(), "N = {n}");
        }
    }

    #[test]
    fn test_interleaved_repeats_normals_per_cube() {
        let packed = LayoutStrategy::Interleaved.pack(&attributes(2)).unwrap();
        let first = packed.vertex(0).unwrap();
        let second_cube_first = packed.vertex(36).unwrap();
        assert_eq!(first.normal, second_cube_first.normal);
        assert_eq!(first.uv, second_cube_first.uv);
        assert_ne!(first.position, second_cube_first.position);
    }

    #[test]
    fn test_release_frees_host_memory() {
        for layout in [LayoutStrategy::Separate, LayoutStrategy::Interleaved] {
            let mut packed = layout.pack(&attributes(3)).unwrap();
            packed.release();
            assert_eq!(packed.vertex_count(), 0);
            assert_eq!(packed.float_count(), 0);
            assert!(packed.vertex(0).is_none());
        }
    }

    #[test]
    fn test_toggle_is_an_involution() {
        for layout in [LayoutStrategy::Separate, LayoutStrategy::Interleaved] {
            assert_ne!(layout.toggled(), layout);
            assert_eq!(layout.toggled().toggled(), layout);
        }
        assert_eq!(
            LayoutStrategy::from_stride_flag(true),
            LayoutStrategy::Interleaved
        );
    }
}
