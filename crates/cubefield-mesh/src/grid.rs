//! Cube lattice generation: N×N×N cubes filling the [-1, 1] cube.

use std::fmt;

use crate::cube::{CUBE_NORMALS, CUBE_TEXTURE_COORDINATES, generate_cube_data};
use crate::error::{MeshError, try_float_vec};
use crate::vertex_format::{
    NORMAL_DATA_SIZE, POSITION_DATA_SIZE, TEXTURE_COORDINATE_DATA_SIZE, VERTICES_PER_CUBE,
};

const MIN_POSITION: f32 = -1.0;
const MAX_POSITION: f32 = 1.0;
const POSITION_RANGE: f32 = MAX_POSITION - MIN_POSITION;

/// Side length of the cube lattice.
///
/// [`GridFactor::MIN`] and [`GridFactor::MAX`] are the bounds the request
/// surface enforces; the generator itself accepts any positive factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridFactor(u32);

impl GridFactor {
    pub const MIN: GridFactor = GridFactor(1);
    pub const MAX: GridFactor = GridFactor(16);

    /// Returns `None` for zero.
    pub const fn new(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(Self(n)) }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// N³, saturating at `usize::MAX`.
    pub const fn cube_count(self) -> usize {
        let n = self.0 as usize;
        n.saturating_mul(n).saturating_mul(n)
    }

    /// N³ × 36, saturating at `usize::MAX`.
    pub const fn vertex_count(self) -> usize {
        self.cube_count().saturating_mul(VERTICES_PER_CUBE)
    }

    /// N³ × 36 × `floats_per_vertex`, or `None` if it does not fit in `usize`.
    pub const fn checked_float_count(self, floats_per_vertex: usize) -> Option<usize> {
        let n = self.0 as usize;
        match n.checked_mul(n) {
            Some(square) => match square.checked_mul(n) {
                Some(cubes) => match cubes.checked_mul(VERTICES_PER_CUBE) {
                    Some(vertices) => vertices.checked_mul(floats_per_vertex),
                    None => None,
                },
                None => None,
            },
            None => None,
        }
    }

    /// Distance between consecutive cube boundaries along one axis.
    pub fn segment_spacing(self) -> f32 {
        POSITION_RANGE / (2 * u64::from(self.0) - 1) as f32
    }
}

impl fmt::Display for GridFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw attribute arrays for a generated lattice.
///
/// Positions are stored in full. Normals and texture coordinates are the same
/// 36-vertex pattern for every cube, so only one copy is kept; layouts expand
/// them [`GridFactor::cube_count`] times.
#[derive(Clone, Debug)]
pub struct VertexAttributeSet {
    grid_factor: GridFactor,
    positions: Vec<f32>,
}

impl VertexAttributeSet {
    pub fn grid_factor(&self) -> GridFactor {
        self.grid_factor
    }

    /// All positions, `108 * N³` floats.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// One cube's normals (108 floats).
    pub fn cube_normals(&self) -> &'static [f32] {
        &CUBE_NORMALS
    }

    /// One cube's texture coordinates (72 floats).
    pub fn cube_texture_coordinates(&self) -> &'static [f32] {
        &CUBE_TEXTURE_COORDINATES
    }

    /// Length of the normal array once expanded to every cube.
    pub fn expanded_normal_len(&self) -> usize {
        self.grid_factor.vertex_count().saturating_mul(NORMAL_DATA_SIZE)
    }

    /// Length of the texture coordinate array once expanded to every cube.
    pub fn expanded_texture_coordinate_len(&self) -> usize {
        self.grid_factor
            .vertex_count()
            .saturating_mul(TEXTURE_COORDINATE_DATA_SIZE)
    }
}

/// Generate the positions of an N×N×N lattice of cubes.
///
/// Cubes are visited x-major, then y, then z; each cube occupies every other
/// segment on each axis so neighbours are separated by one segment of space.
/// Factors whose float count overflows `usize` fail with
/// [`MeshError::TooLarge`]; ones that merely exhaust memory fail with
/// [`MeshError::OutOfMemory`].
pub fn generate_cube_grid(grid_factor: GridFactor) -> Result<VertexAttributeSet, MeshError> {
    let n = grid_factor.get();
    let total = grid_factor
        .checked_float_count(POSITION_DATA_SIZE)
        .ok_or(MeshError::TooLarge { grid_factor: n })?;
    let mut positions = try_float_vec("cube positions", total)?;

    let spacing = grid_factor.segment_spacing();
    let bounds = |i: u32| {
        let start = u64::from(i) * 2;
        (
            MIN_POSITION + spacing * start as f32,
            MIN_POSITION + spacing * (start + 1) as f32,
        )
    };

    for x in 0..n {
        let (x1, x2) = bounds(x);
        for y in 0..n {
            let (y1, y2) = bounds(y);
            for z in 0..n {
                let (z1, z2) = bounds(z);
                let corners = [
                    [x1, y2, z2],
                    [x2, y2, z2],
                    [x1, y1, z2],
                    [x2, y1, z2],
                    [x1, y2, z1],
                    [x2, y2, z1],
                    [x1, y1, z1],
                    [x2, y1, z1],
                ];
                let points: [&[f32]; 8] = std::array::from_fn(|i| corners[i].as_slice());
                positions.extend_from_slice(&generate_cube_data(points, POSITION_DATA_SIZE));
            }
        }
    }

    debug_assert_eq!(positions.len(), total);
    log::debug!("Generated {} cubes ({} floats)", grid_factor.cube_count(), total);

    Ok(VertexAttributeSet {
        grid_factor,
        positions,
    })
}
