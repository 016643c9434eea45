//! Single-cube triangle expansion and the per-cube attribute patterns.
//!
//! Corners are indexed in this order:
//!
//! | Index | Corner              |
//! |-------|---------------------|
//! | 0     | front left top      |
//! | 1     | front right top     |
//! | 2     | front left bottom   |
//! | 3     | front right bottom  |
//! | 4     | back left top       |
//! | 5     | back right top      |
//! | 6     | back left bottom    |
//! | 7     | back right bottom   |

use crate::vertex_format::VERTICES_PER_CUBE;

/// The six faces of a cube, in emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CubeFace {
    Front = 0,
    Right = 1,
    Back = 2,
    Left = 3,
    Top = 4,
    Bottom = 5,
}

impl CubeFace {
    /// All faces in the order their triangles are written.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Front,
        CubeFace::Right,
        CubeFace::Back,
        CubeFace::Left,
        CubeFace::Top,
        CubeFace::Bottom,
    ];

    /// Corner indices seen from outside the face: top-left, top-right,
    /// bottom-left, bottom-right.
    pub const fn corners(self) -> [usize; 4] {
        match self {
            CubeFace::Front => [0, 1, 2, 3],
            CubeFace::Right => [1, 5, 3, 7],
            CubeFace::Back => [5, 4, 7, 6],
            CubeFace::Left => [4, 0, 6, 2],
            CubeFace::Top => [4, 5, 0, 1],
            CubeFace::Bottom => [7, 6, 3, 2],
        }
    }

    /// Outward unit normal.
    pub const fn normal(self) -> [f32; 3] {
        match self {
            CubeFace::Front => [0.0, 0.0, 1.0],
            CubeFace::Right => [1.0, 0.0, 0.0],
            CubeFace::Back => [0.0, 0.0, -1.0],
            CubeFace::Left => [-1.0, 0.0, 0.0],
            CubeFace::Top => [0.0, 1.0, 0.0],
            CubeFace::Bottom => [0.0, -1.0, 0.0],
        }
    }
}

/// Order in which a face's local corners (tl, tr, bl, br) are emitted:
///
/// ```text
///  tl---tr
///  | \  |
///  bl---br
/// ```
/// (tl, bl, tr) then (bl, br, tr), both counter-clockwise from outside.
const FACE_WINDING: [usize; 6] = [0, 2, 1, 2, 3, 1];

/// Expand eight corner points into 36 triangle-list vertices.
///
/// Each point holds `elements_per_point` values (3 for positions). The result
/// has `elements_per_point * 36` values.
pub fn generate_cube_data(points: [&[f32]; 8], elements_per_point: usize) -> Vec<f32> {
    debug_assert!(points.iter().all(|p| p.len() >= elements_per_point));

    let mut cube_data = Vec::with_capacity(elements_per_point * VERTICES_PER_CUBE);
    for face in CubeFace::ALL {
        let corners = face.corners();
        for local in FACE_WINDING {
            let point = points[corners[local]];
            cube_data.extend_from_slice(&point[..elements_per_point]);
        }
    }
    cube_data
}

const fn face_normals() -> [f32; VERTICES_PER_CUBE * 3] {
    let mut data = [0.0; VERTICES_PER_CUBE * 3];
    let mut face = 0;
    while face < 6 {
        let normal = CubeFace::ALL[face].normal();
        let mut vertex = 0;
        while vertex < 6 {
            let base = (face * 6 + vertex) * 3;
            data[base] = normal[0];
            data[base + 1] = normal[1];
            data[base + 2] = normal[2];
            vertex += 1;
        }
        face += 1;
    }
    data
}

const fn face_texture_coordinates() -> [f32; VERTICES_PER_CUBE * 2] {
    // Image Y grows downward, so T is flipped relative to the face's up.
    const PER_FACE: [f32; 12] = [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0];
    let mut data = [0.0; VERTICES_PER_CUBE * 2];
    let mut i = 0;
    while i < data.len() {
        data[i] = PER_FACE[i % PER_FACE.len()];
        i += 1;
    }
    data
}

/// Normals for one cube, matching the vertex order of [`generate_cube_data`].
pub const CUBE_NORMALS: [f32; VERTICES_PER_CUBE * 3] = face_normals();

/// Texture coordinates for one cube; identical for every face.
pub const CUBE_TEXTURE_COORDINATES: [f32; VERTICES_PER_CUBE * 2] = face_texture_coordinates();
