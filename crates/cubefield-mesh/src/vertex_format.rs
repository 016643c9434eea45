//! Per-vertex record shared by every cube layout.
//!
//! ## Interleaved record
//!
//! | Attribute | Offset | Floats |
//! |-----------|--------|--------|
//! | position  | 0      | 3      |
//! | normal    | 12     | 3      |
//! | texcoord  | 24     | 2      |
//!
//! Separate buffers use the same per-attribute sizes with no stride.

use std::mem;

/// Floats per position.
pub const POSITION_DATA_SIZE: usize = 3;
/// Floats per normal.
pub const NORMAL_DATA_SIZE: usize = 3;
/// Floats per texture coordinate.
pub const TEXTURE_COORDINATE_DATA_SIZE: usize = 2;
/// Size of one `f32` in bytes.
pub const BYTES_PER_FLOAT: usize = mem::size_of::<f32>();

/// 6 faces × 2 triangles × 3 vertices.
pub const VERTICES_PER_CUBE: usize = 36;

/// Floats in one interleaved vertex record.
pub const FLOATS_PER_VERTEX: usize =
    POSITION_DATA_SIZE + NORMAL_DATA_SIZE + TEXTURE_COORDINATE_DATA_SIZE;

/// Byte stride of one interleaved vertex record.
pub const STRIDE_BYTES: usize = FLOATS_PER_VERTEX * BYTES_PER_FLOAT;

/// Byte offset of the normal inside an interleaved record.
pub const NORMAL_OFFSET_BYTES: usize = POSITION_DATA_SIZE * BYTES_PER_FLOAT;

/// Byte offset of the texture coordinate inside an interleaved record.
pub const TEXTURE_COORDINATE_OFFSET_BYTES: usize =
    (POSITION_DATA_SIZE + NORMAL_DATA_SIZE) * BYTES_PER_FLOAT;

/// One decoded cube vertex. Layout matches the interleaved record exactly, so a
/// slice of these can be viewed as the interleaved float buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

static_assertions::assert_eq_size!(CubeVertex, [f32; FLOATS_PER_VERTEX]);

impl CubeVertex {
    /// Build a vertex from an interleaved record of [`FLOATS_PER_VERTEX`] floats.
    pub fn from_record(record: &[f32]) -> Self {
        debug_assert_eq!(record.len(), FLOATS_PER_VERTEX);
        Self {
            position: [record[0], record[1], record[2]],
            normal: [record[3], record[4], record[5]],
            uv: [record[6], record[7]],
        }
    }
}

// ---------------------------------------------------------------------------
// Compile-time validation
// ---------------------------------------------------------------------------

const _: () = assert!(STRIDE_BYTES == 32);
const _: () = assert!(mem::offset_of!(CubeVertex, normal) == NORMAL_OFFSET_BYTES);
const _: () = assert!(mem::offset_of!(CubeVertex, uv) == TEXTURE_COORDINATE_OFFSET_BYTES);
