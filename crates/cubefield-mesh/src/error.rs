//! Geometry error types.

use std::collections::TryReserveError;

/// Errors raised while generating or packing geometry.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Host memory for a geometry array could not be reserved.
    #[error("out of memory allocating {what} ({elements} elements)")]
    OutOfMemory {
        what: &'static str,
        elements: usize,
        #[source]
        source: TryReserveError,
    },

    /// Grid factor whose vertex data cannot even be sized on this platform.
    #[error("grid factor {grid_factor} is too large to generate")]
    TooLarge { grid_factor: u32 },

    /// Heightmap side length outside what `u16` indices can address.
    #[error("invalid heightmap size {size}: must be in 2..=256")]
    InvalidHeightMapSize { size: usize },
}

/// Allocate an empty `Vec<f32>` with room for exactly `floats` elements.
pub(crate) fn try_float_vec(what: &'static str, floats: usize) -> Result<Vec<f32>, MeshError> {
    let mut data = Vec::new();
    data.try_reserve_exact(floats)
        .map_err(|source| MeshError::OutOfMemory {
            what,
            elements: floats,
            source,
        })?;
    Ok(data)
}
