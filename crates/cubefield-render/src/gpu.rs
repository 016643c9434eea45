//! The buffer-object boundary every drawable talks to.
//!
//! The API mirrors a classic buffer-object model: handles are generated
//! first, filled with data second, and referenced by draw calls until they
//! are deleted. Vertex attributes may instead be sourced straight from host
//! memory, in which case the backend re-reads them on every draw.

use std::fmt;
use std::num::NonZeroU32;

use glam::{Mat4, Vec3};

/// Opaque name of a GPU buffer object. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(NonZeroU32);

impl BufferHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a buffer's contents are used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// `u16` index data.
    ElementArray,
}

/// Shader programs the backends know how to bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    /// Lit cubes with texture coordinates.
    Cubes,
    /// Lit, per-vertex coloured heightmap.
    HeightMap,
}

/// Attribute locations of the currently bound program. Absent attributes are
/// not consumed by that program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramAttributes {
    pub position: u32,
    pub normal: Option<u32>,
    pub texture_coordinate: Option<u32>,
    pub color: Option<u32>,
}

impl ProgramAttributes {
    /// Default locations for `program`.
    pub const fn for_program(program: Program) -> Self {
        match program {
            Program::Cubes => Self {
                position: 0,
                normal: Some(1),
                texture_coordinate: Some(2),
                color: None,
            },
            Program::HeightMap => Self {
                position: 0,
                normal: Some(1),
                texture_coordinate: None,
                color: Some(2),
            },
        }
    }
}

/// Per-frame uniforms shared by every program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUniforms {
    /// Projection × view × model.
    pub mvp: Mat4,
    /// View × model.
    pub mv: Mat4,
    /// Light position in eye space.
    pub light_pos_eye: Vec3,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            mvp: Mat4::IDENTITY,
            mv: Mat4::IDENTITY,
            light_pos_eye: Vec3::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
}

/// Where an attribute's floats come from.
#[derive(Clone, Copy, Debug)]
pub enum VertexSource<'a> {
    /// Host memory, re-described on every draw.
    Host(&'a [f32]),
    /// A buffer previously filled with [`GpuBufferApi::buffer_data`].
    Buffer(BufferHandle),
}

/// One enabled vertex attribute.
#[derive(Clone, Copy, Debug)]
pub struct AttributeBinding<'a> {
    pub location: u32,
    /// Float components per vertex.
    pub components: u32,
    /// Bytes between consecutive vertices; 0 means tightly packed.
    pub stride: u32,
    /// Byte offset of the first component.
    pub offset: u32,
    pub source: VertexSource<'a>,
}

impl AttributeBinding<'_> {
    /// Stride with the tightly-packed case resolved.
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.components * std::mem::size_of::<f32>() as u32
        } else {
            self.stride
        }
    }
}

/// A single draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawCall<'a> {
    pub primitive: Primitive,
    pub attributes: &'a [AttributeBinding<'a>],
    /// Vertices, or indices when `indices` is set.
    pub count: u32,
    /// `u16` index buffer.
    pub indices: Option<BufferHandle>,
}

/// Errors reported by a GPU backend.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("out of GPU memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: u64, available: u64 },

    /// The device rejected an allocation that passed the size limit check.
    #[error("GPU allocation of {requested} bytes failed: {message}")]
    AllocationFailed { requested: u64, message: String },

    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferHandle),

    #[error("buffer {0} has no data")]
    EmptyBuffer(BufferHandle),

    #[error("no program bound")]
    NoProgram,

    #[error("unsupported attribute size: {0} components")]
    UnsupportedComponents(u32),
}

/// Render-thread GPU buffer API.
pub trait GpuBufferApi {
    /// Generate a new buffer name. `None` when the backend cannot create one.
    fn gen_buffer(&mut self) -> Option<BufferHandle>;

    /// Replace the contents of `handle`.
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        handle: BufferHandle,
        data: &[u8],
    ) -> Result<(), GpuError>;

    /// Delete buffers. Unknown handles are ignored.
    fn delete_buffers(&mut self, handles: &[BufferHandle]);

    /// Bind a program, or unbind with `None`.
    fn use_program(&mut self, program: Option<Program>);

    /// Locations of the bound program, `None` if nothing is bound.
    fn attribute_locations(&self) -> Option<ProgramAttributes>;

    fn set_frame_uniforms(&mut self, uniforms: &FrameUniforms);

    fn begin_frame(&mut self) {}

    fn end_frame(&mut self) {}

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), GpuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handle_is_invalid() {
        assert!(BufferHandle::new(0).is_none());
        assert_eq!(BufferHandle::new(7).map(BufferHandle::get), Some(7));
    }

    #[test]
    fn test_effective_stride() {
        let mut binding = AttributeBinding {
            location: 0,
            components: 3,
            stride: 0,
            offset: 0,
            source: VertexSource::Host(&[]),
        };
        assert_eq!(binding.effective_stride(), 12);
        binding.stride = 32;
        assert_eq!(binding.effective_stride(), 32);
    }

    #[test]
    fn test_program_locations_do_not_collide() {
        for program in [Program::Cubes, Program::HeightMap] {
            let attrs = ProgramAttributes::for_program(program);
            let mut locations: Vec<u32> = [attrs.normal, attrs.texture_coordinate, attrs.color]
                .into_iter()
                .flatten()
                .collect();
            locations.push(attrs.position);
            locations.sort_unstable();
            locations.dedup();
            assert_eq!(locations.len(), 3);
        }
    }
}
