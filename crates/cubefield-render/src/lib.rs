//! Buffer storage strategies, drawable cube sets and the GPU backends they run on.

pub mod cube_set;
pub mod error;
pub mod gpu;
pub mod headless;
pub mod height_map;
pub mod storage;
pub mod wgpu_backend;

pub use cube_set::CubeSet;
pub use error::{ErrorHandler, ErrorType, LoggingErrorHandler, RenderError};
pub use gpu::{
    AttributeBinding, BufferHandle, BufferTarget, DrawCall, FrameUniforms, GpuBufferApi,
    GpuError, Primitive, Program, ProgramAttributes, VertexSource,
};
pub use headless::{HeadlessGpu, ResolvedDraw};
pub use height_map::HeightMap;
pub use storage::{ServerBuffers, StorageStrategy};
pub use wgpu_backend::{ReadbackError, WgpuGpu, WgpuInitError};
