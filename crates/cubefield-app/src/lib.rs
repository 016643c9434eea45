//! Regeneration pipeline, rotation input and the frame driver tying them to
//! a GPU backend.

pub mod command;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod renderer;

pub use command::{RequestCommand, parse_script};
pub use error::{CommandParseError, PipelineError};
pub use input::RotationDeltas;
pub use pipeline::{
    GenerationRequest, GeneratedGeometry, PipelineMonitor, PipelineState, RegenerationPipeline,
    StrategyStatus, SwapStats,
};
pub use renderer::CubeGridRenderer;
