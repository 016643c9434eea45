//! Application-level errors.

/// Errors starting the regeneration pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The generator thread could not be spawned.
    #[error("failed to spawn generator thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// An unrecognised request command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command `{0}` (expected up, down, vbo or stride)")]
pub struct CommandParseError(pub String);
