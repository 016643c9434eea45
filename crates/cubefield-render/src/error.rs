//! Render-side errors and the application error callback.

use cubefield_mesh::MeshError;

use crate::gpu::GpuError;

/// Categories reported to an [`ErrorHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// A GPU buffer object could not be created or filled.
    BufferCreationError,
}

/// Application hook for errors that the user should see.
///
/// Called synchronously on the render thread.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error_type: ErrorType, cause: &str);
}

/// Default handler: logs and carries on.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, error_type: ErrorType, cause: &str) {
        log::error!("{error_type:?}: {cause}");
    }
}

/// Errors building GPU-side geometry.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("could not create GPU buffer for {what}")]
    BufferCreation { what: &'static str },

    #[error("out of memory uploading {what}")]
    OutOfMemory {
        what: &'static str,
        #[source]
        source: GpuError,
    },

    #[error("geometry packing failed")]
    Mesh(#[from] MeshError),

    #[error("GPU error uploading {what}")]
    Gpu {
        what: &'static str,
        #[source]
        source: GpuError,
    },
}

impl RenderError {
    pub(crate) fn upload(what: &'static str, source: GpuError) -> Self {
        match source {
            GpuError::OutOfMemory { .. } | GpuError::AllocationFailed { .. } => {
                RenderError::OutOfMemory { what, source }
            }
            source => RenderError::Gpu { what, source },
        }
    }

    /// True for host or GPU memory exhaustion.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            RenderError::OutOfMemory { .. } | RenderError::Mesh(MeshError::OutOfMemory { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::BufferHandle;

    #[test]
    fn test_device_allocation_failure_counts_as_out_of_memory() {
        let error = RenderError::upload(
            "cube positions",
            GpuError::AllocationFailed {
                requested: 1 << 30,
                message: "Out of memory".into(),
            },
        );
        assert!(error.is_out_of_memory());
        assert!(matches!(
            error,
            RenderError::OutOfMemory {
                what: "cube positions",
                ..
            }
        ));
    }

    #[test]
    fn test_other_gpu_errors_are_not_out_of_memory() {
        let handle = BufferHandle::new(7).unwrap();
        let error = RenderError::upload("cube normals", GpuError::UnknownBuffer(handle));
        assert!(!error.is_out_of_memory());
        assert!(matches!(error, RenderError::Gpu { .. }));
    }
}
