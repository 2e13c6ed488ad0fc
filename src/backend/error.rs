//! Backend error types.

use thiserror::Error;

/// Errors reported by a GPU backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create descriptor heap: {0}")]
    DescriptorHeapCreationFailed(String),
    #[error("Failed to create fence: {0}")]
    FenceCreationFailed(String),
    #[error("Failed to submit command lists: {0}")]
    SubmissionFailed(String),
    #[error("Timed out waiting for fence value {0}")]
    FenceTimeout(u64),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;
