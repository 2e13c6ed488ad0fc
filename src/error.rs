//! Frame graph error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::descriptor::DescriptorHeapType;
use crate::render_graph::ResourceHandle;
use crate::state::ResourceId;

/// Errors returned by scheduling, allocation and submission.
///
/// Contract violations (mismatched handle types, stale handles, double
/// registration) are not represented here: they panic at the call site.
#[derive(Error, Debug)]
pub enum FrameGraphError {
    #[error("Unresolved dependencies after scheduling: handles {handles:?}, passes {passes:?}")]
    UnresolvedDependencies {
        /// Handles whose access queues were not drained.
        handles: Vec<ResourceHandle>,
        /// Names of the passes that could not be scheduled.
        passes: Vec<String>,
    },
    #[error("{heap:?} {region} descriptors exhausted: requested {requested}, capacity {capacity}")]
    DescriptorHeapExhausted {
        /// Heap type.
        heap: DescriptorHeapType,
        /// Exhausted region ("static" or "dynamic").
        region: &'static str,
        /// Number of descriptors requested.
        requested: u32,
        /// Total capacity of the region.
        capacity: u32,
    },
    #[error("Resource {0:?} is not tracked by the device")]
    UntrackedResource(ResourceId),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, FrameGraphError>;
