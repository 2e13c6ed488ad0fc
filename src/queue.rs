//! Command queues and submission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{CommandList, Device, Fence};
use crate::context::CommandContext;
use crate::error::{FrameGraphError, Result};
use crate::state::{BarrierResolver, GlobalStateTable};
use crate::types::QueueType;

/// One hardware queue with its timeline fence.
///
/// Submission is the only place the global state table is mutated: each
/// context's pending transitions are resolved against it and a barrier-only
/// command list is inserted in front of the context's own work when needed.
pub struct CommandQueue {
    ty: QueueType,
    device: Arc<dyn Device>,
    states: Arc<GlobalStateTable>,
    fence: Arc<dyn Fence>,
    /// Last value handed to `signal`.
    last_signaled: AtomicU64,
}

impl CommandQueue {
    pub(crate) fn new(
        ty: QueueType,
        device: Arc<dyn Device>,
        states: Arc<GlobalStateTable>,
    ) -> Result<Self> {
        let fence = device.create_fence(0)?;
        Ok(Self {
            ty,
            device,
            states,
            fence,
            last_signaled: AtomicU64::new(0),
        })
    }

    /// Queue type.
    pub fn ty(&self) -> QueueType {
        self.ty
    }

    /// The queue's timeline fence.
    pub fn fence(&self) -> &Arc<dyn Fence> {
        &self.fence
    }

    /// Last fence value signaled on this queue.
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    /// Fence value the GPU has completed.
    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    /// Submit recorded contexts in order and signal the fence.
    ///
    /// Returns the fence value that completes once the work has executed.
    /// Each context's resolved barriers execute immediately before its own
    /// work. Contexts are reset and may record again immediately. If a
    /// context names a resource that no longer exists nothing is executed and
    /// the contexts keep their recorded work.
    pub fn submit(&self, contexts: &mut [CommandContext]) -> Result<u64> {
        for ctx in contexts.iter() {
            assert_eq!(
                ctx.queue_type(),
                self.ty,
                "{:?} context submitted to the {:?} queue",
                ctx.queue_type(),
                self.ty
            );
        }
        let mut lists = Vec::with_capacity(contexts.len() * 2);
        {
            let mut resources = self.states.lock();
            for ctx in contexts.iter() {
                if let Some(missing) = ctx
                    .tracker()
                    .pending()
                    .iter()
                    .find(|pending| !resources.contains_key(&pending.info.id))
                {
                    return Err(FrameGraphError::UntrackedResource(missing.info.id));
                }
            }
            for ctx in contexts.iter_mut() {
                let barriers =
                    BarrierResolver::resolve_locked(&mut resources, self.ty, ctx.tracker())?;
                if !barriers.is_empty() {
                    log::trace!(
                        "Prepending {} resolved barriers on the {:?} queue",
                        barriers.len(),
                        self.ty
                    );
                    lists.push(CommandList::from_barriers(barriers));
                }
                let list = ctx.close();
                if !list.is_empty() {
                    lists.push(list);
                }
            }
        }

        if !lists.is_empty() {
            self.device.execute(self.ty, &lists)?;
        }
        let value = self.signal()?;
        for ctx in contexts.iter_mut() {
            ctx.finish_submission();
        }
        Ok(value)
    }

    /// Signal the next fence value without submitting work.
    pub fn signal(&self) -> Result<u64> {
        let value = self.last_signaled.fetch_add(1, Ordering::AcqRel) + 1;
        self.device.signal(self.ty, &self.fence, value)?;
        Ok(value)
    }

    /// Block until everything submitted so far has completed.
    pub fn wait_idle(&self) -> Result<()> {
        self.fence.wait(self.last_signaled())?;
        Ok(())
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("ty", &self.ty)
            .field("last_signaled", &self.last_signaled())
            .field("completed", &self.completed_value())
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandQueue: Send, Sync);
