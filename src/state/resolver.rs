//! Submission-time reconciliation of pending transitions.

use std::collections::HashMap;

use super::{
    GlobalResourceState, GlobalStateTable, ResourceId, ResourceStateTracker, Subresource,
    TrackingInfo, TransitionBarrier,
};
use crate::error::{FrameGraphError, Result};
use crate::types::{QueueType, ResourceState};

/// Resolves a context's pending transitions against the global state table.
///
/// Implicit promotion is consulted before emitting a barrier: buffers and
/// simultaneous-access textures in the common state promote to any state on
/// first use. After the context's states are published, decay sends back to
/// common every buffer, every simultaneous-access texture left read-only, and
/// everything touched on a copy queue.
pub struct BarrierResolver;

impl BarrierResolver {
    /// Resolve `tracker`'s pending transitions and publish its final states.
    ///
    /// Returns the barriers that must execute before the context's work. On
    /// error the table is left untouched.
    pub fn resolve(
        table: &GlobalStateTable,
        queue: QueueType,
        tracker: &ResourceStateTracker,
    ) -> Result<Vec<TransitionBarrier>> {
        let mut resources = table.lock();
        Self::resolve_locked(&mut resources, queue, tracker)
    }

    pub(crate) fn resolve_locked(
        resources: &mut HashMap<ResourceId, GlobalResourceState>,
        queue: QueueType,
        tracker: &ResourceStateTracker,
    ) -> Result<Vec<TransitionBarrier>> {
        if let Some(missing) = tracker
            .pending()
            .iter()
            .find(|pending| !resources.contains_key(&pending.info.id))
        {
            return Err(FrameGraphError::UntrackedResource(missing.info.id));
        }

        let mut barriers = Vec::new();
        for pending in tracker.pending() {
            let global = resources
                .get_mut(&pending.info.id)
                .ok_or(FrameGraphError::UntrackedResource(pending.info.id))?;
            let info = global.info;

            // The context recorded later barriers from `pending.after`, so the
            // subresource must land in exactly that state.
            let mut emit = |subresource: Subresource, before: ResourceState| {
                if before != pending.after && !info.promotes_from(before) {
                    log::trace!(
                        "resolved barrier {:?} {:?}: {:?} -> {:?}",
                        info.id,
                        subresource,
                        before,
                        pending.after
                    );
                    barriers.push(TransitionBarrier {
                        resource: info.id,
                        subresource,
                        before,
                        after: pending.after,
                    });
                }
            };

            match pending.subresource {
                Subresource::All => match global.states.uniform() {
                    Some(before) => emit(Subresource::All, before),
                    None => {
                        for (index, before) in global.states.iter() {
                            emit(Subresource::Index(index), before);
                        }
                    }
                },
                Subresource::Index(index) => emit(pending.subresource, global.states.get(index)),
            }
        }

        for (info, local) in tracker.touched() {
            let Some(global) = resources.get_mut(&info.id) else {
                continue;
            };
            match local.uniform() {
                Some(Some(state)) => {
                    global
                        .states
                        .set(Subresource::All, decayed(info, queue, state));
                }
                Some(None) => {}
                None => {
                    for (index, state) in local.iter() {
                        if let Some(state) = state {
                            global
                                .states
                                .set(Subresource::Index(index), decayed(info, queue, state));
                        }
                    }
                }
            }
        }

        Ok(barriers)
    }
}

/// State a subresource is left in once the submission completes.
fn decayed(info: &TrackingInfo, queue: QueueType, state: ResourceState) -> ResourceState {
    let decays = queue == QueueType::Copy
        || info.is_buffer
        || (info.implicit_transitions && state.is_read_only());
    if decays {
        ResourceState::COMMON
    } else {
        state
    }
}
