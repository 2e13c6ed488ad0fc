//! Per-context resource state cache.

use std::collections::HashMap;

use super::{ResourceId, Subresource, SubresourceStates, TrackingInfo, TransitionBarrier};
use crate::types::ResourceState;

/// A transition whose `before` state was unknown to the recording context.
///
/// Resolved against the global state table at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    /// Tracking properties of the resource.
    pub info: TrackingInfo,
    /// Affected subresource(s).
    pub subresource: Subresource,
    /// Requested state.
    pub after: ResourceState,
}

#[derive(Debug, Clone)]
struct LocalResource {
    info: TrackingInfo,
    /// `None` for subresources this context has not touched yet.
    states: SubresourceStates<Option<ResourceState>>,
}

/// Per-recording-context cache of logical resource states.
///
/// Transitions on subresources the context already touched resolve
/// immediately into barriers; the others become [`PendingTransition`]s.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    resources: HashMap<ResourceId, LocalResource>,
    pending: Vec<PendingTransition>,
    barriers: Vec<TransitionBarrier>,
}

/// Outcome of requesting `after` on a subresource known to be in `before`.
///
/// Returns whether a barrier is needed and the resulting state.
fn next_state(
    info: &TrackingInfo,
    before: ResourceState,
    after: ResourceState,
) -> (bool, ResourceState) {
    if before.satisfies(after) {
        (false, before)
    } else if info.promotes_from(before) {
        (false, after)
    } else {
        (true, after)
    }
}

impl ResourceStateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a state for a (sub)resource.
    pub fn transition(
        &mut self,
        info: &TrackingInfo,
        subresource: Subresource,
        after: ResourceState,
    ) {
        let resource = self.resources.entry(info.id).or_insert_with(|| LocalResource {
            info: *info,
            states: SubresourceStates::new(info.subresource_count, None),
        });

        let mut barriers = Vec::new();
        match subresource {
            Subresource::Index(index) => match resource.states.get(index) {
                None => {
                    self.pending.push(PendingTransition {
                        info: *info,
                        subresource,
                        after,
                    });
                    resource.states.set(subresource, Some(after));
                }
                Some(before) => {
                    let (needs_barrier, state) = next_state(info, before, after);
                    if needs_barrier {
                        barriers.push((subresource, before, state));
                    }
                    resource.states.set(subresource, Some(state));
                }
            },
            Subresource::All => match resource.states.uniform() {
                Some(None) => {
                    self.pending.push(PendingTransition {
                        info: *info,
                        subresource,
                        after,
                    });
                    resource.states.set(Subresource::All, Some(after));
                }
                Some(Some(before)) => {
                    let (needs_barrier, state) = next_state(info, before, after);
                    if needs_barrier {
                        barriers.push((Subresource::All, before, state));
                    }
                    resource.states.set(Subresource::All, Some(state));
                }
                None => {
                    let mut results = Vec::with_capacity(resource.states.count() as usize);
                    for (index, current) in resource.states.iter() {
                        let target = Subresource::Index(index);
                        match current {
                            None => {
                                self.pending.push(PendingTransition {
                                    info: *info,
                                    subresource: target,
                                    after,
                                });
                                results.push(after);
                            }
                            Some(before) => {
                                let (needs_barrier, state) = next_state(info, before, after);
                                if needs_barrier {
                                    barriers.push((target, before, state));
                                }
                                results.push(state);
                            }
                        }
                    }
                    if results.iter().all(|state| *state == after) {
                        resource.states.set(Subresource::All, Some(after));
                    } else {
                        for (index, state) in results.into_iter().enumerate() {
                            resource.states.set(Subresource::Index(index as u32), Some(state));
                        }
                    }
                }
            },
        }

        for (subresource, before, after) in barriers {
            self.push_barrier(TransitionBarrier {
                resource: info.id,
                subresource,
                before,
                after,
            });
        }
    }

    /// Queue a resolved barrier, folding it into the previous one when both
    /// transition the same subresource back to back.
    fn push_barrier(&mut self, barrier: TransitionBarrier) {
        if let Some(last) = self.barriers.last_mut() {
            if last.resource == barrier.resource
                && last.subresource == barrier.subresource
                && last.after == barrier.before
            {
                last.after = barrier.after;
                if last.before == last.after {
                    self.barriers.pop();
                }
                return;
            }
        }
        log::trace!(
            "barrier {:?} {:?}: {:?} -> {:?}",
            barrier.resource,
            barrier.subresource,
            barrier.before,
            barrier.after
        );
        self.barriers.push(barrier);
    }

    /// Barriers resolved locally and not yet flushed.
    pub fn barriers(&self) -> &[TransitionBarrier] {
        &self.barriers
    }

    /// Take the locally resolved barriers for recording.
    pub fn take_barriers(&mut self) -> Vec<TransitionBarrier> {
        std::mem::take(&mut self.barriers)
    }

    /// Transitions awaiting resolution against the global table.
    pub fn pending(&self) -> &[PendingTransition] {
        &self.pending
    }

    /// Local state of one subresource, if this context has touched it.
    pub fn local_state(&self, id: ResourceId, subresource: u32) -> Option<ResourceState> {
        self.resources
            .get(&id)
            .and_then(|resource| resource.states.get(subresource))
    }

    /// Every resource touched by this context with its final local states.
    pub(crate) fn touched(
        &self,
    ) -> impl Iterator<Item = (&TrackingInfo, &SubresourceStates<Option<ResourceState>>)> + '_ {
        self.resources
            .values()
            .map(|resource| (&resource.info, &resource.states))
    }

    /// Forget everything; called once the context's work has been submitted.
    pub fn reset(&mut self) {
        self.resources.clear();
        self.pending.clear();
        self.barriers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(id: u64, subresources: u32) -> TrackingInfo {
        TrackingInfo::texture(ResourceId(id), subresources, false)
    }

    #[test]
    fn test_first_touch_is_pending() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 1);

        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);

        assert_eq!(tracker.pending().len(), 1);
        assert!(tracker.barriers().is_empty());
        assert_eq!(
            tracker.local_state(info.id, 0),
            Some(ResourceState::RENDER_TARGET)
        );
    }

    #[test]
    fn test_repeated_transition_is_idempotent() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 1);

        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        tracker.transition(
            &info,
            Subresource::All,
            ResourceState::PIXEL_SHADER_RESOURCE,
        );
        assert_eq!(tracker.take_barriers().len(), 1);

        tracker.transition(
            &info,
            Subresource::All,
            ResourceState::PIXEL_SHADER_RESOURCE,
        );
        assert!(tracker.barriers().is_empty());
        assert_eq!(tracker.pending().len(), 1);
    }

    #[test]
    fn test_read_only_superset_needs_no_barrier() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 1);

        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        tracker.transition(&info, Subresource::All, ResourceState::ALL_SHADER_RESOURCE);
        tracker.transition(
            &info,
            Subresource::All,
            ResourceState::PIXEL_SHADER_RESOURCE,
        );

        assert_eq!(tracker.barriers().len(), 1);
        assert_eq!(
            tracker.local_state(info.id, 0),
            Some(ResourceState::ALL_SHADER_RESOURCE)
        );
    }

    #[test]
    fn test_back_to_back_barriers_fold() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 1);

        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        tracker.transition(
            &info,
            Subresource::All,
            ResourceState::PIXEL_SHADER_RESOURCE,
        );
        tracker.transition(&info, Subresource::All, ResourceState::COPY_SOURCE);

        let barriers = tracker.take_barriers();
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].before, ResourceState::RENDER_TARGET);
        assert_eq!(barriers[0].after, ResourceState::COPY_SOURCE);
    }

    #[test]
    fn test_fold_back_to_original_state_cancels() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 1);

        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        tracker.transition(
            &info,
            Subresource::All,
            ResourceState::PIXEL_SHADER_RESOURCE,
        );
        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);

        assert!(tracker.barriers().is_empty());
    }

    #[test]
    fn test_divergent_subresources() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 4);

        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        tracker.transition(
            &info,
            Subresource::Index(0),
            ResourceState::PIXEL_SHADER_RESOURCE,
        );
        tracker.transition(&info, Subresource::Index(1), ResourceState::COPY_SOURCE);

        assert_eq!(
            tracker.local_state(info.id, 0),
            Some(ResourceState::PIXEL_SHADER_RESOURCE)
        );
        assert_eq!(
            tracker.local_state(info.id, 1),
            Some(ResourceState::COPY_SOURCE)
        );
        assert_eq!(
            tracker.local_state(info.id, 2),
            Some(ResourceState::RENDER_TARGET)
        );
        assert_eq!(tracker.barriers().len(), 2);

        // Whole-resource request on a divergent record emits one barrier per
        // subresource that differs.
        tracker.take_barriers();
        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        assert_eq!(tracker.barriers().len(), 2);
    }

    #[test]
    fn test_partially_known_resource_mixes_pending_and_barriers() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 2);

        tracker.transition(&info, Subresource::Index(0), ResourceState::COPY_DEST);
        tracker.transition(
            &info,
            Subresource::All,
            ResourceState::PIXEL_SHADER_RESOURCE,
        );

        assert_eq!(tracker.barriers().len(), 1);
        assert_eq!(tracker.pending().len(), 2);
        assert_eq!(tracker.pending()[1].subresource, Subresource::Index(1));
    }

    #[test]
    fn test_buffer_promotes_from_common_locally() {
        let mut tracker = ResourceStateTracker::new();
        let info = TrackingInfo::buffer(ResourceId(5));

        tracker.transition(&info, Subresource::All, ResourceState::COMMON);
        tracker.transition(&info, Subresource::All, ResourceState::UNORDERED_ACCESS);

        assert!(tracker.barriers().is_empty());
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut tracker = ResourceStateTracker::new();
        let info = texture(1, 1);
        tracker.transition(&info, Subresource::All, ResourceState::RENDER_TARGET);
        tracker.reset();

        assert!(tracker.pending().is_empty());
        assert_eq!(tracker.local_state(info.id, 0), None);
    }
}
