//! Resource state tracking and barrier resolution.
//!
//! # Architecture
//!
//! Every GPU resource has an authoritative per-subresource state stored in the
//! device-wide [`GlobalStateTable`]. Recording contexts never read it: each
//! context owns a [`ResourceStateTracker`] caching the states it has itself
//! established. A transition on a resource the context has not touched yet is
//! recorded as *pending* because its current state is unknown locally.
//!
//! At submission the queue runs the [`BarrierResolver`], which compares every
//! pending transition with the global table, emits the missing barriers into a
//! barrier-only batch placed before the context's work, and publishes the
//! context's final states back to the global table.
//!
//! ```text
//! Context A ──► tracker (local) ──┐
//!                                 ├──► resolver ──► global table
//! Context B ──► tracker (local) ──┘        │
//!                                          └──► barrier-only command list
//! ```

mod resolver;
mod subresource;
mod tracker;

pub use resolver::BarrierResolver;
pub use subresource::SubresourceStates;
pub use tracker::{PendingTransition, ResourceStateTracker};

use std::collections::HashMap;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};

use crate::types::ResourceState;

/// Device-unique identifier of a tracked GPU resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// Subresource selector for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subresource {
    /// Every subresource of the resource.
    #[default]
    All,
    /// A single subresource by flat index.
    Index(u32),
}

/// Static tracking properties of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingInfo {
    /// Resource identifier.
    pub id: ResourceId,
    /// Number of independently tracked subresources (1 for buffers).
    pub subresource_count: u32,
    /// Whether the resource is a buffer.
    pub is_buffer: bool,
    /// Whether the resource implicitly promotes from / decays to common.
    ///
    /// True for buffers and simultaneous-access textures.
    pub implicit_transitions: bool,
}

impl TrackingInfo {
    /// Tracking info for a buffer.
    pub fn buffer(id: ResourceId) -> Self {
        Self {
            id,
            subresource_count: 1,
            is_buffer: true,
            implicit_transitions: true,
        }
    }

    /// Tracking info for a texture.
    pub fn texture(id: ResourceId, subresource_count: u32, simultaneous_access: bool) -> Self {
        Self {
            id,
            subresource_count: subresource_count.max(1),
            is_buffer: false,
            implicit_transitions: simultaneous_access,
        }
    }

    /// Whether a subresource currently in `before` implicitly promotes to any
    /// requested state without an explicit barrier.
    #[inline]
    pub fn promotes_from(&self, before: ResourceState) -> bool {
        self.implicit_transitions && before.is_common()
    }
}

/// A single state transition of a (sub)resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    /// Transitioned resource.
    pub resource: ResourceId,
    /// Affected subresource(s).
    pub subresource: Subresource,
    /// State before the barrier.
    pub before: ResourceState,
    /// State after the barrier.
    pub after: ResourceState,
}

/// Authoritative state record of one resource.
#[derive(Debug, Clone)]
pub struct GlobalResourceState {
    /// Tracking properties.
    pub info: TrackingInfo,
    /// Current per-subresource states.
    pub states: SubresourceStates<ResourceState>,
}

/// Device-wide table of authoritative resource states.
///
/// Shared across recording contexts behind an `Arc`, but only mutated by the
/// queue barrier resolver at submission time (plus registration when a
/// resource is created or destroyed).
#[derive(Debug, Default)]
pub struct GlobalStateTable {
    resources: Mutex<HashMap<ResourceId, GlobalResourceState>>,
}

impl GlobalStateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a resource in the given initial state.
    pub fn register(&self, info: TrackingInfo, initial: ResourceState) {
        let states = SubresourceStates::new(info.subresource_count, initial);
        let previous = self
            .resources
            .lock()
            .insert(info.id, GlobalResourceState { info, states });
        assert!(previous.is_none(), "{:?} registered twice", info.id);
    }

    /// Stop tracking a resource.
    pub fn unregister(&self, id: ResourceId) {
        self.resources.lock().remove(&id);
    }

    /// Current state of one subresource, if the resource is tracked.
    pub fn state(&self, id: ResourceId, subresource: u32) -> Option<ResourceState> {
        self.resources
            .lock()
            .get(&id)
            .map(|resource| resource.states.get(subresource))
    }

    /// Whether the resource is tracked.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.lock().contains_key(&id)
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    /// Whether no resource is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, GlobalResourceState>> {
        self.resources.lock()
    }
}

static_assertions::assert_impl_all!(GlobalStateTable: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_query() {
        let table = GlobalStateTable::new();
        let id = ResourceId(1);
        table.register(TrackingInfo::texture(id, 4, false), ResourceState::COMMON);

        assert!(table.contains(id));
        assert_eq!(table.state(id, 3), Some(ResourceState::COMMON));

        table.unregister(id);
        assert!(table.is_empty());
        assert_eq!(table.state(id, 0), None);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_registration_panics() {
        let table = GlobalStateTable::new();
        let info = TrackingInfo::buffer(ResourceId(9));
        table.register(info, ResourceState::COMMON);
        table.register(info, ResourceState::COMMON);
    }

    #[test]
    fn test_promotion_rules() {
        let buffer = TrackingInfo::buffer(ResourceId(1));
        let texture = TrackingInfo::texture(ResourceId(2), 1, false);
        let shared = TrackingInfo::texture(ResourceId(3), 1, true);

        assert!(buffer.promotes_from(ResourceState::COMMON));
        assert!(!buffer.promotes_from(ResourceState::COPY_DEST));
        assert!(!texture.promotes_from(ResourceState::COMMON));
        assert!(shared.promotes_from(ResourceState::COMMON));
    }
}
