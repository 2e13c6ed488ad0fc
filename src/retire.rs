//! Fence-gated retirement ring.
//!
//! GPU work runs up to N frames behind the CPU, so objects the CPU stops
//! referencing must outlive the frames that may still use them. Retired
//! objects go into the slot of the current frame; when the frame ends the slot
//! is sealed with a [`SyncPoint`] holding the fence value of every queue the
//! frame submitted to, and its objects are released once all of those fences
//! reach it.
//!
//! ```text
//!   frame % N:      0          1          2
//!              ┌────────┐ ┌────────┐ ┌────────┐
//!              │objects │ │objects │ │objects │
//!              │G4 C2 X0│ │G5 C2 X1│ │ (open) │
//!              └────────┘ └────────┘ └────────┘
//! ```
//!
//! Advancing into a slot that is still sealed means the CPU is N frames
//! ahead; [`RetirementRing::end_frame`] reports the sync point to wait for.
//! Objects retired into such a slot stay open and are never released by the
//! older sync point.

use crate::types::QueueType;

/// Per-queue fence values that must all complete before a frame is done.
///
/// A value of zero means the queue has nothing to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SyncPoint {
    values: [u64; QueueType::COUNT],
}

impl SyncPoint {
    /// A sync point that is always reached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync point waiting for `value` on the graphics queue only.
    pub fn graphics(value: u64) -> Self {
        Self::new().with(QueueType::Graphics, value)
    }

    /// Set the fence value of one queue.
    pub fn with(mut self, queue: QueueType, value: u64) -> Self {
        self.values[queue.index()] = value;
        self
    }

    /// Fence value of one queue.
    pub fn value(&self, queue: QueueType) -> u64 {
        self.values[queue.index()]
    }

    /// Per-queue maximum of two sync points.
    pub fn merge(self, other: SyncPoint) -> Self {
        let mut merged = self;
        for (value, other) in merged.values.iter_mut().zip(other.values) {
            *value = (*value).max(other);
        }
        merged
    }

    /// Whether every queue's `completed` value has reached this sync point.
    pub fn is_reached(&self, completed: &SyncPoint) -> bool {
        self.values
            .iter()
            .zip(completed.values.iter())
            .all(|(needed, done)| needed <= done)
    }

    /// Queues with a non-zero fence value.
    pub fn queues(&self) -> impl Iterator<Item = (QueueType, u64)> + '_ {
        QueueType::ALL
            .iter()
            .map(move |&queue| (queue, self.value(queue)))
            .filter(|&(_, value)| value > 0)
    }
}

#[derive(Debug)]
struct RetirementSlot<T> {
    /// Retired during the frame currently using this slot.
    open: Vec<T>,
    /// Retired in an earlier frame, waiting for `sync_point`.
    sealed: Vec<T>,
    sync_point: Option<SyncPoint>,
}

impl<T> Default for RetirementSlot<T> {
    fn default() -> Self {
        Self {
            open: Vec::new(),
            sealed: Vec::new(),
            sync_point: None,
        }
    }
}

/// Ring of retired objects indexed by frame number modulo frames-in-flight.
#[derive(Debug)]
pub struct RetirementRing<T> {
    slots: Vec<RetirementSlot<T>>,
    frame: u64,
}

impl<T> RetirementRing<T> {
    /// Create a ring with one slot per frame in flight.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame in flight is required");
        Self {
            slots: (0..frames_in_flight)
                .map(|_| RetirementSlot::default())
                .collect(),
            frame: 0,
        }
    }

    /// Number of slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames ended so far.
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    fn current(&mut self) -> &mut RetirementSlot<T> {
        let index = (self.frame % self.slots.len() as u64) as usize;
        &mut self.slots[index]
    }

    /// Retire an object into the current frame's slot.
    pub fn retire(&mut self, object: T) {
        self.current().open.push(object);
    }

    /// Seal the current slot with the sync point of this frame and advance
    /// to the next one.
    ///
    /// A slot still holding an older sealed batch is merged with the new one
    /// and waits for both. Returns the sync point the next slot is still
    /// waiting for, if any; callers throttle on it.
    pub fn end_frame(&mut self, sync_point: SyncPoint) -> Option<SyncPoint> {
        let slot = self.current();
        let mut open = std::mem::take(&mut slot.open);
        slot.sealed.append(&mut open);
        slot.sync_point = Some(
            slot.sync_point
                .map_or(sync_point, |existing| existing.merge(sync_point)),
        );
        self.frame += 1;
        self.current().sync_point
    }

    /// Release every sealed batch whose sync point has been reached.
    pub fn reclaim(&mut self, completed: &SyncPoint) -> Vec<T> {
        let mut released = Vec::new();
        for slot in &mut self.slots {
            if slot.sync_point.is_some_and(|sync| sync.is_reached(completed)) {
                released.append(&mut slot.sealed);
                slot.sync_point = None;
            }
        }
        released
    }

    /// Release everything regardless of fence state; the caller guarantees
    /// the GPU is idle.
    pub fn drain(&mut self) -> Vec<T> {
        let mut released = Vec::new();
        for slot in &mut self.slots {
            released.append(&mut slot.sealed);
            released.append(&mut slot.open);
            slot.sync_point = None;
        }
        released
    }

    /// Number of objects waiting for release.
    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.open.len() + slot.sealed.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphics(value: u64) -> SyncPoint {
        SyncPoint::graphics(value)
    }

    #[test]
    fn test_objects_release_after_fence() {
        let mut ring = RetirementRing::new(3);
        ring.retire("a");
        assert_eq!(ring.end_frame(graphics(1)), None);

        assert!(ring.reclaim(&graphics(0)).is_empty());
        assert_eq!(ring.reclaim(&graphics(1)), vec!["a"]);
        assert_eq!(ring.pending_count(), 0);
    }

    #[test]
    fn test_open_slot_is_never_reclaimed() {
        let mut ring = RetirementRing::new(2);
        ring.retire(1);
        assert!(ring.reclaim(&graphics(u64::MAX)).is_empty());
        assert_eq!(ring.pending_count(), 1);
    }

    #[test]
    fn test_wrapping_reports_outstanding_fence() {
        let mut ring = RetirementRing::new(2);
        ring.retire(1);
        assert_eq!(ring.end_frame(graphics(10)), None);
        ring.retire(2);
        assert_eq!(ring.end_frame(graphics(11)), Some(graphics(10)));

        assert_eq!(ring.reclaim(&graphics(10)), vec![1]);
        assert_eq!(ring.end_frame(graphics(12)), Some(graphics(11)));
    }

    #[test]
    fn test_retire_into_sealed_slot_waits_for_its_own_frame() {
        let mut ring = RetirementRing::new(2);
        ring.retire("a");
        ring.end_frame(graphics(1));
        ring.retire("b");
        assert_eq!(ring.end_frame(graphics(2)), Some(graphics(1)));

        // The slot of frame 0 is reused before its fence completed.
        ring.retire("c");
        assert_eq!(ring.reclaim(&graphics(1)), vec!["a"]);
        assert_eq!(ring.pending_count(), 2);

        ring.end_frame(graphics(3));
        assert_eq!(ring.reclaim(&graphics(2)), vec!["b"]);
        assert_eq!(ring.reclaim(&graphics(3)), vec!["c"]);
    }

    #[test]
    fn test_sealing_over_an_unreclaimed_slot_waits_for_both() {
        let mut ring = RetirementRing::new(1);
        ring.retire("a");
        ring.end_frame(graphics(1));
        ring.retire("b");
        ring.end_frame(SyncPoint::new().with(QueueType::Compute, 4));

        assert!(ring.reclaim(&graphics(1)).is_empty());
        let done = graphics(1).with(QueueType::Compute, 4);
        assert_eq!(ring.reclaim(&done), vec!["a", "b"]);
    }

    #[test]
    fn test_every_queue_must_reach_the_sync_point() {
        let mut ring = RetirementRing::new(2);
        ring.retire("compute chunk");
        ring.end_frame(graphics(1).with(QueueType::Compute, 1));

        assert!(ring.reclaim(&graphics(1)).is_empty());
        let done = graphics(1).with(QueueType::Compute, 1);
        assert_eq!(ring.reclaim(&done), vec!["compute chunk"]);
    }

    #[test]
    fn test_sync_point_queues_skip_zero() {
        let sync = graphics(3).with(QueueType::Copy, 7);
        let queues: Vec<_> = sync.queues().collect();
        assert_eq!(queues, vec![(QueueType::Graphics, 3), (QueueType::Copy, 7)]);
        assert_eq!(sync.merge(graphics(5)).value(QueueType::Graphics), 5);
    }

    #[test]
    fn test_drain_releases_everything() {
        let mut ring = RetirementRing::new(2);
        ring.retire(1);
        ring.end_frame(graphics(5));
        ring.retire(2);
        let mut drained = ring.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
    }
}
