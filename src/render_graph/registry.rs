//! Realization and lookup of the objects behind graph handles.

use std::collections::HashMap;
use std::sync::Arc;

use super::{GraphResource, ResourceDescriptor, ResourceHandle, ResourceObject, VirtualResource};
use crate::device::RenderDevice;
use crate::error::Result;

#[derive(Debug)]
struct Slot {
    descriptor: ResourceDescriptor,
    object: ResourceObject,
}

/// Owns the concrete objects behind graph handles across frames.
///
/// Declared resources live in slots indexed by declaration order. Each frame
/// [`realize`](Self::realize) compares the declared descriptor with the one
/// the slot was created from and only creates a new object when they differ,
/// retiring the old one through the device. Slots beyond the current frame's
/// declarations stay cached until [`trim`](Self::trim).
///
/// Imported objects are kept in a separate table that persists across frames;
/// importing the same object twice yields the same handle.
///
/// Dropping the registry releases cached objects immediately, so the GPU must
/// be idle by then.
#[derive(Debug, Default)]
pub struct RenderGraphRegistry {
    declarations: Vec<ResourceDescriptor>,
    slots: Vec<Option<Slot>>,
    /// Declarations realized this frame.
    realized: usize,
    imported: Vec<ResourceObject>,
    imported_lookup: HashMap<usize, u32>,
    epoch: u64,
}

impl RenderGraphRegistry {
    pub(crate) fn new(epoch: u64) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    /// Frame epoch declared handles are versioned with.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of resources declared this frame.
    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    /// Number of imported objects.
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    /// Number of slots holding a realized object, including cached ones.
    pub fn cached_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn declare<T: VirtualResource>(
        &mut self,
        descriptor: T::Descriptor,
    ) -> ResourceHandle {
        let id = self.declarations.len() as u32;
        self.declarations.push(T::into_descriptor(descriptor));
        ResourceHandle::declared(T::TYPE, id, self.epoch)
    }

    pub(crate) fn import<T: GraphResource>(&mut self, object: Arc<T>) -> ResourceHandle {
        let object = T::wrap(object);
        let address = object.address();
        if let Some(&id) = self.imported_lookup.get(&address) {
            return ResourceHandle::imported(T::TYPE, id);
        }
        let id = self.imported.len() as u32;
        self.imported.push(object);
        self.imported_lookup.insert(address, id);
        ResourceHandle::imported(T::TYPE, id)
    }

    /// Whether `handle` was issued by this registry and is still current.
    pub(crate) fn contains(&self, handle: ResourceHandle) -> bool {
        if handle.is_imported() {
            (handle.id() as usize) < self.imported.len()
        } else {
            handle.version() == self.epoch && (handle.id() as usize) < self.declarations.len()
        }
    }

    /// Create or reuse the object behind every declaration of this frame.
    pub fn realize(&mut self, device: &RenderDevice) -> Result<()> {
        if self.slots.len() < self.declarations.len() {
            self.slots.resize_with(self.declarations.len(), || None);
        }

        let mut created = 0;
        for (index, descriptor) in self.declarations.iter().enumerate().skip(self.realized) {
            let slot = &mut self.slots[index];
            if slot.as_ref().is_some_and(|slot| slot.descriptor == *descriptor) {
                continue;
            }
            let object = match descriptor {
                ResourceDescriptor::Texture(desc) => {
                    ResourceObject::Texture(device.create_texture(desc.clone())?)
                }
                ResourceDescriptor::Buffer(desc) => {
                    ResourceObject::Buffer(device.create_buffer(desc.clone())?)
                }
            };
            log::debug!(
                "Realized {:?} slot {} {:?}",
                descriptor.ty(),
                index,
                descriptor.label()
            );
            let previous = slot.replace(Slot {
                descriptor: descriptor.clone(),
                object,
            });
            if let Some(previous) = previous {
                device.retire(previous.object);
            }
            created += 1;
        }

        log::trace!(
            "Registry realized {} declarations: {} created, {} reused",
            self.declarations.len() - self.realized,
            created,
            self.declarations.len() - self.realized - created
        );
        self.realized = self.declarations.len();
        Ok(())
    }

    /// Retire cached objects in slots beyond this frame's declarations.
    pub fn trim(&mut self, device: &RenderDevice) {
        let keep = self.declarations.len();
        if self.slots.len() <= keep {
            return;
        }
        let mut retired = 0;
        for slot in self.slots.drain(keep..).flatten() {
            device.retire(slot.object);
            retired += 1;
        }
        if retired > 0 {
            log::debug!("Registry trimmed {} cached resources", retired);
        }
    }

    /// Retire every imported object; existing imported handles become invalid.
    pub fn clear_imports(&mut self, device: &RenderDevice) {
        self.imported_lookup.clear();
        for object in self.imported.drain(..) {
            device.retire(object);
        }
    }

    /// Start a new frame: forget declarations and bump the epoch.
    pub(crate) fn begin_epoch(&mut self, epoch: u64) {
        self.declarations.clear();
        self.realized = 0;
        self.epoch = epoch;
    }

    /// Resolve a handle to its object.
    ///
    /// Panics if the handle's type is not `T`, the handle is stale or out of
    /// range, or the declaration has not been realized yet.
    pub fn get<T: GraphResource>(&self, handle: ResourceHandle) -> &Arc<T> {
        assert!(handle.is_valid(), "resolved an invalid handle");
        assert_eq!(
            handle.ty(),
            T::TYPE,
            "handle {:?} resolved as {:?}",
            handle,
            T::TYPE
        );
        let object = self.object(handle).unwrap_or_else(|| {
            if handle.is_imported() {
                panic!("imported handle {:?} is out of range", handle)
            } else if handle.version() != self.epoch {
                panic!(
                    "stale handle {:?}: the graph is at epoch {}",
                    handle, self.epoch
                )
            } else {
                panic!("handle {:?} is out of range or not realized yet", handle)
            }
        });
        T::unwrap(object)
            .unwrap_or_else(|| panic!("handle {:?} refers to a {:?}", handle, object.ty()))
    }

    /// Non-panicking variant of [`get`](Self::get).
    pub fn try_get<T: GraphResource>(&self, handle: ResourceHandle) -> Option<&Arc<T>> {
        if !handle.is_valid() || handle.ty() != T::TYPE {
            return None;
        }
        self.object(handle).and_then(T::unwrap)
    }

    /// The object behind a valid, current handle.
    pub(crate) fn object(&self, handle: ResourceHandle) -> Option<&ResourceObject> {
        let index = handle.id() as usize;
        if handle.is_imported() {
            return self.imported.get(index);
        }
        if handle.version() != self.epoch || index >= self.realized {
            return None;
        }
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .map(|slot| &slot.object)
    }
}
