//! Per-resource cache of descriptor views.

use std::collections::HashMap;
use std::hash::Hash;

use crate::descriptor::{CpuDescriptorHandle, DescriptorHeapAllocation};
use crate::error::Result;

/// Stable index of a view owned by a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewIndex(pub(crate) u32);

impl ViewIndex {
    /// Raw index value.
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Map from view description to a CPU descriptor, created on first request.
#[derive(Debug)]
pub(crate) struct ViewCache<K> {
    lookup: HashMap<K, ViewIndex>,
    allocations: Vec<DescriptorHeapAllocation>,
}

impl<K: Eq + Hash + Copy> ViewCache<K> {
    pub(crate) fn new() -> Self {
        Self {
            lookup: HashMap::new(),
            allocations: Vec::new(),
        }
    }

    /// Index of the view for `key`, creating it with `create` if absent.
    pub(crate) fn get_or_create(
        &mut self,
        key: K,
        create: impl FnOnce() -> Result<DescriptorHeapAllocation>,
    ) -> Result<ViewIndex> {
        if let Some(index) = self.lookup.get(&key) {
            return Ok(*index);
        }
        let allocation = create()?;
        let index = ViewIndex(self.allocations.len() as u32);
        self.allocations.push(allocation);
        self.lookup.insert(key, index);
        Ok(index)
    }

    pub(crate) fn handle(&self, index: ViewIndex) -> CpuDescriptorHandle {
        let allocation = self
            .allocations
            .get(index.0 as usize)
            .unwrap_or_else(|| panic!("{:?} does not belong to this resource", index));
        allocation.cpu_handle(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.allocations.len()
    }
}
