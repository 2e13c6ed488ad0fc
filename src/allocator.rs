//! Variable-size free-list allocator over a linear range.
//!
//! Free blocks are indexed twice: by offset (for coalescing on free) and by
//! `(size, offset)` (for best-fit allocation). Both operations are
//! O(log n) in the number of free blocks.
//!
//! # Example
//!
//! ```ignore
//! let mut allocator = VariableSizeAllocator::new(1024);
//! let a = allocator.allocate(100, 1).unwrap();
//! let b = allocator.allocate(64, 64).unwrap();
//! allocator.free(a);
//! allocator.free(b);
//! assert!(allocator.is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet};

/// A block handed out by [`VariableSizeAllocator::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    /// Offset of the first unit.
    pub offset: u64,
    /// Number of units.
    pub size: u64,
}

/// Best-fit free-list allocator.
#[derive(Debug, Clone)]
pub struct VariableSizeAllocator {
    capacity: u64,
    free_size: u64,
    /// offset -> size
    by_offset: BTreeMap<u64, u64>,
    /// (size, offset)
    by_size: BTreeSet<(u64, u64)>,
}

impl VariableSizeAllocator {
    /// Create an allocator managing `[0, capacity)`.
    pub fn new(capacity: u64) -> Self {
        let mut allocator = Self {
            capacity,
            free_size: 0,
            by_offset: BTreeMap::new(),
            by_size: BTreeSet::new(),
        };
        if capacity > 0 {
            allocator.insert_block(0, capacity);
        }
        allocator
    }

    /// Total managed size.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Total free size (possibly fragmented).
    pub fn free_size(&self) -> u64 {
        self.free_size
    }

    /// Total allocated size.
    pub fn used_size(&self) -> u64 {
        self.capacity - self.free_size
    }

    /// Whether nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.free_size == self.capacity
    }

    /// Whether nothing is free.
    pub fn is_full(&self) -> bool {
        self.free_size == 0
    }

    /// Number of disjoint free blocks.
    pub fn free_block_count(&self) -> usize {
        self.by_offset.len()
    }

    /// Size of the largest free block.
    pub fn largest_free_block(&self) -> u64 {
        self.by_size.iter().next_back().map_or(0, |&(size, _)| size)
    }

    /// Allocate `size` units whose offset is a multiple of `alignment`.
    ///
    /// Picks the smallest free block that fits. Alignment padding in front
    /// of the allocation stays on the free list. Returns `None` if no block
    /// fits.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<Allocation> {
        assert!(size > 0, "allocation size must be non-zero");
        assert!(
            alignment.is_power_of_two(),
            "alignment {} is not a power of two",
            alignment
        );
        if size > self.free_size {
            return None;
        }

        let (block_size, block_offset, aligned) = self
            .by_size
            .range((size, 0)..)
            .find_map(|&(block_size, block_offset)| {
                let aligned = align_up(block_offset, alignment);
                let padding = aligned - block_offset;
                (block_size >= padding + size).then_some((block_size, block_offset, aligned))
            })?;

        self.remove_block(block_offset, block_size);

        let padding = aligned - block_offset;
        if padding > 0 {
            self.insert_block(block_offset, padding);
        }
        let tail = block_size - padding - size;
        if tail > 0 {
            self.insert_block(aligned + size, tail);
        }

        Some(Allocation {
            offset: aligned,
            size,
        })
    }

    /// Return a block to the free list, merging it with adjacent free blocks.
    pub fn free(&mut self, allocation: Allocation) {
        let Allocation { mut offset, mut size } = allocation;
        assert!(
            size > 0 && offset + size <= self.capacity,
            "freed block [{}, {}) is outside the managed range [0, {})",
            offset,
            offset + size,
            self.capacity
        );

        if let Some((&prev_offset, &prev_size)) = self.by_offset.range(..offset).next_back() {
            assert!(
                prev_offset + prev_size <= offset,
                "freed block at {} overlaps free block [{}, {})",
                offset,
                prev_offset,
                prev_offset + prev_size
            );
            if prev_offset + prev_size == offset {
                self.remove_block(prev_offset, prev_size);
                offset = prev_offset;
                size += prev_size;
            }
        }

        if let Some((&next_offset, &next_size)) = self.by_offset.range(offset..).next() {
            assert!(
                offset + size <= next_offset,
                "freed block [{}, {}) overlaps free block at {}",
                offset,
                offset + size,
                next_offset
            );
            if offset + size == next_offset {
                self.remove_block(next_offset, next_size);
                size += next_size;
            }
        }

        self.insert_block(offset, size);
    }

    /// Iterate free blocks in offset order.
    pub fn free_blocks(&self) -> impl Iterator<Item = Allocation> + '_ {
        self.by_offset
            .iter()
            .map(|(&offset, &size)| Allocation { offset, size })
    }

    fn insert_block(&mut self, offset: u64, size: u64) {
        self.by_offset.insert(offset, size);
        self.by_size.insert((size, offset));
        self.free_size += size;
    }

    fn remove_block(&mut self, offset: u64, size: u64) {
        self.by_offset.remove(&offset);
        self.by_size.remove(&(size, offset));
        self.free_size -= size;
    }
}

#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
