//! Memory and address space accounting.
//!
//! Element counts come straight from the buffer states. Blocks replaced by
//! a resize and still waiting on the hold list have no elements of their
//! own; their bytes count as allocated, used and on hold.

use std::mem;

use holdfast_core::{Element, RefType};

use crate::buffer_state::BufferStatus;
use crate::store::{DataStore, HeldMemory};

/// Snapshot of element and byte counts across all buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Capacity of active and held buffers, in elements.
    pub alloc_elems: usize,
    /// Elements allocated, including reserved, dead and held ones.
    pub used_elems: usize,
    /// Elements freed and unreachable.
    pub dead_elems: usize,
    /// Elements released but possibly still read.
    pub hold_elems: usize,
    /// Bytes allocated.
    pub alloc_bytes: usize,
    /// Bytes in use.
    pub used_bytes: usize,
    /// Bytes dead.
    pub dead_bytes: usize,
    /// Bytes on hold.
    pub hold_bytes: usize,
    /// Buffer ids with no memory.
    pub free_buffers: u32,
    /// Buffers accepting allocations.
    pub active_buffers: u32,
    /// Buffers waiting for reclaim.
    pub hold_buffers: u32,
}

/// Byte-level memory usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Bytes allocated.
    pub allocated_bytes: usize,
    /// Bytes in use (live, dead and held).
    pub used_bytes: usize,
    /// Bytes dead.
    pub dead_bytes: usize,
    /// Bytes on hold.
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    /// Add another usage to this one.
    pub fn merge(&mut self, other: &MemoryUsage) {
        self.allocated_bytes += other.allocated_bytes;
        self.used_bytes += other.used_bytes;
        self.dead_bytes += other.dead_bytes;
        self.allocated_bytes_on_hold += other.allocated_bytes_on_hold;
    }
}

impl From<MemoryStats> for MemoryUsage {
    fn from(stats: MemoryStats) -> Self {
        Self {
            allocated_bytes: stats.alloc_bytes,
            used_bytes: stats.used_bytes,
            dead_bytes: stats.dead_bytes,
            allocated_bytes_on_hold: stats.hold_bytes,
        }
    }
}

/// Usage of the reference address space, in offsets (elements).
///
/// `limit` is every offset of every buffer id the store can use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressSpace {
    /// Offsets handed out in active and held buffers.
    pub used: usize,
    /// Offsets that are dead in active buffers.
    pub dead: usize,
    /// Total offsets available.
    pub limit: usize,
}

impl AddressSpace {
    /// Fraction of the address space in use.
    pub fn usage(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            self.used as f64 / self.limit as f64
        }
    }
}

impl<T: Element, R: RefType> DataStore<T, R> {
    /// Element and byte counts across all buffers and held blocks.
    pub fn memory_stats(&self) -> MemoryStats {
        let elem_size = mem::size_of::<T>();
        let mut stats = MemoryStats::default();
        for state in &self.buffers {
            match state.status() {
                BufferStatus::Free => continue,
                BufferStatus::Active => stats.active_buffers += 1,
                BufferStatus::Hold => stats.hold_buffers += 1,
            }
            stats.alloc_elems += state.capacity();
            stats.used_elems += state.size();
            stats.dead_elems += state.dead_elems();
            stats.hold_elems += state.hold_elems();
        }
        stats.free_buffers = self.num_buffers() as u32 - stats.active_buffers - stats.hold_buffers;
        stats.alloc_bytes = stats.alloc_elems * elem_size;
        stats.used_bytes = stats.used_elems * elem_size;
        stats.dead_bytes = stats.dead_elems * elem_size;
        stats.hold_bytes = stats.hold_elems * elem_size;

        let held = self.held_block_bytes();
        stats.alloc_bytes += held;
        stats.used_bytes += held;
        stats.hold_bytes += held;
        stats
    }

    /// Byte-level usage, including held resize blocks.
    pub fn memory_usage(&self) -> MemoryUsage {
        self.memory_stats().into()
    }

    /// How much of the reference address space is used and dead.
    pub fn address_space_usage(&self) -> AddressSpace {
        let mut space = AddressSpace {
            limit: self.num_buffers() * R::offset_size(),
            ..AddressSpace::default()
        };
        for state in &self.buffers {
            match state.status() {
                BufferStatus::Free => {}
                BufferStatus::Active => {
                    space.used += state.size();
                    space.dead += state.dead_elems();
                }
                BufferStatus::Hold => space.used += state.size(),
            }
        }
        space
    }

    fn held_block_bytes(&self) -> usize {
        self.memory_holds
            .iter()
            .map(|held| match held {
                HeldMemory::Buffer(_) => 0,
                HeldMemory::Block(block) => block.bytes(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use holdfast_core::{BufferTypeId, EntryRefT, Generation};

    use super::*;
    use crate::buffer_type::BufferType;
    use crate::config::BufferTypeConfig;

    type Store = DataStore<u32, EntryRefT<22, 10>>;

    #[test]
    fn fresh_store_stats() {
        let store = Store::new();
        let stats = store.memory_stats();
        // Default type: 16 arrays of one u32.
        assert_eq!(stats.alloc_elems, 16);
        assert_eq!(stats.used_elems, 1);
        assert_eq!(stats.dead_elems, 1);
        assert_eq!(stats.hold_elems, 0);
        assert_eq!(stats.alloc_bytes, 64);
        assert_eq!(stats.active_buffers, 1);
        assert_eq!(stats.hold_buffers, 0);
        assert_eq!(stats.free_buffers, 1023);
    }

    #[test]
    fn holds_and_reclaim_move_counts() {
        let mut store = Store::new();
        let r = store.add_entry(1);
        store.add_entry(2);
        store.hold_elem(r, 1);
        let stats = store.memory_stats();
        assert_eq!(stats.used_elems, 3);
        assert_eq!(stats.hold_elems, 1);
        assert_eq!(stats.hold_bytes, 4);

        store.assign_generation(Generation(1));
        store.reclaim_memory(Generation(2));
        let usage = store.memory_usage();
        assert_eq!(usage.used_bytes, 12);
        assert_eq!(usage.dead_bytes, 8);
        assert_eq!(usage.allocated_bytes_on_hold, 0);
    }

    #[test]
    fn held_buffer_counts_as_hold() {
        let mut store = Store::new();
        store.add_entry(1);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        store.hold_buffer(0);
        let stats = store.memory_stats();
        assert_eq!(stats.active_buffers, 1);
        assert_eq!(stats.hold_buffers, 1);
        assert_eq!(stats.free_buffers, 1022);
        assert_eq!(stats.hold_elems, 1);
    }

    #[test]
    fn resized_block_counts_until_reclaimed() {
        let buffer_type = BufferType::new(BufferTypeConfig {
            min_arrays: 1,
            num_arrays_for_new_buffer: 64,
            ..BufferTypeConfig::new(1)
        })
        .unwrap();
        let mut store = Store::with_type(buffer_type);
        store.add_entry(1);
        // One reserved array grew to two; the one-array block is held.
        let before = store.memory_usage();
        assert_eq!(before.allocated_bytes, 8 + 4);
        assert_eq!(before.allocated_bytes_on_hold, 4);

        store.assign_generation(Generation(1));
        store.reclaim_memory(Generation(2));
        let after = store.memory_usage();
        assert_eq!(after.allocated_bytes, 8);
        assert_eq!(after.allocated_bytes_on_hold, 0);
    }

    #[test]
    fn address_space_tracks_used_and_dead() {
        let mut store = Store::new();
        let r = store.add_entry(1);
        store.add_entry(2);
        store.hold_elem(r, 1);
        store.assign_generation(Generation(1));
        store.reclaim_memory(Generation(2));
        let space = store.address_space_usage();
        assert_eq!(space.used, 3);
        assert_eq!(space.dead, 2);
        assert_eq!(space.limit, 1024 * (1 << 22));
        assert!(space.usage() > 0.0);
    }

    #[test]
    fn usage_merge_adds_fields() {
        let mut a = MemoryUsage {
            allocated_bytes: 10,
            used_bytes: 5,
            dead_bytes: 1,
            allocated_bytes_on_hold: 2,
        };
        let b = a;
        a.merge(&b);
        assert_eq!(a.allocated_bytes, 20);
        assert_eq!(a.allocated_bytes_on_hold, 4);
    }
}
