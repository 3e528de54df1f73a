//! Compaction of buffers with many dead elements.
//!
//! The owner picks the worst buffers with
//! [`start_compact_worst_buffers`](DataStore::start_compact_worst_buffers),
//! walks its own live references, moves every run whose reference passes
//! the [`EntryRefFilter`] with [`move_array`](DataStore::move_array), then
//! hands the buffers back with
//! [`finish_compact`](DataStore::finish_compact). The old buffers go on
//! hold, so readers holding pre-move references stay safe until the next
//! reclaim passes.

use smallvec::SmallVec;
use tracing::debug;

use holdfast_core::{Element, RefType};

use crate::buffer_state::BufferStatus;
use crate::stats::{AddressSpace, MemoryUsage};
use crate::store::DataStore;

/// Dead bytes tolerated before the ratio is even considered.
pub const DEAD_BYTES_SLACK: usize = 64 * 1024;

/// Dead offsets tolerated before the ratio is even considered.
pub const DEAD_ADDRESS_SPACE_SLACK: usize = 64 * 1024;

/// When compaction is worth it, and how much to compact at once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompactionStrategy {
    /// Compact memory once dead bytes exceed this share of used bytes.
    ///
    /// Default: 0.05.
    pub max_dead_bytes_ratio: f64,

    /// Compact address space once dead offsets exceed this share of used
    /// offsets.
    ///
    /// Default: 0.2.
    pub max_dead_address_space_ratio: f64,

    /// Buffers compacted per pass.
    ///
    /// Default: 1.
    pub max_buffers: usize,
}

impl CompactionStrategy {
    /// Default dead-bytes ratio.
    pub const DEFAULT_MAX_DEAD_BYTES_RATIO: f64 = 0.05;

    /// Default dead-address-space ratio.
    pub const DEFAULT_MAX_DEAD_ADDRESS_SPACE_RATIO: f64 = 0.2;

    /// Default buffers per pass.
    pub const DEFAULT_MAX_BUFFERS: usize = 1;

    /// Whether `usage` has enough dead bytes to be worth compacting.
    pub fn should_compact_memory(&self, usage: &MemoryUsage) -> bool {
        usage.dead_bytes >= DEAD_BYTES_SLACK
            && usage.dead_bytes as f64 > usage.used_bytes as f64 * self.max_dead_bytes_ratio
    }

    /// Whether `space` has enough dead offsets to be worth compacting.
    pub fn should_compact_address_space(&self, space: &AddressSpace) -> bool {
        space.dead >= DEAD_ADDRESS_SPACE_SLACK
            && space.dead as f64 > space.used as f64 * self.max_dead_address_space_ratio
    }
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        Self {
            max_dead_bytes_ratio: Self::DEFAULT_MAX_DEAD_BYTES_RATIO,
            max_dead_address_space_ratio: Self::DEFAULT_MAX_DEAD_ADDRESS_SPACE_RATIO,
            max_buffers: Self::DEFAULT_MAX_BUFFERS,
        }
    }
}

/// Which references point into buffers being compacted.
#[derive(Clone, Debug)]
pub struct EntryRefFilter {
    buffers: Vec<bool>,
}

impl EntryRefFilter {
    fn new(num_buffers: usize, ids: &[u32]) -> Self {
        let mut buffers = vec![false; num_buffers];
        for &id in ids {
            buffers[id as usize] = true;
        }
        Self { buffers }
    }

    /// Whether `entry_ref` lives in a compacting buffer. Invalid refs never
    /// match.
    pub fn has<R: RefType>(&self, entry_ref: R) -> bool {
        entry_ref.valid()
            && self
                .buffers
                .get(entry_ref.buffer_id() as usize)
                .copied()
                .unwrap_or(false)
    }
}

/// Buffers selected by one compaction pass.
#[derive(Debug)]
#[must_use = "pass the buffers to finish_compact once live runs are moved"]
pub struct CompactingBuffers {
    ids: SmallVec<[u32; 4]>,
    filter: EntryRefFilter,
}

impl CompactingBuffers {
    /// The compacting buffer ids, worst first.
    pub fn buffer_ids(&self) -> &[u32] {
        &self.ids
    }

    /// Filter matching references into the compacting buffers.
    pub fn filter(&self) -> &EntryRefFilter {
        &self.filter
    }
}

impl<T: Element, R: RefType> DataStore<T, R> {
    /// Pick the active buffers with the most dead elements (beyond their
    /// reserved ones) and mark them compacting.
    ///
    /// Their free runs are dropped and any type whose primary buffer is
    /// picked moves to a fresh one, so nothing new lands in them. Returns
    /// `None` when no buffer has anything dead to compact.
    pub fn start_compact_worst_buffers(
        &mut self,
        strategy: &CompactionStrategy,
    ) -> Option<CompactingBuffers> {
        let mut candidates: Vec<(usize, u32)> = self
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status() == BufferStatus::Active && !s.is_compacting())
            .map(|(id, s)| (s.dead_elems().saturating_sub(s.reserved_elems()), id as u32))
            .filter(|&(dead, _)| dead > 0)
            .collect();
        candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates.truncate(strategy.max_buffers);
        if candidates.is_empty() {
            return None;
        }

        let ids: SmallVec<[u32; 4]> = candidates.iter().map(|&(_, id)| id).collect();
        for &buffer_id in &ids {
            let state = &mut self.buffers[buffer_id as usize];
            state.set_compacting();
            let type_id = state.owner();
            self.types[type_id.0 as usize]
                .free_list
                .remove_buffer(buffer_id);
            if self.primary_buffer_id(type_id) == buffer_id {
                self.switch_primary_buffer(type_id, 0);
            }
        }
        debug!(buffers = ?ids.as_slice(), "compaction started");
        let filter = EntryRefFilter::new(self.num_buffers(), &ids);
        Some(CompactingBuffers { ids, filter })
    }

    /// Copy the live run at `entry_ref` into its type's primary buffer and
    /// return the new reference. The old run is left for the buffer hold.
    ///
    /// # Panics
    ///
    /// Panics if the run's buffer is free or the run is out of bounds.
    pub fn move_array(&mut self, entry_ref: R, len: usize) -> R {
        let type_id = self.buffer_state(entry_ref.buffer_id()).owner();
        let values: SmallVec<[T; 8]> = SmallVec::from_slice(self.get_array(entry_ref, len));
        let moved = self.alloc_run(type_id, len, false);
        self.run_mut(moved, len).copy_from_slice(&values);
        moved
    }

    /// Put every compacted buffer on hold.
    ///
    /// # Panics
    ///
    /// Panics if a compacted buffer became some type's primary again.
    pub fn finish_compact(&mut self, compacting: CompactingBuffers) {
        for &buffer_id in &compacting.ids {
            self.hold_buffer(buffer_id);
        }
        debug!(buffers = ?compacting.ids.as_slice(), "compaction finished");
    }
}

#[cfg(test)]
mod tests {
    use holdfast_core::{BufferTypeId, EntryRefT, Generation};

    use super::*;

    type Store = DataStore<u32, EntryRefT<22, 10>>;

    fn store_with_dead(live: u32, dead: u32) -> (Store, Vec<EntryRefT<22, 10>>) {
        let mut store = Store::new();
        let mut kept = Vec::new();
        for v in 0..live + dead {
            let r = store.add_entry(v + 1);
            if v < dead {
                store.hold_elem(r, 1);
            } else {
                kept.push(r);
            }
        }
        store.assign_generation(Generation(1));
        store.reclaim_memory(Generation(2));
        (store, kept)
    }

    #[test]
    fn memory_thresholds_need_slack_and_ratio() {
        let strategy = CompactionStrategy::default();
        let mut usage = MemoryUsage {
            used_bytes: 1 << 20,
            dead_bytes: DEAD_BYTES_SLACK - 1,
            ..MemoryUsage::default()
        };
        assert!(!strategy.should_compact_memory(&usage));
        usage.dead_bytes = DEAD_BYTES_SLACK;
        assert!(strategy.should_compact_memory(&usage));
        usage.used_bytes = 10 << 20;
        assert!(!strategy.should_compact_memory(&usage));
    }

    #[test]
    fn address_space_thresholds() {
        let strategy = CompactionStrategy::default();
        let space = AddressSpace {
            used: 100_000,
            dead: DEAD_ADDRESS_SPACE_SLACK,
            limit: 1 << 32,
        };
        assert!(strategy.should_compact_address_space(&space));
        let space = AddressSpace {
            used: 1_000_000,
            ..space
        };
        assert!(!strategy.should_compact_address_space(&space));
    }

    #[test]
    fn nothing_dead_means_nothing_to_compact() {
        let mut store = Store::new();
        store.add_entry(1);
        assert!(store
            .start_compact_worst_buffers(&CompactionStrategy::default())
            .is_none());
    }

    #[test]
    fn compaction_moves_live_runs_and_frees_buffer() {
        let (mut store, kept) = store_with_dead(4, 6);
        store.enable_free_lists();
        let compacting = store
            .start_compact_worst_buffers(&CompactionStrategy::default())
            .unwrap();
        assert_eq!(compacting.buffer_ids(), &[0]);
        assert!(store.buffer_state(0).is_compacting());
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 1);

        let moved: Vec<_> = kept
            .iter()
            .map(|&r| {
                assert!(compacting.filter().has(r));
                store.move_array(r, 1)
            })
            .collect();
        for (old, new) in kept.iter().zip(&moved) {
            assert_eq!(new.buffer_id(), 1);
            assert!(!compacting.filter().has(*new));
            assert_eq!(store.get_entry(*new), store.get_entry(*old));
        }

        store.finish_compact(compacting);
        assert!(store.buffer_state(0).is_on_hold());
        store.assign_generation(Generation(2));
        store.reclaim_memory(Generation(3));
        assert!(store.buffer_state(0).is_free());
        assert_eq!(store.get_entry(moved[3]), 10);
    }

    #[test]
    fn worst_buffer_is_picked_first() {
        let (mut store, _) = store_with_dead(1, 2);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        let refs: Vec<_> = (0..6).map(|v| store.add_entry(v)).collect();
        for r in &refs[..5] {
            store.hold_elem(*r, 1);
        }
        store.assign_generation(Generation(2));
        store.reclaim_memory(Generation(3));

        let strategy = CompactionStrategy {
            max_buffers: 2,
            ..CompactionStrategy::default()
        };
        let compacting = store.start_compact_worst_buffers(&strategy).unwrap();
        assert_eq!(compacting.buffer_ids(), &[1, 0]);
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 2);
    }

    #[test]
    fn compacting_buffer_gets_no_free_runs() {
        let (mut store, kept) = store_with_dead(2, 2);
        store.enable_free_lists();
        let compacting = store
            .start_compact_worst_buffers(&CompactionStrategy::default())
            .unwrap();
        store.hold_elem(kept[0], 1);
        store.assign_generation(Generation(2));
        store.reclaim_memory(Generation(3));
        assert!(store.free_list(BufferTypeId(0)).is_empty());
        store.finish_compact(compacting);
    }

    #[test]
    fn filter_rejects_invalid_refs() {
        let filter = EntryRefFilter::new(4, &[0]);
        assert!(!filter.has(EntryRefT::<22, 10>::default()));
        assert!(filter.has(EntryRefT::<22, 10>::new(3, 0)));
        assert!(!filter.has(EntryRefT::<22, 10>::new(3, 1)));
    }
}
