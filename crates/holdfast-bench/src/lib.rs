//! Benchmark profiles for the holdfast datastore.
//!
//! - [`entry_profile`]: single `u64` entries, always switching buffers.
//! - [`array_profile`]: fixed-size `u32` arrays in a type of their own.
//! - [`fragmented_profile`]: an entry store with every other entry reclaimed.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use holdfast_core::{BufferTypeId, Generation};
use holdfast_datastore::{BufferType, BufferTypeConfig, DataStore, StoreError};

/// Store of single `u64` entries with the default buffer type.
pub fn entry_profile() -> DataStore<u64> {
    DataStore::new()
}

/// Store whose type 1 holds arrays of `array_size` `u32` elements.
///
/// Type 1 resizes in place until its buffer reaches 1024 arrays.
pub fn array_profile(array_size: u32) -> Result<(DataStore<u32>, BufferTypeId), StoreError> {
    let arrays = BufferType::new(BufferTypeConfig {
        num_arrays_for_new_buffer: 1024,
        ..BufferTypeConfig::new(array_size)
    })?;
    let mut store = DataStore::empty();
    store.add_type(BufferType::default());
    let type_id = store.add_type(arrays);
    store.init_primary_buffers();
    Ok((store, type_id))
}

/// Entry store with `count` entries where every other one has been
/// released and reclaimed onto the free list.
pub fn fragmented_profile(count: u64) -> DataStore<u64> {
    let mut store = entry_profile();
    store.enable_free_lists();
    for v in 0..count {
        let r = store.add_entry(v);
        if v % 2 == 1 {
            store.hold_elem(r, 1);
        }
    }
    store.assign_generation(Generation(1));
    store.reclaim_memory(Generation(2));
    store
}
