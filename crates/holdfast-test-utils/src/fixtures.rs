//! Store fixtures shared by integration tests and benches.
//!
//! - [`switching_type`]: always switches to a new buffer when full.
//! - [`resizing_type`]: resizes in place below a switch threshold.
//! - [`two_type_store`]: a one-element type 0 plus one configured type 1.

use std::sync::Arc;

use holdfast_core::{BufferTypeId, MemoryAllocator};
use holdfast_datastore::{BufferType, BufferTypeConfig, DataStore};

/// The store used throughout the tests: `u32` elements, 22 offset bits.
pub type TestStore = DataStore<u32>;

/// Array size 1, `min_arrays` arrays, always switch.
pub fn switching_type(min_arrays: u32) -> BufferType {
    let config = BufferTypeConfig {
        min_arrays,
        ..BufferTypeConfig::new(1)
    };
    match BufferType::new(config) {
        Ok(t) => t,
        Err(e) => panic!("fixture config rejected: {e}"),
    }
}

/// Array size 1, `min_arrays` arrays, resize while under `switch_at` arrays.
pub fn resizing_type(min_arrays: u32, switch_at: u32) -> BufferType {
    let config = BufferTypeConfig {
        min_arrays,
        num_arrays_for_new_buffer: switch_at,
        ..BufferTypeConfig::new(1)
    };
    match BufferType::new(config) {
        Ok(t) => t,
        Err(e) => panic!("fixture config rejected: {e}"),
    }
}

/// A store with `buffer_type` as type 1 and primary buffers initialized.
///
/// Type 0 is [`switching_type(0)`](switching_type): its first buffer holds
/// only the reserved element (4 bytes). Type 1 starts in buffer 1, so it
/// has no reserved elements.
pub fn two_type_store(buffer_type: BufferType) -> (TestStore, BufferTypeId) {
    let mut store = TestStore::empty();
    store.add_type(switching_type(0));
    let type_id = store.add_type(buffer_type);
    store.init_primary_buffers();
    (store, type_id)
}

/// Same as [`two_type_store`], with type 1 reporting to `allocator`.
pub fn observed_two_type_store(
    buffer_type: BufferType,
    allocator: Arc<dyn MemoryAllocator>,
) -> (TestStore, BufferTypeId) {
    two_type_store(buffer_type.with_allocator(allocator))
}
