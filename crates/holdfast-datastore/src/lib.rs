//! Generation-reclaimed arena datastore.
//!
//! Stores plain `Copy` elements in large buffers and hands out compact
//! 32-bit references that pack a buffer id and an in-buffer offset. One
//! writer allocates, releases and compacts; any number of readers resolve
//! references concurrently without locks. Memory released by the writer is
//! only reused once no reader can still be looking at it, which the writer
//! learns from a generation counter.
//!
//! # Architecture
//!
//! ```text
//! DataStore<T, R>
//! ├── TypeHandler × types      BufferType sizing policy, primary buffer, FreeList
//! ├── BufferState × buffer ids  Free / Active / Hold, counters, owned RawBlock
//! ├── Arc<BufferTable>          block pointers shared with StoreReader
//! ├── elem holds                released runs, tagged with a Generation
//! └── memory holds              held buffers and blocks replaced by a resize
//! ```
//!
//! # Lifecycle
//!
//! 1. The writer allocates runs in the primary buffer of a type. When the
//!    primary is full it switches to a fresh buffer id or, below the type's
//!    switch threshold, resizes the primary and holds the old block.
//! 2. Releasing a run ([`DataStore::hold_elem`]) or a whole buffer
//!    ([`DataStore::hold_buffer`]) puts it on a hold list. Readers may keep
//!    using it.
//! 3. [`DataStore::assign_generation`] tags the pending holds with the
//!    current generation.
//! 4. [`DataStore::reclaim_memory`] frees every hold tagged older than the
//!    oldest generation a reader still uses. Freed runs are cleaned and,
//!    with free lists enabled, reused by later allocations of the same
//!    length.
//!
//! ```
//! use holdfast_core::Generation;
//! use holdfast_datastore::DataStore;
//!
//! let mut store: DataStore<u32> = DataStore::new();
//! let r = store.add_entry(7);
//! assert_eq!(store.get_entry(r), 7);
//!
//! store.hold_elem(r, 1);
//! store.assign_generation(Generation(1));
//! store.reclaim_memory(Generation(2));
//! assert_eq!(store.get_entry(r), 0);
//! ```
//!
//! # Safety
//!
//! All `unsafe` lives in the private `raw` module, which owns the buffer
//! blocks and the table readers resolve them through. The reader methods
//! are `unsafe fn`: whether a reference is still alive depends on the
//! generation protocol, which the type system cannot see.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod alloc;
pub mod buffer_state;
pub mod buffer_type;
pub mod compaction;
pub mod config;
pub mod error;
pub mod free_list;
pub mod hold;
mod raw;
pub mod read;
pub mod stats;
pub mod store;

// Public re-exports for the primary API surface.
pub use alloc::{Allocator, Handle, RawAllocator};
pub use buffer_state::{BufferState, BufferStatus};
pub use buffer_type::BufferType;
pub use compaction::{CompactingBuffers, CompactionStrategy, EntryRefFilter};
pub use config::BufferTypeConfig;
pub use error::StoreError;
pub use free_list::FreeList;
pub use hold::GenerationHoldList;
pub use read::StoreReader;
pub use stats::{AddressSpace, MemoryStats, MemoryUsage};
pub use store::{DataStore, MAX_NUM_BUFFERS};
