//! Holdfast: a generation-reclaimed arena datastore.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! holdfast sub-crates. For most users, adding `holdfast` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use holdfast::prelude::*;
//!
//! let mut store: DataStore<u64> = DataStore::new();
//! store.enable_free_lists();
//! let mut generations = GenerationHandler::new();
//! let mut reader_handle = generations.register_reader();
//! let reader = store.reader();
//!
//! let r = store.add_entry(42);
//! {
//!     let _guard = reader_handle.take_guard();
//!     // SAFETY: r is written and the guard is taken before r is released.
//!     assert_eq!(unsafe { reader.get_entry(r) }, 42);
//!     store.hold_elem(r, 1);
//!     generations.commit(&mut store);
//!     // Still pinned: the release has not been reclaimed.
//!     assert_eq!(unsafe { reader.get_entry(r) }, 42);
//! }
//! generations.commit(&mut store);
//! assert_eq!(store.add_entry(7), r);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `holdfast-core` | Entry references, generations, core traits |
//! | [`datastore`] | `holdfast-datastore` | `DataStore`, buffer types, readers, compaction |
//! | [`generation`] | `holdfast-generation` | Generation counter and reader pinning |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Entry references, generations and core traits (`holdfast-core`).
pub use holdfast_core as types;

/// The arena datastore (`holdfast-datastore`).
///
/// Most users only need [`datastore::DataStore`] and
/// [`datastore::StoreReader`], also available in the [`prelude`].
pub use holdfast_datastore as datastore;

/// Generation counter and reader pinning (`holdfast-generation`).
pub use holdfast_generation as generation;

/// Common imports for typical holdfast usage.
///
/// ```rust
/// use holdfast::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use holdfast_core::{
        BufferTypeId, Element, EntryRef, EntryRefT, Generation, GenerationHeld, MemoryAllocator,
        RefType,
    };

    // Datastore
    pub use holdfast_datastore::{
        BufferType, BufferTypeConfig, CompactionStrategy, DataStore, MemoryUsage, StoreError,
        StoreReader,
    };

    // Generations
    pub use holdfast_generation::{GenerationGuard, GenerationHandler, ReaderHandle};
}
