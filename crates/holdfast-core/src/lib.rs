//! Core types and traits for the holdfast datastore.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: entry references,
//! generations, buffer type ids, and the traits at the seams between the
//! datastore, its allocator hook, and the reader generation tracker.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod entry_ref;
pub mod id;
pub mod traits;

pub use entry_ref::{EntryRef, EntryRefT, RefType};
pub use id::{BufferTypeId, Generation};
pub use traits::{
    round_up_to_match_allocator, Element, GenerationHeld, HeapAllocator, MemoryAllocator,
    HUGE_PAGE_SIZE,
};
