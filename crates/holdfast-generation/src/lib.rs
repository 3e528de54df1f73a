//! Generation tracking for readers of a holdfast datastore.
//!
//! Readers pin the generation they start reading in; the writer advances
//! the generation after each batch of releases and reclaims only what is
//! older than every pinned generation.
//!
//! ```
//! use holdfast_core::Generation;
//! use holdfast_generation::GenerationHandler;
//!
//! let mut handler = GenerationHandler::new();
//! let mut reader = handler.register_reader();
//! let guard = reader.take_guard();
//! handler.inc_generation();
//! assert_eq!(handler.update_oldest_used_generation(), guard.generation());
//! drop(guard);
//! assert_eq!(handler.update_oldest_used_generation(), Generation(1));
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod handler;

pub use handler::{
    GenerationGuard, GenerationHandler, ReaderHandle, ReaderSlot, GENERATION_UNPINNED,
};
