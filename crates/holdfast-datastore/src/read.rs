//! Lock-free readers.
//!
//! A [`StoreReader`] shares the store's buffer table and resolves
//! references on any thread while the single writer keeps allocating,
//! switching and resizing buffers. It never blocks and never sees a
//! partially published block.
//!
//! What it cannot know on its own is whether the memory behind a reference
//! is still alive: that is the generation contract. A reader pins a
//! generation (see `holdfast-generation`) before reading, and the writer
//! only reclaims holds tagged older than the oldest pinned generation. The
//! read methods are therefore `unsafe`, with the contract spelled out on
//! each one.

use std::marker::PhantomData;
use std::sync::Arc;

use holdfast_core::{Element, RefType};

use crate::raw::BufferTable;

/// Concurrent, read-only view of a [`DataStore`](crate::DataStore).
pub struct StoreReader<T: Element, R: RefType> {
    table: Arc<BufferTable<T>>,
    _ref: PhantomData<fn() -> R>,
}

// Compile-time assertion: StoreReader must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<StoreReader<u32, holdfast_core::EntryRefT<22, 10>>>();
};

impl<T: Element, R: RefType> StoreReader<T, R> {
    pub(crate) fn new(table: Arc<BufferTable<T>>) -> Self {
        Self {
            table,
            _ref: PhantomData,
        }
    }

    /// Number of buffer ids the store can use.
    pub fn num_buffers(&self) -> usize {
        self.table.len()
    }
}

#[allow(unsafe_code)]
impl<T: Element, R: RefType> StoreReader<T, R> {
    /// The value at `entry_ref`.
    ///
    /// # Safety
    ///
    /// `entry_ref` must have been handed out by the writer after its run
    /// was written, and the run must not have been reclaimed: either it was
    /// never held, or it was held under a generation no older than one the
    /// calling thread has pinned for the duration of the call. The store
    /// must not be dropped concurrently.
    ///
    /// # Panics
    ///
    /// Panics if the reference lies outside its buffer's published block.
    pub unsafe fn get_entry(&self, entry_ref: R) -> T {
        // SAFETY: forwarded to the caller.
        unsafe { self.with_array(entry_ref, 1, |s| s[0]) }
    }

    /// Run `f` on the `len` elements starting at `entry_ref`.
    ///
    /// # Safety
    ///
    /// Same contract as [`get_entry`](Self::get_entry), for the whole run.
    pub unsafe fn with_array<U>(&self, entry_ref: R, len: usize, f: impl FnOnce(&[T]) -> U) -> U {
        // SAFETY: forwarded to the caller.
        unsafe {
            self.table
                .read(entry_ref.buffer_id(), entry_ref.offset(), len, f)
        }
    }

    /// Copy the run starting at `entry_ref` into `out` (its length is the
    /// run length).
    ///
    /// # Safety
    ///
    /// Same contract as [`get_entry`](Self::get_entry), for the whole run.
    pub unsafe fn copy_array(&self, entry_ref: R, out: &mut [T]) {
        // SAFETY: forwarded to the caller.
        unsafe { self.with_array(entry_ref, out.len(), |s| out.copy_from_slice(s)) }
    }
}

impl<T: Element, R: RefType> Clone for StoreReader<T, R> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.table))
    }
}
