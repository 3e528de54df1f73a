//! Typed allocators over a [`DataStore`].
//!
//! An allocator borrows the store mutably for its lifetime and allocates
//! into one buffer type. The free-list variants reuse a reclaimed run of
//! exactly the requested length before appending to the primary buffer.

use holdfast_core::{BufferTypeId, Element, RefType};

use crate::store::DataStore;

/// A freshly allocated run and its reference.
///
/// `data` is the run itself; fill it before publishing `entry_ref` to
/// readers.
#[derive(Debug)]
pub struct Handle<'a, T, R> {
    /// Reference to the first element of the run.
    pub entry_ref: R,
    /// The run, holding `T::default()` until written.
    pub data: &'a mut [T],
}

/// Allocates values and copies of slices.
pub struct Allocator<'a, T: Element, R: RefType> {
    store: &'a mut DataStore<T, R>,
    type_id: BufferTypeId,
    use_free_list: bool,
}

impl<'a, T: Element, R: RefType> Allocator<'a, T, R> {
    pub(crate) fn new(
        store: &'a mut DataStore<T, R>,
        type_id: BufferTypeId,
        use_free_list: bool,
    ) -> Self {
        Self {
            store,
            type_id,
            use_free_list,
        }
    }

    /// Store one value.
    pub fn alloc(&mut self, value: T) -> R {
        let entry_ref = self.store.alloc_run(self.type_id, 1, self.use_free_list);
        self.store.run_mut(entry_ref, 1)[0] = value;
        entry_ref
    }

    /// Store a copy of `values` as one run. An empty slice claims nothing
    /// and returns the invalid reference.
    pub fn alloc_array(&mut self, values: &[T]) -> R {
        let entry_ref = self
            .store
            .alloc_run(self.type_id, values.len(), self.use_free_list);
        if !values.is_empty() {
            self.store
                .run_mut(entry_ref, values.len())
                .copy_from_slice(values);
        }
        entry_ref
    }
}

/// Hands out writable runs for callers that fill many elements at once.
pub struct RawAllocator<'a, T: Element, R: RefType> {
    store: &'a mut DataStore<T, R>,
    type_id: BufferTypeId,
    use_free_list: bool,
}

impl<'a, T: Element, R: RefType> RawAllocator<'a, T, R> {
    pub(crate) fn new(
        store: &'a mut DataStore<T, R>,
        type_id: BufferTypeId,
        use_free_list: bool,
    ) -> Self {
        Self {
            store,
            type_id,
            use_free_list,
        }
    }

    /// Claim a run of `len` elements.
    ///
    /// An empty run claims nothing and carries the invalid reference.
    pub fn alloc(&mut self, len: usize) -> Handle<'_, T, R> {
        let entry_ref = self.store.alloc_run(self.type_id, len, self.use_free_list);
        let data: &mut [T] = if len == 0 {
            &mut []
        } else {
            self.store.run_mut(entry_ref, len)
        };
        Handle { entry_ref, data }
    }
}
