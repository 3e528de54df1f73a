//! Low-level primitives for datastore memory.
//!
//! Two pieces live here, and they are the only code in the crate that
//! touches raw pointers:
//!
//! - [`RawBlock`]: an owned, default-filled allocation of `capacity`
//!   elements obtained through the global allocator and reported to the
//!   buffer type's [`MemoryAllocator`] hook.
//! - [`BufferTable`]: one `(pointer, capacity)` slot per buffer id, shared
//!   with readers. The writer publishes a block by storing its pointer and
//!   then its capacity (release); readers load the capacity and then the
//!   pointer (acquire), so a reader that observes a capacity also observes
//!   a pointer to a block at least that large.
//!
//! Every `unsafe` block carries a `// SAFETY:` comment.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use holdfast_core::{Element, MemoryAllocator};

/// An owned block of `capacity` initialized elements.
pub(crate) struct RawBlock<T: Element> {
    ptr: NonNull<T>,
    capacity: usize,
    allocator: Arc<dyn MemoryAllocator>,
}

// SAFETY: RawBlock owns its allocation exclusively, like a Box<[T]>. T is
// Send + Sync (Element bound), so moving or sharing the owner across
// threads is sound.
unsafe impl<T: Element> Send for RawBlock<T> {}
// SAFETY: see above. Shared access only hands out &[T].
unsafe impl<T: Element> Sync for RawBlock<T> {}

impl<T: Element> RawBlock<T> {
    /// A block with no storage. Does not allocate or notify the hook.
    pub(crate) fn empty(allocator: Arc<dyn MemoryAllocator>) -> Self {
        Self {
            ptr: NonNull::dangling(),
            capacity: 0,
            allocator,
        }
    }

    /// Allocate `capacity` elements, each set to `T::default()`.
    pub(crate) fn new(capacity: usize, allocator: Arc<dyn MemoryAllocator>) -> Self {
        if capacity == 0 {
            return Self::empty(allocator);
        }
        let layout = Self::layout(capacity);
        // SAFETY: layout has non-zero size (capacity > 0 and the store
        // rejects zero-sized element types).
        let raw = unsafe { alloc::alloc(layout) } as *mut T;
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        let fill = T::default();
        for i in 0..capacity {
            // SAFETY: i < capacity, so the write stays inside the fresh
            // allocation. Elements are Copy, nothing is overwritten that
            // needs dropping.
            unsafe { ptr.as_ptr().add(i).write(fill) };
        }
        allocator.on_alloc(layout.size());
        Self {
            ptr,
            capacity,
            allocator,
        }
    }

    fn layout(capacity: usize) -> Layout {
        match Layout::array::<T>(capacity) {
            Ok(layout) => layout,
            Err(_) => panic!("buffer capacity {capacity} overflows the address space"),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the allocation in bytes.
    pub(crate) fn bytes(&self) -> usize {
        self.capacity * std::mem::size_of::<T>()
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Shared view of `len` elements starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the block.
    pub(crate) fn slice(&self, offset: usize, len: usize) -> &[T] {
        self.check_range(offset, len);
        // SAFETY: the range is inside the allocation and every element was
        // initialized in `new`. Writers only mutate through `&mut self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) }
    }

    /// Exclusive view of `len` elements starting at `offset`.
    ///
    /// Readers may be reading other ranges of the same block concurrently
    /// through the [`BufferTable`]; the caller only asks for ranges no
    /// reader can hold a reference to (fresh, reused or reclaimed runs).
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the block.
    pub(crate) fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [T] {
        self.check_range(offset, len);
        // SAFETY: the range is inside the allocation, initialized, and
        // borrowed exclusively through &mut self. The slice covers only
        // the requested range, never the ranges readers resolve.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) }
    }

    /// Copy the first `len` elements of `src` into the start of this block.
    pub(crate) fn copy_prefix_from(&mut self, src: &RawBlock<T>, len: usize) {
        src.check_range(0, len);
        self.check_range(0, len);
        // SAFETY: both ranges are in bounds and initialized, and the blocks
        // are distinct allocations (self is borrowed mutably, src shared).
        unsafe { ptr::copy_nonoverlapping(src.ptr.as_ptr(), self.ptr.as_ptr(), len) };
    }

    fn check_range(&self, offset: usize, len: usize) {
        let end = offset.checked_add(len);
        assert!(
            end.is_some_and(|end| end <= self.capacity),
            "range {}+{} outside block of capacity {}",
            offset,
            len,
            self.capacity
        );
    }
}

impl<T: Element> Drop for RawBlock<T> {
    fn drop(&mut self) {
        if self.capacity == 0 {
            return;
        }
        let layout = Self::layout(self.capacity);
        // SAFETY: ptr was returned by alloc::alloc with exactly this layout
        // and has not been freed. Elements are Copy and need no drop.
        unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        self.allocator.on_free(layout.size());
    }
}

/// One reader-visible slot: the current block of a buffer id.
struct TableSlot<T> {
    ptr: AtomicPtr<T>,
    capacity: AtomicUsize,
}

/// Per-buffer-id block pointers shared between the writer and readers.
pub(crate) struct BufferTable<T> {
    slots: Box<[TableSlot<T>]>,
}

impl<T: Element> BufferTable<T> {
    pub(crate) fn new(num_buffers: usize) -> Self {
        let slots = (0..num_buffers)
            .map(|_| TableSlot {
                ptr: AtomicPtr::new(ptr::null_mut()),
                capacity: AtomicUsize::new(0),
            })
            .collect();
        Self { slots }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Make `block` the block readers resolve `buffer_id` through.
    pub(crate) fn publish(&self, buffer_id: u32, block: &RawBlock<T>) {
        let slot = &self.slots[buffer_id as usize];
        slot.ptr.store(block.as_ptr(), Ordering::Release);
        slot.capacity.store(block.capacity(), Ordering::Release);
    }

    /// Detach `buffer_id` from its block before the block is freed.
    pub(crate) fn clear(&self, buffer_id: u32) {
        let slot = &self.slots[buffer_id as usize];
        slot.capacity.store(0, Ordering::Release);
        slot.ptr.store(ptr::null_mut(), Ordering::Release);
    }

    /// Run `f` on `len` elements of `buffer_id` starting at `offset`.
    ///
    /// # Safety
    ///
    /// The elements must belong to a run the writer has finished writing
    /// and handed out, and the block they live in must not be freed while
    /// `f` runs: the run's buffer (or the resized-away block that held it)
    /// must still be held under a generation the caller is pinned to.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the published capacity or the slot has
    /// no block.
    pub(crate) unsafe fn read<U>(
        &self,
        buffer_id: u32,
        offset: usize,
        len: usize,
        f: impl FnOnce(&[T]) -> U,
    ) -> U {
        let slot = &self.slots[buffer_id as usize];
        let capacity = slot.capacity.load(Ordering::Acquire);
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= capacity),
            "read of {}+{} outside buffer {} with published capacity {}",
            offset,
            len,
            buffer_id,
            capacity
        );
        let base = slot.ptr.load(Ordering::Acquire);
        assert!(!base.is_null(), "read from released buffer {buffer_id}");
        // SAFETY: the capacity load synchronizes with the writer's release
        // store, which follows the pointer store, so `base` points to a
        // block of at least `capacity` initialized elements. The caller
        // guarantees that block is alive and that the run is not being
        // written.
        let data = unsafe { std::slice::from_raw_parts(base.add(offset), len) };
        f(data)
    }
}
