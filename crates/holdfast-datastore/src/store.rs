//! The datastore: buffers, primary buffers per type, holds and reclaim.
//!
//! ```text
//! DataStore<T, R>
//! ├── TypeHandler × types   (BufferType policy, primary buffer, FreeList)
//! ├── BufferState × buffer ids (counters, lifecycle, owned RawBlock)
//! ├── Arc<BufferTable>      (block pointers shared with StoreReaders)
//! ├── elem holds            (GenerationHoldList of released runs)
//! └── memory holds          (held buffers and resized-away blocks)
//! ```
//!
//! All mutation goes through `&mut self`, so one owner serializes writes.
//! Readers never lock; they resolve references through the shared table.

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use holdfast_core::{
    BufferTypeId, Element, EntryRef, EntryRefT, Generation, GenerationHeld, HeapAllocator,
    MemoryAllocator, RefType,
};

use crate::alloc::{Allocator, RawAllocator};
use crate::buffer_state::{BufferState, BufferStatus};
use crate::buffer_type::BufferType;
use crate::free_list::FreeList;
use crate::hold::GenerationHoldList;
use crate::raw::{BufferTable, RawBlock};
use crate::read::StoreReader;

/// Upper bound on buffer ids a store tracks, whatever its reference layout
/// allows.
pub const MAX_NUM_BUFFERS: u32 = 1 << 16;

/// Runtime state of one registered buffer type.
pub(crate) struct TypeHandler<R: RefType> {
    pub(crate) buffer_type: BufferType,
    pub(crate) primary: Option<u32>,
    pub(crate) free_list: FreeList<R>,
    pub(crate) elem_hold_enabled: bool,
}

/// A released run waiting for its generation to pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ElemHold<R> {
    entry_ref: R,
    len: usize,
}

/// Memory waiting for its generation to pass.
pub(crate) enum HeldMemory<T: Element> {
    /// A whole buffer, freed by id.
    Buffer(u32),
    /// A block replaced by a resize.
    Block(RawBlock<T>),
}

/// Generation-reclaimed arena of `T` elements addressed by `R` references.
///
/// See the [crate docs](crate) for the lifecycle of buffers and holds.
pub struct DataStore<T: Element, R: RefType = EntryRefT<22, 10>> {
    pub(crate) buffers: Vec<BufferState<T>>,
    pub(crate) table: Arc<BufferTable<T>>,
    pub(crate) types: Vec<TypeHandler<R>>,
    pub(crate) elem_holds: GenerationHoldList<ElemHold<R>>,
    pub(crate) memory_holds: GenerationHoldList<HeldMemory<T>>,
    pub(crate) free_lists_enabled: bool,
    vacant: BufferState<T>,
    heap: Arc<dyn MemoryAllocator>,
}

// Compile-time assertion: DataStore must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<DataStore<u32>>();
    assert::<DataStore<u64, EntryRefT<19, 13>>>();
};

impl<T: Element, R: RefType> DataStore<T, R> {
    /// A store with no buffer types.
    ///
    /// Add types with [`add_type`](Self::add_type), then call
    /// [`init_primary_buffers`](Self::init_primary_buffers) before
    /// allocating.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn empty() -> Self {
        assert!(
            mem::size_of::<T>() > 0,
            "zero-sized element types are not supported"
        );
        let num_buffers = R::num_buffers().min(MAX_NUM_BUFFERS) as usize;
        let heap: Arc<dyn MemoryAllocator> = Arc::new(HeapAllocator);
        Self {
            buffers: Vec::new(),
            table: Arc::new(BufferTable::new(num_buffers)),
            types: Vec::new(),
            elem_holds: GenerationHoldList::new(),
            memory_holds: GenerationHoldList::new(),
            free_lists_enabled: false,
            vacant: BufferState::new(Arc::clone(&heap)),
            heap,
        }
    }

    /// A store with one default buffer type (array size 1), initialized
    /// and ready for [`add_entry`](Self::add_entry).
    pub fn new() -> Self {
        Self::with_type(BufferType::default())
    }

    /// A store whose only type (id 0) is `buffer_type`, initialized.
    pub fn with_type(buffer_type: BufferType) -> Self {
        let mut store = Self::empty();
        store.add_type(buffer_type);
        store.init_primary_buffers();
        store
    }

    /// Register a buffer type. Ids are assigned sequentially from 0.
    ///
    /// `max_arrays` (and `min_arrays` with it) is clamped so a single
    /// buffer fits in the offset space of `R`.
    pub fn add_type(&mut self, mut buffer_type: BufferType) -> BufferTypeId {
        buffer_type.clamp_to_offset_size(R::offset_size());
        let type_id = BufferTypeId(self.types.len() as u32);
        self.types.push(TypeHandler {
            buffer_type,
            primary: None,
            free_list: FreeList::new(),
            elem_hold_enabled: true,
        });
        type_id
    }

    /// Give every type without a primary buffer its first buffer.
    ///
    /// Types get the lowest free buffer ids, so on a fresh store type `i`
    /// starts in buffer `i` and buffer 0 (with its reserved array) belongs
    /// to type 0.
    pub fn init_primary_buffers(&mut self) {
        for idx in 0..self.types.len() {
            if self.types[idx].primary.is_some() {
                continue;
            }
            let buffer_id = self.next_free_buffer_id(0);
            let type_id = BufferTypeId(idx as u32);
            self.activate(buffer_id, type_id, 0);
            self.types[idx].primary = Some(buffer_id);
        }
    }

    /// Number of registered buffer types.
    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    /// Number of buffer ids this store can use.
    pub fn num_buffers(&self) -> usize {
        self.table.len()
    }

    /// The (store-clamped) policy of a buffer type.
    ///
    /// # Panics
    ///
    /// Panics if `type_id` is not registered.
    pub fn buffer_type(&self, type_id: BufferTypeId) -> &BufferType {
        &self.handler(type_id).buffer_type
    }

    /// The buffer a type currently allocates from.
    ///
    /// # Panics
    ///
    /// Panics if `type_id` is not registered or has no primary buffer yet.
    pub fn primary_buffer_id(&self, type_id: BufferTypeId) -> u32 {
        match self.handler(type_id).primary {
            Some(buffer_id) => buffer_id,
            None => panic!(
                "buffer type {type_id} has no primary buffer; call init_primary_buffers"
            ),
        }
    }

    /// State of a buffer id. Ids never used report as free.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_id` is outside the store's buffer id range.
    pub fn buffer_state(&self, buffer_id: u32) -> &BufferState<T> {
        assert!(
            (buffer_id as usize) < self.num_buffers(),
            "buffer id {} out of range ({} buffers)",
            buffer_id,
            self.num_buffers()
        );
        self.buffers.get(buffer_id as usize).unwrap_or(&self.vacant)
    }

    /// The free list of a buffer type.
    pub fn free_list(&self, type_id: BufferTypeId) -> &FreeList<R> {
        &self.handler(type_id).free_list
    }

    /// A reader that resolves references concurrently with this writer.
    pub fn reader(&self) -> StoreReader<T, R> {
        StoreReader::new(Arc::clone(&self.table))
    }

    // ----- allocation -------------------------------------------------------

    /// Store one value in type 0 and return its reference.
    ///
    /// Reuses a reclaimed single-element run first when free lists are
    /// enabled.
    pub fn add_entry(&mut self, value: T) -> R {
        self.free_list_allocator(BufferTypeId(0)).alloc(value)
    }

    /// Value allocator that always appends to the primary buffer.
    pub fn allocator(&mut self, type_id: BufferTypeId) -> Allocator<'_, T, R> {
        self.handler(type_id);
        Allocator::new(self, type_id, false)
    }

    /// Value allocator that reuses exact-length free runs first.
    pub fn free_list_allocator(&mut self, type_id: BufferTypeId) -> Allocator<'_, T, R> {
        self.handler(type_id);
        Allocator::new(self, type_id, true)
    }

    /// Bulk allocator handing out writable runs.
    pub fn raw_allocator(&mut self, type_id: BufferTypeId) -> RawAllocator<'_, T, R> {
        self.handler(type_id);
        RawAllocator::new(self, type_id, false)
    }

    /// Bulk allocator that reuses exact-length free runs first.
    pub fn free_list_raw_allocator(&mut self, type_id: BufferTypeId) -> RawAllocator<'_, T, R> {
        self.handler(type_id);
        RawAllocator::new(self, type_id, true)
    }

    /// Claim a run of `len` elements for `type_id`.
    ///
    /// Fresh runs hold `T::default()`; reused runs were cleaned when they
    /// were reclaimed. An empty run gets the invalid reference and claims
    /// nothing, since its offset could sit one past the last addressable
    /// element.
    pub(crate) fn alloc_run(
        &mut self,
        type_id: BufferTypeId,
        len: usize,
        use_free_list: bool,
    ) -> R {
        if len == 0 {
            return R::from(EntryRef::INVALID);
        }
        if use_free_list {
            if let Some(entry_ref) = self.pop_free(type_id, len) {
                return entry_ref;
            }
        }
        self.ensure_buffer_capacity(type_id, len);
        let buffer_id = self.primary_buffer_id(type_id);
        let offset = self.buffers[buffer_id as usize].push_elems(len);
        R::new(offset, buffer_id)
    }

    fn pop_free(&mut self, type_id: BufferTypeId, len: usize) -> Option<R> {
        let entry_ref = self.types[type_id.0 as usize].free_list.pop(len)?;
        self.buffers[entry_ref.buffer_id() as usize].dec_dead_elems(len);
        Some(entry_ref)
    }

    /// Writable view of a run the writer has just claimed.
    pub(crate) fn run_mut(&mut self, entry_ref: R, len: usize) -> &mut [T] {
        self.buffers[entry_ref.buffer_id() as usize]
            .block_mut()
            .slice_mut(entry_ref.offset(), len)
    }

    /// Make sure the primary buffer of `type_id` has room for
    /// `elems_needed` more elements, switching to a fresh buffer or
    /// resizing the current one as the type's policy dictates.
    pub fn ensure_buffer_capacity(&mut self, type_id: BufferTypeId, elems_needed: usize) {
        let buffer_id = self.primary_buffer_id(type_id);
        let state = &self.buffers[buffer_id as usize];
        if state.remaining() >= elems_needed {
            return;
        }
        let switch = self
            .handler(type_id)
            .buffer_type
            .should_switch(state.size(), elems_needed);
        if switch {
            self.switch_primary_buffer(type_id, elems_needed);
        } else {
            self.fallback_resize(type_id, buffer_id, elems_needed);
        }
    }

    /// Move `type_id` to a fresh buffer with room for `elems_needed`
    /// elements. The old primary stays active until the owner holds it.
    ///
    /// # Panics
    ///
    /// Panics if every buffer id is in use.
    pub fn switch_primary_buffer(&mut self, type_id: BufferTypeId, elems_needed: usize) {
        let old = self.primary_buffer_id(type_id);
        let buffer_id = self.next_free_buffer_id(old + 1);
        self.activate(buffer_id, type_id, elems_needed);
        self.types[type_id.0 as usize].primary = Some(buffer_id);
        debug!(
            type_id = type_id.0,
            from = old,
            to = buffer_id,
            "primary buffer switched"
        );
    }

    fn fallback_resize(&mut self, type_id: BufferTypeId, buffer_id: u32, elems_needed: usize) {
        let buffer_type = &self.types[type_id.0 as usize].buffer_type;
        let state = &self.buffers[buffer_id as usize];
        let used = state.size();
        let old_capacity = state.capacity();
        let arrays = buffer_type.calc_arrays_to_alloc(elems_needed, 0, used, true);
        let capacity = buffer_type.capacity_for_arrays(arrays, mem::size_of::<T>());
        let mut block = RawBlock::new(capacity, Arc::clone(buffer_type.allocator()));
        block.copy_prefix_from(state.block(), used);

        let state = &mut self.buffers[buffer_id as usize];
        let old = state.replace_block(block);
        self.table.publish(buffer_id, state.block());
        self.memory_holds.insert(HeldMemory::Block(old));
        debug!(
            buffer_id,
            type_id = type_id.0,
            old_capacity,
            new_capacity = capacity,
            "buffer resized"
        );
    }

    fn activate(&mut self, buffer_id: u32, type_id: BufferTypeId, elems_needed: usize) {
        let used = self.active_used_elems(type_id);
        let buffer_type = &self.types[type_id.0 as usize].buffer_type;
        let reserved = buffer_type.reserved_elems(buffer_id);
        let arrays = buffer_type.calc_arrays_to_alloc(elems_needed, reserved, used, false);
        let capacity = buffer_type.capacity_for_arrays(arrays, mem::size_of::<T>());
        let block = RawBlock::new(capacity, Arc::clone(buffer_type.allocator()));
        let array_size = buffer_type.array_size();

        self.materialize(buffer_id);
        let state = &mut self.buffers[buffer_id as usize];
        state.activate(type_id, array_size, reserved, block);
        self.table.publish(buffer_id, state.block());
        debug!(
            buffer_id,
            type_id = type_id.0,
            capacity,
            reserved,
            "buffer activated"
        );
    }

    fn active_used_elems(&self, type_id: BufferTypeId) -> usize {
        self.buffers
            .iter()
            .filter(|s| s.is_active() && s.type_id() == Some(type_id))
            .map(BufferState::size)
            .sum()
    }

    fn next_free_buffer_id(&self, start: u32) -> u32 {
        let n = self.num_buffers() as u32;
        for i in 0..n {
            let buffer_id = (start + i) % n;
            if self.buffer_state(buffer_id).is_free() {
                return buffer_id;
            }
        }
        panic!("all {n} buffer ids are in use");
    }

    fn materialize(&mut self, buffer_id: u32) {
        while self.buffers.len() <= buffer_id as usize {
            self.buffers.push(BufferState::new(Arc::clone(&self.heap)));
        }
    }

    // ----- reads ------------------------------------------------------------

    /// The value at `entry_ref`.
    pub fn get_entry(&self, entry_ref: R) -> T {
        self.get_array(entry_ref, 1)[0]
    }

    /// The `len` elements starting at `entry_ref`.
    ///
    /// # Panics
    ///
    /// Panics if the run lies outside the buffer's block.
    pub fn get_array(&self, entry_ref: R, len: usize) -> &[T] {
        self.buffer_state(entry_ref.buffer_id())
            .block()
            .slice(entry_ref.offset(), len)
    }

    // ----- holds and reclaim ------------------------------------------------

    /// Release the run of `len` elements at `entry_ref`.
    ///
    /// The run stays readable until a reclaim passes the generation it gets
    /// tagged with. If the type's element hold list is disabled the run is
    /// marked dead at once and never reused.
    ///
    /// # Panics
    ///
    /// Panics if the run's buffer is not active.
    pub fn hold_elem(&mut self, entry_ref: R, len: usize) {
        let buffer_id = entry_ref.buffer_id();
        let state = active_state_mut(&mut self.buffers, buffer_id, "hold_elem");
        let type_id = state.owner();
        if !self.types[type_id.0 as usize].elem_hold_enabled {
            state.inc_dead_elems(len);
            return;
        }
        state.inc_hold_elems(len);
        self.elem_holds.insert(ElemHold { entry_ref, len });
    }

    /// Put a whole non-primary buffer on hold.
    ///
    /// Everything in it that is not already dead becomes held, and its
    /// free runs are forgotten. The buffer id becomes free once a reclaim
    /// passes the hold's generation.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is not active or is its type's primary buffer.
    pub fn hold_buffer(&mut self, buffer_id: u32) {
        let state = active_state_mut(&mut self.buffers, buffer_id, "hold_buffer");
        let type_id = state.owner();
        let handler = &mut self.types[type_id.0 as usize];
        assert!(
            handler.primary != Some(buffer_id),
            "cannot hold buffer {buffer_id}: it is the primary buffer of type {type_id}"
        );
        state.on_hold();
        let hold_elems = state.hold_elems();
        let dropped_free_runs = handler.free_list.remove_buffer(buffer_id);
        self.memory_holds.insert(HeldMemory::Buffer(buffer_id));
        debug!(
            buffer_id,
            type_id = type_id.0,
            hold_elems,
            dropped_free_runs,
            "buffer put on hold"
        );
    }

    /// Tag every hold issued since the previous call with `current`.
    pub fn assign_generation(&mut self, current: Generation) {
        self.elem_holds.assign_generation(current);
        self.memory_holds.assign_generation(current);
    }

    /// Free every element hold tagged older than `oldest_used`.
    ///
    /// Freed runs are cleaned to `T::default()`, counted dead, and pushed on
    /// their type's free list when free lists are enabled and the buffer is
    /// still active.
    pub fn reclaim_entry_refs(&mut self, oldest_used: Generation) {
        let mut freed = 0usize;
        while let Some(hold) = self.elem_holds.pop_reclaimable(oldest_used) {
            self.free_elem(hold);
            freed += 1;
        }
        if freed > 0 {
            trace!(freed, oldest_used = oldest_used.0, "reclaimed element holds");
        }
    }

    fn free_elem(&mut self, hold: ElemHold<R>) {
        let ElemHold { entry_ref, len } = hold;
        let buffer_id = entry_ref.buffer_id();
        let state = &mut self.buffers[buffer_id as usize];
        assert!(
            !state.is_free(),
            "element hold in buffer {buffer_id} outlived the buffer"
        );
        state.hold_to_dead(len);
        state
            .block_mut()
            .slice_mut(entry_ref.offset(), len)
            .fill(T::default());
        if self.free_lists_enabled && state.is_active() && !state.is_compacting() {
            let type_id = state.owner();
            self.types[type_id.0 as usize]
                .free_list
                .push(entry_ref, len);
        }
    }

    /// Free element holds, held buffers and resized-away blocks tagged
    /// older than `oldest_used`.
    pub fn reclaim_memory(&mut self, oldest_used: Generation) {
        self.reclaim_entry_refs(oldest_used);
        let mut freed_buffers = 0usize;
        let mut freed_blocks = 0usize;
        while let Some(held) = self.memory_holds.pop_reclaimable(oldest_used) {
            match held {
                HeldMemory::Buffer(buffer_id) => {
                    self.free_buffer(buffer_id);
                    freed_buffers += 1;
                }
                HeldMemory::Block(block) => {
                    drop(block);
                    freed_blocks += 1;
                }
            }
        }
        if freed_buffers + freed_blocks > 0 {
            trace!(
                freed_buffers,
                freed_blocks,
                oldest_used = oldest_used.0,
                "reclaimed held memory"
            );
        }
    }

    fn free_buffer(&mut self, buffer_id: u32) {
        self.table.clear(buffer_id);
        let empty = RawBlock::empty(Arc::clone(&self.heap));
        let block = self.buffers[buffer_id as usize].on_free(empty);
        debug!(buffer_id, bytes = block.bytes(), "buffer freed");
    }

    /// Free every buffer and every hold at once and forget all primary
    /// buffers. The store needs [`init_primary_buffers`](Self::init_primary_buffers)
    /// before it can allocate again.
    ///
    /// Readers must be gone: their references all dangle afterwards.
    pub fn drop_buffers(&mut self) {
        self.elem_holds.drain_all().for_each(drop);
        self.memory_holds.drain_all().for_each(drop);
        for buffer_id in 0..self.buffers.len() as u32 {
            if !self.buffers[buffer_id as usize].is_free() {
                self.free_buffer(buffer_id);
            }
        }
        for handler in &mut self.types {
            handler.primary = None;
            handler.free_list.clear();
        }
    }

    // ----- policy switches --------------------------------------------------

    /// Push reclaimed runs on free lists and reuse them.
    pub fn enable_free_lists(&mut self) {
        self.free_lists_enabled = true;
    }

    /// Stop collecting reclaimed runs and forget the ones collected.
    pub fn disable_free_lists(&mut self) {
        self.free_lists_enabled = false;
        for handler in &mut self.types {
            handler.free_list.clear();
        }
    }

    /// Whether reclaimed runs are collected for reuse.
    pub fn free_lists_enabled(&self) -> bool {
        self.free_lists_enabled
    }

    /// Make element holds of `type_id` dead immediately instead of waiting
    /// for a generation. For types whose readers never outlive a release.
    pub fn disable_elem_hold_list(&mut self, type_id: BufferTypeId) {
        self.handler_mut(type_id).elem_hold_enabled = false;
    }

    fn handler(&self, type_id: BufferTypeId) -> &TypeHandler<R> {
        match self.types.get(type_id.0 as usize) {
            Some(handler) => handler,
            None => panic!("unknown buffer type {type_id}"),
        }
    }

    fn handler_mut(&mut self, type_id: BufferTypeId) -> &mut TypeHandler<R> {
        match self.types.get_mut(type_id.0 as usize) {
            Some(handler) => handler,
            None => panic!("unknown buffer type {type_id}"),
        }
    }
}

fn active_state_mut<'a, T: Element>(
    buffers: &'a mut [BufferState<T>],
    buffer_id: u32,
    op: &str,
) -> &'a mut BufferState<T> {
    match buffers.get_mut(buffer_id as usize) {
        Some(state) if state.is_active() => state,
        other => panic!(
            "{} on buffer {} which is {}",
            op,
            buffer_id,
            other.map_or(BufferStatus::Free, |s| s.status())
        ),
    }
}

impl<T: Element, R: RefType> GenerationHeld for DataStore<T, R> {
    fn assign_generation(&mut self, current: Generation) {
        DataStore::assign_generation(self, current);
    }

    fn reclaim_memory(&mut self, oldest_used: Generation) {
        DataStore::reclaim_memory(self, oldest_used);
    }
}

impl<T: Element, R: RefType> Default for DataStore<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element, R: RefType> Drop for DataStore<T, R> {
    fn drop(&mut self) {
        self.drop_buffers();
    }
}

impl<T: Element, R: RefType> fmt::Debug for DataStore<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("types", &self.types.len())
            .field("buffers_in_use", &self.buffers.iter().filter(|s| !s.is_free()).count())
            .field("num_buffers", &self.num_buffers())
            .field("free_lists_enabled", &self.free_lists_enabled)
            .field("elem_holds", &self.elem_holds.len())
            .field("memory_holds", &self.memory_holds.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferTypeConfig;

    type Store = DataStore<u32, EntryRefT<22, 10>>;
    type TinyStore = DataStore<u32, EntryRefT<3, 2>>;

    fn held_then_reclaimed(store: &mut Store, gen: u64) {
        store.assign_generation(Generation(gen));
        store.reclaim_memory(Generation(gen + 1));
    }

    #[test]
    fn reclaim_entry_refs_leaves_held_memory() {
        let mut store = Store::new();
        store.add_entry(1);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        let r = store.add_entry(2);
        assert_eq!(r.buffer_id(), 1);
        store.hold_elem(r, 1);
        store.hold_buffer(0);
        store.assign_generation(Generation(1));

        store.reclaim_entry_refs(Generation(2));
        assert_eq!(store.buffer_state(1).hold_elems(), 0);
        assert_eq!(store.buffer_state(1).dead_elems(), 1);
        assert_eq!(store.get_entry(r), 0);
        assert!(store.buffer_state(0).is_on_hold());
        assert_eq!(store.memory_holds.len(), 1);

        store.reclaim_memory(Generation(2));
        assert!(store.buffer_state(0).is_free());
        assert!(store.memory_holds.is_empty());
    }

    #[test]
    fn new_store_reserves_first_element() {
        let store = Store::new();
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 0);
        let state = store.buffer_state(0);
        assert!(state.is_active());
        assert_eq!(state.size(), 1);
        assert_eq!(state.dead_elems(), 1);
    }

    #[test]
    fn first_ref_is_never_zero() {
        let mut store = Store::new();
        let r = store.add_entry(7);
        assert!(r.valid());
        assert_eq!(r.offset(), 1);
        assert_eq!(r.buffer_id(), 0);
    }

    #[test]
    fn entries_round_trip() {
        let mut store = Store::new();
        let refs: Vec<_> = (1..=100).map(|v| store.add_entry(v)).collect();
        for (r, v) in refs.iter().zip(1..=100) {
            assert_eq!(store.get_entry(*r), v);
        }
    }

    #[test]
    fn refs_increase_within_a_buffer() {
        let mut store = Store::new();
        let a = store.add_entry(1);
        let b = store.add_entry(2);
        let c = store.add_entry(3);
        assert!(a < b && b < c);
    }

    #[test]
    fn tiny_layout_switches_buffers() {
        let mut store = TinyStore::new();
        // Offset space of 8 caps every buffer at 8 elements.
        let refs: Vec<_> = (0..20).map(|v| store.add_entry(v)).collect();
        assert!(refs.iter().any(|r| r.buffer_id() > 0));
        for (r, v) in refs.iter().zip(0..20) {
            assert_eq!(store.get_entry(*r), v);
        }
        for buffer_id in 0..4 {
            assert!(store.buffer_state(buffer_id).capacity() <= 8);
        }
    }

    #[test]
    fn hold_then_reclaim_cleans_and_counts_dead() {
        let mut store = Store::new();
        let r = store.add_entry(5);
        store.hold_elem(r, 1);
        assert_eq!(store.buffer_state(0).hold_elems(), 1);
        assert_eq!(store.get_entry(r), 5);
        held_then_reclaimed(&mut store, 1);
        assert_eq!(store.buffer_state(0).hold_elems(), 0);
        assert_eq!(store.buffer_state(0).dead_elems(), 2);
        assert_eq!(store.get_entry(r), 0);
    }

    #[test]
    fn reclaim_waits_for_generation() {
        let mut store = Store::new();
        let r = store.add_entry(5);
        store.hold_elem(r, 1);
        store.assign_generation(Generation(3));
        store.reclaim_memory(Generation(3));
        assert_eq!(store.buffer_state(0).hold_elems(), 1);
        store.reclaim_memory(Generation(4));
        assert_eq!(store.buffer_state(0).hold_elems(), 0);
    }

    #[test]
    fn unassigned_holds_survive_reclaim() {
        let mut store = Store::new();
        let r = store.add_entry(5);
        store.hold_elem(r, 1);
        store.reclaim_memory(Generation(u64::MAX));
        assert_eq!(store.buffer_state(0).hold_elems(), 1);
    }

    #[test]
    fn disabled_elem_hold_list_marks_dead_at_once() {
        let mut store = Store::new();
        store.enable_free_lists();
        store.disable_elem_hold_list(BufferTypeId(0));
        let r = store.add_entry(5);
        store.hold_elem(r, 1);
        assert_eq!(store.buffer_state(0).hold_elems(), 0);
        assert_eq!(store.buffer_state(0).dead_elems(), 2);
        held_then_reclaimed(&mut store, 1);
        assert!(store.free_list(BufferTypeId(0)).is_empty());
    }

    #[test]
    fn free_list_reuse_decrements_dead() {
        let mut store = Store::new();
        store.enable_free_lists();
        let r = store.add_entry(5);
        store.hold_elem(r, 1);
        held_then_reclaimed(&mut store, 1);
        assert_eq!(store.buffer_state(0).dead_elems(), 2);
        let again = store.add_entry(6);
        assert_eq!(again, r);
        assert_eq!(store.get_entry(again), 6);
        assert_eq!(store.buffer_state(0).dead_elems(), 1);
    }

    #[test]
    fn disabling_free_lists_forgets_runs() {
        let mut store = Store::new();
        store.enable_free_lists();
        let r = store.add_entry(5);
        store.hold_elem(r, 1);
        held_then_reclaimed(&mut store, 1);
        store.disable_free_lists();
        assert!(store.free_list(BufferTypeId(0)).is_empty());
        assert_ne!(store.add_entry(6), r);
    }

    #[test]
    fn hold_buffer_and_free_it() {
        let mut store = Store::new();
        store.add_entry(1);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 1);
        store.hold_buffer(0);
        let state = store.buffer_state(0);
        assert!(state.is_on_hold());
        assert_eq!(state.hold_elems(), 1);
        assert_eq!(state.dead_elems(), 1);
        held_then_reclaimed(&mut store, 1);
        let state = store.buffer_state(0);
        assert!(state.is_free());
        assert_eq!(state.capacity(), 0);
    }

    #[test]
    fn switch_prefers_ids_after_primary() {
        let mut store = Store::new();
        store.switch_primary_buffer(BufferTypeId(0), 0);
        store.hold_buffer(0);
        held_then_reclaimed(&mut store, 1);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 2);
        assert!(store.buffer_state(0).is_free());
    }

    #[test]
    fn freed_buffer_id_is_reused_after_wrapping() {
        let mut store = TinyStore::new();
        for _ in 0..3 {
            store.switch_primary_buffer(BufferTypeId(0), 0);
        }
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 3);
        for buffer_id in 0..3 {
            store.hold_buffer(buffer_id);
        }
        store.assign_generation(Generation(1));
        store.reclaim_memory(Generation(2));
        store.switch_primary_buffer(BufferTypeId(0), 0);
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 0);
        // Buffer 0 reserves its first element again.
        assert_eq!(store.buffer_state(0).size(), 1);
    }

    #[test]
    #[should_panic(expected = "primary buffer")]
    fn holding_primary_buffer_panics() {
        let mut store = Store::new();
        store.hold_buffer(0);
    }

    #[test]
    #[should_panic(expected = "hold_elem on buffer 0 which is hold")]
    fn hold_elem_on_held_buffer_panics() {
        let mut store = Store::new();
        let r = store.add_entry(1);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        store.hold_buffer(0);
        store.hold_elem(r, 1);
    }

    #[test]
    #[should_panic(expected = "init_primary_buffers")]
    fn alloc_before_init_panics() {
        let mut store = Store::empty();
        store.add_type(BufferType::default());
        store.add_entry(1);
    }

    #[test]
    #[should_panic(expected = "unknown buffer type 3")]
    fn unknown_type_panics() {
        let mut store = Store::new();
        store.allocator(BufferTypeId(3));
    }

    #[test]
    #[should_panic(expected = "buffer ids are in use")]
    fn exhausting_buffer_ids_panics() {
        let mut store = TinyStore::new();
        for _ in 0..4 {
            store.switch_primary_buffer(BufferTypeId(0), 0);
        }
    }

    #[test]
    #[should_panic(expected = "zero-sized")]
    fn zero_sized_elements_rejected() {
        let _ = DataStore::<(), EntryRefT<22, 10>>::empty();
    }

    #[test]
    fn resize_moves_data_and_holds_old_block() {
        let buffer_type = BufferType::new(BufferTypeConfig {
            min_arrays: 2,
            num_arrays_for_new_buffer: 64,
            ..BufferTypeConfig::new(1)
        })
        .unwrap();
        let mut store = Store::with_type(buffer_type);
        let refs: Vec<_> = (10..20).map(|v| store.add_entry(v)).collect();
        assert_eq!(store.primary_buffer_id(BufferTypeId(0)), 0);
        assert!(!store.memory_holds.is_empty());
        for (r, v) in refs.iter().zip(10..20) {
            assert_eq!(store.get_entry(*r), v);
        }
        held_then_reclaimed(&mut store, 1);
        assert!(store.memory_holds.is_empty());
        assert_eq!(store.get_entry(refs[9]), 19);
    }

    #[test]
    fn drop_buffers_frees_everything() {
        let mut store = Store::new();
        store.add_entry(1);
        store.switch_primary_buffer(BufferTypeId(0), 0);
        store.drop_buffers();
        assert!(store.buffer_state(0).is_free());
        assert!(store.buffer_state(1).is_free());
        store.init_primary_buffers();
        let r = store.add_entry(9);
        assert_eq!(store.get_entry(r), 9);
    }
}
