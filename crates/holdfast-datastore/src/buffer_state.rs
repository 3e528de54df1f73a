//! Runtime state of one physical buffer.

use std::fmt;
use std::sync::Arc;

use holdfast_core::{BufferTypeId, Element, MemoryAllocator};

use crate::raw::RawBlock;

/// Lifecycle of a buffer id.
///
/// `Free -> Active` when a type switches to it, `Active -> Hold` when the
/// owner holds the whole buffer, `Hold -> Free` once the hold is reclaimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    /// No memory; the id may be handed to any type.
    Free,
    /// Owns memory; allocations and element holds are allowed.
    Active,
    /// Owns memory that readers may still see; waiting for reclaim.
    Hold,
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Active => write!(f, "active"),
            Self::Hold => write!(f, "hold"),
        }
    }
}

/// State of one buffer id: counters, lifecycle, and the owned block.
///
/// For every buffer `dead_elems + hold_elems <= size <= capacity`, where
/// `size` counts every element ever allocated in the buffer (live, dead,
/// or on hold).
pub struct BufferState<T: Element> {
    status: BufferStatus,
    type_id: Option<BufferTypeId>,
    array_size: usize,
    reserved_elems: usize,
    used_elems: usize,
    dead_elems: usize,
    hold_elems: usize,
    compacting: bool,
    block: RawBlock<T>,
}

impl<T: Element> BufferState<T> {
    pub(crate) fn new(allocator: Arc<dyn MemoryAllocator>) -> Self {
        Self {
            status: BufferStatus::Free,
            type_id: None,
            array_size: 0,
            reserved_elems: 0,
            used_elems: 0,
            dead_elems: 0,
            hold_elems: 0,
            compacting: false,
            block: RawBlock::empty(allocator),
        }
    }

    /// Free -> Active with a fresh block. Reserved elements count as both
    /// used and dead.
    pub(crate) fn activate(
        &mut self,
        type_id: BufferTypeId,
        array_size: usize,
        reserved_elems: usize,
        block: RawBlock<T>,
    ) {
        assert_eq!(
            self.status,
            BufferStatus::Free,
            "activating a buffer that is not free"
        );
        debug_assert!(reserved_elems <= block.capacity());
        self.status = BufferStatus::Active;
        self.type_id = Some(type_id);
        self.array_size = array_size;
        self.reserved_elems = reserved_elems;
        self.used_elems = reserved_elems;
        self.dead_elems = reserved_elems;
        self.hold_elems = 0;
        self.compacting = false;
        self.block = block;
    }

    /// Active -> Hold. Everything not already dead goes on hold.
    pub(crate) fn on_hold(&mut self) {
        self.status = BufferStatus::Hold;
        self.hold_elems = self.used_elems - self.dead_elems;
        self.compacting = false;
    }

    /// Hold -> Free. Returns the block so the caller can detach it from
    /// readers before dropping it.
    pub(crate) fn on_free(&mut self, empty: RawBlock<T>) -> RawBlock<T> {
        self.status = BufferStatus::Free;
        self.type_id = None;
        self.array_size = 0;
        self.reserved_elems = 0;
        self.used_elems = 0;
        self.dead_elems = 0;
        self.hold_elems = 0;
        self.compacting = false;
        std::mem::replace(&mut self.block, empty)
    }

    /// Swap in a larger block, returning the old one.
    pub(crate) fn replace_block(&mut self, block: RawBlock<T>) -> RawBlock<T> {
        debug_assert!(block.capacity() >= self.used_elems);
        std::mem::replace(&mut self.block, block)
    }

    /// Claim `len` elements at the end of the used region, returning their
    /// offset.
    pub(crate) fn push_elems(&mut self, len: usize) -> usize {
        let offset = self.used_elems;
        assert!(
            len <= self.remaining(),
            "allocation of {} elements exceeds remaining capacity {}",
            len,
            self.remaining()
        );
        self.used_elems += len;
        offset
    }

    pub(crate) fn inc_hold_elems(&mut self, len: usize) {
        self.hold_elems += len;
        debug_assert!(self.dead_elems + self.hold_elems <= self.used_elems);
    }

    pub(crate) fn inc_dead_elems(&mut self, len: usize) {
        self.dead_elems += len;
        debug_assert!(self.dead_elems + self.hold_elems <= self.used_elems);
    }

    pub(crate) fn dec_dead_elems(&mut self, len: usize) {
        debug_assert!(len <= self.dead_elems);
        self.dead_elems -= len;
    }

    /// A held run is freed: hold -> dead.
    pub(crate) fn hold_to_dead(&mut self, len: usize) {
        debug_assert!(len <= self.hold_elems);
        self.hold_elems -= len;
        self.dead_elems += len;
    }

    /// The owning type of a buffer that is not free.
    pub(crate) fn owner(&self) -> BufferTypeId {
        match self.type_id {
            Some(type_id) => type_id,
            None => panic!("free buffer has no owning type"),
        }
    }

    pub(crate) fn set_compacting(&mut self) {
        self.compacting = true;
    }

    pub(crate) fn block(&self) -> &RawBlock<T> {
        &self.block
    }

    pub(crate) fn block_mut(&mut self) -> &mut RawBlock<T> {
        &mut self.block
    }

    /// Lifecycle state.
    pub fn status(&self) -> BufferStatus {
        self.status
    }

    /// Whether the buffer accepts allocations and element holds.
    pub fn is_active(&self) -> bool {
        self.status == BufferStatus::Active
    }

    /// Whether the whole buffer is on hold.
    pub fn is_on_hold(&self) -> bool {
        self.status == BufferStatus::Hold
    }

    /// Whether the buffer id is unused.
    pub fn is_free(&self) -> bool {
        self.status == BufferStatus::Free
    }

    /// Whether the buffer is being compacted away.
    pub fn is_compacting(&self) -> bool {
        self.compacting
    }

    /// The type that owns the buffer, if it is not free.
    pub fn type_id(&self) -> Option<BufferTypeId> {
        self.type_id
    }

    /// Elements per array of the owning type (0 when free).
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    /// Elements allocated so far, including reserved, dead and held ones.
    pub fn size(&self) -> usize {
        self.used_elems
    }

    /// Elements still available for bump allocation.
    pub fn remaining(&self) -> usize {
        self.block.capacity() - self.used_elems
    }

    /// Elements reserved when the buffer was activated.
    pub fn reserved_elems(&self) -> usize {
        self.reserved_elems
    }

    /// Elements that are freed and not reachable by any reader.
    pub fn dead_elems(&self) -> usize {
        self.dead_elems
    }

    /// Elements freed by the owner but possibly still seen by readers.
    pub fn hold_elems(&self) -> usize {
        self.hold_elems
    }
}

impl<T: Element> fmt::Debug for BufferState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferState")
            .field("status", &self.status)
            .field("type_id", &self.type_id)
            .field("capacity", &self.capacity())
            .field("size", &self.used_elems)
            .field("dead", &self.dead_elems)
            .field("hold", &self.hold_elems)
            .field("compacting", &self.compacting)
            .finish()
    }
}
