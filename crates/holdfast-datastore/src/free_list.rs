//! Per-type free lists of reclaimed runs.
//!
//! Reclaimed runs are pushed on a LIFO stack keyed by run length. Reuse is
//! exact-length only: a request for `n` elements never takes a run of any
//! other length, so the store never splits or merges runs.

use indexmap::IndexMap;

use holdfast_core::RefType;

/// LIFO stacks of free runs, one per run length.
#[derive(Clone, Debug)]
pub struct FreeList<R: RefType> {
    stacks: IndexMap<usize, Vec<R>>,
}

impl<R: RefType> FreeList<R> {
    /// Create an empty free list.
    pub fn new() -> Self {
        Self {
            stacks: IndexMap::new(),
        }
    }

    /// Push a reclaimed run of `len` elements.
    pub fn push(&mut self, entry_ref: R, len: usize) {
        self.stacks.entry(len).or_default().push(entry_ref);
    }

    /// Pop the most recently pushed run of exactly `len` elements.
    pub fn pop(&mut self, len: usize) -> Option<R> {
        self.stacks.get_mut(&len)?.pop()
    }

    /// Drop every run that lives in `buffer_id`. Returns how many were
    /// dropped.
    pub fn remove_buffer(&mut self, buffer_id: u32) -> usize {
        let mut removed = 0;
        for stack in self.stacks.values_mut() {
            let before = stack.len();
            stack.retain(|r| r.buffer_id() != buffer_id);
            removed += before - stack.len();
        }
        removed
    }

    /// Number of free runs of exactly `len` elements.
    pub fn len_for(&self, len: usize) -> usize {
        self.stacks.get(&len).map_or(0, Vec::len)
    }

    /// Total number of free runs.
    pub fn len(&self) -> usize {
        self.stacks.values().map(Vec::len).sum()
    }

    /// Whether there are no free runs.
    pub fn is_empty(&self) -> bool {
        self.stacks.values().all(Vec::is_empty)
    }

    /// Forget every free run.
    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}

impl<R: RefType> Default for FreeList<R> {
    fn default() -> Self {
        Self::new()
    }
}
