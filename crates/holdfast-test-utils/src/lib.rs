//! Test utilities for holdfast development.
//!
//! Provides [`ObservedAllocator`], a [`MemoryAllocator`] that records every
//! block allocated and released, and store [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Mutex, PoisonError};

use holdfast_core::{round_up_to_match_allocator, MemoryAllocator};

/// One observed allocator call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocEvent {
    Alloc(usize),
    Free(usize),
}

/// Allocator hook that records [`AllocEvent`]s.
///
/// Rounds like the default allocator unless built with
/// [`exact`](ObservedAllocator::exact).
#[derive(Debug, Default)]
pub struct ObservedAllocator {
    events: Mutex<Vec<AllocEvent>>,
    exact: bool,
}

impl ObservedAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An allocator that hands out exactly the requested size.
    pub fn exact() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            exact: true,
        }
    }

    /// Every event so far, oldest first.
    pub fn events(&self) -> Vec<AllocEvent> {
        self.lock().clone()
    }

    /// Sizes of every allocation so far, oldest first.
    pub fn allocations(&self) -> Vec<usize> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                AllocEvent::Alloc(bytes) => Some(*bytes),
                AllocEvent::Free(_) => None,
            })
            .collect()
    }

    /// Bytes allocated and not yet freed.
    pub fn live_bytes(&self) -> usize {
        self.lock().iter().fold(0, |live, e| match e {
            AllocEvent::Alloc(bytes) => live + bytes,
            AllocEvent::Free(bytes) => live - bytes,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AllocEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryAllocator for ObservedAllocator {
    fn round_up(&self, bytes: usize) -> usize {
        if self.exact {
            bytes
        } else {
            round_up_to_match_allocator(bytes)
        }
    }

    fn on_alloc(&self, bytes: usize) {
        self.lock().push(AllocEvent::Alloc(bytes));
    }

    fn on_free(&self, bytes: usize) {
        self.lock().push(AllocEvent::Free(bytes));
    }
}
