//! Generation counter and reader pinning.
//!
//! The writer owns a [`GenerationHandler`]. Every reader thread registers
//! once and gets a [`ReaderHandle`]; before resolving references it takes a
//! [`GenerationGuard`], which pins the current generation until dropped.
//! The writer tags released memory with the current generation, advances
//! it, and reclaims whatever is older than the oldest pinned generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::trace;

use holdfast_core::{Generation, GenerationHeld};

/// Sentinel meaning "this reader is not pinned to any generation."
pub const GENERATION_UNPINNED: u64 = u64::MAX;

/// Pinned generation of one reader, padded to avoid false sharing.
///
/// The writer scans every slot when computing the oldest used generation;
/// without padding, adjacent readers' pins would invalidate each other's
/// cache lines. 128-byte alignment covers both 64-byte (x86) and 128-byte
/// (Apple M-series) cache line sizes.
#[repr(align(128))]
#[derive(Debug)]
pub struct ReaderSlot {
    pinned: AtomicU64,
}

impl ReaderSlot {
    fn new() -> Self {
        Self {
            pinned: AtomicU64::new(GENERATION_UNPINNED),
        }
    }

    /// The pinned generation, if any.
    pub fn pinned(&self) -> Option<Generation> {
        match self.pinned.load(Ordering::SeqCst) {
            GENERATION_UNPINNED => None,
            g => Some(Generation(g)),
        }
    }
}

#[derive(Debug)]
struct Shared {
    current: AtomicU64,
    next_reader_id: AtomicU64,
    readers: Mutex<IndexMap<u64, Arc<ReaderSlot>>>,
}

impl Shared {
    fn readers(&self) -> MutexGuard<'_, IndexMap<u64, Arc<ReaderSlot>>> {
        // The registry is only inserted into and removed from; a panic
        // elsewhere cannot leave it half-updated.
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writer-side generation counter and reader registry.
///
/// Generations start at 0 and only grow. A `u64` never wraps in practice.
#[derive(Debug)]
pub struct GenerationHandler {
    shared: Arc<Shared>,
    oldest_used: Generation,
}

// Compile-time assertion: handler and reader handles must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<GenerationHandler>();
    assert::<ReaderHandle>();
};

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationHandler {
    /// A handler at generation 0 with no readers.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                current: AtomicU64::new(0),
                next_reader_id: AtomicU64::new(0),
                readers: Mutex::new(IndexMap::new()),
            }),
            oldest_used: Generation(0),
        }
    }

    /// The generation new holds are tagged with.
    pub fn current_generation(&self) -> Generation {
        Generation(self.shared.current.load(Ordering::SeqCst))
    }

    /// Advance the generation and return the new value.
    pub fn inc_generation(&mut self) -> Generation {
        Generation(self.shared.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Register a reader. The handle may move to another thread.
    pub fn register_reader(&self) -> ReaderHandle {
        let id = self.shared.next_reader_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(ReaderSlot::new());
        self.shared.readers().insert(id, Arc::clone(&slot));
        ReaderHandle {
            shared: Arc::clone(&self.shared),
            slot,
            id,
        }
    }

    /// Number of registered readers.
    pub fn num_readers(&self) -> usize {
        self.shared.readers().len()
    }

    /// Recompute the oldest generation any reader may still use: the
    /// smallest pinned generation, or the current one if nobody is pinned.
    pub fn update_oldest_used_generation(&mut self) -> Generation {
        let current = self.current_generation();
        let oldest = self
            .shared
            .readers()
            .values()
            .filter_map(|slot| slot.pinned())
            .min()
            .map_or(current, |pinned| pinned.min(current));
        debug_assert!(oldest >= self.oldest_used, "oldest used generation moved back");
        self.oldest_used = oldest;
        oldest
    }

    /// The value computed by the last
    /// [`update_oldest_used_generation`](Self::update_oldest_used_generation).
    pub fn oldest_used_generation(&self) -> Generation {
        self.oldest_used
    }

    /// One writer commit: tag pending holds with the current generation,
    /// advance it, and reclaim what no reader can see any more.
    pub fn commit<H: GenerationHeld + ?Sized>(&mut self, held: &mut H) {
        let tagged = self.current_generation();
        held.assign_generation(tagged);
        self.inc_generation();
        let oldest = self.update_oldest_used_generation();
        held.reclaim_memory(oldest);
        trace!(tagged = tagged.0, oldest_used = oldest.0, "generation committed");
    }
}

/// A registered reader. Unregisters on drop.
#[derive(Debug)]
pub struct ReaderHandle {
    shared: Arc<Shared>,
    slot: Arc<ReaderSlot>,
    id: u64,
}

impl ReaderHandle {
    /// Pin the current generation until the guard is dropped.
    ///
    /// Retries if the writer advanced the generation while the pin was
    /// being published, so the writer either sees the pin or the reader
    /// sees the newer generation.
    pub fn take_guard(&mut self) -> GenerationGuard<'_> {
        loop {
            let g = self.shared.current.load(Ordering::SeqCst);
            self.slot.pinned.store(g, Ordering::SeqCst);
            if self.shared.current.load(Ordering::SeqCst) == g {
                return GenerationGuard {
                    slot: &self.slot,
                    generation: Generation(g),
                };
            }
        }
    }

    /// The generation this reader is pinned to, if any.
    pub fn pinned(&self) -> Option<Generation> {
        self.slot.pinned()
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.shared.readers().shift_remove(&self.id);
    }
}

/// Keeps a generation pinned; unpins on drop.
#[derive(Debug)]
#[must_use = "the generation is unpinned as soon as the guard is dropped"]
pub struct GenerationGuard<'a> {
    slot: &'a ReaderSlot,
    generation: Generation,
}

impl GenerationGuard<'_> {
    /// The pinned generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.slot.pinned.store(GENERATION_UNPINNED, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        assigned: Vec<Generation>,
        reclaimed: Vec<Generation>,
    }

    impl GenerationHeld for Recorder {
        fn assign_generation(&mut self, current: Generation) {
            self.assigned.push(current);
        }

        fn reclaim_memory(&mut self, oldest_used: Generation) {
            self.reclaimed.push(oldest_used);
        }
    }

    #[test]
    fn generation_advances() {
        let mut handler = GenerationHandler::new();
        assert_eq!(handler.current_generation(), Generation(0));
        assert_eq!(handler.inc_generation(), Generation(1));
        assert_eq!(handler.inc_generation(), Generation(2));
        assert_eq!(handler.current_generation(), Generation(2));
    }

    #[test]
    fn oldest_is_current_without_readers() {
        let mut handler = GenerationHandler::new();
        handler.inc_generation();
        assert_eq!(handler.update_oldest_used_generation(), Generation(1));
        assert_eq!(handler.oldest_used_generation(), Generation(1));
    }

    #[test]
    fn pinned_reader_holds_back_oldest() {
        let mut handler = GenerationHandler::new();
        let mut reader = handler.register_reader();
        handler.inc_generation();
        {
            let guard = reader.take_guard();
            assert_eq!(guard.generation(), Generation(1));
            handler.inc_generation();
            handler.inc_generation();
            assert_eq!(handler.update_oldest_used_generation(), Generation(1));
        }
        assert_eq!(reader.pinned(), None);
        assert_eq!(handler.update_oldest_used_generation(), Generation(3));
    }

    #[test]
    fn min_over_several_readers() {
        let mut handler = GenerationHandler::new();
        let mut early = handler.register_reader();
        let mut late = handler.register_reader();
        let _early_guard = early.take_guard();
        handler.inc_generation();
        let _late_guard = late.take_guard();
        assert_eq!(handler.update_oldest_used_generation(), Generation(0));
    }

    #[test]
    fn dropped_reader_unregisters() {
        let handler = GenerationHandler::new();
        let reader = handler.register_reader();
        assert_eq!(handler.num_readers(), 1);
        drop(reader);
        assert_eq!(handler.num_readers(), 0);
    }

    #[test]
    fn commit_tags_advances_and_reclaims() {
        let mut handler = GenerationHandler::new();
        let mut held = Recorder::default();
        handler.commit(&mut held);
        handler.commit(&mut held);
        assert_eq!(held.assigned, vec![Generation(0), Generation(1)]);
        assert_eq!(held.reclaimed, vec![Generation(1), Generation(2)]);
    }

    #[test]
    fn commit_respects_pinned_reader() {
        let mut handler = GenerationHandler::new();
        let mut reader = handler.register_reader();
        let mut held = Recorder::default();
        let guard = reader.take_guard();
        handler.commit(&mut held);
        assert_eq!(held.reclaimed, vec![Generation(0)]);
        drop(guard);
        handler.commit(&mut held);
        assert_eq!(held.reclaimed, vec![Generation(0), Generation(2)]);
    }

    #[test]
    fn reader_slot_alignment() {
        assert!(
            std::mem::align_of::<ReaderSlot>() >= 128,
            "ReaderSlot must be cache-line aligned (>= 128 bytes)"
        );
    }

    #[test]
    fn guard_pins_across_threads() {
        let mut handler = GenerationHandler::new();
        let mut reader = handler.register_reader();
        let (pinned_tx, pinned_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let t = std::thread::spawn(move || {
            let guard = reader.take_guard();
            pinned_tx.send(guard.generation()).unwrap();
            release_rx.recv().unwrap();
        });
        let pinned = pinned_rx.recv().unwrap();
        handler.inc_generation();
        assert_eq!(handler.update_oldest_used_generation(), pinned);
        release_tx.send(()).unwrap();
        t.join().unwrap();
        assert_eq!(handler.update_oldest_used_generation(), Generation(1));
    }
}
