//! Core abstraction traits: element payloads, the allocator hook, and the
//! generation hold protocol.

use std::fmt;

use crate::id::Generation;

/// A value that can be stored in a datastore buffer.
///
/// Readers copy elements out of shared buffers without locking, so
/// elements are plain values. `Default` supplies the empty value written
/// into reserved slots, fresh capacity, and reclaimed runs.
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Element for T {}

/// Size of a transparent huge page. Buffers at or below this size are
/// rounded to a power of two; larger buffers to a multiple of it.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Round `bytes` up to the size the default allocator hands out.
///
/// `0` stays `0`. Sizes up to [`HUGE_PAGE_SIZE`] round to the next power of
/// two; larger sizes round to the next multiple of [`HUGE_PAGE_SIZE`].
pub fn round_up_to_match_allocator(bytes: usize) -> usize {
    if bytes == 0 {
        return 0;
    }
    let p2 = bytes.next_power_of_two();
    if p2 <= HUGE_PAGE_SIZE {
        p2
    } else {
        bytes.div_ceil(HUGE_PAGE_SIZE) * HUGE_PAGE_SIZE
    }
}

/// Per-buffer-type memory allocator hook.
///
/// Decides how requested buffer sizes are rounded and observes every block
/// allocated and released for buffers of the type. The default
/// [`HeapAllocator`] uses huge-page-aware rounding and observes nothing.
pub trait MemoryAllocator: Send + Sync + fmt::Debug {
    /// Round a requested byte count up to the size actually handed out.
    fn round_up(&self, bytes: usize) -> usize {
        round_up_to_match_allocator(bytes)
    }

    /// Called after a block of `bytes` bytes has been allocated.
    fn on_alloc(&self, _bytes: usize) {}

    /// Called after a block of `bytes` bytes has been released.
    fn on_free(&self, _bytes: usize) {}
}

/// The process-default allocator hook.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl MemoryAllocator for HeapAllocator {}

/// Something that defers frees until no reader can observe them.
///
/// The owning component drives this from its reader generation tracker:
/// tag everything held so far with the current generation, advance the
/// generation, then reclaim with the oldest generation still in use.
pub trait GenerationHeld {
    /// Tag every hold issued since the previous call with `current`.
    fn assign_generation(&mut self, current: Generation);

    /// Physically free every hold tagged with a generation older than
    /// `oldest_used`.
    fn reclaim_memory(&mut self, oldest_used: Generation);
}
