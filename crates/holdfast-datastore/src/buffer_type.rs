//! Per-element-class buffer policy.
//!
//! A [`BufferType`] is shared by every buffer that stores its element class.
//! It owns no memory; it decides how large the next buffer (or the next
//! resize of the primary buffer) should be, and carries the allocator hook
//! those buffers are allocated through.

use std::sync::Arc;

use holdfast_core::{HeapAllocator, MemoryAllocator};

use crate::config::BufferTypeConfig;
use crate::error::StoreError;

/// Sizing policy and allocator hook for one element class.
#[derive(Clone, Debug)]
pub struct BufferType {
    config: BufferTypeConfig,
    allocator: Arc<dyn MemoryAllocator>,
}

impl BufferType {
    /// Create a buffer type from a validated config, using the heap
    /// allocator hook.
    pub fn new(config: BufferTypeConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            config,
            allocator: Arc::new(HeapAllocator),
        })
    }

    /// Replace the allocator hook buffers of this type go through.
    pub fn with_allocator(mut self, allocator: Arc<dyn MemoryAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// The (possibly store-clamped) configuration.
    pub fn config(&self) -> &BufferTypeConfig {
        &self.config
    }

    /// The allocator hook.
    pub fn allocator(&self) -> &Arc<dyn MemoryAllocator> {
        &self.allocator
    }

    /// Elements per array.
    pub fn array_size(&self) -> usize {
        self.config.array_size as usize
    }

    /// Minimum arrays per buffer.
    pub fn min_arrays(&self) -> usize {
        self.config.min_arrays as usize
    }

    /// Maximum arrays per buffer.
    pub fn max_arrays(&self) -> usize {
        self.config.max_arrays as usize
    }

    /// Elements reserved at the start of `buffer_id` when it is activated
    /// for this type. Buffer 0 reserves one array so that the all-zero
    /// reference is never handed out.
    pub fn reserved_elems(&self, buffer_id: u32) -> usize {
        if buffer_id == 0 {
            self.array_size()
        } else {
            0
        }
    }

    /// Whether a primary buffer currently holding `size` elements should be
    /// replaced by a fresh buffer (rather than resized) to fit
    /// `elems_needed` more.
    pub fn should_switch(&self, size: usize, elems_needed: usize) -> bool {
        let threshold = self.config.num_arrays_for_new_buffer as usize * self.array_size();
        elems_needed + size >= threshold
    }

    /// Clamp `max_arrays` (and `min_arrays` with it) so one buffer fits in
    /// `offset_size` offsets.
    pub(crate) fn clamp_to_offset_size(&mut self, offset_size: usize) {
        let limit = (offset_size / self.array_size()).min(u32::MAX as usize) as u32;
        self.config.max_arrays = self.config.max_arrays.min(limit);
        self.config.min_arrays = self.config.min_arrays.min(self.config.max_arrays);
    }

    /// Number of arrays to allocate for a new buffer or a resize.
    ///
    /// `used_elems` is the primary buffer's size when `resizing`, and the
    /// total size of every active buffer of this type otherwise.
    /// `reserved_elems` applies only to fresh buffers.
    ///
    /// # Panics
    ///
    /// Panics if `elems_needed` cannot fit in a buffer of `max_arrays`
    /// arrays.
    pub fn calc_arrays_to_alloc(
        &self,
        elems_needed: usize,
        reserved_elems: usize,
        used_elems: usize,
        resizing: bool,
    ) -> usize {
        let array_size = self.array_size();
        let base = if resizing { used_elems } else { reserved_elems };
        let needed_arrays = (elems_needed + base).div_ceil(array_size);
        let used_arrays = used_elems / array_size;
        let grow_arrays = (used_arrays as f64 * f64::from(self.config.grow_factor)) as usize;
        let carried = if resizing { used_arrays } else { 0 };
        let wanted_arrays = (carried + grow_arrays).max(self.min_arrays());
        assert!(
            needed_arrays <= self.max_arrays(),
            "request for {} elements needs {} arrays, buffer type allows at most {}",
            elems_needed,
            needed_arrays,
            self.max_arrays()
        );
        wanted_arrays.max(needed_arrays).min(self.max_arrays())
    }

    /// Capacity in elements of a block holding `arrays` arrays of
    /// `elem_size`-byte elements, after the allocator's rounding and the
    /// `max_arrays` clamp.
    pub fn capacity_for_arrays(&self, arrays: usize, elem_size: usize) -> usize {
        let requested = arrays * self.array_size() * elem_size;
        let max_bytes = self
            .max_arrays()
            .saturating_mul(self.array_size())
            .saturating_mul(elem_size);
        let bytes = self
            .allocator
            .round_up(requested)
            .max(requested)
            .min(max_bytes);
        bytes / elem_size
    }
}

impl Default for BufferType {
    fn default() -> Self {
        Self {
            config: BufferTypeConfig::default(),
            allocator: Arc::new(HeapAllocator),
        }
    }
}
