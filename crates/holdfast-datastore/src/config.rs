//! Buffer type configuration parameters.

use crate::error::StoreError;

/// Sizing policy for one buffer type (element class).
///
/// Controls how many arrays a fresh buffer gets, how fast buffers grow, and
/// when the store switches to a new buffer instead of resizing the current
/// one. Validated when turned into a [`BufferType`](crate::BufferType).
#[derive(Clone, Debug, PartialEq)]
pub struct BufferTypeConfig {
    /// Number of elements in one array (the allocation unit).
    ///
    /// Must be at least 1.
    pub array_size: u32,

    /// Minimum number of arrays allocated for a buffer.
    ///
    /// Default: 16.
    pub min_arrays: u32,

    /// Maximum number of arrays in one buffer.
    ///
    /// Default: `u32::MAX`. Clamped when the type is added to a store so a
    /// buffer never outgrows the offset space of the store's reference
    /// layout.
    pub max_arrays: u32,

    /// Buffer size (in arrays) from which the store switches to a fresh
    /// buffer instead of resizing the primary one.
    ///
    /// Default: 0, meaning always switch and never resize.
    pub num_arrays_for_new_buffer: u32,

    /// Fraction of the arrays already in use that a new buffer grows by.
    ///
    /// Default: 0.4. Must be finite and non-negative.
    pub grow_factor: f32,
}

impl BufferTypeConfig {
    /// Default minimum arrays per buffer.
    pub const DEFAULT_MIN_ARRAYS: u32 = 16;

    /// Default maximum arrays per buffer (clamped per store).
    pub const DEFAULT_MAX_ARRAYS: u32 = u32::MAX;

    /// Default switch threshold: always switch.
    pub const DEFAULT_NUM_ARRAYS_FOR_NEW_BUFFER: u32 = 0;

    /// Default grow factor.
    pub const DEFAULT_GROW_FACTOR: f32 = 0.4;

    /// Create a config for the given array size.
    ///
    /// Uses default values for all other parameters.
    pub fn new(array_size: u32) -> Self {
        Self {
            array_size,
            min_arrays: Self::DEFAULT_MIN_ARRAYS,
            max_arrays: Self::DEFAULT_MAX_ARRAYS,
            num_arrays_for_new_buffer: Self::DEFAULT_NUM_ARRAYS_FOR_NEW_BUFFER,
            grow_factor: Self::DEFAULT_GROW_FACTOR,
        }
    }

    /// Check the config for values no store can honour.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.array_size == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "array_size must be at least 1".into(),
            });
        }
        if self.min_arrays > self.max_arrays {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "min_arrays ({}) exceeds max_arrays ({})",
                    self.min_arrays, self.max_arrays
                ),
            });
        }
        if !self.grow_factor.is_finite() || self.grow_factor < 0.0 {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "grow_factor must be finite and non-negative, got {}",
                    self.grow_factor
                ),
            });
        }
        Ok(())
    }
}

impl Default for BufferTypeConfig {
    fn default() -> Self {
        Self::new(1)
    }
}
