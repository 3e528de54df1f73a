//! Strongly-typed identifiers: buffer type ids and generations.

use std::fmt;

/// Identifies a buffer type (element class) registered with a datastore.
///
/// Types are registered in order and assigned sequential ids.
/// `BufferTypeId(0)` is the default type used by single-element helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferTypeId(pub u32);

impl fmt::Display for BufferTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BufferTypeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing reader generation.
///
/// Holds are tagged with the generation current when they are assigned;
/// a hold tagged `g` may be reclaimed once the oldest generation any reader
/// still uses is greater than `g`. Never wraps in practice (u64).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_next_is_strictly_greater() {
        let g = Generation(41);
        assert_eq!(g.next(), Generation(42));
        assert!(g.next() > g);
    }

    #[test]
    fn ids_display_as_numbers() {
        assert_eq!(BufferTypeId(3).to_string(), "3");
        assert_eq!(Generation::from(7).to_string(), "7");
    }
}
