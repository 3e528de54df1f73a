//! Compact 32-bit handles into a datastore.
//!
//! An [`EntryRef`] is the untyped form that other structures store in bulk
//! (posting lists, attribute vectors). An [`EntryRefT`] fixes the split
//! between buffer id bits and offset bits at compile time and knows how to
//! decode itself. The raw layout is `[buffer_id : B][offset : O]`, so raw
//! ordering sorts first by buffer and then by offset.

use std::fmt;
use std::hash::Hash;

/// Untyped entry reference.
///
/// The zero value is reserved: no allocation ever returns it, so it can be
/// used as "no entry" in handle arrays.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef(u32);

impl EntryRef {
    /// The reserved "no entry" reference.
    pub const INVALID: EntryRef = EntryRef(0);

    /// Wrap a raw 32-bit value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this reference points at an entry (is non-zero).
    pub const fn valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryRef({:#x})", self.0)
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for EntryRef {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A reference layout: how many bits go to the offset and the buffer id.
///
/// Implemented by [`EntryRefT`]. The datastore is generic over this trait
/// so a store instantiation fixes its layout at compile time.
pub trait RefType:
    Copy + Eq + Ord + Hash + fmt::Debug + From<EntryRef> + Into<EntryRef> + Send + Sync + 'static
{
    /// Bits used for the in-buffer offset.
    const OFFSET_BITS: u32;
    /// Bits used for the buffer id.
    const BUFFER_BITS: u32;

    /// Encode an `(offset, buffer_id)` pair.
    ///
    /// Fields wider than their bit width are a caller bug; this is only
    /// checked in debug builds.
    fn new(offset: usize, buffer_id: u32) -> Self;

    /// The in-buffer offset, in elements.
    fn offset(self) -> usize;

    /// The buffer id.
    fn buffer_id(self) -> u32;

    /// Number of addressable offsets per buffer (`2^OFFSET_BITS`).
    fn offset_size() -> usize {
        1usize << Self::OFFSET_BITS
    }

    /// Number of addressable buffers (`2^BUFFER_BITS`).
    fn num_buffers() -> u32 {
        1u32 << Self::BUFFER_BITS
    }

    /// Whether this reference points at an entry.
    fn valid(self) -> bool {
        let untyped: EntryRef = self.into();
        untyped.valid()
    }
}

/// An entry reference with a fixed `OFFSET_BITS` / `BUFFER_BITS` split.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRefT<const OFFSET_BITS: u32, const BUFFER_BITS: u32>(EntryRef);

impl<const OFFSET_BITS: u32, const BUFFER_BITS: u32> EntryRefT<OFFSET_BITS, BUFFER_BITS> {
    // Evaluated per instantiation; a bad layout fails to compile.
    const LAYOUT_OK: () = assert!(
        OFFSET_BITS > 0 && BUFFER_BITS > 0 && OFFSET_BITS + BUFFER_BITS <= 32,
        "EntryRefT needs 1..=31 offset bits, at least one buffer bit, and at most 32 bits total"
    );

    const OFFSET_MASK: u32 = ((1u64 << OFFSET_BITS) - 1) as u32;

    /// Encode an `(offset, buffer_id)` pair.
    pub fn new(offset: usize, buffer_id: u32) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::LAYOUT_OK;
        debug_assert!(
            offset < (1usize << OFFSET_BITS),
            "offset {} exceeds {} bits",
            offset,
            OFFSET_BITS
        );
        debug_assert!(
            (buffer_id as u64) < (1u64 << BUFFER_BITS),
            "buffer id {} exceeds {} bits",
            buffer_id,
            BUFFER_BITS
        );
        Self(EntryRef((buffer_id << OFFSET_BITS) | (offset as u32 & Self::OFFSET_MASK)))
    }

    /// The in-buffer offset, in elements.
    pub fn offset(self) -> usize {
        (self.0 .0 & Self::OFFSET_MASK) as usize
    }

    /// The buffer id.
    pub fn buffer_id(self) -> u32 {
        self.0 .0 >> OFFSET_BITS
    }

    /// The untyped reference.
    pub fn entry_ref(self) -> EntryRef {
        self.0
    }

    /// Whether this reference points at an entry.
    pub fn valid(self) -> bool {
        self.0.valid()
    }
}

impl<const O: u32, const B: u32> RefType for EntryRefT<O, B> {
    const OFFSET_BITS: u32 = O;
    const BUFFER_BITS: u32 = B;

    fn new(offset: usize, buffer_id: u32) -> Self {
        EntryRefT::new(offset, buffer_id)
    }

    fn offset(self) -> usize {
        EntryRefT::offset(self)
    }

    fn buffer_id(self) -> u32 {
        EntryRefT::buffer_id(self)
    }
}

impl<const O: u32, const B: u32> From<EntryRef> for EntryRefT<O, B> {
    fn from(r: EntryRef) -> Self {
        Self(r)
    }
}

impl<const O: u32, const B: u32> From<EntryRefT<O, B>> for EntryRef {
    fn from(r: EntryRefT<O, B>) -> Self {
        r.0
    }
}

impl<const O: u32, const B: u32> fmt::Debug for EntryRefT<O, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntryRefT(buffer={}, offset={})",
            self.buffer_id(),
            self.offset()
        )
    }
}

impl<const O: u32, const B: u32> fmt::Display for EntryRefT<O, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.buffer_id(), self.offset())
    }
}
