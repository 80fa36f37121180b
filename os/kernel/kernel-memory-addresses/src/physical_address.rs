use crate::{PAGE_OFFSET_MASK, PAGE_SHIFT};
use core::fmt;
use core::ops::Add;

/// Physical memory address.
///
/// Carries the *kind* of address at the type level so frame bookkeeping never
/// confuses a physical address with a virtual one. No range validation is
/// performed here; the frame allocator checks addresses against the managed
/// range before it touches its tables.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0010_2042);
/// assert_eq!(pa.frame(), FrameNumber::new(0x102));
/// assert_eq!(pa.page_offset(), 0x42);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The frame containing this address.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> FrameNumber {
        FrameNumber(self.0 >> PAGE_SHIFT)
    }

    /// Offset of this address within its frame.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & PAGE_OFFSET_MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Align down to the frame boundary.
    #[inline]
    #[must_use]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_OFFSET_MASK)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Physical frame number (PFN).
///
/// The index of a 4 KiB frame in physical memory, i.e. the physical base
/// address shifted right by [`PAGE_SHIFT`]. This is the key of the frame
/// ownership table and of the inverted page table.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u64);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(pfn: u64) -> Self {
        Self(pfn)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The frame number as a table index.
    ///
    /// Frame numbers of managed memory always fit into `usize`; the tables
    /// indexed by this value bound-check it against their capacity.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0 << PAGE_SHIFT)
    }

    /// Combine the frame base with an in-page `offset`.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        PhysicalAddress((self.0 << PAGE_SHIFT) | (offset & PAGE_OFFSET_MASK))
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PFN({:#x})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        pa.frame()
    }
}
