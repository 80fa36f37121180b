use crate::{PAGE_OFFSET_MASK, PAGE_SHIFT};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// Does not validate canonicality or user/kernel placement; that is up to
/// the address-space code that installs mappings.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x0000_5010);
/// assert_eq!(va.page().base().as_u64(), 0x5000);
/// assert_eq!(va.page_offset(), 0x10);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The page that contains this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualPage::containing_address(self)
    }

    /// Offset of this address within its page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & PAGE_OFFSET_MASK
    }

    /// Split into (page, in-page offset).
    #[inline]
    #[must_use]
    pub const fn split(self) -> (VirtualPage, u64) {
        (self.page(), self.page_offset())
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<VirtualPage> for VirtualAddress {
    #[inline]
    fn from(page: VirtualPage) -> Self {
        page.base()
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Base of a 4 KiB virtual page.
///
/// ### Invariants
/// - The low [`PAGE_SHIFT`] bits are always zero.
///
/// The page *number* (`base >> PAGE_SHIFT`) is what the translation cache
/// hashes; the aligned *base* is what the inverted page table records.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u64);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to the page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.0 & !PAGE_OFFSET_MASK)
    }

    /// Page with virtual page number `vpn`.
    #[inline]
    #[must_use]
    pub const fn from_number(vpn: u64) -> Self {
        Self(vpn << PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.0)
    }

    /// Virtual page number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    /// Combine the page base with an in-page `offset`.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> VirtualAddress {
        VirtualAddress(self.0 | (offset & PAGE_OFFSET_MASK))
    }

    /// The page `n` pages above this one.
    #[inline]
    #[must_use]
    pub const fn offset_by(self, n: u64) -> Self {
        Self(self.0 + (n << PAGE_SHIFT))
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        if va.page_offset() == 0 {
            Ok(va.page())
        } else {
            Err(())
        }
    }
}
