//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for the raw values the memory bookkeeping layer
//! passes around: byte addresses, physical frame numbers and page-aligned
//! virtual page bases.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory. |
//! | [`FrameNumber`] | Index of a 4 KiB physical frame (`pa >> PAGE_SHIFT`). |
//! | [`VirtualAddress`] | A byte address in some process' address space. |
//! | [`VirtualPage`] | The page-aligned base of a 4 KiB virtual page. |
//!
//! Frames are identified by **number**, pages by their **aligned base**. This
//! mirrors how the inverted page table keys its chains (by frame number) and
//! how it records the mapped virtual address (offset bits cleared).
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_3123);
//! let (page, off) = va.split();
//! assert_eq!(page.base().as_u64(), 0x3000);
//! assert_eq!(off, 0x123);
//! assert_eq!(page.join(off), va);
//!
//! let pa = PhysicalAddress::new(0x0020_0042);
//! assert_eq!(pa.frame().as_u64(), 0x200);
//! assert_eq!(pa.frame().join(pa.page_offset()), pa);
//! ```
//!
//! All conversions are `const fn` and the types are `#[repr(transparent)]`
//! over `u64`, so they cost nothing over the raw integers.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod physical_address;
mod virtual_address;

pub use crate::physical_address::{FrameNumber, PhysicalAddress};
pub use crate::virtual_address::{VirtualAddress, VirtualPage};

/// log2 of the page size; number of low address bits used for the in-page offset.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Round `x` down to a page boundary.
///
/// ```rust
/// # use kernel_memory_addresses::page_round_down;
/// assert_eq!(page_round_down(0), 0);
/// assert_eq!(page_round_down(4095), 0);
/// assert_eq!(page_round_down(4097), 4096);
/// ```
#[inline]
#[must_use]
pub const fn page_round_down(x: u64) -> u64 {
    x & !PAGE_OFFSET_MASK
}

/// Round `x` up to a page boundary.
///
/// `x + PAGE_SIZE - 1` must not overflow.
///
/// ```rust
/// # use kernel_memory_addresses::page_round_up;
/// assert_eq!(page_round_up(0), 0);
/// assert_eq!(page_round_up(1), 4096);
/// assert_eq!(page_round_up(4096), 4096);
/// ```
#[inline]
#[must_use]
pub const fn page_round_up(x: u64) -> u64 {
    (x + PAGE_OFFSET_MASK) & !PAGE_OFFSET_MASK
}
