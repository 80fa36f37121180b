//! # Page Table (leaf level)
//!
//! - [`TableIndex`]: index into one level, derived from a virtual address.
//! - [`PtEntry`]: a 4 KiB leaf entry (PTE).
//! - [`PageTable`]: a 4 KiB-aligned array of 512 PTEs.
//!
//! The base address stored in a PTE is always frame aligned; the entry keeps
//! the frame *number* in bits 12..=51 and [`PageFlags`] in bits 0..=11.

use crate::PageFlags;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PAGE_SHIFT, VirtualPage};

/// Entries per table level.
pub const ENTRIES: usize = 512;

/// Index into a directory or page table (`0..512`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Construct from a raw index.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(v: usize) -> Self {
        debug_assert!(v < ENTRIES);
        Self(v as u16)
    }

    /// Directory index of `page` (VA bits `[29:21]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn directory(page: VirtualPage) -> Self {
        Self(((page.number() >> 9) & 0x1FF) as u16)
    }

    /// Table index of `page` (VA bits `[20:12]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn table(page: VirtualPage) -> Self {
        Self((page.number() & 0x1FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The page addressed by a (directory, table) index pair.
    #[inline]
    #[must_use]
    pub const fn join(dir: Self, table: Self) -> VirtualPage {
        VirtualPage::from_number(((dir.0 as u64) << 9) | table.0 as u64)
    }
}

/// A single leaf page-table entry (PTE).
#[doc(alias = "PTE")]
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PtEntry {
    /// Permission and status bits (bits 0..=11).
    #[bits(12)]
    flag_bits: u16,
    /// Physical frame number (bits 12..=51).
    #[bits(40)]
    frame_bits: u64,
    /// OS-available (bits 52..=62).
    #[bits(11)]
    pub os_available_high: u16,
    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PtEntry {
    /// A non-present entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// Leaf entry mapping `frame` with `flags`; `present` is forced on.
    #[inline]
    #[must_use]
    pub const fn leaf(frame: FrameNumber, flags: PageFlags) -> Self {
        Self::new()
            .with_frame_bits(frame.as_u64())
            .with_flag_bits(flags.with_present(true).with_large_page(false).into_bits())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.flags().present()
    }

    /// The permission snapshot of this entry.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageFlags {
        PageFlags::from_bits(self.flag_bits())
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    /// Same frame, different flags.
    #[inline]
    #[must_use]
    pub const fn with_flags(self, flags: PageFlags) -> Self {
        self.with_flag_bits(flags.into_bits())
    }

    /// The mapped frame and flags, if present.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(FrameNumber, PageFlags)> {
        if self.is_present() {
            Some((self.frame(), self.flags()))
        } else {
            None
        }
    }

    /// Physical address of the frame base, as stored by hardware.
    #[inline]
    #[must_use]
    pub const fn raw_address(self) -> u64 {
        self.frame_bits() << PAGE_SHIFT
    }
}

/// The Page Table: 512 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES],
}

impl PageTable {
    /// A table with every entry non-present.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Present entries with their table index, in index order.
    pub fn present(&self) -> impl Iterator<Item = (TableIndex, PtEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present())
            .map(|(i, e)| (TableIndex::new(i), *e))
    }

    /// Whether no entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.entries.iter().any(|e| e.is_present())
    }
}

const _: () = {
    assert!(size_of::<PageTable>() == 4096);
    assert!(size_of::<PtEntry>() == 8);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_forces_present_and_keeps_frame() {
        let e = PtEntry::leaf(FrameNumber::new(0x1234), PageFlags::new().with_writable(true));
        assert!(e.is_present());
        assert!(e.flags().writable());
        assert_eq!(e.frame(), FrameNumber::new(0x1234));
        assert_eq!(e.raw_address(), 0x0123_4000);
        assert_eq!(e.into_bits() & 0xFFF, 0b11);
    }

    #[test]
    fn index_split_round_trips() {
        let page = VirtualPage::from_number((3 << 9) | 17);
        let (d, t) = (TableIndex::directory(page), TableIndex::table(page));
        assert_eq!(d.as_usize(), 3);
        assert_eq!(t.as_usize(), 17);
        assert_eq!(TableIndex::join(d, t), page);
    }

    #[test]
    fn present_iterates_in_index_order() {
        let mut pt = PageTable::zeroed();
        assert!(pt.is_empty());
        let page = VirtualPage::from_number(9);
        pt.set(TableIndex::table(page), PtEntry::leaf(FrameNumber::new(1), PageFlags::user_rw()));
        pt.set(TableIndex::table(VirtualPage::from_number(2)), PtEntry::leaf(FrameNumber::new(5), PageFlags::user_ro()));
        let got: Vec<_> = pt.present().map(|(i, e)| (i.as_usize(), e.frame().as_u64())).collect();
        assert_eq!(got, vec![(2, 5), (9, 1)]);
    }
}
