//! # Address Space (two-level, user half)
//!
//! One process' user mappings. Intermediate page tables are allocated on the
//! first mapping that needs them and kept until the address space is dropped.
//!
//! ## Highlights
//!
//! - [`AddressSpace::map_page`] installs one 4 KiB leaf.
//! - [`AddressSpace::unmap_page`] clears it and hands back the old entry, so
//!   the caller can release the frame and drop its index entries.
//! - [`AddressSpace::set_flags`] rewrites the permission bits in place.
//! - [`AddressSpace::query`] translates a VA to a PA.
//! - [`PageWalk`] is the read-only view the translation service uses.
//!
//! None of these touch the inverted page table or the translation cache.

use crate::page_table::{ENTRIES, PageTable, PtEntry, TableIndex};
use crate::PageFlags;
use alloc::boxed::Box;
use kernel_info::memory::USERSPACE_END;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress, VirtualPage};
use log::trace;

/// Read-only page-table walk.
pub trait PageWalk {
    /// The leaf entry covering `page`, or `None` if no page table covers it.
    ///
    /// A returned entry may still be non-present; callers check
    /// [`PtEntry::is_present`].
    fn walk(&self, page: VirtualPage) -> Option<PtEntry>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmemError {
    #[error("page {0} is not mapped")]
    NotMapped(VirtualPage),
    #[error("page {0} is already mapped")]
    AlreadyMapped(VirtualPage),
    #[error("address {0} is outside user space")]
    OutOfRange(VirtualAddress),
}

/// Handle to a single user address space.
pub struct AddressSpace {
    directory: Box<[Option<Box<PageTable>>; ENTRIES]>,
    mapped: usize,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    #[must_use]
    pub fn new() -> Self {
        Self {
            directory: Box::new([const { None }; ENTRIES]),
            mapped: 0,
        }
    }

    /// Number of present leaf mappings.
    #[inline]
    #[must_use]
    pub const fn mapped_pages(&self) -> usize {
        self.mapped
    }

    const fn check(page: VirtualPage) -> Result<(), VmemError> {
        if page.base().as_u64() >= USERSPACE_END {
            Err(VmemError::OutOfRange(page.base()))
        } else {
            Ok(())
        }
    }

    fn table(&self, page: VirtualPage) -> Option<&PageTable> {
        self.directory[TableIndex::directory(page).as_usize()].as_deref()
    }

    fn table_mut(&mut self, page: VirtualPage) -> Option<&mut PageTable> {
        self.directory[TableIndex::directory(page).as_usize()].as_deref_mut()
    }

    fn ensure_table(&mut self, page: VirtualPage) -> &mut PageTable {
        self.directory[TableIndex::directory(page).as_usize()]
            .get_or_insert_with(|| Box::new(PageTable::zeroed()))
    }

    /// Map `page → frame` with `flags` (`present` is forced on).
    ///
    /// Returns the installed entry.
    ///
    /// # Errors
    /// - [`VmemError::OutOfRange`] if `page` lies at or above the user limit.
    /// - [`VmemError::AlreadyMapped`] if a present entry already covers `page`.
    pub fn map_page(
        &mut self,
        page: VirtualPage,
        frame: FrameNumber,
        flags: PageFlags,
    ) -> Result<PtEntry, VmemError> {
        Self::check(page)?;
        let i = TableIndex::table(page);
        let pt = self.ensure_table(page);
        if pt.get(i).is_present() {
            return Err(VmemError::AlreadyMapped(page));
        }

        let entry = PtEntry::leaf(frame, flags);
        pt.set(i, entry);
        self.mapped += 1;
        trace!("map {page} -> {frame:?} {:?}", entry.flags());
        Ok(entry)
    }

    /// Clear the mapping of `page` and return the entry that was present.
    ///
    /// # Errors
    /// - [`VmemError::OutOfRange`] if `page` lies at or above the user limit.
    /// - [`VmemError::NotMapped`] if no present entry covers `page`.
    pub fn unmap_page(&mut self, page: VirtualPage) -> Result<PtEntry, VmemError> {
        Self::check(page)?;
        let i = TableIndex::table(page);
        let pt = self.table_mut(page).ok_or(VmemError::NotMapped(page))?;
        let old = pt.get(i);
        if !old.is_present() {
            return Err(VmemError::NotMapped(page));
        }

        pt.set(i, PtEntry::zero());
        self.mapped -= 1;
        trace!("unmap {page} (was {:?})", old.frame());
        Ok(old)
    }

    /// Replace the flags of the present mapping of `page`, keeping its frame.
    ///
    /// The flags are stored as given; clearing `present` here removes the
    /// mapping from translation but keeps the frame recorded in the entry.
    /// Returns the updated entry.
    ///
    /// # Errors
    /// - [`VmemError::OutOfRange`] if `page` lies at or above the user limit.
    /// - [`VmemError::NotMapped`] if no present entry covers `page`.
    pub fn set_flags(&mut self, page: VirtualPage, flags: PageFlags) -> Result<PtEntry, VmemError> {
        Self::check(page)?;
        let i = TableIndex::table(page);
        let pt = self.table_mut(page).ok_or(VmemError::NotMapped(page))?;
        let old = pt.get(i);
        if !old.is_present() {
            return Err(VmemError::NotMapped(page));
        }

        let entry = old.with_flags(flags);
        pt.set(i, entry);
        if !flags.present() {
            self.mapped -= 1;
        }
        trace!("reprotect {page}: {:?} -> {flags:?}", old.flags());
        Ok(entry)
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` and flags if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<(PhysicalAddress, PageFlags)> {
        let (page, offset) = va.split();
        let (frame, flags) = self.walk(page)?.page_4k()?;
        Some((frame.join(offset), flags))
    }

    /// Every present mapping, in ascending virtual address order.
    pub fn mappings(&self) -> impl Iterator<Item = (VirtualPage, PtEntry)> + '_ {
        self.directory
            .iter()
            .enumerate()
            .filter_map(|(d, pt)| pt.as_deref().map(|pt| (TableIndex::new(d), pt)))
            .flat_map(|(d, pt)| {
                pt.present()
                    .map(move |(t, e)| (TableIndex::join(d, t), e))
            })
    }
}

impl PageWalk for AddressSpace {
    fn walk(&self, page: VirtualPage) -> Option<PtEntry> {
        if Self::check(page).is_err() {
            return None;
        }
        self.table(page).map(|pt| pt.get(TableIndex::table(page)))
    }
}
