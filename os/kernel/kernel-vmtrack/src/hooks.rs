//! # Lifecycle Hooks
//!
//! Called synchronously by the page-table mutation routines to keep the
//! inverted page table and the software TLB in step with the page tables.
//!
//! | Mutation | Hook | Effect |
//! |----------|------|--------|
//! | page mapped (grow, fork copy) | [`page_mapped`](MmContext::page_mapped) | IPT insert |
//! | page about to be released (shrink) | [`page_unmapped`](MmContext::page_unmapped) | IPT remove, sTLB invalidate |
//! | permissions changed | [`page_reprotected`](MmContext::page_reprotected) | IPT flag update, sTLB invalidate |
//! | address space torn down | [`address_space_destroyed`](MmContext::address_space_destroyed) | IPT purge, sTLB flush |
//!
//! The kernel context (`owner == None`) never has IPT entries; its cache
//! slots are still invalidated.
//!
//! The IPT lock and the sTLB lock are taken one after the other, never
//! nested.

use crate::context::MmContext;
use kernel_alloc::PhysMapper;
use kernel_info::process::ProcessId;
use kernel_memory_addresses::VirtualPage;
use kernel_vmem::PtEntry;
use log::debug;

impl<M: PhysMapper> MmContext<M> {
    /// A present `entry` was installed for `page`.
    pub fn page_mapped(&self, owner: Option<ProcessId>, page: VirtualPage, entry: PtEntry) {
        if let Some(pid) = owner {
            self.ipt().insert(entry.frame(), pid, page.base(), entry.flags());
        }
    }

    /// The mapping `entry` of `page` was cleared; its frame has not been
    /// released yet.
    pub fn page_unmapped(&self, owner: Option<ProcessId>, page: VirtualPage, entry: PtEntry) {
        if let Some(pid) = owner {
            self.ipt().remove(entry.frame(), pid, page.base());
        }
        self.tlb().invalidate(owner, page);
    }

    /// The permissions of `page` were rewritten; `entry` is the new entry.
    pub fn page_reprotected(&self, owner: Option<ProcessId>, page: VirtualPage, entry: PtEntry) {
        if let Some(pid) = owner {
            self.ipt()
                .update_flags(entry.frame(), pid, page.base(), entry.flags());
        }
        self.tlb().invalidate(owner, page);
    }

    /// The address space of `owner` is being torn down. Runs before its
    /// frames go back to the allocator.
    pub fn address_space_destroyed(&self, owner: Option<ProcessId>) {
        let purged = owner.map_or(0, |pid| self.ipt().remove_all(pid));
        let flushed = self.tlb().flush(owner);
        debug!("vmtrack: teardown of {owner:?}: {purged} ipt entries, {flushed} tlb slots");
    }
}

#[cfg(test)]
mod tests {
    use crate::context::MmContext;
    use kernel_alloc::FrameRange;
    use kernel_info::process::ProcessId;
    use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualPage};
    use kernel_vmem::{PageFlags, PtEntry};

    fn mm() -> MmContext<kernel_alloc::SimulatedRam> {
        let range =
            FrameRange::new(PhysicalAddress::new(0x40_0000), PhysicalAddress::new(0x40_8000)).unwrap();
        let mm = MmContext::simulated(range);
        mm.init();
        mm
    }

    #[test]
    fn kernel_context_never_reaches_the_ipt() {
        let mm = mm();
        let page = VirtualPage::from_number(1);
        let entry = PtEntry::leaf(FrameNumber::new(0x400), PageFlags::user_rw());
        mm.page_mapped(None, page, entry);
        assert!(mm.ipt().is_empty());

        mm.tlb().insert(None, page, entry.frame(), entry.flags());
        mm.page_unmapped(None, page, entry);
        assert_eq!(mm.tlb().status().valid, 0);
    }

    #[test]
    fn reprotect_updates_snapshot_and_drops_cached_translation() {
        let mm = mm();
        let pid = ProcessId::new(2);
        let page = VirtualPage::from_number(3);
        let entry = PtEntry::leaf(FrameNumber::new(0x401), PageFlags::user_rw());
        mm.page_mapped(pid, page, entry);
        mm.tlb().insert(pid, page, entry.frame(), entry.flags());

        let ro = entry.with_flags(PageFlags::user_ro());
        mm.page_reprotected(pid, page, ro);

        assert!(mm.tlb().lookup(pid, page).is_none());
        let maps = mm.ipt().lookup_by_frame(entry.frame(), 4);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].flags, PageFlags::user_ro());
    }
}
