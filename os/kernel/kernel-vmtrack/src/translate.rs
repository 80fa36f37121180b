//! # Translation Service
//!
//! Virtual-to-physical translation through the software TLB, falling back
//! to a page-table walk on a miss. This is the only path that fills the
//! cache; every mapping change only ever invalidates.

use crate::stlb::SoftTlb;
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{PageFlags, PageWalk};

/// Result of a successful translation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Translation {
    pub physical: PhysicalAddress,
    /// Permission snapshot of the mapping.
    pub flags: PageFlags,
    /// Whether the answer came from the software TLB.
    pub cache_hit: bool,
}

/// Translate `va` in `space` on behalf of `owner` (`None` for the kernel
/// context).
///
/// Returns `None` if no present mapping covers `va`.
pub fn translate<W>(
    tlb: &SoftTlb,
    owner: Option<ProcessId>,
    space: &W,
    va: VirtualAddress,
) -> Option<Translation>
where
    W: PageWalk + ?Sized,
{
    let (page, offset) = va.split();

    if let Some((frame, flags)) = tlb.lookup(owner, page) {
        return Some(Translation {
            physical: frame.join(offset),
            flags,
            cache_hit: true,
        });
    }

    let (frame, flags) = space.walk(page)?.page_4k()?;
    tlb.insert(owner, page, frame, flags);
    Some(Translation {
        physical: frame.join(offset),
        flags,
        cache_hit: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::{FrameNumber, VirtualPage};
    use kernel_vmem::AddressSpace;

    #[test]
    fn miss_fills_then_hits() {
        let tlb = SoftTlb::new();
        let owner = ProcessId::new(4);
        let mut asp = AddressSpace::new();
        asp.map_page(VirtualPage::from_number(2), FrameNumber::new(0x300), PageFlags::user_rw())
            .unwrap();

        let va = VirtualAddress::new(0x2123);
        let first = translate(&tlb, owner, &asp, va).unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.physical, PhysicalAddress::new(0x30_0123));

        let second = translate(&tlb, owner, &asp, va).unwrap();
        assert!(second.cache_hit);
        assert_eq!((second.physical, second.flags), (first.physical, first.flags));
    }

    #[test]
    fn unmapped_address_is_not_cached() {
        let tlb = SoftTlb::new();
        let asp = AddressSpace::new();
        assert_eq!(translate(&tlb, None, &asp, VirtualAddress::new(0x5000)), None);
        assert_eq!(tlb.status().valid, 0);
        assert_eq!(tlb.status().misses, 1);
    }

    #[test]
    fn non_present_entry_is_not_mapped() {
        let tlb = SoftTlb::new();
        let mut asp = AddressSpace::new();
        let page = VirtualPage::from_number(1);
        asp.map_page(page, FrameNumber::new(0x300), PageFlags::user_rw())
            .unwrap();
        asp.set_flags(page, PageFlags::new()).unwrap();
        assert_eq!(translate(&tlb, None, &asp, page.base()), None);
    }
}
