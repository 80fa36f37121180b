use kernel_alloc::{FrameRange, SimulatedRam};
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress, VirtualPage};
use kernel_vmem::{AddressSpace, PageFlags, PageWalk};
use kernel_vmtrack::MmContext;
use kernel_vmtrack::uvm::ProcessMemory;

const PAGE: u64 = 4096;

fn mm() -> MmContext<SimulatedRam> {
    let range = FrameRange::new(PhysicalAddress::new(0x100_0000), PhysicalAddress::new(0x102_0000))
        .unwrap();
    let mm = MmContext::simulated(range);
    mm.init();
    mm
}

fn frame_of(image: &ProcessMemory, n: u64) -> FrameNumber {
    image
        .space()
        .walk(VirtualPage::from_number(n))
        .and_then(|e| e.page_4k())
        .unwrap()
        .0
}

#[test]
fn unmapping_middle_page_leaves_neighbours_alone() {
    let mm = mm();
    let p = ProcessId::new(1).unwrap();
    let mut space = AddressSpace::new();
    let mut frames = Vec::new();
    for n in 0..3 {
        let frame = mm.frames().allocate(Some(p)).unwrap();
        let page = VirtualPage::from_number(n);
        let entry = space.map_page(page, frame, PageFlags::user_rw()).unwrap();
        mm.page_mapped(Some(p), page, entry);
        frames.push(frame);
    }

    let f0 = mm.ipt().lookup_by_frame(frames[0], 4);
    assert_eq!(f0.len(), 1);
    assert_eq!(f0[0].owner, p);
    assert_eq!(f0[0].page, VirtualPage::from_number(0));
    assert_eq!(f0[0].flags, PageFlags::user_rw());

    let middle = VirtualPage::from_number(1);
    let old = space.unmap_page(middle).unwrap();
    mm.page_unmapped(Some(p), middle, old);
    mm.frames().free_frame(old.frame());

    assert!(mm.ipt().lookup_by_frame(frames[1], 4).is_empty());
    assert_eq!(mm.ipt().lookup_by_frame(frames[0], 4), f0);
    let f2 = mm.ipt().lookup_by_frame(frames[2], 4);
    assert_eq!(f2.len(), 1);
    assert_eq!(f2[0].page, VirtualPage::from_number(2));
}

#[test]
fn reprotect_is_never_served_stale_from_cache() {
    let mm = mm();
    let mut image = ProcessMemory::new(ProcessId::new(2).unwrap());
    image.grow(&mm, PAGE).unwrap();
    let va = VirtualAddress::new(0x80);

    let first = image.translate(&mm, va).unwrap();
    assert!(!first.cache_hit);
    let second = image.translate(&mm, va).unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.physical, first.physical);
    assert_eq!(second.flags, first.flags);

    image.set_page_flags(&mm, va, PageFlags::user_ro()).unwrap();

    let third = image.translate(&mm, va).unwrap();
    assert!(!third.cache_hit);
    assert!(!third.flags.writable());
    assert_eq!(third.physical, first.physical);
}

#[test]
fn shrink_makes_translation_fail() {
    let mm = mm();
    let mut image = ProcessMemory::new(ProcessId::new(3).unwrap());
    image.grow(&mm, 2 * PAGE).unwrap();
    let va = VirtualAddress::new(PAGE + 4);
    assert!(image.translate(&mm, va).is_some());
    assert!(image.translate(&mm, va).unwrap().cache_hit);

    image.shrink(&mm, PAGE);
    assert!(image.translate(&mm, va).is_none());
}

#[test]
fn fork_child_is_indexed_under_its_own_identity() {
    let mm = mm();
    let parent_pid = ProcessId::new(4).unwrap();
    let child_pid = ProcessId::new(5).unwrap();
    let mut parent = ProcessMemory::new(parent_pid);
    parent.grow(&mm, 2 * PAGE).unwrap();

    let child = parent.fork_copy(&mm, child_pid).unwrap();
    for n in 0..2 {
        let pf = frame_of(&parent, n);
        let cf = frame_of(&child, n);
        assert_eq!(mm.ipt().lookup_by_frame(pf, 4)[0].owner, parent_pid);
        assert_eq!(mm.ipt().lookup_by_frame(cf, 4)[0].owner, child_pid);
        assert_eq!(mm.frames().slot(cf).owner, Some(child_pid));
    }

    parent.destroy(&mm);
    assert_eq!(mm.ipt().len(), 2);
    child.destroy(&mm);
    assert!(mm.ipt().is_empty());
}

#[test]
fn kernel_context_translations_stay_out_of_the_index() {
    let mm = mm();
    let mut kernel_space = AddressSpace::new();
    let frame = mm.frames().allocate(None).unwrap();
    let page = VirtualPage::from_number(0);
    let entry = kernel_space.map_page(page, frame, PageFlags::user_rw()).unwrap();
    mm.page_mapped(None, page, entry);
    assert!(mm.ipt().is_empty());
    assert_eq!(mm.frames().slot(frame).owner, None);

    assert!(!mm.translate(None, &kernel_space, page.base()).unwrap().cache_hit);
    assert!(mm.translate(None, &kernel_space, page.base()).unwrap().cache_hit);

    let old = kernel_space.unmap_page(page).unwrap();
    mm.page_unmapped(None, page, old);
    mm.frames().free_frame(old.frame());
    assert!(mm.translate(None, &kernel_space, page.base()).is_none());
    assert_eq!(mm.tlb().status().valid, 0);
}

#[test]
fn sibling_images_keep_separate_cache_entries() {
    let mm = mm();
    let va = VirtualAddress::new(0x10);
    let mut first = ProcessMemory::new(ProcessId::new(6).unwrap());
    first.grow(&mm, PAGE).unwrap();
    let t_first = first.translate(&mm, va).unwrap();

    let second = first.fork_copy(&mm, ProcessId::new(7).unwrap()).unwrap();
    let t_second = second.translate(&mm, va).unwrap();
    assert!(!t_second.cache_hit);
    assert_eq!(Some(t_second.physical), second.space().query(va).map(|q| q.0));
    assert_ne!(t_second.physical, t_first.physical);

    first.destroy(&mm);
    second.destroy(&mm);
}
