//! # User Address-Space Routines
//!
//! The page-table mutating operations for one process image. Each routine
//! updates the page tables first and then calls the matching lifecycle hook
//! of the [`MmContext`] before returning, so the inverted page table and the
//! software TLB never lag behind.
//!
//! | Routine | Page tables | Hook |
//! |---------|-------------|------|
//! | [`grow`](ProcessMemory::grow) | map zeroed user RW frames | `page_mapped` |
//! | [`shrink`](ProcessMemory::shrink) | unmap, junk-fill and free | `page_unmapped` |
//! | [`fork_copy`](ProcessMemory::fork_copy) | eager copy into fresh frames | `page_mapped` (child) |
//! | [`set_page_flags`](ProcessMemory::set_page_flags) | rewrite flags, keep `present` | `page_reprotected` |
//! | [`clear_user`](ProcessMemory::clear_user) | clear `user` (stack guard) | `page_reprotected` |
//! | [`destroy`](ProcessMemory::destroy) | free everything | `address_space_destroyed` |

use crate::context::MmContext;
use crate::error::VmError;
use crate::translate::Translation;
use alloc::vec::Vec;
use kernel_alloc::{FRAME_BYTES, PhysMapper};
use kernel_info::memory::USERSPACE_END;
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{
    FrameNumber, PAGE_SIZE, VirtualAddress, VirtualPage, page_round_down, page_round_up,
};
use kernel_vmem::{AddressSpace, PageFlags, PageWalk, VmemError};
use log::{trace, warn};

/// The user memory of one process: its page tables and its size in bytes.
///
/// Pages `[0, size)` are mapped, with frames owned exclusively by this
/// image.
pub struct ProcessMemory {
    owner: ProcessId,
    space: AddressSpace,
    size: u64,
}

impl ProcessMemory {
    /// An empty image for `owner`.
    ///
    /// Every image belongs to a real process: the translation cache keys
    /// entries by owner, and the kernel context (`None`) stands for the one
    /// kernel address space only.
    #[must_use]
    pub fn new(owner: ProcessId) -> Self {
        Self {
            owner,
            space: AddressSpace::new(),
            size: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Size of the image in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// Grow the image to `new_size` bytes with zeroed, user-writable pages.
    ///
    /// A `new_size` below the current size leaves the image unchanged.
    /// Returns the new size.
    ///
    /// # Errors
    /// - [`VmError::SizeLimit`] if `new_size` reaches beyond user space.
    /// - [`VmError::Alloc`] if frames run out; every page mapped by this call
    ///   is released again and the size is unchanged.
    pub fn grow<M: PhysMapper>(&mut self, mm: &MmContext<M>, new_size: u64) -> Result<u64, VmError> {
        if new_size >= USERSPACE_END {
            return Err(VmError::SizeLimit {
                requested: new_size,
            });
        }
        let old_size = self.size;
        if new_size < old_size {
            return Ok(old_size);
        }

        let mut a = page_round_up(old_size);
        while a < new_size {
            let page = VirtualPage::containing_address(VirtualAddress::new(a));
            if let Err(e) = self.map_fresh_page(mm, page) {
                warn!("grow: {e} at {page}; rolling back to {old_size:#x}");
                self.release_range(mm, old_size, a);
                return Err(e);
            }
            a += PAGE_SIZE;
        }

        self.size = new_size;
        Ok(new_size)
    }

    fn map_fresh_page<M: PhysMapper>(&mut self, mm: &MmContext<M>, page: VirtualPage) -> Result<(), VmError> {
        let frame = mm.frames().allocate(Some(self.owner))?;
        // SAFETY: the frame was just handed to us.
        unsafe { mm.frames().zero_frame(frame) };

        match self.space.map_page(page, frame, PageFlags::user_rw()) {
            Ok(entry) => {
                mm.page_mapped(Some(self.owner), page, entry);
                Ok(())
            }
            Err(e) => {
                mm.frames().free_frame(frame);
                Err(e.into())
            }
        }
    }

    /// Shrink the image to `new_size` bytes, releasing every page at or
    /// above `page_round_up(new_size)`.
    ///
    /// A `new_size` at or above the current size leaves the image
    /// unchanged. Returns the new size.
    pub fn shrink<M: PhysMapper>(&mut self, mm: &MmContext<M>, new_size: u64) -> u64 {
        if new_size >= self.size {
            return self.size;
        }
        self.release_range(mm, new_size, self.size);
        self.size = new_size;
        new_size
    }

    /// Unmap and free every present page in `[page_round_up(from), to)`.
    fn release_range<M: PhysMapper>(&mut self, mm: &MmContext<M>, from: u64, to: u64) {
        let mut a = page_round_up(from);
        while a < to {
            let page = VirtualPage::containing_address(VirtualAddress::new(a));
            if let Ok(entry) = self.space.unmap_page(page) {
                mm.page_unmapped(Some(self.owner), page, entry);
                mm.frames().free_frame(entry.frame());
            }
            a += PAGE_SIZE;
        }
    }

    /// Duplicate the image for `child`: every mapped page is copied into a
    /// fresh frame and mapped with the same flags.
    ///
    /// # Errors
    /// [`VmError::Alloc`] if frames run out; the partial copy is destroyed.
    pub fn fork_copy<M: PhysMapper>(&self, mm: &MmContext<M>, child: ProcessId) -> Result<Self, VmError> {
        let mut copy = Self::new(child);
        copy.size = self.size;

        for (page, entry) in self.space.mappings() {
            if let Err(e) = copy.copy_page_from(mm, page, entry.frame(), entry.flags()) {
                warn!("fork_copy: {e} at {page}; discarding partial copy");
                copy.destroy(mm);
                return Err(e);
            }
        }
        trace!(
            "fork_copy: {:?} -> {child:?}, {} pages",
            self.owner,
            copy.space.mapped_pages()
        );
        Ok(copy)
    }

    fn copy_page_from<M: PhysMapper>(
        &mut self,
        mm: &MmContext<M>,
        page: VirtualPage,
        src: FrameNumber,
        flags: PageFlags,
    ) -> Result<(), VmError> {
        let frame = mm.frames().allocate(Some(self.owner))?;
        // SAFETY: `frame` is fresh; `src` belongs to the parent image, which
        // is borrowed immutably for the whole copy.
        unsafe { mm.frames().copy_frame(src, frame) };

        match self.space.map_page(page, frame, flags) {
            Ok(entry) => {
                mm.page_mapped(Some(self.owner), page, entry);
                Ok(())
            }
            Err(e) => {
                mm.frames().free_frame(frame);
                Err(e.into())
            }
        }
    }

    /// Rewrite the flags of the page containing `va`; `present` is always
    /// kept on.
    ///
    /// # Errors
    /// [`VmError::Vmem`] if the page is not mapped.
    pub fn set_page_flags<M: PhysMapper>(
        &mut self,
        mm: &MmContext<M>,
        va: VirtualAddress,
        flags: PageFlags,
    ) -> Result<(), VmError> {
        let page = VirtualPage::containing_address(VirtualAddress::new(page_round_down(va.as_u64())));
        let entry = self.space.set_flags(page, flags.with_present(true))?;
        mm.page_reprotected(Some(self.owner), page, entry);
        Ok(())
    }

    /// Make the page containing `va` inaccessible to user mode. Used for the
    /// guard page beneath the user stack.
    ///
    /// # Errors
    /// [`VmError::Vmem`] if the page is not mapped.
    pub fn clear_user<M: PhysMapper>(&mut self, mm: &MmContext<M>, va: VirtualAddress) -> Result<(), VmError> {
        let page = va.page();
        let current = self
            .space
            .walk(page)
            .and_then(|e| e.page_4k())
            .ok_or(VmemError::NotMapped(page))?;
        let entry = self.space.set_flags(page, current.1.with_user(false))?;
        mm.page_reprotected(Some(self.owner), page, entry);
        Ok(())
    }

    /// Translate `va` through the software TLB.
    pub fn translate<M: PhysMapper>(&self, mm: &MmContext<M>, va: VirtualAddress) -> Option<Translation> {
        mm.translate(Some(self.owner), &self.space, va)
    }

    /// Copy `data` into the image starting at `va`.
    ///
    /// # Errors
    /// [`VmError::Vmem`] if any touched page is not mapped; bytes before
    /// that page have been written.
    pub fn write_bytes<M: PhysMapper>(
        &mut self,
        mm: &MmContext<M>,
        va: VirtualAddress,
        data: &[u8],
    ) -> Result<(), VmError> {
        let mut va = va;
        let mut rest = data;
        while !rest.is_empty() {
            let (page, offset) = va.split();
            let (frame, _) = self
                .space
                .walk(page)
                .and_then(|e| e.page_4k())
                .ok_or(VmemError::NotMapped(page))?;
            #[allow(clippy::cast_possible_truncation)]
            let offset = offset as usize;
            let n = rest.len().min(FRAME_BYTES - offset);
            // SAFETY: frames mapped in this image are owned by it, and
            // `&mut self` excludes every other access.
            let bytes = unsafe { mm.frames().frame_mut(frame) };
            bytes[offset..offset + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            va += n as u64;
        }
        Ok(())
    }

    /// Copy bytes of the image starting at `va` into `buf`.
    ///
    /// # Errors
    /// [`VmError::Vmem`] if any touched page is not mapped.
    pub fn read_bytes<M: PhysMapper>(
        &self,
        mm: &MmContext<M>,
        va: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<(), VmError> {
        let mut va = va;
        let mut done = 0;
        while done < buf.len() {
            let (page, offset) = va.split();
            let (frame, _) = self
                .space
                .walk(page)
                .and_then(|e| e.page_4k())
                .ok_or(VmemError::NotMapped(page))?;
            #[allow(clippy::cast_possible_truncation)]
            let offset = offset as usize;
            let n = (buf.len() - done).min(FRAME_BYTES - offset);
            // SAFETY: frames mapped in this image are owned by it; writers
            // need `&mut self`, which cannot coexist with this borrow.
            let bytes = unsafe { mm.frames().frame_mut(frame) };
            buf[done..done + n].copy_from_slice(&bytes[offset..offset + n]);
            done += n;
            va += n as u64;
        }
        Ok(())
    }

    /// Tear the image down: purge its index entries, then free every frame.
    pub fn destroy<M: PhysMapper>(mut self, mm: &MmContext<M>) {
        mm.address_space_destroyed(Some(self.owner));
        let pages: Vec<_> = self.space.mappings().map(|(page, _)| page).collect();
        for page in pages {
            if let Ok(entry) = self.space.unmap_page(page) {
                mm.frames().free_frame(entry.frame());
            }
        }
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_alloc::{AllocError, FrameRange, SimulatedRam};
    use kernel_memory_addresses::PhysicalAddress;

    const PAGE: u64 = PAGE_SIZE;

    fn pid(n: u32) -> ProcessId {
        ProcessId::new(n).unwrap()
    }

    fn mm(frames: u64) -> MmContext<SimulatedRam> {
        let start = 0x30_0000;
        let range =
            FrameRange::new(PhysicalAddress::new(start), PhysicalAddress::new(start + frames * PAGE)).unwrap();
        let mm = MmContext::simulated(range);
        mm.init();
        mm
    }

    #[test]
    fn grow_maps_zeroed_user_pages() {
        let mm = mm(8);
        let mut image = ProcessMemory::new(pid(4));
        assert_eq!(image.grow(&mm, 2 * PAGE + 1), Ok(2 * PAGE + 1));
        assert_eq!(image.space().mapped_pages(), 3);

        let mut buf = [0xAAu8; 16];
        image.read_bytes(&mm, VirtualAddress::new(2 * PAGE), &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);

        let (_, flags) = image.space().query(VirtualAddress::new(PAGE)).unwrap();
        assert!(flags.user() && flags.writable() && flags.present());
    }

    #[test]
    fn grow_out_of_memory_rolls_back() {
        let mm = mm(2);
        let owner = pid(5);
        let mut image = ProcessMemory::new(owner);
        assert_eq!(
            image.grow(&mm, 4 * PAGE),
            Err(VmError::Alloc(AllocError::OutOfMemory))
        );
        assert_eq!(image.size(), 0);
        assert_eq!(image.space().mapped_pages(), 0);
        assert_eq!(mm.frames().free_count(), 2);
        assert_eq!(mm.ipt().entries_of(owner), 0);
    }

    #[test]
    fn grow_refuses_kernel_half() {
        let mm = mm(1);
        let mut image = ProcessMemory::new(pid(6));
        assert_eq!(
            image.grow(&mm, USERSPACE_END),
            Err(VmError::SizeLimit {
                requested: USERSPACE_END
            })
        );
    }

    #[test]
    fn shrink_keeps_partially_used_page() {
        let mm = mm(4);
        let mut image = ProcessMemory::new(pid(7));
        image.grow(&mm, 3 * PAGE).unwrap();
        assert_eq!(image.shrink(&mm, PAGE + 10), PAGE + 10);
        assert_eq!(image.space().mapped_pages(), 2);
        assert_eq!(mm.frames().free_count(), 2);
        assert_eq!(image.shrink(&mm, 5 * PAGE), PAGE + 10);
    }

    #[test]
    fn fork_copy_duplicates_contents_not_frames() {
        let mm = mm(8);
        let parent_pid = pid(10);
        let child_pid = pid(11);
        let mut parent = ProcessMemory::new(parent_pid);
        parent.grow(&mm, 2 * PAGE).unwrap();
        parent
            .write_bytes(&mm, VirtualAddress::new(PAGE - 2), b"fork")
            .unwrap();

        let child = parent.fork_copy(&mm, child_pid).unwrap();
        assert_eq!(child.size(), parent.size());

        let mut buf = [0u8; 4];
        child.read_bytes(&mm, VirtualAddress::new(PAGE - 2), &mut buf).unwrap();
        assert_eq!(&buf, b"fork");

        let p = parent.space().query(VirtualAddress::new(0)).unwrap().0;
        let c = child.space().query(VirtualAddress::new(0)).unwrap().0;
        assert_ne!(p, c);
        assert_eq!(mm.frames().owned_by(child_pid), 2);
        assert_eq!(mm.ipt().entries_of(child_pid), 2);
    }

    #[test]
    fn fork_copy_out_of_memory_leaves_no_trace() {
        let mm = mm(3);
        let child_pid = pid(13);
        let mut parent = ProcessMemory::new(pid(12));
        parent.grow(&mm, 2 * PAGE).unwrap();

        assert!(parent.fork_copy(&mm, child_pid).is_err());
        assert_eq!(mm.frames().free_count(), 1);
        assert_eq!(mm.frames().owned_by(child_pid), 0);
        assert_eq!(mm.ipt().entries_of(child_pid), 0);
    }

    #[test]
    fn set_page_flags_keeps_page_present() {
        let mm = mm(2);
        let mut image = ProcessMemory::new(pid(14));
        image.grow(&mm, PAGE).unwrap();
        image
            .set_page_flags(&mm, VirtualAddress::new(0x10), PageFlags::new().with_user(true))
            .unwrap();
        let (_, flags) = image.space().query(VirtualAddress::new(0)).unwrap();
        assert!(flags.present());
        assert!(!flags.writable());

        assert_eq!(
            image.set_page_flags(&mm, VirtualAddress::new(PAGE), PageFlags::user_ro()),
            Err(VmError::Vmem(VmemError::NotMapped(VirtualPage::from_number(1))))
        );
    }

    #[test]
    fn clear_user_makes_guard_page() {
        let mm = mm(2);
        let owner = pid(15);
        let mut image = ProcessMemory::new(owner);
        image.grow(&mm, 2 * PAGE).unwrap();
        image.clear_user(&mm, VirtualAddress::new(0)).unwrap();

        let (_, flags) = image.space().query(VirtualAddress::new(0)).unwrap();
        assert!(!flags.user());
        assert!(flags.writable());

        let (frame, _) = image.space().walk(VirtualPage::from_number(0)).unwrap().page_4k().unwrap();
        let maps = mm.ipt().lookup_by_frame(frame, 1);
        assert!(!maps[0].flags.user());
    }

    #[test]
    fn destroy_returns_every_frame() {
        let mm = mm(4);
        let owner = pid(16);
        let mut image = ProcessMemory::new(owner);
        image.grow(&mm, 4 * PAGE).unwrap();
        image.translate(&mm, VirtualAddress::new(0)).unwrap();
        image.destroy(&mm);

        assert_eq!(mm.frames().free_count(), 4);
        assert_eq!(mm.frames().owned_by(owner), 0);
        assert!(mm.ipt().is_empty());
        assert_eq!(mm.tlb().status().valid, 0);
    }

    #[test]
    fn forked_image_never_sees_parent_translation() {
        let mm = mm(4);
        let mut parent = ProcessMemory::new(pid(20));
        parent.grow(&mm, PAGE).unwrap();
        let va = VirtualAddress::new(0x10);
        let from_parent = parent.translate(&mm, va).unwrap();

        let child = parent.fork_copy(&mm, pid(21)).unwrap();
        let from_child = child.translate(&mm, va).unwrap();
        assert!(!from_child.cache_hit);
        assert_eq!(Some(from_child.physical), child.space().query(va).map(|q| q.0));
        assert_ne!(from_child.physical, from_parent.physical);

        assert_eq!(parent.translate(&mm, va).unwrap().physical, from_parent.physical);
    }
}
