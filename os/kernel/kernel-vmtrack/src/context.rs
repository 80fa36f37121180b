//! # Memory-Management Context
//!
//! Owns the frame allocator, the inverted page table and the software TLB.
//! Every caller gets the context passed in explicitly; there are no global
//! tables.

use crate::ipt::InvertedPageTable;
use crate::stlb::SoftTlb;
use crate::translate::{Translation, translate};
use alloc::sync::Arc;
use kernel_alloc::{FrameAllocator, FrameRange, PhysMapper, SimulatedRam, Ticks};
use kernel_info::process::ProcessId;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::PageWalk;
use log::info;

pub struct MmContext<M: PhysMapper> {
    frames: FrameAllocator<M>,
    ipt: InvertedPageTable,
    tlb: SoftTlb,
}

impl<M: PhysMapper> MmContext<M> {
    /// Wrap an allocator. The inverted page table starts uninitialized and
    /// the allocator keeps whatever tracking state it has.
    pub const fn new(frames: FrameAllocator<M>) -> Self {
        Self {
            frames,
            ipt: InvertedPageTable::new(),
            tlb: SoftTlb::new(),
        }
    }

    /// Finish bring-up: initialize the inverted page table and start
    /// attributing frames to processes.
    pub fn init(&self) {
        self.ipt.init();
        self.frames.enable_tracking();
        info!(
            "vmtrack: tracking {} frames, {} free",
            self.frames.range().frame_count(),
            self.frames.free_count()
        );
    }

    #[inline]
    pub const fn frames(&self) -> &FrameAllocator<M> {
        &self.frames
    }

    #[inline]
    pub const fn ipt(&self) -> &InvertedPageTable {
        &self.ipt
    }

    #[inline]
    pub const fn tlb(&self) -> &SoftTlb {
        &self.tlb
    }

    /// Translate `va` in `space` for `owner`; see [`translate`].
    pub fn translate<W>(&self, owner: Option<ProcessId>, space: &W, va: VirtualAddress) -> Option<Translation>
    where
        W: PageWalk + ?Sized,
    {
        translate(&self.tlb, owner, space, va)
    }
}

impl MmContext<SimulatedRam> {
    /// A context over host memory backing `range`, with every frame of the
    /// range already on the free list. Call [`init`](Self::init) to enable
    /// tracking.
    #[must_use]
    pub fn simulated(range: FrameRange) -> Self {
        let frames = FrameAllocator::new(SimulatedRam::new(range), range, Arc::new(Ticks::new()));
        frames.free_range(range.start(), range.stop());
        Self::new(frames)
    }
}
