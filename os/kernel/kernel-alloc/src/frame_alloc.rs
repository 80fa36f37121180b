//! # Physical Frame Allocator
//!
//! Hands out 4 KiB frames from a LIFO free list and keeps the frame
//! ownership table in step with every allocation and free.
//!
//! ## Bring-up
//!
//! Initialization happens in two phases:
//! 1. [`FrameAllocator::free_range`] seeds the free list (possibly several
//!    times, for disjoint ranges). Allocations in this phase are never
//!    attributed to a process.
//! 2. [`FrameAllocator::enable_tracking`] marks the subsystem initialized.
//!    From then on, allocations requested on behalf of a user process record
//!    the owner and the current tick.
//!
//! ## Fatal guards
//!
//! Freeing an unaligned address, an address outside the managed range, or a
//! frame that is already free panics. These are programming errors upstream,
//! and continuing would corrupt the shared tables.

use crate::frame_table::{FrameSlot, FrameTable};
use crate::phys_mapper::{FrameBytes, PhysMapper};
use crate::ticks::Ticks;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::copy_out::CopyOut;
use kernel_info::inspect::{FrameInfo, InspectError, checked_maximum};
use kernel_info::memory::{FREED_FRAME_FILL, PFNNUM, PHYSTOP};
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress, page_round_up};
use kernel_sync::SpinLock;
use log::{debug, info, trace};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    #[error("out of physical frames")]
    OutOfMemory,
    #[error("invalid managed range {start}..{stop}")]
    InvalidRange {
        start: PhysicalAddress,
        stop: PhysicalAddress,
    },
}

/// The managed physical range: from the first byte after the kernel image up
/// to (exclusive) the end of managed memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameRange {
    start: PhysicalAddress,
    stop: PhysicalAddress,
}

impl FrameRange {
    /// # Errors
    /// [`AllocError::InvalidRange`] unless `start < stop <= PHYSTOP` and
    /// every frame below `stop` fits the frame ownership table.
    pub fn new(start: PhysicalAddress, stop: PhysicalAddress) -> Result<Self, AllocError> {
        let max_stop = PHYSTOP.min(PFNNUM as u64 * PAGE_SIZE);
        if start >= stop || stop.as_u64() > max_stop {
            return Err(AllocError::InvalidRange { start, stop });
        }
        Ok(Self { start, stop })
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn stop(&self) -> PhysicalAddress {
        self.stop
    }

    /// First whole frame at or after `start`.
    #[inline]
    #[must_use]
    pub const fn first_frame(&self) -> FrameNumber {
        PhysicalAddress::new(page_round_up(self.start.as_u64())).frame()
    }

    /// Number of whole frames in the range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frame_count(&self) -> usize {
        let first = page_round_up(self.start.as_u64());
        if first >= self.stop.as_u64() {
            0
        } else {
            ((self.stop.as_u64() - first) / PAGE_SIZE) as usize
        }
    }

    /// Whether `pa` lies in `[start, stop)`.
    #[inline]
    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        pa >= self.start && pa < self.stop
    }
}

/// One bit per frame-table row: set while the frame sits on the free list.
struct FreeBitmap {
    words: Box<[u64]>,
}

impl FreeBitmap {
    fn new() -> Self {
        Self {
            words: vec![0; PFNNUM.div_ceil(64)].into_boxed_slice(),
        }
    }

    fn test(&self, idx: usize) -> bool {
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    fn set(&mut self, idx: usize, on: bool) {
        let bit = 1 << (idx % 64);
        if on {
            self.words[idx / 64] |= bit;
        } else {
            self.words[idx / 64] &= !bit;
        }
    }
}

struct AllocState {
    free: Vec<FrameNumber>,
    on_free_list: FreeBitmap,
    table: FrameTable,
}

/// Physical frame allocator with per-frame ownership tracking.
pub struct FrameAllocator<M: PhysMapper> {
    mapper: M,
    range: FrameRange,
    ticks: Arc<Ticks>,
    tracking: AtomicBool,
    state: SpinLock<AllocState>,
}

impl<M: PhysMapper> FrameAllocator<M> {
    /// An empty allocator over `range`. Call [`free_range`](Self::free_range)
    /// to make frames available.
    pub fn new(mapper: M, range: FrameRange, ticks: Arc<Ticks>) -> Self {
        Self {
            mapper,
            range,
            ticks,
            tracking: AtomicBool::new(false),
            state: SpinLock::named(
                "kmem",
                AllocState {
                    free: Vec::with_capacity(range.frame_count()),
                    on_free_list: FreeBitmap::new(),
                    table: FrameTable::new(),
                },
            ),
        }
    }

    #[inline]
    pub const fn range(&self) -> FrameRange {
        self.range
    }

    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    pub fn ticks(&self) -> &Ticks {
        &self.ticks
    }

    /// Put every whole frame of `[from, to)` on the free list.
    ///
    /// # Panics
    /// If any of the frames lies outside the managed range or is already free.
    pub fn free_range(&self, from: PhysicalAddress, to: PhysicalAddress) {
        let mut p = page_round_up(from.as_u64());
        let mut n = 0usize;
        while p + PAGE_SIZE <= to.as_u64() {
            self.free(PhysicalAddress::new(p));
            p += PAGE_SIZE;
            n += 1;
        }
        debug!("kmem: seeded {n} frames from {from}..{to}");
    }

    /// Mark the subsystem initialized; allocations for user processes are
    /// attributed from now on.
    pub fn enable_tracking(&self) {
        self.tracking.store(true, Ordering::Release);
        info!("kmem: frame ownership tracking enabled");
    }

    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    /// Take one frame off the free list.
    ///
    /// The frame's contents are whatever the previous owner (or the junk
    /// fill) left behind. If tracking is enabled and `requester` is a user
    /// process, the frame is attributed to it and stamped with the current
    /// tick.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if no frame is free.
    pub fn allocate(&self, requester: Option<ProcessId>) -> Result<FrameNumber, AllocError> {
        let tracked = requester.filter(|_| self.is_tracking());
        let mut st = self.state.lock();
        let frame = st.free.pop().ok_or(AllocError::OutOfMemory)?;
        st.on_free_list.set(frame.as_usize(), false);

        let start_tick = if tracked.is_some() {
            // Lock order: kmem, then ticks.
            self.ticks.now()
        } else {
            0
        };
        st.table.mark_allocated(frame, tracked, start_tick);
        drop(st);

        trace!("kalloc {frame:?} for {tracked:?}");
        Ok(frame)
    }

    /// Return the frame at `pa` to the free list.
    ///
    /// The frame is overwritten with [`FREED_FRAME_FILL`] first so that
    /// dangling references read junk.
    ///
    /// # Panics
    /// - `pa` is not frame aligned.
    /// - `pa` lies outside the managed range.
    /// - The frame is already free.
    pub fn free(&self, pa: PhysicalAddress) {
        assert!(pa.is_page_aligned(), "free_frame: unaligned address {pa}");
        assert!(
            self.range.contains(pa),
            "free_frame: {pa} outside managed range {}..{}",
            self.range.start,
            self.range.stop
        );
        let frame = pa.frame();
        assert!(
            self.mapper.covers(frame),
            "free_frame: {frame:?} has no backing memory"
        );

        // Claim the frame first: once its bit is set, a second free panics
        // here and never reaches the fill. It only becomes allocatable when
        // pushed below.
        {
            let mut st = self.state.lock();
            assert!(
                !st.on_free_list.test(frame.as_usize()),
                "free_frame: double free of {frame:?}"
            );
            st.on_free_list.set(frame.as_usize(), true);
            st.table.mark_free(frame);
        }

        // SAFETY: the frame is claimed above and not yet on the free list,
        // so no allocator caller or concurrent free can reach its bytes.
        unsafe { self.mapper.frame_mut(frame) }.fill(FREED_FRAME_FILL);

        self.state.lock().free.push(frame);

        trace!("kfree {frame:?}");
    }

    /// Release a frame by number.
    ///
    /// # Panics
    /// See [`free`](Self::free).
    #[inline]
    pub fn free_frame(&self, frame: FrameNumber) {
        self.free(frame.base());
    }

    /// Borrow the bytes of an allocated frame.
    ///
    /// # Safety
    /// The caller must own `frame` (allocated to it and not yet freed), and
    /// must not hold any other reference to its bytes for `'a`.
    #[inline]
    pub unsafe fn frame_mut<'a>(&self, frame: FrameNumber) -> &'a mut FrameBytes {
        // SAFETY: forwarded to the caller.
        unsafe { self.mapper.frame_mut(frame) }
    }

    /// Zero an owned frame.
    ///
    /// # Safety
    /// See [`frame_mut`](Self::frame_mut).
    #[inline]
    pub unsafe fn zero_frame(&self, frame: FrameNumber) {
        // SAFETY: forwarded to the caller.
        unsafe { self.frame_mut(frame) }.fill(0);
    }

    /// Copy the contents of `src` into `dst`.
    ///
    /// # Safety
    /// The caller must own both frames, `src != dst`, and no other
    /// reference to either frame's bytes may be live.
    #[inline]
    pub unsafe fn copy_frame(&self, src: FrameNumber, dst: FrameNumber) {
        debug_assert_ne!(src, dst);
        // SAFETY: distinct frames never overlap; exclusivity is the caller's.
        let (s, d) = unsafe { (self.frame_mut(src), self.frame_mut(dst)) };
        d.copy_from_slice(s);
    }

    /// Snapshot of the ownership slot of `frame`.
    #[must_use]
    pub fn slot(&self, frame: FrameNumber) -> FrameSlot {
        self.state.lock().table.get(frame)
    }

    /// Frames currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Frames attributed to `owner`.
    #[must_use]
    pub fn owned_by(&self, owner: ProcessId) -> usize {
        self.state.lock().table.owned_by(owner)
    }

    /// How often the allocator lock has been taken.
    #[must_use]
    pub fn lock_acquisitions(&self) -> u64 {
        self.state.acquisitions()
    }

    /// Copy up to `max_entries` frame-table rows, starting at frame 0, into
    /// `out`. The whole copy happens under the allocator lock, so no row is
    /// torn; it is not atomic with respect to any other structure.
    ///
    /// Returns the number of rows copied.
    ///
    /// # Errors
    /// - [`InspectError::InvalidMaximum`] if `max_entries` is not in
    ///   `1..=PFNNUM`; nothing is copied.
    /// - [`InspectError::Fault`] if `out` rejects a row; the export is
    ///   aborted and the lock released.
    pub fn export_rows<O>(&self, max_entries: i64, out: &mut O) -> Result<usize, InspectError>
    where
        O: CopyOut<FrameInfo> + ?Sized,
    {
        let max = checked_maximum(max_entries, PFNNUM)?;
        let st = self.state.lock();
        let mut copied = 0;
        for idx in 0..max {
            let Some(row) = st.table.row(idx) else {
                break;
            };
            out.copy_out(idx, &row)?;
            copied += 1;
        }
        Ok(copied)
    }
}
