//! # Frame Ownership Table
//!
//! One [`FrameSlot`] per physical frame, indexed by frame number, with fixed
//! capacity [`PFNNUM`]. The table is only ever mutated by the frame
//! allocator while it holds its lock.

use alloc::boxed::Box;
use alloc::vec;
use kernel_info::inspect::FrameInfo;
use kernel_info::memory::PFNNUM;
use kernel_info::process::ProcessId;
use kernel_memory_addresses::FrameNumber;

/// Allocation state of one physical frame.
///
/// ### Invariants
/// - `allocated == false` implies `owner == None` and `start_tick == 0`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameSlot {
    pub allocated: bool,
    /// Owning user process, if the allocation was tracked.
    pub owner: Option<ProcessId>,
    /// Tick at which a tracked allocation happened.
    pub start_tick: u64,
}

pub struct FrameTable {
    slots: Box<[FrameSlot]>,
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![FrameSlot::default(); PFNNUM].into_boxed_slice(),
        }
    }

    /// Table index of `frame`.
    ///
    /// # Panics
    /// If `frame` is beyond the table capacity; frames outside the table
    /// can never have been handed out.
    fn index(frame: FrameNumber, op: &str) -> usize {
        let idx = frame.as_usize();
        assert!(
            idx < PFNNUM,
            "{op}: frame index {idx} out of bounds (capacity {PFNNUM})"
        );
        idx
    }

    #[must_use]
    pub fn get(&self, frame: FrameNumber) -> FrameSlot {
        self.slots[Self::index(frame, "frame_table")]
    }

    pub(crate) fn mark_allocated(
        &mut self,
        frame: FrameNumber,
        owner: Option<ProcessId>,
        start_tick: u64,
    ) {
        self.slots[Self::index(frame, "allocate_frame")] = FrameSlot {
            allocated: true,
            owner,
            start_tick,
        };
    }

    pub(crate) fn mark_free(&mut self, frame: FrameNumber) {
        self.slots[Self::index(frame, "free_frame")] = FrameSlot::default();
    }

    /// Inspection row for table index `idx`.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<FrameInfo> {
        let slot = self.slots.get(idx)?;
        Some(FrameInfo {
            frame_index: u32::try_from(idx).ok()?,
            allocated: slot.allocated,
            owner: slot.owner,
            start_tick: slot.start_tick,
        })
    }

    /// Number of slots currently marked allocated.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.slots.iter().filter(|s| s.allocated).count()
    }

    /// Number of slots owned by `owner`.
    #[must_use]
    pub fn owned_by(&self, owner: ProcessId) -> usize {
        self.slots.iter().filter(|s| s.owner == Some(owner)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_resets_owner_and_tick() {
        let mut t = FrameTable::new();
        let f = FrameNumber::new(42);
        let pid = ProcessId::new(3);
        t.mark_allocated(f, pid, 17);
        t.mark_allocated(FrameNumber::new(43), None, 0);
        assert_eq!(t.allocated(), 2);
        assert_eq!(t.owned_by(pid.unwrap()), 1);
        assert_eq!(
            t.get(f),
            FrameSlot {
                allocated: true,
                owner: pid,
                start_tick: 17
            }
        );
        t.mark_free(f);
        assert_eq!(t.get(f), FrameSlot::default());
        assert_eq!(t.allocated(), 1);
    }

    #[test]
    fn rows_carry_their_index() {
        let t = FrameTable::new();
        assert_eq!(t.row(7).unwrap().frame_index, 7);
        assert!(t.row(PFNNUM).is_none());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn frames_beyond_capacity_are_fatal() {
        let t = FrameTable::new();
        let _ = t.get(FrameNumber::new(PFNNUM as u64));
    }
}
