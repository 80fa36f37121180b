//! # Software TLB
//!
//! A direct-mapped cache of `(owner, virtual page) → (frame, flags)`
//! translations with [`SW_TLB_SIZE`] slots.
//!
//! A colliding insert silently overwrites the previous occupant; there is no
//! eviction policy beyond "last writer wins". Correctness rests entirely on
//! invalidation: every path that changes or removes a mapping invalidates
//! its slot, and process teardown flushes every slot of the owner.
//!
//! The cache lock is a leaf: nothing else is ever acquired while it is held.

use core::fmt;
use kernel_info::memory::SW_TLB_SIZE;
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{FrameNumber, VirtualPage};
use kernel_sync::SpinLock;
use kernel_vmem::PageFlags;
use log::trace;

/// Cache key identity: the raw process id, `0` for the kernel context.
#[inline]
const fn key(owner: Option<ProcessId>) -> u32 {
    ProcessId::raw_or_kernel(owner)
}

/// Slot index of `(owner, page)`.
///
/// ```rust
/// # use kernel_vmtrack::stlb::slot_index;
/// # use kernel_info::process::ProcessId;
/// # use kernel_memory_addresses::VirtualPage;
/// assert_eq!(slot_index(ProcessId::new(3), VirtualPage::from_number(5)), 3 ^ 5);
/// assert_eq!(slot_index(None, VirtualPage::from_number(64 + 7)), 7);
/// ```
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn slot_index(owner: Option<ProcessId>, page: VirtualPage) -> usize {
    ((key(owner) as u64 ^ page.number()) % SW_TLB_SIZE as u64) as usize
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct TlbEntry {
    owner: u32,
    page: VirtualPage,
    frame: FrameNumber,
    flags: PageFlags,
    valid: bool,
}

impl TlbEntry {
    const INVALID: Self = Self {
        owner: 0,
        page: VirtualPage::from_number(0),
        frame: FrameNumber::new(0),
        flags: PageFlags::new(),
        valid: false,
    };

    const fn holds(&self, owner: u32, page: VirtualPage) -> bool {
        self.valid && self.owner == owner && self.page.number() == page.number()
    }
}

struct TlbState {
    entries: [TlbEntry; SW_TLB_SIZE],
    hits: u64,
    misses: u64,
}

/// Hit/miss counters and occupancy.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TlbStatus {
    /// Number of slots.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Slots currently holding a valid translation.
    pub valid: usize,
}

impl TlbStatus {
    /// Integer hit rate in percent, if any lookup happened yet.
    #[must_use]
    pub const fn hit_rate_percent(&self) -> Option<u64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits * 100 / total)
        }
    }
}

impl fmt::Display for TlbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SW TLB Statistics ===")?;
        writeln!(f, "Size:     {} entries", self.size)?;
        writeln!(f, "Hits:     {}", self.hits)?;
        write!(f, "Misses:   {}", self.misses)?;
        if let Some(rate) = self.hit_rate_percent() {
            write!(f, "\nHit Rate: {rate}%")?;
        }
        Ok(())
    }
}

/// Direct-mapped software translation cache.
pub struct SoftTlb {
    state: SpinLock<TlbState>,
}

impl Default for SoftTlb {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftTlb {
    /// All slots invalid, counters zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SpinLock::named(
                "sw_tlb",
                TlbState {
                    entries: [TlbEntry::INVALID; SW_TLB_SIZE],
                    hits: 0,
                    misses: 0,
                },
            ),
        }
    }

    /// Cached `(frame, flags)` for `(owner, page)`.
    ///
    /// Counts a hit or a miss on every call.
    pub fn lookup(&self, owner: Option<ProcessId>, page: VirtualPage) -> Option<(FrameNumber, PageFlags)> {
        let mut st = self.state.lock();
        let e = st.entries[slot_index(owner, page)];
        if e.holds(key(owner), page) {
            st.hits += 1;
            Some((e.frame, e.flags))
        } else {
            st.misses += 1;
            None
        }
    }

    /// Overwrite the slot of `(owner, page)`.
    pub fn insert(&self, owner: Option<ProcessId>, page: VirtualPage, frame: FrameNumber, flags: PageFlags) {
        let idx = slot_index(owner, page);
        self.state.lock().entries[idx] = TlbEntry {
            owner: key(owner),
            page,
            frame,
            flags,
            valid: true,
        };
    }

    /// Clear the slot of `(owner, page)` if it still holds exactly that
    /// translation. Returns whether a slot was cleared.
    pub fn invalidate(&self, owner: Option<ProcessId>, page: VirtualPage) -> bool {
        let idx = slot_index(owner, page);
        let mut st = self.state.lock();
        let e = &mut st.entries[idx];
        if e.holds(key(owner), page) {
            e.valid = false;
            drop(st);
            trace!("sw_tlb: invalidated {owner:?} {page}");
            true
        } else {
            false
        }
    }

    /// Clear every valid slot of `owner`. Returns the number of slots cleared.
    pub fn flush(&self, owner: Option<ProcessId>) -> usize {
        let owner = key(owner);
        let mut st = self.state.lock();
        let mut cleared = 0;
        for e in st.entries.iter_mut().filter(|e| e.valid && e.owner == owner) {
            e.valid = false;
            cleared += 1;
        }
        cleared
    }

    #[must_use]
    pub fn status(&self) -> TlbStatus {
        let st = self.state.lock();
        TlbStatus {
            size: SW_TLB_SIZE,
            hits: st.hits,
            misses: st.misses,
            valid: st.entries.iter().filter(|e| e.valid).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u32) -> Option<ProcessId> {
        ProcessId::new(n)
    }

    fn page(n: u64) -> VirtualPage {
        VirtualPage::from_number(n)
    }

    #[test]
    fn miss_then_hit() {
        let tlb = SoftTlb::new();
        assert_eq!(tlb.lookup(pid(1), page(4)), None);
        tlb.insert(pid(1), page(4), FrameNumber::new(0x200), PageFlags::user_rw());
        assert_eq!(
            tlb.lookup(pid(1), page(4)),
            Some((FrameNumber::new(0x200), PageFlags::user_rw()))
        );
        let s = tlb.status();
        assert_eq!((s.hits, s.misses, s.valid), (1, 1, 1));
        assert_eq!(s.hit_rate_percent(), Some(50));
    }

    #[test]
    fn owners_do_not_alias() {
        let tlb = SoftTlb::new();
        tlb.insert(pid(1), page(4), FrameNumber::new(1), PageFlags::user_rw());
        assert_eq!(tlb.lookup(pid(2), page(4)), None);
        assert_eq!(tlb.lookup(None, page(4)), None);
    }

    #[test]
    fn collision_overwrites_silently() {
        let tlb = SoftTlb::new();
        let a = page(3);
        let b = page(3 + SW_TLB_SIZE as u64);
        assert_eq!(slot_index(pid(1), a), slot_index(pid(1), b));

        tlb.insert(pid(1), a, FrameNumber::new(1), PageFlags::user_rw());
        tlb.insert(pid(1), b, FrameNumber::new(2), PageFlags::user_rw());
        assert_eq!(tlb.lookup(pid(1), a), None);
        assert_eq!(tlb.lookup(pid(1), b).map(|(f, _)| f), Some(FrameNumber::new(2)));
    }

    #[test]
    fn invalidate_requires_exact_match() {
        let tlb = SoftTlb::new();
        let a = page(3);
        let b = page(3 + SW_TLB_SIZE as u64);
        tlb.insert(pid(1), b, FrameNumber::new(2), PageFlags::user_rw());

        // same slot, different page: untouched
        assert!(!tlb.invalidate(pid(1), a));
        assert!(tlb.lookup(pid(1), b).is_some());

        assert!(tlb.invalidate(pid(1), b));
        assert!(tlb.lookup(pid(1), b).is_none());
    }

    #[test]
    fn flush_clears_only_that_owner() {
        let tlb = SoftTlb::new();
        for n in 0..10 {
            tlb.insert(pid(7), page(n * 2), FrameNumber::new(n), PageFlags::user_rw());
        }
        tlb.insert(pid(8), page(0), FrameNumber::new(99), PageFlags::user_rw());

        assert_eq!(tlb.flush(pid(7)), 10);
        for n in 0..10 {
            assert!(tlb.lookup(pid(7), page(n * 2)).is_none());
        }
        assert!(tlb.lookup(pid(8), page(0)).is_some());
        assert_eq!(tlb.flush(pid(7)), 0);
    }

    #[test]
    fn status_renders_hit_rate_only_after_lookups() {
        let tlb = SoftTlb::new();
        let text = tlb.status().to_string();
        assert!(text.contains("Size:     64 entries"));
        assert!(!text.contains("Hit Rate"));

        tlb.insert(None, page(0), FrameNumber::new(1), PageFlags::user_rw());
        let _ = tlb.lookup(None, page(0));
        assert!(tlb.status().to_string().ends_with("Hit Rate: 100%"));
    }
}
