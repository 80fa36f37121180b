//! # Inverted Page Table
//!
//! Index from physical frame to every `(owner, virtual page)` pair that
//! currently maps it.
//!
//! ## Layout
//!
//! ```text
//! buckets[frame % IPT_BUCKETS] ──► entry ──► entry ──► None
//!                                    │
//!                                    └─ (frame, owner, page, flags, refcount)
//! ```
//!
//! Entries live in an arena of slots; a bucket holds the index of its
//! chain head and every entry holds the index of its successor. Released
//! slots go on a free list and are reused by later inserts. The arena is
//! separate from the frame allocator, so the table's own growth never shows
//! up in the frame ownership table.
//!
//! ## Lifecycle
//!
//! The table starts *uninitialized*: every mutation is a no-op and every
//! query returns nothing until [`InvertedPageTable::init`] runs. This lets
//! early bring-up code call into it unconditionally.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use kernel_info::copy_out::{CopyOut, CopyOutFault};
use kernel_info::memory::IPT_BUCKETS;
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{FrameNumber, VirtualAddress, VirtualPage};
use kernel_sync::SpinLock;
use kernel_vmem::PageFlags;
use log::{debug, trace};

/// One reverse mapping as reported by lookups and the inspection export.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ReverseMapping {
    pub owner: ProcessId,
    /// Page-aligned virtual address.
    pub page: VirtualPage,
    /// Permission snapshot at insert or last update.
    pub flags: PageFlags,
}

/// Diagnostic counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct IptStatus {
    pub initialized: bool,
    /// Number of times the table lock was taken.
    pub lock_acquisitions: u64,
    /// Number of mutating operations applied after initialization.
    pub operations: u64,
    /// Live entries (distinct `(frame, owner, page)` triples).
    pub entries: usize,
    /// Arena slots allocated so far, live or free.
    pub arena_slots: usize,
}

impl fmt::Display for IptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPT Status : locks = {} ops = {} entries = {}",
            self.lock_acquisitions, self.operations, self.entries
        )
    }
}

#[derive(Debug)]
struct IptEntry {
    frame: FrameNumber,
    owner: ProcessId,
    page: VirtualPage,
    flags: PageFlags,
    refcount: u32,
    next: Option<usize>,
}

impl IptEntry {
    fn matches(&self, frame: FrameNumber, owner: ProcessId, page: VirtualPage) -> bool {
        self.frame == frame && self.owner == owner && self.page == page
    }

    const fn mapping(&self) -> ReverseMapping {
        ReverseMapping {
            owner: self.owner,
            page: self.page,
            flags: self.flags,
        }
    }
}

enum Slot {
    Used(IptEntry),
    Free { next_free: Option<usize> },
}

/// Growable slot table with an intrusive free list of indices.
struct Arena {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    live: usize,
}

impl Arena {
    const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            live: 0,
        }
    }

    fn alloc(&mut self, entry: IptEntry) -> usize {
        self.live += 1;
        if let Some(idx) = self.free_head {
            let Slot::Free { next_free } = &self.slots[idx] else {
                panic!("ipt: free list points at live slot {idx}");
            };
            self.free_head = *next_free;
            self.slots[idx] = Slot::Used(entry);
            idx
        } else {
            self.slots.push(Slot::Used(entry));
            self.slots.len() - 1
        }
    }

    fn release(&mut self, idx: usize) -> IptEntry {
        let slot = core::mem::replace(
            &mut self.slots[idx],
            Slot::Free {
                next_free: self.free_head,
            },
        );
        let Slot::Used(entry) = slot else {
            panic!("ipt: double release of slot {idx}");
        };
        self.free_head = Some(idx);
        self.live -= 1;
        entry
    }

    fn get(&self, idx: usize) -> &IptEntry {
        match &self.slots[idx] {
            Slot::Used(e) => e,
            Slot::Free { .. } => panic!("ipt: chain references free slot {idx}"),
        }
    }

    fn get_mut(&mut self, idx: usize) -> &mut IptEntry {
        match &mut self.slots[idx] {
            Slot::Used(e) => e,
            Slot::Free { .. } => panic!("ipt: chain references free slot {idx}"),
        }
    }
}

struct Buckets {
    heads: Box<[Option<usize>]>,
    arena: Arena,
}

impl Buckets {
    fn new() -> Self {
        Self {
            heads: vec![None; IPT_BUCKETS].into_boxed_slice(),
            arena: Arena::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn bucket(frame: FrameNumber) -> usize {
        (frame.as_u64() % IPT_BUCKETS as u64) as usize
    }

    /// Chain of `bucket`, head first.
    fn chain(&self, bucket: usize) -> impl Iterator<Item = (usize, &IptEntry)> + '_ {
        let mut cursor = self.heads[bucket];
        core::iter::from_fn(move || {
            let idx = cursor?;
            let e = self.arena.get(idx);
            cursor = e.next;
            Some((idx, e))
        })
    }

    /// `(predecessor, index)` of the matching entry.
    fn find(
        &self,
        frame: FrameNumber,
        owner: ProcessId,
        page: VirtualPage,
    ) -> Option<(Option<usize>, usize)> {
        let mut prev = None;
        for (idx, e) in self.chain(Self::bucket(frame)) {
            if e.matches(frame, owner, page) {
                return Some((prev, idx));
            }
            prev = Some(idx);
        }
        None
    }

    fn unlink(&mut self, bucket: usize, prev: Option<usize>, idx: usize) -> IptEntry {
        let next = self.arena.get(idx).next;
        match prev {
            Some(p) => self.arena.get_mut(p).next = next,
            None => self.heads[bucket] = next,
        }
        self.arena.release(idx)
    }
}

struct IptState {
    /// `None` until [`InvertedPageTable::init`].
    buckets: Option<Buckets>,
    operations: u64,
}

/// Hash-indexed reverse mapping table with per-entry reference counts.
pub struct InvertedPageTable {
    state: SpinLock<IptState>,
}

impl Default for InvertedPageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InvertedPageTable {
    /// An uninitialized table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SpinLock::named(
                "ipt",
                IptState {
                    buckets: None,
                    operations: 0,
                },
            ),
        }
    }

    /// Allocate the bucket array. Idempotent.
    pub fn init(&self) {
        let mut st = self.state.lock();
        if st.buckets.is_none() {
            st.buckets = Some(Buckets::new());
            debug!("ipt: initialized with {IPT_BUCKETS} buckets");
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().buckets.is_some()
    }

    /// Record that `owner` maps `frame` at the page containing `va`.
    ///
    /// Inserting an identical `(frame, owner, page)` triple again bumps its
    /// reference count instead of adding a second entry; the stored flags
    /// keep their current value in that case.
    ///
    /// # Panics
    /// If the reference count of an entry would overflow.
    pub fn insert(&self, frame: FrameNumber, owner: ProcessId, va: VirtualAddress, flags: PageFlags) {
        let page = va.page();
        let mut st = self.state.lock();
        let IptState {
            buckets,
            operations,
        } = &mut *st;
        let Some(b) = buckets else {
            return;
        };
        *operations += 1;

        if let Some((_, idx)) = b.find(frame, owner, page) {
            let e = b.arena.get_mut(idx);
            e.refcount = e
                .refcount
                .checked_add(1)
                .unwrap_or_else(|| panic!("ipt_insert: refcount overflow for {frame:?}"));
            trace!("ipt: {frame:?} {owner:?} {page} refcount {}", e.refcount);
            return;
        }

        let bucket = Buckets::bucket(frame);
        let idx = b.arena.alloc(IptEntry {
            frame,
            owner,
            page,
            flags,
            refcount: 1,
            next: b.heads[bucket],
        });
        b.heads[bucket] = Some(idx);
        trace!("ipt: insert {frame:?} {owner:?} {page} {flags:?}");
    }

    /// Overwrite the permission snapshot of the matching entry. No-op if
    /// there is none.
    pub fn update_flags(
        &self,
        frame: FrameNumber,
        owner: ProcessId,
        va: VirtualAddress,
        new_flags: PageFlags,
    ) {
        let page = va.page();
        let mut st = self.state.lock();
        let IptState {
            buckets,
            operations,
        } = &mut *st;
        let Some(b) = buckets else {
            return;
        };
        *operations += 1;

        if let Some((_, idx)) = b.find(frame, owner, page) {
            b.arena.get_mut(idx).flags = new_flags;
            trace!("ipt: update {frame:?} {owner:?} {page} -> {new_flags:?}");
        }
    }

    /// Drop one reference to the matching entry; the entry is unlinked and
    /// its slot released when the count reaches zero. No-op if there is none.
    pub fn remove(&self, frame: FrameNumber, owner: ProcessId, va: VirtualAddress) {
        let page = va.page();
        let mut st = self.state.lock();
        let IptState {
            buckets,
            operations,
        } = &mut *st;
        let Some(b) = buckets else {
            return;
        };
        *operations += 1;

        let Some((prev, idx)) = b.find(frame, owner, page) else {
            return;
        };
        let e = b.arena.get_mut(idx);
        e.refcount -= 1;
        if e.refcount == 0 {
            b.unlink(Buckets::bucket(frame), prev, idx);
            trace!("ipt: remove {frame:?} {owner:?} {page}");
        }
    }

    /// Remove every entry belonging to `owner`, regardless of reference
    /// count. Returns the number of entries removed.
    pub fn remove_all(&self, owner: ProcessId) -> usize {
        let mut st = self.state.lock();
        let IptState {
            buckets,
            operations,
        } = &mut *st;
        let Some(b) = buckets else {
            return 0;
        };
        *operations += 1;

        let mut removed = 0;
        for bucket in 0..IPT_BUCKETS {
            let mut prev = None;
            let mut cursor = b.heads[bucket];
            while let Some(idx) = cursor {
                let e = b.arena.get(idx);
                cursor = e.next;
                if e.owner == owner {
                    b.unlink(bucket, prev, idx);
                    removed += 1;
                } else {
                    prev = Some(idx);
                }
            }
        }
        debug!("ipt: purged {removed} entries of {owner:?}");
        removed
    }

    /// Up to `max` live mappings of `frame`, in chain order.
    #[must_use]
    pub fn lookup_by_frame(&self, frame: FrameNumber, max: usize) -> Vec<ReverseMapping> {
        let st = self.state.lock();
        let Some(b) = &st.buckets else {
            return Vec::new();
        };
        b.chain(Buckets::bucket(frame))
            .filter(|(_, e)| e.frame == frame)
            .map(|(_, e)| e.mapping())
            .take(max)
            .collect()
    }

    /// Copy up to `max` mappings of `frame` into `out` while holding the
    /// table lock. Returns the number copied.
    ///
    /// # Errors
    /// The first [`CopyOutFault`] of `out`; the copy stops there.
    pub fn copy_mappings<O>(&self, frame: FrameNumber, max: usize, out: &mut O) -> Result<usize, CopyOutFault>
    where
        O: CopyOut<ReverseMapping> + ?Sized,
    {
        let st = self.state.lock();
        let Some(b) = &st.buckets else {
            return Ok(0);
        };
        let mut copied = 0;
        for (_, e) in b.chain(Buckets::bucket(frame)).filter(|(_, e)| e.frame == frame) {
            if copied == max {
                break;
            }
            out.copy_out(copied, &e.mapping())?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Reference count of the matching entry, if present.
    #[must_use]
    pub fn refcount(&self, frame: FrameNumber, owner: ProcessId, va: VirtualAddress) -> Option<u32> {
        let st = self.state.lock();
        let b = st.buckets.as_ref()?;
        let (_, idx) = b.find(frame, owner, va.page())?;
        Some(b.arena.get(idx).refcount)
    }

    /// Number of live entries belonging to `owner`.
    #[must_use]
    pub fn entries_of(&self, owner: ProcessId) -> usize {
        let st = self.state.lock();
        st.buckets.as_ref().map_or(0, |b| {
            (0..IPT_BUCKETS)
                .flat_map(move |bucket| b.chain(bucket))
                .filter(|(_, e)| e.owner == owner)
                .count()
        })
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().buckets.as_ref().map_or(0, |b| b.arena.live)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn status(&self) -> IptStatus {
        let st = self.state.lock();
        IptStatus {
            initialized: st.buckets.is_some(),
            lock_acquisitions: self.state.acquisitions(),
            operations: st.operations,
            entries: st.buckets.as_ref().map_or(0, |b| b.arena.live),
            arena_slots: st.buckets.as_ref().map_or(0, |b| b.arena.slots.len()),
        }
    }
}
