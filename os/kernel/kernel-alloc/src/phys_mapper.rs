//! # Physical Frame Access
//!
//! The allocator has to touch frame contents in exactly two places: the junk
//! fill on free, and the zero/copy helpers its callers use for fresh frames.
//! [`PhysMapper`] abstracts how a frame number becomes addressable memory.
//!
//! ## How does it work?
//! - In the kernel, every physical frame is reachable through a direct map,
//!   so the mapper adds a fixed offset to the frame base.
//! - On the host, [`SimulatedRam`] backs a [`FrameRange`] with a boxed slice
//!   of 4 KiB-aligned frames, so the same allocator code runs in tests.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::{FrameRange, PhysMapper, SimulatedRam};
//! use kernel_memory_addresses::{FrameNumber, PhysicalAddress};
//!
//! let range = FrameRange::new(PhysicalAddress::new(0x10_0000), PhysicalAddress::new(0x10_4000)).unwrap();
//! let ram = SimulatedRam::new(range);
//! let frame = FrameNumber::new(0x101);
//! // SAFETY: nobody else references this frame.
//! let bytes = unsafe { ram.frame_mut(frame) };
//! bytes[0] = 0xAA;
//! assert_eq!(unsafe { ram.frame_mut(frame) }[0], 0xAA);
//! ```

use crate::FrameRange;
use alloc::boxed::Box;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE};

/// Size of one frame in bytes, as a `usize`.
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_BYTES: usize = PAGE_SIZE as usize;

/// The contents of one physical frame.
pub type FrameBytes = [u8; FRAME_BYTES];

/// Makes physical frames addressable.
pub trait PhysMapper {
    /// Borrow the bytes of `frame`.
    ///
    /// # Safety
    /// - `frame` must be backed by this mapper (see [`covers`](Self::covers)).
    /// - The caller must hold the only live reference to the frame's bytes
    ///   for `'a`; in practice: the caller owns the frame.
    unsafe fn frame_mut<'a>(&self, frame: FrameNumber) -> &'a mut FrameBytes;

    /// Whether `frame` is backed by this mapper.
    fn covers(&self, frame: FrameNumber) -> bool;
}

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Aligned4K(UnsafeCell<FrameBytes>);

impl Aligned4K {
    const fn new_zeroed() -> Self {
        Self(UnsafeCell::new([0u8; FRAME_BYTES]))
    }
}

/// Host-memory "physical RAM" covering one [`FrameRange`].
///
/// Frame `n` of the range lives at index `n - range.first_frame()`.
/// Physical addresses are only used as keys; nothing is identity mapped.
pub struct SimulatedRam {
    first: FrameNumber,
    frames: Box<[Aligned4K]>,
}

// Safety: frame bytes are only reached through `frame_mut`, whose contract
// makes the caller responsible for exclusive access.
unsafe impl Sync for SimulatedRam {}

impl SimulatedRam {
    /// Zero-filled backing for every frame in `range`.
    #[must_use]
    pub fn new(range: FrameRange) -> Self {
        let frames = (0..range.frame_count())
            .map(|_| Aligned4K::new_zeroed())
            .collect();
        Self {
            first: range.first_frame(),
            frames,
        }
    }

    /// Number of backed frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn slot(&self, frame: FrameNumber) -> Option<&Aligned4K> {
        let idx = frame.as_u64().checked_sub(self.first.as_u64())?;
        self.frames.get(usize::try_from(idx).ok()?)
    }
}

impl PhysMapper for SimulatedRam {
    unsafe fn frame_mut<'a>(&self, frame: FrameNumber) -> &'a mut FrameBytes {
        let Some(slot) = self.slot(frame) else {
            panic!("SimulatedRam: {frame:?} is not backed");
        };
        // SAFETY: the caller guarantees exclusive access to this frame; the
        // backing slice lives as long as `self` and is never reallocated.
        unsafe { &mut *slot.0.get() }
    }

    fn covers(&self, frame: FrameNumber) -> bool {
        self.slot(frame).is_some()
    }
}
