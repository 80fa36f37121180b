//! # Process Identity

use core::fmt;
use core::num::NonZeroU32;

/// Identity of a real user process.
///
/// Zero is reserved for "no process" (kernel context, idle loop, or code
/// running before the scheduler exists) and cannot be constructed. An owner
/// that may be absent is spelled `Option<ProcessId>`, which has the same
/// size and ABI as a raw `u32` where `0` means `None`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProcessId(NonZeroU32);

impl ProcessId {
    /// Wrap a raw identity; returns `None` for zero.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Raw identity of a possibly absent owner, `0` for the kernel context.
    #[inline]
    #[must_use]
    pub const fn raw_or_kernel(owner: Option<Self>) -> u32 {
        match owner {
            Some(pid) => pid.get(),
            None => 0,
        }
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
