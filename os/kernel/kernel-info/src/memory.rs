//! # Memory Layout

pub use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE};

/// Number of rows in the frame ownership table.
///
/// Every frame number handed out by the allocator must be below this value.
pub const PFNNUM: usize = 60_000;

/// Number of hash buckets in the inverted page table.
pub const IPT_BUCKETS: usize = 1024;

/// Number of slots in the direct-mapped software translation cache.
pub const SW_TLB_SIZE: usize = 64;

/// Top of managed physical memory (exclusive).
pub const PHYSTOP: u64 = 0x0E00_0000; // 224 MiB

/// End of the user virtual address range (exclusive).
///
/// The two-level user page table covers `512 * 512` pages of 4 KiB.
pub const USERSPACE_END: u64 = 1 << 30; // 1 GiB

/// Byte pattern written over every freed frame.
///
/// Stale references into freed memory read this junk instead of the
/// previous owner's data.
pub const FREED_FRAME_FILL: u8 = 0x01;

const _: () = {
    assert!(PHYSTOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP / PAGE_SIZE <= PFNNUM as u64);
    assert!(USERSPACE_END.is_multiple_of(PAGE_SIZE));
    assert!(IPT_BUCKETS.is_power_of_two());
    assert!(SW_TLB_SIZE.is_power_of_two());
};
