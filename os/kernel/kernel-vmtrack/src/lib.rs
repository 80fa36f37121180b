//! # Virtual Memory Tracking
//!
//! Keeps three structures coherent with the per-process page tables:
//!
//! ```text
//!            page-table mutation (grow / shrink / fork / reprotect / teardown)
//!                                  │
//!                         lifecycle hooks
//!              ┌───────────────────┼────────────────────┐
//!              ▼                   ▼                    ▼
//!   ┌───────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//!   │ Frame allocator   │ │ Inverted page    │ │ Software TLB     │
//!   │ ("kmem")          │ │ table ("ipt")    │ │ ("sw_tlb")       │
//!   │ owner + tick/frame│ │ frame → mappings │ │ 64 direct-mapped │
//!   └───────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! - [`ipt::InvertedPageTable`]: 1024 hash buckets keyed by frame number,
//!   one reference-counted entry per `(frame, owner, page)`.
//! - [`stlb::SoftTlb`]: direct-mapped translation cache with hit and miss
//!   counters, consulted by [`translate::translate`].
//! - [`MmContext`]: owns all three and exposes the lifecycle hooks.
//! - [`uvm::ProcessMemory`]: the user address-space routines that call the
//!   hooks.
//! - [`inspect`]: bounded copies of the ownership table and of reverse
//!   mappings for diagnostic tooling.
//!
//! ## Lock ordering
//!
//! The three locks are independent. No operation holds one of them while
//! acquiring another; the hooks take the IPT lock and the TLB lock one after
//! the other. Hooks never allocate frames, so the allocator lock is never
//! held together with either of the others.
//!
//! ## Example
//!
//! ```rust
//! # use kernel_alloc::FrameRange;
//! # use kernel_info::process::ProcessId;
//! # use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//! # use kernel_vmtrack::{MmContext, uvm::ProcessMemory};
//! let range = FrameRange::new(PhysicalAddress::new(0x10_0000), PhysicalAddress::new(0x11_0000)).unwrap();
//! let mm = MmContext::simulated(range);
//! mm.init();
//!
//! let pid = ProcessId::new(1).unwrap();
//! let mut image = ProcessMemory::new(pid);
//! image.grow(&mm, 3 * 4096).unwrap();
//! assert_eq!(mm.ipt().entries_of(pid), 3);
//!
//! let t = image.translate(&mm, VirtualAddress::new(0x1010)).unwrap();
//! assert!(!t.cache_hit);
//! assert!(image.translate(&mm, VirtualAddress::new(0x1020)).unwrap().cache_hit);
//!
//! image.destroy(&mm);
//! assert!(mm.ipt().is_empty());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod context;
mod error;
mod hooks;
pub mod inspect;
pub mod ipt;
pub mod stlb;
pub mod translate;
pub mod uvm;

pub use crate::context::MmContext;
pub use crate::error::VmError;
pub use crate::ipt::{InvertedPageTable, IptStatus, ReverseMapping};
pub use crate::stlb::{SoftTlb, TlbStatus};
pub use crate::translate::Translation;
