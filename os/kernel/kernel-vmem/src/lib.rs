//! # User Page Tables
//!
//! The hardware-visible page tables that the memory bookkeeping layer keeps
//! its indices consistent with. Only what the bookkeeping needs is modeled:
//! a two-level tree of 4 KiB leaf mappings covering the user half of an
//! address space.
//!
//! ## Virtual address split
//!
//! ```text
//! | 29‒21 | 20‒12 | 11‒0   |
//! |  Dir  | Table | Offset |
//! ```
//!
//! Each level holds 512 (2⁹) entries, so one directory covers
//! `512 × 512 × 4 KiB = 1 GiB` of user space
//! ([`USERSPACE_END`](kernel_info::memory::USERSPACE_END)).
//!
//! ```text
//!  Directory  →  PageTable  →  Physical frame
//!      │             │
//!      │             └───► PtEntry: frame number + PageFlags
//!      └─────────────────► lazily allocated on first mapping
//! ```
//!
//! ## What you get
//! - [`PageFlags`]: the low 12 permission/status bits of an entry. This is
//!   the *permission snapshot* stored in the inverted page table and the
//!   translation cache.
//! - [`PtEntry`]: one 64-bit leaf entry (frame number + flags).
//! - [`AddressSpace`]: map, unmap, reprotect and walk single pages.
//! - [`PageWalk`]: the read-only walk the translation service depends on.
//!
//! Mutating a mapping here does **not** touch any software index. Callers
//! that change mappings are responsible for the corresponding inverted page
//! table and translation-cache maintenance.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod address_space;
mod page_flags;
pub mod page_table;

pub use crate::address_space::{AddressSpace, PageWalk, VmemError};
pub use crate::page_flags::PageFlags;
pub use crate::page_table::PtEntry;
