//! # Memory Bookkeeping Configuration
//!
//! This crate is the single source of truth for the sizing constants and the
//! small shared types that every memory-management crate in the workspace
//! agrees on. Keeping them here prevents the frame allocator, the inverted
//! page table and the translation cache from drifting apart on table sizes or
//! identity semantics.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! Fixed capacities that are part of the external contract:
//! * **`PFNNUM`**: frame ownership table rows (one per physical frame)
//! * **`IPT_BUCKETS`**: inverted page table hash buckets
//! * **`SW_TLB_SIZE`**: software translation cache slots (direct-mapped)
//! * **`PHYSTOP`** / **`USERSPACE_END`**: managed physical memory and user VA limits
//!
//! ### Process Identity ([`process`])
//! The [`ProcessId`](process::ProcessId) type. Identity zero is reserved for
//! "no process" (kernel or idle context) and is therefore not representable
//! as a `ProcessId`; callers carry `Option<ProcessId>` instead.
//!
//! ### Inspection Rows ([`inspect`])
//! [`FrameInfo`](inspect::FrameInfo) rows and the shared maximum-count
//! validation used by every bounded-copy export.
//!
//! ### Caller-Provided Storage ([`copy_out`])
//! The [`CopyOut`](copy_out::CopyOut) destination used by the bounded-copy
//! inspection exports. A destination may fault part way through a copy; the
//! exports abort and report the fault instead of returning a partial result.
//!
//! ## Layout
//!
//! ```text
//! Physical memory (managed by the frame allocator):
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │   Kernel image & boot data      │ (never freed)
//! kernel end  ├─────────────────────────────────┤
//!             │   Allocatable frames            │
//! PHYSTOP     └─────────────────────────────────┘
//!
//! Per-process virtual memory:
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │   User pages (grow upward)      │
//! USERSPACE_END└────────────────────────────────┘
//! ```
//!
//! All values are `const` and validated at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod copy_out;
pub mod inspect;
pub mod memory;
pub mod process;
