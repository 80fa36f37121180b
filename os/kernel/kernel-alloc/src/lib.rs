//! # Physical Frame Allocation
//!
//! The physical frame allocator together with the per-frame ownership table
//! it maintains.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Frame Allocator ("kmem" lock)          │
//! │    • LIFO free list of 4 KiB frames                 │
//! │    • Double-free bitmap                             │
//! │    • Junk fill on free                              │
//! └───────┬─────────────────────────────┬───────────────┘
//!         │                             │
//! ┌───────▼───────────────┐   ┌─────────▼─────────────────┐
//! │ Frame Ownership Table │   │ Physical Mapper           │
//! │ • one slot per frame  │   │ • frame number → bytes    │
//! │ • owner + start tick  │   │ • direct map / host RAM   │
//! └───────┬───────────────┘   └───────────────────────────┘
//!         │
//! ┌───────▼───────────────┐
//! │ Ticks (ticket lock)   │
//! └───────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Frame Allocator ([`frame_alloc`])
//!
//! Two-phase bring-up (seed the free list, then enable tracking), `allocate`
//! / `free`, and the bounded-copy export of ownership rows for inspection
//! tooling.
//!
//! ### Frame Ownership Table ([`frame_table`])
//!
//! Fixed `PFNNUM`-row table recording, per frame, whether it is allocated,
//! which user process owns it and when it was handed out. Only the
//! allocator writes to it, always under its lock.
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! Turns frame numbers into addressable bytes. [`SimulatedRam`] provides
//! host-memory backing so the allocator runs unchanged in tests.
//!
//! ## Lock Ordering
//!
//! The allocator lock may be held while the tick counter is read. No other
//! lock is ever acquired while the allocator lock is held.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod frame_alloc;
pub mod frame_table;
pub mod phys_mapper;
mod ticks;

pub use crate::frame_alloc::{AllocError, FrameAllocator, FrameRange};
pub use crate::frame_table::FrameSlot;
pub use crate::phys_mapper::{FRAME_BYTES, FrameBytes, PhysMapper, SimulatedRam};
pub use crate::ticks::Ticks;
