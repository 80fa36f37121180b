//! # Kernel synchronization primitives
//!
//! Two busy-waiting locks for short, non-blocking critical sections:
//!
//! - [`SpinLock`]: test-and-test-and-set lock. Each lock carries a static name
//!   and counts how often it was acquired, which the memory bookkeeping layer
//!   reports for diagnostics.
//! - [`TicketLock`]: FIFO-fair lock that hands out tickets in arrival order.
//!   Used for the system tick counter, which timer and allocation paths touch
//!   from every core.
//!
//! Neither lock disables interrupts or yields; holders must keep their
//! critical sections bounded.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod ticket_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use ticket_lock::{TicketLock, TicketLockGuard};
