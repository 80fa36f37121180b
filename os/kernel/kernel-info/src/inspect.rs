//! # Inspection Rows
//!
//! Plain-data rows handed to diagnostic tooling by the bounded-copy exports,
//! and the validation those exports share.

use crate::copy_out::CopyOutFault;
use crate::process::ProcessId;

/// One frame ownership table row as seen by inspection tooling.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameInfo {
    /// Index of the frame in the ownership table (its frame number).
    pub frame_index: u32,
    pub allocated: bool,
    /// Owning process; `None` for free frames and kernel allocations.
    pub owner: Option<ProcessId>,
    /// Tick at which the frame was handed out; `0` when untracked.
    pub start_tick: u64,
}

/// Errors reported by the bounded-copy exports.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InspectError {
    /// The requested maximum was zero, negative, or larger than the table.
    #[error("invalid maximum entry count {requested} (capacity {capacity})")]
    InvalidMaximum { requested: i64, capacity: usize },
    /// The destination faulted part way through the copy.
    #[error("copy to caller storage failed: {0}")]
    Fault(#[from] CopyOutFault),
}

/// Validate a caller-supplied maximum entry count against `capacity`.
///
/// # Errors
/// Returns [`InspectError::InvalidMaximum`] unless `1 <= requested <= capacity`.
///
/// ```rust
/// # use kernel_info::inspect::{checked_maximum, InspectError};
/// assert_eq!(checked_maximum(10, 64), Ok(10));
/// assert!(checked_maximum(0, 64).is_err());
/// assert!(checked_maximum(-1, 64).is_err());
/// assert!(checked_maximum(65, 64).is_err());
/// ```
pub fn checked_maximum(requested: i64, capacity: usize) -> Result<usize, InspectError> {
    usize::try_from(requested)
        .ok()
        .filter(|&max| max > 0 && max <= capacity)
        .ok_or(InspectError::InvalidMaximum {
            requested,
            capacity,
        })
}
