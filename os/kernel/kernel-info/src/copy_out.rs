//! # Bounded Copies into Caller Storage

/// A write into caller-provided storage failed at `index`.
///
/// In the kernel this is a user buffer that turned out not to be mapped (or
/// not user-accessible) part way through a copy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("destination rejected element {index}")]
pub struct CopyOutFault {
    pub index: usize,
}

/// Destination for the bounded-copy inspection exports.
///
/// Implementations accept elements in increasing `index` order, starting at
/// zero. A failed write aborts the export; elements already written are not
/// considered valid by the caller.
pub trait CopyOut<T> {
    /// Store `value` at element `index`.
    ///
    /// # Errors
    /// Returns [`CopyOutFault`] if the destination cannot hold element `index`.
    fn copy_out(&mut self, index: usize, value: &T) -> Result<(), CopyOutFault>;
}

impl<T: Copy> CopyOut<T> for [T] {
    #[inline]
    fn copy_out(&mut self, index: usize, value: &T) -> Result<(), CopyOutFault> {
        let slot = self.get_mut(index).ok_or(CopyOutFault { index })?;
        *slot = *value;
        Ok(())
    }
}
