use thiserror::Error;

/// Errors raised by [`Buffer`](crate::Buffer) cursor operations.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferError {
    /// A buffer was requested with zero capacity.
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,
    /// A cursor move exceeded the bytes available for it.
    #[error("{operation} of {requested} bytes exceeds the {available} bytes available")]
    OutOfRange {
        /// Name of the cursor operation that failed.
        operation: &'static str,
        /// Bytes the caller asked to move.
        requested: usize,
        /// Bytes that were actually available.
        available: usize,
    },
}

impl BufferError {
    pub(crate) const fn out_of_range(
        operation: &'static str,
        requested: usize,
        available: usize,
    ) -> Self {
        Self::OutOfRange {
            operation,
            requested,
            available,
        }
    }
}
