//! Error types shared by the streaming engine, codec adapters and block codec.

use std::fmt;
use std::io;

use buffers::BufferError;
use thiserror::Error;

use crate::algorithm::CompressionAlgorithm;

/// Classification of a malformed or unacceptable compressed input.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DataFaultKind {
    /// The codec rejected the input as malformed.
    Corrupt,
    /// The input ended before the codec reached its end-of-stream marker.
    Truncated,
    /// A configured position or size limit would be exceeded.
    LimitExceeded,
    /// An embedded integrity check did not match the decoded content.
    Checksum,
}

impl fmt::Display for DataFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Corrupt => "corrupt",
            Self::Truncated => "truncated",
            Self::LimitExceeded => "limit exceeded",
            Self::Checksum => "checksum mismatch",
        })
    }
}

/// Errors produced by compression streams and codec adapters.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The API was used in a way its contract forbids.
    #[error("contract violation: {0}")]
    Contract(&'static str),
    /// An option or argument was rejected.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending option or argument.
        name: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// A buffer cursor was moved out of range.
    #[error(transparent)]
    OutOfRange(#[from] BufferError),
    /// A codec library call failed for a reason other than bad input data.
    #[error("{algorithm} call `{function}` failed with code {code}: {message}")]
    Native {
        /// Algorithm whose library failed.
        algorithm: CompressionAlgorithm,
        /// Library function that reported the failure.
        function: &'static str,
        /// Library specific status code.
        code: i32,
        /// Library supplied description.
        message: String,
    },
    /// The compressed input is malformed, truncated or exceeds a limit.
    #[error("{kind} {algorithm} data: {detail}")]
    InvalidData {
        /// Algorithm that rejected the data.
        algorithm: CompressionAlgorithm,
        /// Fault classification.
        kind: DataFaultKind,
        /// Additional context.
        detail: String,
    },
    /// The requested algorithm or option is not available in this build.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
    /// The underlying sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CompressionError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn native(
        algorithm: CompressionAlgorithm,
        function: &'static str,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::Native {
            algorithm,
            function,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn data(
        algorithm: CompressionAlgorithm,
        kind: DataFaultKind,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidData {
            algorithm,
            kind,
            detail: detail.into(),
        }
    }

    pub(crate) fn corrupt(algorithm: CompressionAlgorithm, detail: impl Into<String>) -> Self {
        Self::data(algorithm, DataFaultKind::Corrupt, detail)
    }

    pub(crate) fn truncated(algorithm: CompressionAlgorithm) -> Self {
        Self::data(
            algorithm,
            DataFaultKind::Truncated,
            "input ended before the end-of-stream marker",
        )
    }

    pub(crate) fn unsupported_algorithm(algorithm: CompressionAlgorithm) -> Self {
        Self::Unsupported(format!("{algorithm} support was not compiled in"))
    }

    /// Returns the data fault classification when this is an [`InvalidData`](Self::InvalidData) error.
    #[must_use]
    pub const fn data_fault(&self) -> Option<DataFaultKind> {
        match self {
            Self::InvalidData { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Recovers a `CompressionError` that travelled through an [`io::Error`].
    ///
    /// Errors raised by the [`Read`](io::Read)/[`Write`](io::Write)
    /// implementations of the streams are wrapped in `io::Error`; this undoes
    /// the wrapping. Plain I/O failures become [`CompressionError::Io`].
    #[must_use]
    pub fn from_io(error: io::Error) -> Self {
        if error
            .get_ref()
            .is_some_and(|inner| inner.is::<Self>())
        {
            match error.into_inner().map(|inner| inner.downcast::<Self>()) {
                Some(Ok(inner)) => *inner,
                Some(Err(other)) => Self::Io(io::Error::other(other)),
                None => Self::Contract("wrapped error vanished"),
            }
        } else {
            Self::Io(error)
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::InvalidData { .. } => io::ErrorKind::InvalidData,
            Self::InvalidArgument { .. } | Self::OutOfRange(_) | Self::Contract(_) => {
                io::ErrorKind::InvalidInput
            }
            Self::Unsupported(_) => io::ErrorKind::Unsupported,
            // `Interrupted` would make `write_all` and `read_to_end` retry forever.
            Self::Cancelled => io::ErrorKind::Other,
            Self::Io(error) => error.kind(),
            Self::Native { .. } => io::ErrorKind::Other,
        }
    }
}

impl From<CompressionError> for io::Error {
    fn from(error: CompressionError) -> Self {
        match error {
            CompressionError::Io(inner) => inner,
            other => Self::new(other.io_kind(), other),
        }
    }
}

/// Status codes reported by the block codec.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CompressionResultCode {
    /// The operation completed.
    Success,
    /// The codec failed for an unclassified reason.
    Error,
    /// The destination buffer is too small.
    InsufficientBuffer,
    /// The source is not valid compressed data.
    InvalidData,
    /// A parameter such as the level was rejected.
    InvalidParameter,
    /// The algorithm or operation is unavailable.
    NotSupported,
}

impl fmt::Display for CompressionResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Error => "codec error",
            Self::InsufficientBuffer => "destination buffer too small",
            Self::InvalidData => "invalid compressed data",
            Self::InvalidParameter => "invalid parameter",
            Self::NotSupported => "operation not supported",
        })
    }
}

impl std::error::Error for CompressionResultCode {}

impl CompressionResultCode {
    /// Collapses a block codec result into its status code.
    #[must_use]
    pub const fn of<T>(result: &Result<T, Self>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(code) => *code,
        }
    }
}

impl From<&CompressionError> for CompressionResultCode {
    fn from(error: &CompressionError) -> Self {
        match error {
            CompressionError::InvalidData { .. } => Self::InvalidData,
            CompressionError::InvalidArgument { .. } => Self::InvalidParameter,
            CompressionError::Unsupported(_) => Self::NotSupported,
            _ => Self::Error,
        }
    }
}
