//! Buffered compression streams.
//!
//! [`CompressStream`] wraps a [`Write`](std::io::Write) sink and compresses
//! everything written to it; [`DecompressStream`] wraps a
//! [`Read`](std::io::Read) source and serves decompressed bytes. Both share
//! one buffered engine that handles thresholds, limits, cancellation and
//! position accounting.
//!
//! # Position accounting
//!
//! | Quantity                 | Compression                 | Decompression                          |
//! |--------------------------|-----------------------------|----------------------------------------|
//! | `base_position`          | bytes written to the sink   | bytes read from the source             |
//! | `position`               | `base_position`             | `base_position - buffered_bytes_unused` |
//! | `position_full_size`     | uncompressed bytes encoded  | decompressed bytes served              |
//! | `buffered_bytes_unused`  | staged, not yet encoded     | read from the source, not yet decoded  |
//!
//! A decoder usually reads past the end of its compressed stream. After the
//! decoder finished, seeking the source back by
//! [`DecompressStream::buffered_bytes_unused`] re-positions it at the first
//! byte that does not belong to the stream.

mod compress;
mod decompress;
mod engine;

#[cfg(feature = "async")]
mod async_stream;

#[cfg(feature = "async")]
pub use async_stream::AsyncCompressionStream;
pub use compress::CompressStream;
pub use decompress::DecompressStream;

/// Snapshot of a stream's position counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StreamPositions {
    /// Bytes moved across the compressed boundary, net of unused input.
    pub position: u64,
    /// Raw bytes moved to or from the sink.
    pub base_position: u64,
    /// Bytes moved across the uncompressed boundary.
    pub position_full_size: u64,
    /// Bytes currently held in the input buffer.
    pub buffered_bytes_total: u64,
    /// Bytes of the input buffer already consumed by the codec.
    pub buffered_bytes_used: u64,
    /// Bytes taken in but not consumed, including codec-internal bytes.
    pub buffered_bytes_unused: u64,
    /// Consumed input the codec holds internally without output yet.
    pub internal_buffered_bytes: u64,
}
