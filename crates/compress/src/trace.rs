//! Structured tracing for stream lifecycle and codec transitions.
//!
//! Every helper is compiled to a no-op when the `tracing` feature is off, so
//! call sites never need their own `cfg` guards.

use crate::algorithm::CompressionAlgorithm;
use crate::error::CompressionError;

/// Target for engine lifecycle events.
#[cfg(feature = "tracing")]
const STREAM_TARGET: &str = "compress::stream";

/// Target for codec level events.
#[cfg(feature = "tracing")]
const CODEC_TARGET: &str = "compress::codec";

// ============================================================================
// Stream lifecycle
// ============================================================================

/// Traces construction of a stream engine.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_stream_open(
    algorithm: CompressionAlgorithm,
    is_compress: bool,
    level: i32,
    buffer_size: usize,
) {
    tracing::debug!(
        target: STREAM_TARGET,
        algorithm = %algorithm,
        direction = if is_compress { "compress" } else { "decompress" },
        level = level,
        buffer_size = buffer_size,
        "stream: opened"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_stream_open(
    _algorithm: CompressionAlgorithm,
    _is_compress: bool,
    _level: i32,
    _buffer_size: usize,
) {
}

/// Traces successful finalization.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_stream_complete(
    algorithm: CompressionAlgorithm,
    base_position: u64,
    position_full_size: u64,
) {
    tracing::debug!(
        target: STREAM_TARGET,
        algorithm = %algorithm,
        base_position = base_position,
        position_full_size = position_full_size,
        "stream: completed"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_stream_complete(
    _algorithm: CompressionAlgorithm,
    _base_position: u64,
    _position_full_size: u64,
) {
}

/// Traces a finalization error swallowed by `Drop`.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_finalize_failed(algorithm: CompressionAlgorithm, error: &CompressionError) {
    tracing::warn!(
        target: STREAM_TARGET,
        algorithm = %algorithm,
        error = %error,
        "stream: finalize during drop failed"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_finalize_failed(
    _algorithm: CompressionAlgorithm,
    _error: &CompressionError,
) {
}

/// Traces a thread count that the algorithm cannot use.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_threads_ignored(algorithm: CompressionAlgorithm, threads: u32) {
    tracing::debug!(
        target: STREAM_TARGET,
        algorithm = %algorithm,
        threads = threads,
        "stream: algorithm is single-threaded, ignoring thread count"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_threads_ignored(_algorithm: CompressionAlgorithm, _threads: u32) {}

// ============================================================================
// Codec transitions
// ============================================================================

/// Traces a decoder reaching its end-of-stream marker.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_decoder_finished(algorithm: CompressionAlgorithm, unused: u64) {
    tracing::trace!(
        target: CODEC_TARGET,
        algorithm = %algorithm,
        unused = unused,
        "codec: end of stream"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_decoder_finished(_algorithm: CompressionAlgorithm, _unused: u64) {}

/// Traces the in-place reset between concatenated GZip members.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_gzip_member(member: u32) {
    tracing::trace!(
        target: CODEC_TARGET,
        member = member,
        "codec: gzip member boundary, decoder reset"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_gzip_member(_member: u32) {}

/// Traces a sync flush pass.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_sync_flush(algorithm: CompressionAlgorithm, produced: usize) {
    tracing::trace!(
        target: CODEC_TARGET,
        algorithm = %algorithm,
        produced = produced,
        "codec: sync flush"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) const fn trace_sync_flush(_algorithm: CompressionAlgorithm, _produced: usize) {}
