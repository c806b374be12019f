use std::io::{self, Write};

use super::StreamPositions;
use super::engine::Engine;
use crate::algorithm::CompressionAlgorithm;
use crate::cancel::CancellableToken;
use crate::error::CompressionError;
use crate::options::{CompressionOptions, ResolvedOptions};
use crate::trace::trace_finalize_failed;

/// Compresses bytes written to it into a [`Write`] sink.
///
/// The stream must be finalized to emit the end-of-stream marker. Use
/// [`complete`](Self::complete), [`close`](Self::close) or
/// [`into_inner`](Self::into_inner) to observe finalization errors;
/// dropping the stream finalizes as well but can only log a failure.
///
/// ```
/// use std::io::Write;
/// use compress::{CompressStream, CompressionAlgorithm, CompressionOptions};
///
/// let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::GZip, &CompressionOptions::default())?;
/// stream.write_all(b"hello, gzip")?;
/// let compressed = stream.into_inner()?;
/// assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CompressStream<W: Write> {
    engine: Engine,
    sink: Option<W>,
}

impl<W: Write> CompressStream<W> {
    /// Creates a compression stream over `sink`.
    ///
    /// # Errors
    ///
    /// [`CompressionError::InvalidArgument`] when `options` describe
    /// decompression, plus everything [`CompressionOptions::resolve`] rejects.
    pub fn new(
        sink: W,
        algorithm: CompressionAlgorithm,
        options: &CompressionOptions,
    ) -> Result<Self, CompressionError> {
        if options.compression_type.is_decompress() {
            return Err(CompressionError::invalid_argument(
                "compression_type",
                "a compression stream cannot be built with the Decompress type",
            ));
        }
        Ok(Self {
            engine: Engine::new(options.resolve(algorithm)?)?,
            sink: Some(sink),
        })
    }

    /// Attaches a cancellation token checked by every loop iteration.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellableToken) -> Self {
        self.engine.set_cancellation(token);
        self
    }

    /// Writes all of `buf`, encoding whenever the buffer threshold is reached.
    ///
    /// # Errors
    ///
    /// Fails after completion, when a limit would be exceeded, on
    /// cancellation and on codec or sink failures.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, CompressionError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or(CompressionError::Contract("stream sink already taken"))?;
        self.engine.write_bytes(buf, sink)
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// See [`write_bytes`](Self::write_bytes).
    pub fn write_byte(&mut self, byte: u8) -> Result<(), CompressionError> {
        self.write_bytes(&[byte]).map(drop)
    }

    /// Encodes staged input, emits a sync flush and flushes the sink.
    ///
    /// # Errors
    ///
    /// Codec, sink and cancellation failures.
    pub fn flush_stream(&mut self) -> Result<(), CompressionError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or(CompressionError::Contract("stream sink already taken"))?;
        self.engine.on_flush(sink)
    }

    /// Emits the end-of-stream marker. Calling it again after a success does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Codec, sink, limit and cancellation failures. Once finalization has
    /// failed, this and every later finalizing call (including
    /// [`into_inner`](Self::into_inner) and [`close`](Self::close)) return
    /// [`CompressionError::Contract`].
    pub fn complete(&mut self) -> Result<(), CompressionError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or(CompressionError::Contract("stream sink already taken"))?;
        self.engine.complete(sink)
    }

    /// Finalizes the stream and returns the sink.
    ///
    /// # Errors
    ///
    /// See [`complete`](Self::complete).
    pub fn into_inner(mut self) -> Result<W, CompressionError> {
        self.complete()?;
        self.sink
            .take()
            .ok_or(CompressionError::Contract("stream sink already taken"))
    }

    /// Finalizes the stream, returning the sink when `leave_open` was set
    /// and dropping it otherwise.
    ///
    /// # Errors
    ///
    /// See [`complete`](Self::complete).
    pub fn close(self) -> Result<Option<W>, CompressionError> {
        let leave_open = self.engine.options().leave_open;
        let sink = self.into_inner()?;
        Ok(leave_open.then_some(sink))
    }

    /// The wrapped sink.
    pub fn get_ref(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    /// The wrapped sink. Writing to it directly corrupts the stream.
    pub fn get_mut(&mut self) -> Option<&mut W> {
        self.sink.as_mut()
    }

    /// Resolved configuration.
    pub const fn options(&self) -> &ResolvedOptions {
        self.engine.options()
    }

    /// Algorithm of this stream.
    pub const fn algorithm(&self) -> CompressionAlgorithm {
        self.engine.algorithm()
    }

    /// Resolved compression level.
    pub const fn level(&self) -> i32 {
        self.engine.options().level
    }

    /// True once the end-of-stream marker was requested.
    pub const fn is_complete(&self) -> bool {
        self.engine.is_complete()
    }

    /// Decoder initialisation bytes produced by the encoder.
    pub fn properties(&self) -> Option<Vec<u8>> {
        self.engine.properties()
    }

    /// Compressed bytes written to the sink.
    pub fn position(&self) -> u64 {
        self.engine.position()
    }

    /// Compressed bytes written to the sink.
    pub const fn base_position(&self) -> u64 {
        self.engine.base_position()
    }

    /// Uncompressed bytes consumed by the encoder.
    pub const fn position_full_size(&self) -> u64 {
        self.engine.position_full_size()
    }

    /// Bytes staged but not yet encoded.
    pub fn buffered_bytes_unused(&self) -> u64 {
        self.engine.buffered_bytes_unused()
    }

    /// All position counters at once.
    pub fn positions(&self) -> StreamPositions {
        self.engine.positions()
    }
}

impl<W: Write> Write for CompressStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_stream().map_err(io::Error::from)
    }
}

impl<W: Write> Drop for CompressStream<W> {
    fn drop(&mut self) {
        if self.engine.finalize_failed() {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(error) = self.engine.complete(sink) {
                trace_finalize_failed(self.engine.algorithm(), &error);
            }
        }
    }
}

impl<W: Write> std::fmt::Debug for CompressStream<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressStream")
            .field("algorithm", &self.engine.algorithm())
            .field("positions", &self.engine.positions())
            .field("complete", &self.engine.is_complete())
            .finish_non_exhaustive()
    }
}
