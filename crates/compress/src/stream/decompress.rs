use std::io::{self, Read};

use super::StreamPositions;
use super::engine::Engine;
use crate::algorithm::CompressionAlgorithm;
use crate::cancel::CancellableToken;
use crate::error::CompressionError;
use crate::options::{CompressionOptions, CompressionType, ResolvedOptions};

/// Decompresses bytes pulled from a [`Read`] source.
///
/// The stream ends at the end-of-stream marker of the first compressed
/// stream (or member, for concatenated GZip input). Bytes it read past that
/// point are reported by [`buffered_bytes_unused`](Self::buffered_bytes_unused).
///
/// ```
/// use std::io::Read;
/// use compress::{CompressionAlgorithm, CompressionOptions, DecompressStream};
///
/// let compressed = [0x78, 0x9c, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01];
/// let mut stream = DecompressStream::new(&compressed[..], CompressionAlgorithm::ZLib, &CompressionOptions::decompress())?;
/// let mut decoded = Vec::new();
/// stream.read_to_end(&mut decoded)?;
/// assert!(decoded.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DecompressStream<R: Read> {
    engine: Engine,
    source: R,
}

impl<R: Read> DecompressStream<R> {
    /// Creates a decompression stream over `source`. The level of `options`
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Everything [`CompressionOptions::resolve`] rejects, and invalid
    /// `init_properties`.
    pub fn new(
        source: R,
        algorithm: CompressionAlgorithm,
        options: &CompressionOptions,
    ) -> Result<Self, CompressionError> {
        let mut options = options.clone();
        options.compression_type = CompressionType::Decompress;
        Ok(Self {
            engine: Engine::new(options.resolve(algorithm)?)?,
            source,
        })
    }

    /// Attaches a cancellation token checked by every loop iteration.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellableToken) -> Self {
        self.engine.set_cancellation(token);
        self
    }

    /// Reads decompressed bytes into `buf`. Returns zero at the end of the
    /// stream or for an empty `buf`.
    ///
    /// # Errors
    ///
    /// Data faults for corrupt or truncated input, plus codec, source and
    /// cancellation failures.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, CompressionError> {
        self.engine.read_bytes(buf, &mut self.source)
    }

    /// Reads one byte, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// See [`read_bytes`](Self::read_bytes).
    pub fn read_byte(&mut self) -> Result<Option<u8>, CompressionError> {
        let mut byte = [0u8];
        Ok((self.read_bytes(&mut byte)? == 1).then_some(byte[0]))
    }

    /// Makes the last `count` served bytes readable again.
    ///
    /// Only bytes decoded since the output buffer was last recycled can be
    /// rewound.
    ///
    /// # Errors
    ///
    /// [`CompressionError::OutOfRange`] when fewer bytes are retained.
    pub fn rewind_read(&mut self, count: usize) -> Result<(), CompressionError> {
        self.engine.rewind_read(count)
    }

    /// Marks the stream finished. Decompression has nothing to flush, so
    /// this only records completion.
    pub fn complete(&mut self) {
        self.engine.complete_read();
    }

    /// Returns the source. Its cursor may be up to
    /// [`buffered_bytes_unused`](Self::buffered_bytes_unused) bytes past the
    /// end of the consumed compressed data.
    pub fn into_inner(mut self) -> R {
        self.complete();
        self.source
    }

    /// Returns the source when `leave_open` was set and drops it otherwise.
    pub fn close(self) -> Option<R> {
        let leave_open = self.engine.options().leave_open;
        let source = self.into_inner();
        leave_open.then_some(source)
    }

    /// The wrapped source.
    pub const fn get_ref(&self) -> &R {
        &self.source
    }

    /// The wrapped source. Reading from it directly corrupts the stream.
    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// Resolved configuration.
    pub const fn options(&self) -> &ResolvedOptions {
        self.engine.options()
    }

    /// Algorithm of this stream.
    pub const fn algorithm(&self) -> CompressionAlgorithm {
        self.engine.algorithm()
    }

    /// True once [`complete`](Self::complete) ran.
    pub const fn is_complete(&self) -> bool {
        self.engine.is_complete()
    }

    /// The `init_properties` this decoder was built with.
    pub fn properties(&self) -> Option<Vec<u8>> {
        self.engine.properties()
    }

    /// Compressed bytes consumed by the decoder.
    pub fn position(&self) -> u64 {
        self.engine.position()
    }

    /// Raw bytes read from the source.
    pub const fn base_position(&self) -> u64 {
        self.engine.base_position()
    }

    /// Decompressed bytes served.
    pub const fn position_full_size(&self) -> u64 {
        self.engine.position_full_size()
    }

    /// Bytes held in the input buffer.
    pub fn buffered_bytes_total(&self) -> u64 {
        self.engine.buffered_bytes_total()
    }

    /// Bytes of the input buffer the decoder consumed.
    pub fn buffered_bytes_used(&self) -> u64 {
        self.engine.buffered_bytes_used()
    }

    /// Bytes read from the source that the decoder did not consume; the
    /// amount to seek the source back by.
    pub fn buffered_bytes_unused(&self) -> u64 {
        self.engine.buffered_bytes_unused()
    }

    /// Consumed input held inside the decoder without output yet.
    pub fn internal_buffered_bytes(&self) -> u64 {
        self.engine.internal_buffered_bytes()
    }

    /// All position counters at once.
    pub fn positions(&self) -> StreamPositions {
        self.engine.positions()
    }
}

impl<R: Read> Read for DecompressStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(io::Error::from)
    }
}

impl<R: Read> std::fmt::Debug for DecompressStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecompressStream")
            .field("algorithm", &self.engine.algorithm())
            .field("positions", &self.engine.positions())
            .field("complete", &self.engine.is_complete())
            .finish_non_exhaustive()
    }
}
