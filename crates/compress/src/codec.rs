//! # Overview
//!
//! The seam between the buffered engine and the algorithm libraries. Each
//! algorithm supplies an [`Encoder`] and a [`Decoder`] adapter that owns its
//! native context exclusively and moves bytes between two [`Buffer`]s:
//! adapters read from `input.readable()`, write into `output.writable()` and
//! advance both cursors by exactly what the library reported.
//!
//! [`new_encoder`] and [`new_decoder`] pick the adapter for a
//! [`ResolvedOptions`].
//!
//! # Invariants
//!
//! - "Needs more input" and "needs more output" are never errors; adapters
//!   return `Ok` with whatever progress was made.
//! - A decoder reports [`Decoder::finished`] once its end-of-stream marker
//!   was consumed and never reads input afterwards, so leftover bytes stay in
//!   the input buffer for the caller to rewind.
//! - Native contexts are released by `Drop`.

use buffers::Buffer;

use crate::algorithm::CompressionAlgorithm;
use crate::error::CompressionError;
use crate::options::ResolvedOptions;

/// Progress of one [`Encoder::flush`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlushProgress {
    /// Bytes written to the output buffer.
    pub produced: usize,
    /// More flush output is pending; call again after draining.
    pub pending: bool,
}

/// Progress of one [`Encoder::finish`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FinishProgress {
    /// Bytes written to the output buffer.
    pub produced: usize,
    /// The end-of-stream marker has been fully emitted.
    pub stream_end: bool,
}

/// Compression half of an algorithm adapter.
pub trait Encoder: Send {
    /// Compresses as much of `input` as the library accepts without flushing.
    /// Returns the bytes written to `output`.
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError>;

    /// Emits everything encoded so far as a decodable unit.
    fn flush(&mut self, output: &mut Buffer) -> Result<FlushProgress, CompressionError>;

    /// Emits the remaining data and the end-of-stream marker.
    fn finish(&mut self, output: &mut Buffer) -> Result<FinishProgress, CompressionError>;

    /// Decoder initialisation properties, for algorithms that have them.
    fn properties(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Decompression half of an algorithm adapter.
pub trait Decoder: Send {
    /// Algorithm served by this decoder.
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Runs one decode step. Returns the bytes written to `output`.
    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError>;

    /// The end-of-stream marker has been consumed.
    fn finished(&self) -> bool;

    /// At least one input byte was ever offered.
    fn non_empty_input(&self) -> bool;

    /// Consumed input bytes held inside the adapter that have not produced
    /// output yet.
    fn internal_buffered_bytes(&self) -> u64 {
        0
    }

    /// No consumed input is pending inside the adapter.
    fn needs_input(&self) -> bool {
        self.internal_buffered_bytes() == 0
    }

    /// Called once the sink is exhausted and [`decode`](Self::decode) made no
    /// further progress.
    fn end_of_input(&mut self) -> Result<(), CompressionError> {
        if self.non_empty_input() && !self.finished() {
            return Err(CompressionError::truncated(self.algorithm()));
        }
        Ok(())
    }
}

/// Builds the encoder adapter for `options.algorithm`.
pub fn new_encoder(options: &ResolvedOptions) -> Result<Box<dyn Encoder>, CompressionError> {
    use crate::zlib::{DeflateEncoder, DeflateFraming};

    match options.algorithm {
        CompressionAlgorithm::Copy => Ok(Box::new(crate::copy::CopyEncoder)),
        algorithm @ (CompressionAlgorithm::Deflate
        | CompressionAlgorithm::ZLib
        | CompressionAlgorithm::GZip) => {
            let framing = DeflateFraming::for_algorithm(algorithm)
                .ok_or_else(|| CompressionError::unsupported_algorithm(algorithm))?;
            Ok(Box::new(DeflateEncoder::new(framing, options.level)?))
        }
        #[cfg(feature = "brotli")]
        CompressionAlgorithm::Brotli => Ok(Box::new(crate::brotli::BrotliEncoder::new(
            options.level,
            options.buffer_size,
        ))),
        #[cfg(feature = "lzma")]
        CompressionAlgorithm::Lzma | CompressionAlgorithm::Lzma2 | CompressionAlgorithm::FastLzma2 => {
            Ok(Box::new(crate::lzma::LzmaEncoder::new(options)?))
        }
        #[cfg(feature = "lz4")]
        CompressionAlgorithm::Lz4 => Ok(Box::new(crate::lz4::Lz4Encoder::new(
            options.level,
            options.block_mode,
        ))),
        #[cfg(feature = "zstd")]
        CompressionAlgorithm::ZStd => Ok(Box::new(crate::zstd::ZstdEncoder::new(
            options.level,
            options.threads,
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(CompressionError::unsupported_algorithm(other)),
    }
}

/// Builds the decoder adapter for `options.algorithm`.
pub fn new_decoder(options: &ResolvedOptions) -> Result<Box<dyn Decoder>, CompressionError> {
    use crate::zlib::{DeflateDecoder, DeflateFraming};

    match options.algorithm {
        CompressionAlgorithm::Copy => Ok(Box::new(crate::copy::CopyDecoder::default())),
        algorithm @ (CompressionAlgorithm::Deflate
        | CompressionAlgorithm::ZLib
        | CompressionAlgorithm::GZip) => {
            let framing = DeflateFraming::for_algorithm(algorithm)
                .ok_or_else(|| CompressionError::unsupported_algorithm(algorithm))?;
            Ok(Box::new(DeflateDecoder::new(framing)))
        }
        #[cfg(feature = "brotli")]
        CompressionAlgorithm::Brotli => Ok(Box::new(crate::brotli::BrotliDecoder::new())),
        #[cfg(feature = "lzma")]
        CompressionAlgorithm::Lzma | CompressionAlgorithm::Lzma2 | CompressionAlgorithm::FastLzma2 => {
            Ok(Box::new(crate::lzma::LzmaDecoder::new(options)?))
        }
        #[cfg(feature = "lz4")]
        CompressionAlgorithm::Lz4 => Ok(Box::new(crate::lz4::Lz4Decoder::new())),
        #[cfg(feature = "zstd")]
        CompressionAlgorithm::ZStd => Ok(Box::new(crate::zstd::ZstdDecoder::new()?)),
        #[allow(unreachable_patterns)]
        other => Err(CompressionError::unsupported_algorithm(other)),
    }
}

/// Framing bytes an adapter generated itself and still has to hand over.
///
/// Used for headers, trailers and block records that may not fit into the
/// output buffer in one go.
#[derive(Debug, Default)]
pub(crate) struct PendingOutput {
    bytes: Vec<u8>,
    offset: usize,
}

impl PendingOutput {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        if self.offset == self.bytes.len() {
            self.bytes.clear();
            self.offset = 0;
        }
        self.bytes.extend_from_slice(bytes);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.offset == self.bytes.len()
    }

    /// Copies as much as fits into `output`; returns the bytes copied.
    pub(crate) fn drain_into(&mut self, output: &mut Buffer) -> usize {
        let copied = output.write_from(&self.bytes[self.offset..]);
        self.offset += copied;
        if self.is_empty() {
            self.bytes.clear();
            self.offset = 0;
        }
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_output_drains_across_calls() {
        let mut pending = PendingOutput::default();
        pending.push(b"header");
        pending.push(b"-body");

        let mut output = Buffer::unpooled(4).expect("capacity");
        assert_eq!(pending.drain_into(&mut output), 4);
        assert_eq!(output.readable(), b"head");
        assert!(!pending.is_empty());

        output.reset();
        assert_eq!(pending.drain_into(&mut output), 4);
        output.reset();
        assert_eq!(pending.drain_into(&mut output), 3);
        assert_eq!(output.readable(), b"ody");
        assert!(pending.is_empty());
    }

    #[test]
    fn every_enabled_algorithm_builds_both_adapters() {
        use crate::options::CompressionOptions;

        for algorithm in CompressionAlgorithm::available() {
            let encode = CompressionOptions::default().resolve(algorithm).expect("resolve");
            assert!(new_encoder(&encode).is_ok(), "{algorithm} encoder");

            let decode = CompressionOptions::decompress().resolve(algorithm).expect("resolve");
            assert!(new_decoder(&decode).is_ok(), "{algorithm} decoder");
        }
    }
}
