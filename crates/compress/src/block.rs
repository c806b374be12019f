//! One-shot compression of fully buffered inputs.
//!
//! A [`CompressionBlock`] carries no state between calls. Callers size the
//! destination with [`CompressionBlock::required_compress_output_size`];
//! expected failures such as a short destination come back as a
//! [`CompressionResultCode`] rather than an error value.

use crate::algorithm::CompressionAlgorithm;
use crate::error::{CompressionError, CompressionResultCode};
use crate::options::{CompressionOptions, ResolvedOptions};
use crate::zlib::{self, DeflateFraming};

/// Stateless single-call codec for one algorithm.
#[derive(Clone, Debug)]
pub struct CompressionBlock {
    options: ResolvedOptions,
}

impl CompressionBlock {
    /// Resolves `options` for `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`CompressionOptions::resolve`].
    pub fn new(algorithm: CompressionAlgorithm, options: &CompressionOptions) -> Result<Self, CompressionError> {
        Ok(Self {
            options: options.resolve(algorithm)?,
        })
    }

    /// Algorithm used by this codec.
    #[must_use]
    pub const fn algorithm(&self) -> CompressionAlgorithm {
        self.options.algorithm
    }

    /// Resolved compression level.
    #[must_use]
    pub const fn level(&self) -> i32 {
        self.options.level
    }

    /// Worst-case compressed size for `input_len` bytes.
    #[must_use]
    pub fn required_compress_output_size(&self, input_len: usize) -> usize {
        match self.options.algorithm {
            CompressionAlgorithm::Copy => input_len,
            algorithm @ (CompressionAlgorithm::Deflate
            | CompressionAlgorithm::ZLib
            | CompressionAlgorithm::GZip) => DeflateFraming::for_algorithm(algorithm)
                .map_or(input_len, |framing| zlib::compress_bound(framing, input_len)),
            #[cfg(feature = "brotli")]
            CompressionAlgorithm::Brotli => crate::brotli::compress_bound(input_len),
            #[cfg(feature = "lzma")]
            algorithm @ (CompressionAlgorithm::Lzma
            | CompressionAlgorithm::Lzma2
            | CompressionAlgorithm::FastLzma2) => crate::lzma::compress_bound(algorithm, input_len),
            #[cfg(feature = "lz4")]
            CompressionAlgorithm::Lz4 => crate::lz4::compress_bound(input_len),
            #[cfg(feature = "zstd")]
            CompressionAlgorithm::ZStd => crate::zstd::compress_bound(input_len),
            #[allow(unreachable_patterns)]
            _ => input_len,
        }
    }

    /// Compresses `src` into `dst`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// [`CompressionResultCode::InsufficientBuffer`] when `dst` is too small,
    /// [`CompressionResultCode::NotSupported`] for a decompress-only
    /// configuration, or the algorithm's own failure code.
    pub fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
        if !self.options.is_compress {
            return Err(CompressionResultCode::NotSupported);
        }
        let level = self.options.level;
        match self.options.algorithm {
            CompressionAlgorithm::Copy => copy(src, dst),
            algorithm @ (CompressionAlgorithm::Deflate
            | CompressionAlgorithm::ZLib
            | CompressionAlgorithm::GZip) => {
                let framing = DeflateFraming::for_algorithm(algorithm).ok_or(CompressionResultCode::NotSupported)?;
                zlib::compress_block(framing, level, src, dst)
            }
            #[cfg(feature = "brotli")]
            CompressionAlgorithm::Brotli => crate::brotli::compress_block(level, src, dst),
            #[cfg(feature = "lzma")]
            CompressionAlgorithm::Lzma | CompressionAlgorithm::Lzma2 | CompressionAlgorithm::FastLzma2 => {
                crate::lzma::compress_block(&self.options, src, dst)
            }
            #[cfg(feature = "lz4")]
            CompressionAlgorithm::Lz4 => crate::lz4::compress_block(src, dst),
            #[cfg(feature = "zstd")]
            CompressionAlgorithm::ZStd => crate::zstd::compress_block(level, src, dst),
            #[allow(unreachable_patterns)]
            _ => Err(CompressionResultCode::NotSupported),
        }
    }

    /// Decompresses `src` into `dst`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// [`CompressionResultCode::InsufficientBuffer`] when `dst` cannot hold
    /// the decoded data, [`CompressionResultCode::InvalidData`] for malformed
    /// input.
    pub fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
        match self.options.algorithm {
            CompressionAlgorithm::Copy => copy(src, dst),
            algorithm @ (CompressionAlgorithm::Deflate
            | CompressionAlgorithm::ZLib
            | CompressionAlgorithm::GZip) => {
                let framing = DeflateFraming::for_algorithm(algorithm).ok_or(CompressionResultCode::NotSupported)?;
                zlib::decompress_block(framing, src, dst)
            }
            #[cfg(feature = "brotli")]
            CompressionAlgorithm::Brotli => crate::brotli::decompress_block(src, dst),
            #[cfg(feature = "lzma")]
            CompressionAlgorithm::Lzma | CompressionAlgorithm::Lzma2 | CompressionAlgorithm::FastLzma2 => {
                crate::lzma::decompress_block(&self.options, src, dst)
            }
            #[cfg(feature = "lz4")]
            CompressionAlgorithm::Lz4 => crate::lz4::decompress_block(src, dst),
            #[cfg(feature = "zstd")]
            CompressionAlgorithm::ZStd => crate::zstd::decompress_block(src, dst),
            #[allow(unreachable_patterns)]
            _ => Err(CompressionResultCode::NotSupported),
        }
    }
}

fn copy(src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    let target = dst
        .get_mut(..src.len())
        .ok_or(CompressionResultCode::InsufficientBuffer)?;
    target.copy_from_slice(src);
    Ok(src.len())
}
