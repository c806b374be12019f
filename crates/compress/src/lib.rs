#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `compress` wraps several compression formats behind two uniform
//! surfaces: buffered streams that compress into a [`Write`](std::io::Write)
//! sink or decompress out of a [`Read`](std::io::Read) source, and
//! [`CompressionBlock`] for one-shot buffer-to-buffer calls. Supported
//! algorithms are Deflate, ZLib and GZip (via [`flate2`](https://docs.rs/flate2)),
//! Brotli, LZMA/LZMA2 (via liblzma), LZ4 frames and Zstandard, plus a
//! pass-through [`CompressionAlgorithm::Copy`].
//!
//! # Design
//!
//! Every algorithm implements the [`codec::Encoder`] and [`codec::Decoder`]
//! traits: a step consumes part of an input [`buffers::Buffer`] and appends
//! to an output buffer, and never blocks on I/O. The stream engine owns a
//! pooled input and output buffer pair, drives the codec and moves bytes
//! across the I/O boundary. It also keeps the position counters described
//! in [`StreamPositions`].
//!
//! Options are declared with [`CompressionOptions`] and validated once
//! into [`ResolvedOptions`], which fixes the level, buffer sizes and
//! algorithm-specific settings before any codec is built.
//!
//! # Invariants
//!
//! - A [`CompressStream`] emits its end-of-stream marker exactly once, on
//!   [`CompressStream::complete`], on `close`/`into_inner` or on drop.
//! - A [`DecompressStream`] stops at the end of the first compressed stream
//!   (consecutive GZip members are decoded as one stream). Bytes read past
//!   that point are reported by [`DecompressStream::buffered_bytes_unused`].
//! - A cancelled [`CancellableToken`] aborts the current call before the
//!   next codec step.
//!
//! # Errors
//!
//! Stream operations return [`CompressionError`]; block operations return a
//! [`CompressionResultCode`]. Corrupt or truncated input is reported as
//! [`CompressionError::InvalidData`] with a [`DataFaultKind`], which converts
//! into [`std::io::ErrorKind::InvalidData`] when the stream is used through
//! the `std::io` traits.
//!
//! # Examples
//!
//! ```
//! use std::io::{Read, Write};
//! use compress::{CompressStream, CompressionAlgorithm, CompressionOptions, DecompressStream};
//!
//! let mut writer = CompressStream::new(Vec::new(), CompressionAlgorithm::ZLib, &CompressionOptions::default())?;
//! writer.write_all(b"streaming payload")?;
//! let compressed = writer.into_inner()?;
//!
//! let mut reader = DecompressStream::new(compressed.as_slice(), CompressionAlgorithm::ZLib, &CompressionOptions::decompress())?;
//! let mut decoded = Vec::new();
//! reader.read_to_end(&mut decoded)?;
//! assert_eq!(decoded, b"streaming payload");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # See also
//!
//! - [`buffers`] for the cursor buffer and pool used by the streams.

pub mod algorithm;
#[cfg(feature = "brotli")]
pub mod brotli;
pub mod codec;
pub mod copy;
#[cfg(feature = "lz4")]
pub mod lz4;
#[cfg(feature = "lzma")]
pub mod lzma;
pub mod options;
pub mod zlib;
#[cfg(feature = "zstd")]
pub mod zstd;

mod block;
mod cancel;
mod error;
mod stream;
mod trace;

pub use algorithm::{CompressionAlgorithm, CompressionAlgorithmParseError};
pub use block::CompressionBlock;
pub use cancel::CancellableToken;
pub use error::{CompressionError, CompressionResultCode, DataFaultKind};
pub use options::{
    BlockMode, CompressionOptions, CompressionType, CompressionVersion, DEFAULT_BUFFER_SIZE,
    LevelDefaults, ResolvedOptions,
};
#[cfg(feature = "async")]
pub use stream::AsyncCompressionStream;
pub use stream::{CompressStream, DecompressStream, StreamPositions};
