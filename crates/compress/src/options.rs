//! # Overview
//!
//! Stream and block configuration. [`CompressionOptions`] is the builder that
//! callers fill in; [`CompressionOptions::resolve`] validates it against an
//! algorithm once, at construction, and produces the [`ResolvedOptions`] the
//! engine and codec adapters actually read.
//!
//! Symbolic levels ([`CompressionType::Fastest`], [`CompressionType::Optimal`],
//! [`CompressionType::SmallestSize`]) map through a static per-algorithm table,
//! see [`LevelDefaults::for_algorithm`].
//!
//! # Examples
//!
//! ```
//! use compress::{CompressionAlgorithm, CompressionOptions, CompressionType};
//!
//! let options = CompressionOptions::new(CompressionType::SmallestSize)
//!     .with_buffer_size(64 * 1024)
//!     .with_leave_open(true);
//! let resolved = options.resolve(CompressionAlgorithm::ZStd).unwrap();
//! assert_eq!(resolved.level, 22);
//! assert_eq!(resolved.buffer_threshold, 64 * 1024);
//! ```

use core::ops::RangeInclusive;

use crate::algorithm::CompressionAlgorithm;
use crate::error::CompressionError;

/// Default size of the engine's input and output buffers (128 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Direction and level requested for a stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CompressionType {
    /// Compress with an explicit algorithm specific level.
    Level(i32),
    /// Decompress.
    Decompress,
    /// Compress with the algorithm's balanced default.
    #[default]
    Optimal,
    /// Compress favouring speed.
    Fastest,
    /// Compress favouring ratio.
    SmallestSize,
}

impl CompressionType {
    /// Reports whether this type selects decompression.
    #[must_use]
    pub const fn is_decompress(self) -> bool {
        matches!(self, Self::Decompress)
    }
}

/// Backend variant for the deflate family.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CompressionVersion {
    /// Whatever backend the build links.
    #[default]
    Default,
    /// Classic zlib semantics.
    ///
    /// Accepted for compatibility only: the deflate family always runs on the
    /// single flate2 backend chosen at build time, so this selects nothing
    /// at runtime.
    ZLib,
    /// zlib-ng; requires the `zlib-ng` cargo feature.
    ///
    /// Resolution fails without that feature. With it, zlib-ng is already
    /// the backend for every deflate stream, so this behaves like
    /// [`Default`](Self::Default).
    ZLibNg,
}

/// Block layout requested through [`CompressionOptions::block_size`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BlockMode {
    /// Codec default.
    #[default]
    Default,
    /// A single block spanning the whole stream (`block_size == -1`).
    Solid,
    /// Blocks of at most this many uncompressed bytes.
    Fixed(u64),
}

/// Level mapping for one algorithm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LevelDefaults {
    /// Level used for [`CompressionType::Fastest`].
    pub fastest: i32,
    /// Level used for [`CompressionType::Optimal`].
    pub optimal: i32,
    /// Level used for [`CompressionType::SmallestSize`].
    pub smallest: i32,
    /// Accepted explicit levels.
    pub range: RangeInclusive<i32>,
}

impl LevelDefaults {
    /// Returns the static level table entry for `algorithm`.
    #[must_use]
    pub const fn for_algorithm(algorithm: CompressionAlgorithm) -> Self {
        let (fastest, optimal, smallest, min, max) = match algorithm {
            CompressionAlgorithm::Copy => (0, 0, 0, 0, 0),
            CompressionAlgorithm::Deflate
            | CompressionAlgorithm::ZLib
            | CompressionAlgorithm::GZip => (1, 6, 9, 0, 9),
            CompressionAlgorithm::Brotli => (1, 4, 11, 0, 11),
            CompressionAlgorithm::Lzma | CompressionAlgorithm::Lzma2 => (1, 5, 9, 0, 9),
            CompressionAlgorithm::FastLzma2 => (1, 6, 9, 1, 9),
            CompressionAlgorithm::Lz4 => (1, 6, 12, 0, 12),
            CompressionAlgorithm::ZStd => (1, 3, 22, -7, 22),
        };
        Self {
            fastest,
            optimal,
            smallest,
            range: min..=max,
        }
    }

    const fn level_for(&self, compression_type: CompressionType) -> i32 {
        match compression_type {
            CompressionType::Level(level) => level,
            CompressionType::Fastest => self.fastest,
            CompressionType::Optimal | CompressionType::Decompress => self.optimal,
            CompressionType::SmallestSize => self.smallest,
        }
    }
}

/// Caller supplied stream and block configuration.
///
/// Every field has a builder method; unset optional fields fall back to the
/// codec or engine default during [`resolve`](Self::resolve).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompressionOptions {
    /// Direction and level.
    pub compression_type: CompressionType,
    /// Hand the sink back from [`close`](crate::CompressStream::close) instead of dropping it.
    pub leave_open: bool,
    /// Deflate backend selection.
    pub version: CompressionVersion,
    /// Encoder worker threads for algorithms that support them.
    pub thread_count: Option<u32>,
    /// Block size in bytes; `-1` requests a solid stream.
    pub block_size: Option<i64>,
    /// Cap on bytes moved across the sink boundary.
    pub position_limit: Option<u64>,
    /// Cap on uncompressed bytes.
    pub position_full_size_limit: Option<u64>,
    /// Decoder initialisation properties as produced by an encoder.
    pub init_properties: Option<Vec<u8>>,
    /// Capacity of each engine buffer.
    pub buffer_size: Option<usize>,
    /// Pending input that triggers an encode pass; defaults to `buffer_size`.
    pub buffer_threshold: Option<usize>,
    /// Emit a sync-flush block even when nothing was ever written.
    pub sync_flush_when_empty: bool,
    /// Write bare LZMA or LZMA2 data without the `.lzma`/`.xz` container.
    /// The encoder's [`properties`](crate::CompressStream::properties) must
    /// then travel out of band. Decoders switch to bare data whenever
    /// [`init_properties`](Self::init_properties) are given.
    pub raw: bool,
}

impl CompressionOptions {
    /// Creates options with the given type and everything else defaulted.
    #[must_use]
    pub fn new(compression_type: CompressionType) -> Self {
        Self {
            compression_type,
            ..Self::default()
        }
    }

    /// Options for a decompression stream.
    #[must_use]
    pub fn decompress() -> Self {
        Self::new(CompressionType::Decompress)
    }

    /// Options for compressing at an explicit level.
    #[must_use]
    pub fn level(level: i32) -> Self {
        Self::new(CompressionType::Level(level))
    }

    /// Sets [`leave_open`](Self::leave_open).
    pub fn with_leave_open(mut self, leave_open: bool) -> Self {
        self.leave_open = leave_open;
        self
    }

    /// Sets [`version`](Self::version).
    pub fn with_version(mut self, version: CompressionVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets [`thread_count`](Self::thread_count).
    pub fn with_thread_count(mut self, threads: u32) -> Self {
        self.thread_count = Some(threads);
        self
    }

    /// Sets [`block_size`](Self::block_size).
    pub fn with_block_size(mut self, block_size: i64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Sets [`position_limit`](Self::position_limit).
    pub fn with_position_limit(mut self, limit: u64) -> Self {
        self.position_limit = Some(limit);
        self
    }

    /// Sets [`position_full_size_limit`](Self::position_full_size_limit).
    pub fn with_position_full_size_limit(mut self, limit: u64) -> Self {
        self.position_full_size_limit = Some(limit);
        self
    }

    /// Sets [`init_properties`](Self::init_properties).
    pub fn with_init_properties(mut self, properties: impl Into<Vec<u8>>) -> Self {
        self.init_properties = Some(properties.into());
        self
    }

    /// Sets [`buffer_size`](Self::buffer_size).
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Sets [`buffer_threshold`](Self::buffer_threshold).
    pub fn with_buffer_threshold(mut self, threshold: usize) -> Self {
        self.buffer_threshold = Some(threshold);
        self
    }

    /// Sets [`sync_flush_when_empty`](Self::sync_flush_when_empty).
    pub fn with_sync_flush_when_empty(mut self, enabled: bool) -> Self {
        self.sync_flush_when_empty = enabled;
        self
    }

    /// Sets [`raw`](Self::raw).
    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Validates the options for `algorithm` and fills in defaults.
    ///
    /// # Errors
    ///
    /// - [`CompressionError::Unsupported`] when the algorithm's feature is
    ///   disabled or the requested backend version is unavailable.
    /// - [`CompressionError::InvalidArgument`] for an out-of-range level,
    ///   a zero buffer size or thread count, a threshold larger than the
    ///   buffer, a block size of zero or below `-1`, `raw` outside the LZMA
    ///   family, or a raw decoder without `init_properties`.
    pub fn resolve(
        &self,
        algorithm: CompressionAlgorithm,
    ) -> Result<ResolvedOptions, CompressionError> {
        if !algorithm.is_enabled() {
            return Err(CompressionError::unsupported_algorithm(algorithm));
        }

        let defaults = LevelDefaults::for_algorithm(algorithm);
        let is_compress = !self.compression_type.is_decompress();
        let level = defaults.level_for(self.compression_type);
        if is_compress && !defaults.range.contains(&level) {
            return Err(CompressionError::invalid_argument(
                "level",
                format!(
                    "{level} is outside the {algorithm} range {}..={}",
                    defaults.range.start(),
                    defaults.range.end()
                ),
            ));
        }

        resolve_version(algorithm, self.version)?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 {
            return Err(CompressionError::invalid_argument(
                "buffer_size",
                "must be greater than zero",
            ));
        }
        let buffer_threshold = self.buffer_threshold.unwrap_or(buffer_size);
        if buffer_threshold == 0 || buffer_threshold > buffer_size {
            return Err(CompressionError::invalid_argument(
                "buffer_threshold",
                format!("{buffer_threshold} must be within 1..={buffer_size}"),
            ));
        }

        let threads = self.thread_count.unwrap_or(1);
        if threads == 0 {
            return Err(CompressionError::invalid_argument(
                "thread_count",
                "must be at least one",
            ));
        }

        let block_mode = match self.block_size {
            None => BlockMode::Default,
            Some(-1) => BlockMode::Solid,
            Some(size) if size > 0 => BlockMode::Fixed(size as u64),
            Some(size) => {
                return Err(CompressionError::invalid_argument(
                    "block_size",
                    format!("{size} is neither positive nor -1"),
                ));
            }
        };

        let raw = resolve_raw(algorithm, is_compress, self.raw, self.init_properties.is_some())?;

        Ok(ResolvedOptions {
            algorithm,
            is_compress,
            level,
            version: self.version,
            leave_open: self.leave_open,
            threads,
            block_mode,
            position_limit: self.position_limit,
            position_full_size_limit: self.position_full_size_limit,
            init_properties: self.init_properties.clone(),
            buffer_size,
            buffer_threshold,
            sync_flush_when_empty: self.sync_flush_when_empty,
            raw,
        })
    }
}

fn resolve_raw(
    algorithm: CompressionAlgorithm,
    is_compress: bool,
    requested: bool,
    has_properties: bool,
) -> Result<bool, CompressionError> {
    if !algorithm.is_lzma_family() {
        return if requested {
            Err(CompressionError::invalid_argument(
                "raw",
                format!("{algorithm} has no bare stream format"),
            ))
        } else {
            Ok(false)
        };
    }
    if is_compress {
        return Ok(requested);
    }
    if requested && !has_properties {
        return Err(CompressionError::invalid_argument(
            "init_properties",
            "bare LZMA data can only be decoded with the encoder's properties",
        ));
    }
    Ok(has_properties)
}

fn resolve_version(
    algorithm: CompressionAlgorithm,
    version: CompressionVersion,
) -> Result<(), CompressionError> {
    match version {
        CompressionVersion::Default => Ok(()),
        _ if !algorithm.is_deflate_family() => Err(CompressionError::Unsupported(format!(
            "{algorithm} has no alternative backend versions"
        ))),
        CompressionVersion::ZLib => Ok(()),
        CompressionVersion::ZLibNg if cfg!(feature = "zlib-ng") => Ok(()),
        CompressionVersion::ZLibNg => Err(CompressionError::Unsupported(
            "the zlib-ng backend was not compiled in".to_string(),
        )),
    }
}

/// Validated configuration for one algorithm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedOptions {
    /// Algorithm the options were resolved for.
    pub algorithm: CompressionAlgorithm,
    /// `true` for compression, `false` for decompression.
    pub is_compress: bool,
    /// Concrete level inside the algorithm's range.
    pub level: i32,
    /// Deflate backend selection.
    pub version: CompressionVersion,
    /// Whether `close` hands the sink back.
    pub leave_open: bool,
    /// Encoder worker threads (at least one).
    pub threads: u32,
    /// Block layout.
    pub block_mode: BlockMode,
    /// Cap on bytes moved across the sink boundary.
    pub position_limit: Option<u64>,
    /// Cap on uncompressed bytes.
    pub position_full_size_limit: Option<u64>,
    /// Decoder initialisation properties.
    pub init_properties: Option<Vec<u8>>,
    /// Capacity of each engine buffer.
    pub buffer_size: usize,
    /// Pending input that triggers an encode pass.
    pub buffer_threshold: usize,
    /// Emit a sync-flush block even when nothing was ever written.
    pub sync_flush_when_empty: bool,
    /// Bare LZMA/LZMA2 data; decoders are then built from `init_properties`.
    pub raw: bool,
}
