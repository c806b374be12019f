//! Enumeration of the compression algorithms understood by the crate.

use core::fmt;
use core::str::FromStr;

/// Compression algorithms recognised by the crate.
///
/// Every variant exists regardless of the enabled cargo features so that
/// configuration files stay portable. Constructing a stream or block codec for
/// an algorithm whose feature is disabled fails with
/// [`CompressionError::Unsupported`](crate::CompressionError::Unsupported).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CompressionAlgorithm {
    /// Pass-through; bytes are stored unchanged.
    Copy,
    /// Raw deflate without framing.
    Deflate,
    /// Deflate wrapped in the zlib header and Adler-32 trailer.
    #[default]
    ZLib,
    /// Deflate wrapped in GZip members with a CRC-32 trailer.
    GZip,
    /// Brotli.
    Brotli,
    /// LZMA in the `.lzma` (alone) container.
    Lzma,
    /// LZMA2 in the `.xz` container.
    Lzma2,
    /// LZMA2 in the `.xz` container, encoded by the multi-threaded block encoder.
    FastLzma2,
    /// LZ4 frame format.
    Lz4,
    /// Zstandard.
    ZStd,
}

impl CompressionAlgorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Copy,
        Self::Deflate,
        Self::ZLib,
        Self::GZip,
        Self::Brotli,
        Self::Lzma,
        Self::Lzma2,
        Self::FastLzma2,
        Self::Lz4,
        Self::ZStd,
    ];

    /// Returns the canonical display name used in diagnostics and option files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Deflate => "deflate",
            Self::ZLib => "zlib",
            Self::GZip => "gzip",
            Self::Brotli => "brotli",
            Self::Lzma => "lzma",
            Self::Lzma2 => "lzma2",
            Self::FastLzma2 => "fast-lzma2",
            Self::Lz4 => "lz4",
            Self::ZStd => "zstd",
        }
    }

    /// Reports whether support for the algorithm was compiled in.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        match self {
            Self::Copy | Self::Deflate | Self::ZLib | Self::GZip => true,
            Self::Brotli => cfg!(feature = "brotli"),
            Self::Lzma | Self::Lzma2 | Self::FastLzma2 => cfg!(feature = "lzma"),
            Self::Lz4 => cfg!(feature = "lz4"),
            Self::ZStd => cfg!(feature = "zstd"),
        }
    }

    /// Returns the algorithms available in the current build.
    #[must_use]
    pub fn available() -> Vec<Self> {
        Self::ALL.into_iter().filter(|algorithm| algorithm.is_enabled()).collect()
    }

    /// Reports whether `thread_count` above one changes encoder behaviour.
    #[must_use]
    pub const fn supports_threads(self) -> bool {
        matches!(self, Self::ZStd | Self::FastLzma2)
    }

    /// Reports whether the encoder exposes coder properties after construction.
    #[must_use]
    pub const fn produces_properties(self) -> bool {
        matches!(self, Self::Lzma | Self::Lzma2 | Self::FastLzma2)
    }

    /// Reports whether the algorithm belongs to the deflate family.
    #[must_use]
    pub const fn is_deflate_family(self) -> bool {
        matches!(self, Self::Deflate | Self::ZLib | Self::GZip)
    }

    /// LZMA, LZMA2 or Fast-LZMA2.
    #[must_use]
    pub const fn is_lzma_family(self) -> bool {
        matches!(self, Self::Lzma | Self::Lzma2 | Self::FastLzma2)
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when attempting to parse an unknown compression algorithm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompressionAlgorithmParseError {
    input: String,
}

impl CompressionAlgorithmParseError {
    /// Creates a parse error capturing the original input.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the invalid input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for CompressionAlgorithmParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown compression algorithm: {}", self.input)
    }
}

impl std::error::Error for CompressionAlgorithmParseError {}

impl FromStr for CompressionAlgorithm {
    type Err = CompressionAlgorithmParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" | "none" | "store" => Ok(Self::Copy),
            "deflate" | "raw-deflate" => Ok(Self::Deflate),
            "zlib" => Ok(Self::ZLib),
            "gzip" | "gz" => Ok(Self::GZip),
            "brotli" | "br" => Ok(Self::Brotli),
            "lzma" | "lzma1" => Ok(Self::Lzma),
            "lzma2" | "xz" => Ok(Self::Lzma2),
            "fast-lzma2" | "fastlzma2" | "flzma2" => Ok(Self::FastLzma2),
            "lz4" => Ok(Self::Lz4),
            "zstd" | "zstandard" => Ok(Self::ZStd),
            other => Err(CompressionAlgorithmParseError::new(other)),
        }
    }
}
