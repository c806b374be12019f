//! LZ4 frame descriptor encoding and parsing.
//!
//! Layout of a frame:
//!
//! ```text
//! magic (4, LE 0x184D2204) | FLG | BD | [content size (8)] | [dict id (4)] | HC
//! { block size (4, LE, high bit = stored) | data | [block checksum (4)] }*
//! end mark (4, zero) | [content checksum (4)]
//! ```

use xxhash_rust::xxh32::xxh32;

use crate::algorithm::CompressionAlgorithm;
use crate::error::{CompressionError, DataFaultKind};

pub(crate) const MAGIC: u32 = 0x184D_2204;
pub(crate) const SKIPPABLE_MAGIC: u32 = 0x184D_2A50;
pub(crate) const SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;

/// High bit of a block size word: the block is stored uncompressed.
pub(crate) const STORED_BLOCK: u32 = 0x8000_0000;

/// History kept for linked blocks.
pub(crate) const WINDOW_SIZE: usize = 64 * 1024;

const VERSION: u8 = 0b0100_0000;
const VERSION_MASK: u8 = 0b1100_0000;
const BLOCK_INDEPENDENT: u8 = 0x20;
const BLOCK_CHECKSUM: u8 = 0x10;
const CONTENT_SIZE: u8 = 0x08;
const CONTENT_CHECKSUM: u8 = 0x04;
const FLG_RESERVED: u8 = 0x02;
const DICT_ID: u8 = 0x01;
const BD_RESERVED: u8 = 0b1000_1111;

/// Maximum uncompressed block size declared in the BD byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockSize {
    /// 64 KiB.
    Max64KB,
    /// 256 KiB.
    Max256KB,
    /// 1 MiB.
    Max1MB,
    /// 4 MiB.
    Max4MB,
}

impl BlockSize {
    /// Block size used for a compression level.
    #[must_use]
    pub const fn for_level(level: i32) -> Self {
        match level {
            i32::MIN..=3 => Self::Max64KB,
            4..=6 => Self::Max256KB,
            7..=8 => Self::Max1MB,
            _ => Self::Max4MB,
        }
    }

    /// Smallest block size holding `bytes`, capped at 4 MiB.
    #[must_use]
    pub const fn covering(bytes: u64) -> Self {
        match bytes {
            0..=0x1_0000 => Self::Max64KB,
            0x1_0001..=0x4_0000 => Self::Max256KB,
            0x4_0001..=0x10_0000 => Self::Max1MB,
            _ => Self::Max4MB,
        }
    }

    /// Block size in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Max64KB => 64 * 1024,
            Self::Max256KB => 256 * 1024,
            Self::Max1MB => 1024 * 1024,
            Self::Max4MB => 4 * 1024 * 1024,
        }
    }

    const fn code(self) -> u8 {
        match self {
            Self::Max64KB => 4,
            Self::Max256KB => 5,
            Self::Max1MB => 6,
            Self::Max4MB => 7,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(Self::Max64KB),
            5 => Some(Self::Max256KB),
            6 => Some(Self::Max1MB),
            7 => Some(Self::Max4MB),
            _ => None,
        }
    }
}

/// Decoded frame descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FrameDescriptor {
    pub(crate) block_independent: bool,
    pub(crate) block_checksum: bool,
    pub(crate) content_checksum: bool,
    pub(crate) content_size: Option<u64>,
    pub(crate) block_size: BlockSize,
}

impl FrameDescriptor {
    /// Magic plus descriptor bytes, including the header checksum.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut flg = VERSION;
        if self.block_independent {
            flg |= BLOCK_INDEPENDENT;
        }
        if self.block_checksum {
            flg |= BLOCK_CHECKSUM;
        }
        if self.content_size.is_some() {
            flg |= CONTENT_SIZE;
        }
        if self.content_checksum {
            flg |= CONTENT_CHECKSUM;
        }

        let mut out = Vec::with_capacity(19);
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.push(flg);
        out.push(self.block_size.code() << 4);
        if let Some(size) = self.content_size {
            out.extend_from_slice(&size.to_le_bytes());
        }
        out.push(header_checksum(&out[4..]));
        out
    }

    /// Length of the descriptor (after the magic) announced by `flg`.
    pub(crate) const fn descriptor_len(flg: u8) -> usize {
        let mut len = 3;
        if flg & CONTENT_SIZE != 0 {
            len += 8;
        }
        if flg & DICT_ID != 0 {
            len += 4;
        }
        len
    }

    /// Parses a complete descriptor (FLG through HC, without the magic).
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, CompressionError> {
        let (&flg, rest) = bytes
            .split_first()
            .ok_or_else(|| corrupt("empty frame descriptor"))?;
        if bytes.len() != Self::descriptor_len(flg) {
            return Err(corrupt("frame descriptor length mismatch"));
        }
        if flg & VERSION_MASK != VERSION {
            return Err(corrupt(format!("unsupported frame version in FLG {flg:#04x}")));
        }
        if flg & FLG_RESERVED != 0 {
            return Err(corrupt("reserved FLG bit set"));
        }
        if flg & DICT_ID != 0 {
            return Err(CompressionError::Unsupported(
                "lz4 frames with a dictionary id".to_string(),
            ));
        }
        let bd = rest[0];
        if bd & BD_RESERVED != 0 {
            return Err(corrupt("reserved BD bits set"));
        }
        let block_size = BlockSize::from_code(bd >> 4)
            .ok_or_else(|| corrupt(format!("invalid block size code {}", bd >> 4)))?;

        let (checksum, fields) = bytes[1..]
            .split_last()
            .ok_or_else(|| corrupt("missing header checksum"))?;
        if *checksum != header_checksum(&bytes[..bytes.len() - 1]) {
            return Err(CompressionError::data(
                CompressionAlgorithm::Lz4,
                DataFaultKind::Checksum,
                "frame descriptor checksum mismatch",
            ));
        }

        let content_size = (flg & CONTENT_SIZE != 0).then(|| {
            let mut size = [0u8; 8];
            size.copy_from_slice(&fields[1..9]);
            u64::from_le_bytes(size)
        });

        Ok(Self {
            block_independent: flg & BLOCK_INDEPENDENT != 0,
            block_checksum: flg & BLOCK_CHECKSUM != 0,
            content_checksum: flg & CONTENT_CHECKSUM != 0,
            content_size,
            block_size,
        })
    }
}

fn header_checksum(descriptor: &[u8]) -> u8 {
    ((xxh32(descriptor, 0) >> 8) & 0xff) as u8
}

pub(crate) fn corrupt(detail: impl Into<String>) -> CompressionError {
    CompressionError::corrupt(CompressionAlgorithm::Lz4, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(content_size: Option<u64>) -> FrameDescriptor {
        FrameDescriptor {
            block_independent: true,
            block_checksum: false,
            content_checksum: true,
            content_size,
            block_size: BlockSize::Max256KB,
        }
    }

    #[test]
    fn descriptor_round_trips() {
        for content_size in [None, Some(123_456)] {
            let original = descriptor(content_size);
            let encoded = original.encode();
            assert_eq!(&encoded[..4], &MAGIC.to_le_bytes());
            assert_eq!(FrameDescriptor::descriptor_len(encoded[4]), encoded.len() - 4);
            assert_eq!(FrameDescriptor::parse(&encoded[4..]).expect("parse"), original);
        }
    }

    #[test]
    fn header_checksum_mismatch_detected() {
        let mut encoded = descriptor(None).encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x55;
        let err = FrameDescriptor::parse(&encoded[4..]).expect_err("checksum");
        assert_eq!(err.data_fault(), Some(DataFaultKind::Checksum));
    }

    #[test]
    fn block_size_mapping() {
        assert_eq!(BlockSize::for_level(1), BlockSize::Max64KB);
        assert_eq!(BlockSize::for_level(6), BlockSize::Max256KB);
        assert_eq!(BlockSize::for_level(12), BlockSize::Max4MB);
        assert_eq!(BlockSize::covering(100_000), BlockSize::Max256KB);
        assert_eq!(BlockSize::covering(u64::MAX), BlockSize::Max4MB);
    }
}
