//! LZ4 frame format on top of the `lz4_flex` block primitives.
//!
//! The frame layer is implemented here rather than through
//! `lz4_flex::frame` so the adapters can work on the engine's exchange
//! buffers without an intermediate `Read`/`Write` pair. The encoder emits
//! independent blocks with a content checksum; the decoder also accepts
//! linked blocks, block checksums, a declared content size and leading
//! skippable frames.
//!
//! The compression level only selects the block size:
//!
//! | Level | Block size |
//! |-------|------------|
//! | ..=3  | 64 KiB     |
//! | 4..=6 | 256 KiB    |
//! | 7..=8 | 1 MiB      |
//! | 9..   | 4 MiB      |

pub mod frame;

use buffers::Buffer;
use lz4_flex::block::{
    CompressError, DecompressError, compress_into, decompress_into, decompress_into_with_dict,
    get_maximum_output_size,
};
use xxhash_rust::xxh32::{Xxh32, xxh32};

use crate::algorithm::CompressionAlgorithm;
use crate::codec::{Decoder, Encoder, FinishProgress, FlushProgress, PendingOutput};
use crate::error::{CompressionError, CompressionResultCode, DataFaultKind};
use crate::options::BlockMode;
use crate::trace::trace_decoder_finished;

pub use frame::BlockSize;
use frame::{
    FrameDescriptor, MAGIC, SKIPPABLE_MAGIC, SKIPPABLE_MASK, STORED_BLOCK, WINDOW_SIZE, corrupt,
};

const ALGORITHM: CompressionAlgorithm = CompressionAlgorithm::Lz4;

/// Block size for a level and block mode.
#[must_use]
pub const fn block_size_for(level: i32, mode: BlockMode) -> BlockSize {
    match mode {
        BlockMode::Default => BlockSize::for_level(level),
        BlockMode::Solid => BlockSize::Max4MB,
        BlockMode::Fixed(bytes) => BlockSize::covering(bytes),
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

// ============================================================================
// Encoder
// ============================================================================

/// Streaming LZ4 frame encoder.
pub struct Lz4Encoder {
    block_size: BlockSize,
    block: Vec<u8>,
    scratch: Vec<u8>,
    hasher: Xxh32,
    pending: PendingOutput,
    header_written: bool,
    trailer_written: bool,
}

impl Lz4Encoder {
    /// Creates an encoder; `level` and `mode` only pick the block size.
    #[must_use]
    pub fn new(level: i32, mode: BlockMode) -> Self {
        let block_size = block_size_for(level, mode);
        Self {
            block_size,
            block: Vec::with_capacity(block_size.bytes()),
            scratch: Vec::new(),
            hasher: Xxh32::new(0),
            pending: PendingOutput::default(),
            header_written: false,
            trailer_written: false,
        }
    }

    fn write_header(&mut self) {
        if !self.header_written {
            let descriptor = FrameDescriptor {
                block_independent: true,
                block_checksum: false,
                content_checksum: true,
                content_size: None,
                block_size: self.block_size,
            };
            self.pending.push(&descriptor.encode());
            self.header_written = true;
        }
    }

    /// Compresses the staged block into a block record on the pending queue.
    fn seal_block(&mut self) -> Result<(), CompressionError> {
        if self.block.is_empty() {
            return Ok(());
        }
        self.scratch.resize(get_maximum_output_size(self.block.len()), 0);
        let compressed = compress_into(&self.block, &mut self.scratch)
            .map_err(|error| CompressionError::native(ALGORITHM, "compress_into", -1, error.to_string()))?;

        // Incompressible blocks are stored verbatim.
        if compressed < self.block.len() {
            let header = u32::try_from(compressed)
                .map_err(|_| CompressionError::Contract("lz4 block exceeds u32"))?;
            self.pending.push(&header.to_le_bytes());
            self.pending.push(&self.scratch[..compressed]);
        } else {
            let header = u32::try_from(self.block.len())
                .map_err(|_| CompressionError::Contract("lz4 block exceeds u32"))?;
            self.pending.push(&(header | STORED_BLOCK).to_le_bytes());
            self.pending.push(&self.block);
        }
        self.block.clear();
        Ok(())
    }
}

impl Encoder for Lz4Encoder {
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        self.write_header();
        let mut produced = self.pending.drain_into(output);
        while self.pending.is_empty() && !input.is_empty() {
            let room = self.block_size.bytes() - self.block.len();
            let take = room.min(input.available_read());
            let chunk = &input.readable()[..take];
            self.hasher.update(chunk);
            self.block.extend_from_slice(chunk);
            input.advance_read(take)?;

            if self.block.len() == self.block_size.bytes() {
                self.seal_block()?;
                produced += self.pending.drain_into(output);
            }
        }
        Ok(produced)
    }

    fn flush(&mut self, output: &mut Buffer) -> Result<FlushProgress, CompressionError> {
        self.write_header();
        let mut produced = self.pending.drain_into(output);
        if self.pending.is_empty() {
            self.seal_block()?;
            produced += self.pending.drain_into(output);
        }
        Ok(FlushProgress {
            produced,
            pending: !self.pending.is_empty(),
        })
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<FinishProgress, CompressionError> {
        self.write_header();
        let mut produced = self.pending.drain_into(output);
        if self.pending.is_empty() && !self.trailer_written {
            self.seal_block()?;
            self.pending.push(&0u32.to_le_bytes());
            self.pending.push(&self.hasher.digest().to_le_bytes());
            self.trailer_written = true;
            produced += self.pending.drain_into(output);
        }
        Ok(FinishProgress {
            produced,
            stream_end: self.trailer_written && self.pending.is_empty(),
        })
    }
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Magic,
    SkipSize,
    Skip(u32),
    Descriptor,
    BlockHeader,
    BlockData { len: usize, stored: bool },
    Drain,
    ContentChecksum,
    Done,
}

/// Streaming LZ4 frame decoder for a single frame.
pub struct Lz4Decoder {
    phase: Phase,
    staging: Vec<u8>,
    descriptor: Option<FrameDescriptor>,
    decoded: Vec<u8>,
    decoded_len: usize,
    drained: usize,
    window: Vec<u8>,
    hasher: Xxh32,
    content_len: u64,
    non_empty_input: bool,
}

impl Default for Lz4Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Lz4Decoder {
    /// Creates a decoder waiting for a frame magic number.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Magic,
            staging: Vec::new(),
            descriptor: None,
            decoded: Vec::new(),
            decoded_len: 0,
            drained: 0,
            window: Vec::new(),
            hasher: Xxh32::new(0),
            content_len: 0,
            non_empty_input: false,
        }
    }

    /// Moves input into `staging` until it holds `need` bytes.
    fn fill(&mut self, input: &mut Buffer, need: usize) -> Result<bool, CompressionError> {
        let missing = need.saturating_sub(self.staging.len());
        let take = missing.min(input.available_read());
        self.staging.extend_from_slice(&input.readable()[..take]);
        input.advance_read(take)?;
        Ok(self.staging.len() >= need)
    }

    fn descriptor(&self) -> Result<FrameDescriptor, CompressionError> {
        self.descriptor
            .ok_or(CompressionError::Contract("lz4 block before frame descriptor"))
    }

    fn decode_block(&mut self, len: usize, stored: bool) -> Result<(), CompressionError> {
        let descriptor = self.descriptor()?;
        let data_len = if descriptor.block_checksum { len - 4 } else { len };
        let (data, checksum) = self.staging.split_at(data_len);
        if descriptor.block_checksum && xxh32(data, 0) != read_u32(checksum) {
            return Err(CompressionError::data(
                ALGORITHM,
                DataFaultKind::Checksum,
                "block checksum mismatch",
            ));
        }

        self.decoded.resize(descriptor.block_size.bytes(), 0);
        self.decoded_len = if stored {
            self.decoded[..data_len].copy_from_slice(data);
            data_len
        } else if descriptor.block_independent {
            decompress_into(data, &mut self.decoded).map_err(|error| corrupt(error.to_string()))?
        } else {
            decompress_into_with_dict(data, &mut self.decoded, &self.window)
                .map_err(|error| corrupt(error.to_string()))?
        };

        let block = &self.decoded[..self.decoded_len];
        if descriptor.content_checksum {
            self.hasher.update(block);
        }
        if !descriptor.block_independent {
            self.window.extend_from_slice(block);
            let excess = self.window.len().saturating_sub(WINDOW_SIZE);
            self.window.drain(..excess);
        }
        self.content_len += self.decoded_len as u64;
        self.drained = 0;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), CompressionError> {
        let descriptor = self.descriptor()?;
        if let Some(expected) = descriptor.content_size {
            if expected != self.content_len {
                return Err(corrupt(format!(
                    "content size {} does not match declared {expected}",
                    self.content_len
                )));
            }
        }
        self.phase = Phase::Done;
        Ok(())
    }

    /// Advances the state machine by one phase. Returns false when it needs
    /// more input or more output space.
    fn step(&mut self, input: &mut Buffer, output: &mut Buffer, produced: &mut usize) -> Result<bool, CompressionError> {
        match self.phase {
            Phase::Magic => {
                if !self.fill(input, 4)? {
                    return Ok(false);
                }
                let magic = read_u32(&self.staging);
                self.staging.clear();
                if magic == MAGIC {
                    self.phase = Phase::Descriptor;
                } else if magic & SKIPPABLE_MASK == SKIPPABLE_MAGIC {
                    self.phase = Phase::SkipSize;
                } else {
                    return Err(corrupt(format!("bad frame magic {magic:#010x}")));
                }
            }
            Phase::SkipSize => {
                if !self.fill(input, 4)? {
                    return Ok(false);
                }
                let size = read_u32(&self.staging);
                self.staging.clear();
                self.phase = Phase::Skip(size);
            }
            Phase::Skip(remaining) => {
                if remaining == 0 {
                    self.phase = Phase::Magic;
                    return Ok(true);
                }
                if input.is_empty() {
                    return Ok(false);
                }
                let take = input.available_read().min(remaining as usize);
                input.advance_read(take)?;
                self.phase = Phase::Skip(remaining - take as u32);
            }
            Phase::Descriptor => {
                if !self.fill(input, 1)? {
                    return Ok(false);
                }
                let len = FrameDescriptor::descriptor_len(self.staging[0]);
                if !self.fill(input, len)? {
                    return Ok(false);
                }
                self.descriptor = Some(FrameDescriptor::parse(&self.staging)?);
                self.staging.clear();
                self.phase = Phase::BlockHeader;
            }
            Phase::BlockHeader => {
                if !self.fill(input, 4)? {
                    return Ok(false);
                }
                let word = read_u32(&self.staging);
                self.staging.clear();
                let descriptor = self.descriptor()?;
                if word == 0 {
                    if descriptor.content_checksum {
                        self.phase = Phase::ContentChecksum;
                    } else {
                        self.end_frame()?;
                    }
                    return Ok(true);
                }
                let len = (word & !STORED_BLOCK) as usize;
                if len > descriptor.block_size.bytes() {
                    return Err(corrupt(format!(
                        "block of {len} bytes exceeds the declared maximum of {}",
                        descriptor.block_size.bytes()
                    )));
                }
                let trailer = if descriptor.block_checksum { 4 } else { 0 };
                self.phase = Phase::BlockData {
                    len: len + trailer,
                    stored: word & STORED_BLOCK != 0,
                };
            }
            Phase::BlockData { len, stored } => {
                if !self.fill(input, len)? {
                    return Ok(false);
                }
                self.decode_block(len, stored)?;
                self.staging.clear();
                self.phase = Phase::Drain;
            }
            Phase::Drain => {
                let pending = &self.decoded[self.drained..self.decoded_len];
                let space = output.writable();
                let copied = space.len().min(pending.len());
                space[..copied].copy_from_slice(&pending[..copied]);
                output.advance_write(copied)?;
                self.drained += copied;
                *produced += copied;
                if self.drained < self.decoded_len {
                    return Ok(false);
                }
                self.phase = Phase::BlockHeader;
            }
            Phase::ContentChecksum => {
                if !self.fill(input, 4)? {
                    return Ok(false);
                }
                let expected = read_u32(&self.staging);
                self.staging.clear();
                if expected != self.hasher.digest() {
                    return Err(CompressionError::data(
                        ALGORITHM,
                        DataFaultKind::Checksum,
                        "content checksum mismatch",
                    ));
                }
                self.end_frame()?;
            }
            Phase::Done => return Ok(false),
        }
        Ok(true)
    }
}

impl Decoder for Lz4Decoder {
    fn algorithm(&self) -> CompressionAlgorithm {
        ALGORITHM
    }

    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        if self.phase == Phase::Done {
            return Ok(0);
        }
        self.non_empty_input |= !input.is_empty();
        let mut produced = 0;
        while self.step(input, output, &mut produced)? {}
        if self.phase == Phase::Done {
            trace_decoder_finished(ALGORITHM, input.available_read() as u64);
        }
        Ok(produced)
    }

    fn finished(&self) -> bool {
        self.phase == Phase::Done
    }

    fn non_empty_input(&self) -> bool {
        self.non_empty_input
    }

    fn internal_buffered_bytes(&self) -> u64 {
        self.staging.len() as u64
    }

    fn needs_input(&self) -> bool {
        self.phase != Phase::Drain
    }

    fn end_of_input(&mut self) -> Result<(), CompressionError> {
        match self.phase {
            Phase::Done => Ok(()),
            // Nothing but skippable frames, or nothing at all.
            Phase::Magic if self.staging.is_empty() => {
                self.phase = Phase::Done;
                Ok(())
            }
            _ => Err(CompressionError::truncated(ALGORITHM)),
        }
    }
}

// ============================================================================
// Block codec
// ============================================================================

pub(crate) fn compress_bound(len: usize) -> usize {
    get_maximum_output_size(len)
}

pub(crate) fn compress_block(src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    compress_into(src, dst).map_err(|error| match error {
        CompressError::OutputTooSmall => CompressionResultCode::InsufficientBuffer,
        #[allow(unreachable_patterns)]
        _ => CompressionResultCode::Error,
    })
}

pub(crate) fn decompress_block(src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    decompress_into(src, dst).map_err(|error| match error {
        DecompressError::OutputTooSmall { .. } => CompressionResultCode::InsufficientBuffer,
        _ => CompressionResultCode::InvalidData,
    })
}
