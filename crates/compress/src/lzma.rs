//! LZMA, LZMA2 and multi-threaded LZMA2 adapters over `xz2`.
//!
//! | Algorithm   | Container     | Encoder                         |
//! |-------------|---------------|---------------------------------|
//! | `Lzma`      | `.lzma` alone | `lzma_alone_encoder`            |
//! | `Lzma2`     | `.xz`         | `lzma_stream_encoder`, CRC64    |
//! | `FastLzma2` | `.xz`         | `lzma_stream_encoder_mt`, CRC64 |
//!
//! Both containers describe their own properties. With
//! [`raw`](crate::CompressionOptions::raw) set, the encoder writes bare LZMA
//! or LZMA2 data instead, as archive formats store it, and the decoder is
//! built from `init_properties`: five bytes for `Lzma` (lc/lp/pb and the
//! dictionary size), one byte for the LZMA2 variants (dictionary size only).
//!
//! `xz2` reaches liblzma through its container coders only, so bare data is
//! framed at the edges. The encoder cuts the `.lzma` header, or the `.xz`
//! stream header, block header, index and footer, off its output. The
//! decoder feeds liblzma a synthetic header built from the properties before
//! the input and, for LZMA2, a matching index and footer once the input is
//! exhausted. Bare LZMA data must end with an end-of-payload marker, and
//! bare LZMA2 data must end with its end-of-data chunk and nothing after it.
//! Bare Fast-LZMA2 output is single threaded.

use buffers::Buffer;
use flate2::Crc;
use xz2::stream::{Action, Check, Error as XzError, Filters, LzmaOptions, MtStreamBuilder, Status, Stream};

use crate::algorithm::CompressionAlgorithm;
use crate::codec::{Decoder, Encoder, FinishProgress, FlushProgress};
use crate::error::{CompressionError, CompressionResultCode};
use crate::options::{BlockMode, ResolvedOptions};
use crate::trace::trace_decoder_finished;

/// Literal context bits used for the `.lzma` container.
pub const LITERAL_CONTEXT_BITS: u32 = 3;
/// Literal position bits used for the `.lzma` container.
pub const LITERAL_POSITION_BITS: u32 = 0;
/// Position bits used for the `.lzma` container.
pub const POSITION_BITS: u32 = 2;

const DICTIONARY_SIZES: [u32; 10] = [
    256 << 10,
    1 << 20,
    2 << 20,
    4 << 20,
    4 << 20,
    8 << 20,
    8 << 20,
    16 << 20,
    32 << 20,
    64 << 20,
];

/// Properties byte, dictionary size and the 64-bit uncompressed size.
const ALONE_HEADER_LEN: usize = 13;
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];
const XZ_STREAM_HEADER_LEN: usize = 12;
const XZ_FOOTER_LEN: usize = 12;
/// Block header of the synthetic `.xz` wrapper: one LZMA2 filter, no sizes.
const XZ_BLOCK_HEADER_LEN: usize = 12;
const LZMA2_FILTER_ID: u8 = 0x21;

/// Dictionary size liblzma uses for preset `level`.
#[must_use]
pub fn dictionary_size(level: i32) -> u32 {
    let index = usize::try_from(level.clamp(0, 9)).unwrap_or_default();
    DICTIONARY_SIZES[index]
}

/// The five `.lzma` property bytes: the lc/lp/pb byte and the dictionary
/// size in little endian.
#[must_use]
pub fn lzma_properties(dictionary_size: u32) -> [u8; 5] {
    let packed = (POSITION_BITS * 5 + LITERAL_POSITION_BITS) * 9 + LITERAL_CONTEXT_BITS;
    let mut properties = [0u8; 5];
    properties[0] = u8::try_from(packed).unwrap_or(0x5d);
    properties[1..].copy_from_slice(&dictionary_size.to_le_bytes());
    properties
}

/// The one-byte LZMA2 dictionary size encoding.
///
/// Values `0..=39` encode `(2 | (p & 1)) << (p / 2 + 11)`; 40 means 4 GiB − 1.
#[must_use]
pub fn lzma2_properties(dictionary_size: u32) -> u8 {
    for p in 0u8..40 {
        if u64::from(dictionary_size) <= lzma2_dictionary_size(p) {
            return p;
        }
    }
    40
}

fn lzma2_dictionary_size(p: u8) -> u64 {
    if p >= 40 {
        return u64::from(u32::MAX);
    }
    (2u64 | u64::from(p & 1)) << (u32::from(p) / 2 + 11)
}

fn crc32(bytes: &[u8]) -> [u8; 4] {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum().to_le_bytes()
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().enumerate().take(9) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Container header that makes liblzma accept bare data described by
/// `properties`.
fn bare_prefix(algorithm: CompressionAlgorithm, properties: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let expected = if algorithm == CompressionAlgorithm::Lzma { 5 } else { 1 };
    if properties.len() != expected {
        return Err(CompressionError::invalid_argument(
            "init_properties",
            format!("{algorithm} expects {expected} property bytes, got {}", properties.len()),
        ));
    }
    let invalid = |detail: String| CompressionError::invalid_argument("init_properties", detail);

    if algorithm == CompressionAlgorithm::Lzma {
        let packed = properties[0];
        if packed >= 9 * 5 * 5 {
            return Err(invalid(format!("invalid lc/lp/pb byte {packed:#04x}")));
        }
        let (lc, lp) = (packed % 9, packed / 9 % 5);
        if lc + lp > 4 {
            return Err(invalid(format!("lc {lc} plus lp {lp} exceeds 4")));
        }
        let mut prefix = Vec::with_capacity(ALONE_HEADER_LEN);
        prefix.extend_from_slice(properties);
        // Unknown uncompressed size: the data ends with a marker.
        prefix.extend_from_slice(&u64::MAX.to_le_bytes());
        return Ok(prefix);
    }

    if properties[0] > 40 {
        return Err(invalid(format!("invalid LZMA2 dictionary size byte {}", properties[0])));
    }
    let mut prefix = Vec::with_capacity(XZ_STREAM_HEADER_LEN + XZ_BLOCK_HEADER_LEN);
    prefix.extend_from_slice(&XZ_MAGIC);
    // No integrity check.
    let flags = [0u8, 0];
    prefix.extend_from_slice(&flags);
    prefix.extend_from_slice(&crc32(&flags));
    let block = [
        (XZ_BLOCK_HEADER_LEN / 4 - 1) as u8,
        0x00,
        LZMA2_FILTER_ID,
        1,
        properties[0],
        0,
        0,
        0,
    ];
    prefix.extend_from_slice(&block);
    prefix.extend_from_slice(&crc32(&block));
    Ok(prefix)
}

/// Block padding, index and footer closing a synthetic `.xz` wrapper around
/// `compressed` bare bytes that decoded to `uncompressed` bytes.
fn xz_tail(compressed: u64, uncompressed: u64) -> Vec<u8> {
    let padding = compressed.next_multiple_of(4) - compressed;
    let mut tail = vec![0u8; padding as usize];

    let mut index = vec![0x00];
    put_varint(&mut index, 1);
    put_varint(&mut index, XZ_BLOCK_HEADER_LEN as u64 + compressed);
    put_varint(&mut index, uncompressed);
    index.resize(index.len().next_multiple_of(4), 0);
    let index_crc = crc32(&index);
    index.extend_from_slice(&index_crc);

    let mut footer = ((index.len() / 4 - 1) as u32).to_le_bytes().to_vec();
    footer.extend_from_slice(&[0, 0]);
    tail.extend_from_slice(&index);
    tail.extend_from_slice(&crc32(&footer));
    tail.extend_from_slice(&footer);
    tail.extend_from_slice(b"YZ");
    tail
}

/// Size of the LZMA2 data in an `.xz` stream from its index. `stream` ends
/// with the footer; `block_header_len` is the length of its only block
/// header.
fn xz_payload_len(stream: &[u8], block_header_len: usize) -> Option<u64> {
    let footer = stream.len().checked_sub(XZ_FOOTER_LEN)?;
    let backward: [u8; 4] = stream.get(footer + 4..footer + 8)?.try_into().ok()?;
    let index_len = (usize::try_from(u32::from_le_bytes(backward)).ok()? + 1) * 4;
    let index = stream.get(footer.checked_sub(index_len)?..footer)?;
    if index.first() != Some(&0) {
        return None;
    }
    let (records, used) = read_varint(&index[1..])?;
    if records != 1 {
        return None;
    }
    let (unpadded, _) = read_varint(&index[1 + used..])?;
    unpadded.checked_sub(block_header_len as u64)
}

fn preset(level: i32) -> u32 {
    level.clamp(0, 9).unsigned_abs()
}

fn encoder_error(algorithm: CompressionAlgorithm, function: &'static str, error: XzError) -> CompressionError {
    match error {
        XzError::Program => CompressionError::Contract("liblzma reported a programming error"),
        other => CompressionError::native(algorithm, function, error_code(&other), other.to_string()),
    }
}

fn decoder_error(algorithm: CompressionAlgorithm, error: XzError) -> CompressionError {
    match error {
        XzError::Data | XzError::Format | XzError::Options => {
            CompressionError::corrupt(algorithm, error.to_string())
        }
        other => encoder_error(algorithm, "lzma_code", other),
    }
}

const fn error_code(error: &XzError) -> i32 {
    match error {
        XzError::Mem => 5,
        XzError::MemLimit => 6,
        XzError::Format => 7,
        XzError::Options => 8,
        XzError::Data => 9,
        XzError::Program => 11,
        _ => -1,
    }
}

fn build_encoder(options: &ResolvedOptions) -> Result<Stream, CompressionError> {
    let algorithm = options.algorithm;
    let mut lzma = LzmaOptions::new_preset(preset(options.level))
        .map_err(|error| encoder_error(algorithm, "lzma_lzma_preset", error))?;
    lzma.dict_size(dictionary_size(options.level));

    match algorithm {
        CompressionAlgorithm::Lzma => {
            lzma.literal_context_bits(LITERAL_CONTEXT_BITS)
                .literal_position_bits(LITERAL_POSITION_BITS)
                .position_bits(POSITION_BITS);
            Stream::new_lzma_encoder(&lzma).map_err(|error| encoder_error(algorithm, "lzma_alone_encoder", error))
        }
        CompressionAlgorithm::FastLzma2 if options.block_mode != BlockMode::Solid && !options.raw => {
            let mut builder = MtStreamBuilder::new();
            builder
                .threads(options.threads)
                .preset(preset(options.level))
                .check(Check::Crc64);
            if let BlockMode::Fixed(bytes) = options.block_mode {
                builder.block_size(bytes);
            }
            builder
                .encoder()
                .map_err(|error| encoder_error(algorithm, "lzma_stream_encoder_mt", error))
        }
        _ => {
            let mut filters = Filters::new();
            filters.lzma2(&lzma);
            // Bare output is cut out of the block, so no check may follow it.
            let check = if options.raw { Check::None } else { Check::Crc64 };
            Stream::new_stream_encoder(&filters, check)
                .map_err(|error| encoder_error(algorithm, "lzma_stream_encoder", error))
        }
    }
}

fn build_decoder(algorithm: CompressionAlgorithm) -> Result<Stream, CompressionError> {
    match algorithm {
        CompressionAlgorithm::Lzma => Stream::new_lzma_decoder(u64::MAX)
            .map_err(|error| encoder_error(algorithm, "lzma_alone_decoder", error)),
        _ => Stream::new_stream_decoder(u64::MAX, 0)
            .map_err(|error| encoder_error(algorithm, "lzma_stream_decoder", error)),
    }
}

/// Result of one `lzma_code` call in terms of buffer movement.
struct Step {
    consumed: usize,
    produced: usize,
    status: Status,
}

fn code(stream: &mut Stream, input: &[u8], output: &mut [u8], action: Action) -> Result<Step, XzError> {
    let before_in = stream.total_in();
    let before_out = stream.total_out();
    let status = stream.process(input, output, action)?;
    Ok(Step {
        consumed: usize::try_from(stream.total_in() - before_in).unwrap_or(input.len()),
        produced: usize::try_from(stream.total_out() - before_out).unwrap_or(0),
        status,
    })
}

/// Cuts the container off encoder output in bare mode.
struct BareOutput {
    /// Container header bytes still to drop.
    header_left: usize,
    /// The next byte after the `.xz` stream header sizes the block header.
    block_header_next: bool,
    block_header_len: usize,
    /// The `.xz` index and footer follow the data.
    xz: bool,
    /// Bare bytes handed out so far.
    released: u64,
    pending: Vec<u8>,
    ended: bool,
}

impl BareOutput {
    fn new(algorithm: CompressionAlgorithm) -> Self {
        let xz = algorithm != CompressionAlgorithm::Lzma;
        Self {
            header_left: if xz { XZ_STREAM_HEADER_LEN } else { ALONE_HEADER_LEN },
            block_header_next: xz,
            block_header_len: 0,
            xz,
            released: 0,
            pending: Vec::new(),
            ended: false,
        }
    }

    /// Takes encoder output, dropping header bytes as they arrive.
    fn absorb(&mut self, produced: &[u8]) {
        self.pending.extend_from_slice(produced);
        loop {
            if self.header_left > 0 {
                let dropped = self.header_left.min(self.pending.len());
                self.pending.drain(..dropped);
                self.header_left -= dropped;
                if self.header_left > 0 {
                    return;
                }
            }
            if !self.block_header_next {
                return;
            }
            let Some(&size) = self.pending.first() else {
                return;
            };
            self.block_header_next = false;
            self.block_header_len = (usize::from(size) + 1) * 4;
            self.header_left = self.block_header_len;
        }
    }

    /// Drops the `.xz` padding, index and footer once the encoder reported
    /// the end of the stream.
    fn end_stream(&mut self) -> Result<(), CompressionError> {
        self.ended = true;
        if !self.xz {
            return Ok(());
        }
        let keep = xz_payload_len(&self.pending, self.block_header_len)
            .and_then(|payload| payload.checked_sub(self.released))
            .and_then(|keep| usize::try_from(keep).ok())
            .filter(|&keep| keep <= self.pending.len())
            .ok_or(CompressionError::Contract("liblzma wrote an unreadable .xz index"))?;
        self.pending.truncate(keep);
        Ok(())
    }

    fn release(&mut self, output: &mut Buffer) -> usize {
        let written = output.write_from(&self.pending);
        self.pending.drain(..written);
        self.released += written as u64;
        written
    }
}

/// Streaming encoder for the LZMA family.
pub struct LzmaEncoder {
    algorithm: CompressionAlgorithm,
    stream: Stream,
    flush_action: Option<Action>,
    properties: Vec<u8>,
    bare: Option<BareOutput>,
}

impl LzmaEncoder {
    /// Builds the encoder selected by `options.algorithm`.
    pub fn new(options: &ResolvedOptions) -> Result<Self, CompressionError> {
        let algorithm = options.algorithm;
        let dictionary = dictionary_size(options.level);
        let (flush_action, properties) = match algorithm {
            // LZMA1 has no flush marker.
            CompressionAlgorithm::Lzma => (None, lzma_properties(dictionary).to_vec()),
            CompressionAlgorithm::FastLzma2 if options.block_mode != BlockMode::Solid && !options.raw => {
                (Some(Action::FullFlush), vec![lzma2_properties(dictionary)])
            }
            _ => (Some(Action::SyncFlush), vec![lzma2_properties(dictionary)]),
        };
        Ok(Self {
            algorithm,
            stream: build_encoder(options)?,
            flush_action,
            properties,
            bare: options.raw.then(|| BareOutput::new(algorithm)),
        })
    }

    /// Accounts for `produced` bytes liblzma wrote at the start of
    /// `output.writable()`.
    fn emit(&mut self, output: &mut Buffer, produced: usize) -> Result<usize, CompressionError> {
        let Some(bare) = self.bare.as_mut() else {
            output.advance_write(produced)?;
            return Ok(produced);
        };
        bare.absorb(&output.writable()[..produced]);
        Ok(bare.release(output))
    }
}

impl Encoder for LzmaEncoder {
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        let step = code(&mut self.stream, input.readable(), output.writable(), Action::Run)
            .map_err(|error| encoder_error(self.algorithm, "lzma_code", error))?;
        input.advance_read(step.consumed)?;
        self.emit(output, step.produced)
    }

    fn flush(&mut self, output: &mut Buffer) -> Result<FlushProgress, CompressionError> {
        let Some(action) = self.flush_action else {
            return Ok(FlushProgress::default());
        };
        let step = code(&mut self.stream, &[], output.writable(), action)
            .map_err(|error| encoder_error(self.algorithm, "lzma_code", error))?;
        let produced = self.emit(output, step.produced)?;
        let held = self.bare.as_ref().is_some_and(|bare| !bare.pending.is_empty());
        Ok(FlushProgress {
            produced,
            pending: step.status != Status::StreamEnd || held,
        })
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<FinishProgress, CompressionError> {
        let Some(bare) = self.bare.as_mut() else {
            let step = code(&mut self.stream, &[], output.writable(), Action::Finish)
                .map_err(|error| encoder_error(self.algorithm, "lzma_code", error))?;
            output.advance_write(step.produced)?;
            return Ok(FinishProgress {
                produced: step.produced,
                stream_end: step.status == Status::StreamEnd,
            });
        };

        // The container trailer is only recognisable once the stream ended.
        let mut scratch = [0u8; 4096];
        while !bare.ended {
            let step = code(&mut self.stream, &[], &mut scratch, Action::Finish)
                .map_err(|error| encoder_error(self.algorithm, "lzma_code", error))?;
            bare.absorb(&scratch[..step.produced]);
            if step.status == Status::StreamEnd {
                bare.end_stream()?;
            } else if step.produced == 0 {
                return Err(CompressionError::Contract("encoder finish made no progress"));
            }
        }
        let produced = bare.release(output);
        Ok(FinishProgress {
            produced,
            stream_end: bare.pending.is_empty(),
        })
    }

    fn properties(&self) -> Option<Vec<u8>> {
        Some(self.properties.clone())
    }
}

/// Synthetic container framing around bare decoder input.
struct BareInput {
    /// Header bytes liblzma has not accepted yet.
    prefix: Vec<u8>,
    /// An `.xz` index and footer close the input.
    xz: bool,
    consumed: u64,
    produced: u64,
}

/// Streaming decoder for the LZMA family; stops at the end of the first
/// stream.
pub struct LzmaDecoder {
    algorithm: CompressionAlgorithm,
    stream: Stream,
    finished: bool,
    non_empty_input: bool,
    bare: Option<BareInput>,
}

impl LzmaDecoder {
    /// Builds the decoder selected by `options.algorithm`. Bare data needs
    /// `options.init_properties`.
    pub fn new(options: &ResolvedOptions) -> Result<Self, CompressionError> {
        let algorithm = options.algorithm;
        let bare = if options.raw {
            let properties = options.init_properties.as_deref().unwrap_or_default();
            Some(BareInput {
                prefix: bare_prefix(algorithm, properties)?,
                xz: algorithm != CompressionAlgorithm::Lzma,
                consumed: 0,
                produced: 0,
            })
        } else {
            None
        };
        Ok(Self {
            algorithm,
            stream: build_decoder(algorithm)?,
            finished: false,
            non_empty_input: false,
            bare,
        })
    }

    /// Closes a synthetic `.xz` wrapper; true when liblzma accepted it.
    fn close_bare_stream(&mut self) -> bool {
        let Some(bare) = self.bare.as_ref().filter(|bare| bare.xz && bare.prefix.is_empty()) else {
            return false;
        };
        let tail = xz_tail(bare.consumed, bare.produced);
        let mut scratch = [0u8; 64];
        let mut offset = 0;
        loop {
            let Ok(step) = code(&mut self.stream, &tail[offset..], &mut scratch, Action::Run) else {
                return false;
            };
            offset += step.consumed;
            if step.status == Status::StreamEnd {
                return step.produced == 0;
            }
            if step.produced > 0 || step.consumed == 0 {
                return false;
            }
        }
    }
}

impl Decoder for LzmaDecoder {
    fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        if self.finished {
            return Ok(0);
        }
        self.non_empty_input |= !input.is_empty();

        if let Some(bare) = self.bare.as_mut() {
            if !bare.prefix.is_empty() {
                let step = code(&mut self.stream, &bare.prefix, output.writable(), Action::Run)
                    .map_err(|error| decoder_error(self.algorithm, error))?;
                bare.prefix.drain(..step.consumed);
                if !bare.prefix.is_empty() {
                    return Ok(0);
                }
            }
        }

        let step = code(&mut self.stream, input.readable(), output.writable(), Action::Run)
            .map_err(|error| decoder_error(self.algorithm, error))?;
        input.advance_read(step.consumed)?;
        output.advance_write(step.produced)?;
        if let Some(bare) = self.bare.as_mut() {
            bare.consumed += step.consumed as u64;
            bare.produced += step.produced as u64;
        }

        if step.status == Status::StreamEnd {
            self.finished = true;
            trace_decoder_finished(self.algorithm, input.available_read() as u64);
        }
        Ok(step.produced)
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn non_empty_input(&self) -> bool {
        self.non_empty_input
    }

    fn end_of_input(&mut self) -> Result<(), CompressionError> {
        if !self.finished && self.non_empty_input && self.close_bare_stream() {
            self.finished = true;
            trace_decoder_finished(self.algorithm, 0);
        }
        if self.non_empty_input && !self.finished {
            return Err(CompressionError::truncated(self.algorithm));
        }
        Ok(())
    }
}

// ============================================================================
// Block codec
// ============================================================================

pub(crate) const fn compress_bound(algorithm: CompressionAlgorithm, len: usize) -> usize {
    match algorithm {
        // Header, worst-case range coder expansion and end marker.
        CompressionAlgorithm::Lzma => len + (len >> 4) + 1024,
        // LZMA2 chunk overhead plus block header, check, stream header,
        // footer and index.
        _ => len + 3 * (len / 65_536 + 1) + 1 + 1024 + 64 + 12 + 12 + 24,
    }
}

pub(crate) fn compress_block(options: &ResolvedOptions, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    if options.raw {
        return compress_bare_block(options, src, dst);
    }
    let mut stream = build_encoder(options).map_err(|_| CompressionResultCode::InvalidParameter)?;
    run_block(&mut stream, src, dst, Action::Finish, CompressionResultCode::Error)
}

pub(crate) fn decompress_block(
    options: &ResolvedOptions,
    src: &[u8],
    dst: &mut [u8],
) -> Result<usize, CompressionResultCode> {
    if options.raw {
        return decompress_bare_block(options, src, dst);
    }
    let mut stream = build_decoder(options.algorithm).map_err(|_| CompressionResultCode::Error)?;
    run_block(&mut stream, src, dst, Action::Run, CompressionResultCode::InvalidData)
}

fn run_block(
    stream: &mut Stream,
    src: &[u8],
    dst: &mut [u8],
    action: Action,
    failure: CompressionResultCode,
) -> Result<usize, CompressionResultCode> {
    let (mut read, mut written) = (0, 0);
    loop {
        let step = code(stream, &src[read..], &mut dst[written..], action).map_err(|_| failure)?;
        read += step.consumed;
        written += step.produced;
        if step.status == Status::StreamEnd {
            return Ok(written);
        }
        if step.consumed == 0 && step.produced == 0 {
            return Err(if written == dst.len() {
                CompressionResultCode::InsufficientBuffer
            } else {
                failure
            });
        }
    }
}

/// Staging buffers for the streaming adapters. One spare output byte lets
/// liblzma reach the end marker when the result fills `dst` exactly.
fn block_buffers(src: &[u8], dst_len: usize) -> Result<(Buffer, Buffer), CompressionResultCode> {
    let mut input = Buffer::unpooled(src.len().max(1)).map_err(|_| CompressionResultCode::Error)?;
    input.write_from(src);
    let output = Buffer::unpooled(dst_len + 1).map_err(|_| CompressionResultCode::Error)?;
    Ok((input, output))
}

fn copy_out(output: &Buffer, dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    let produced = output.readable();
    let target = dst.get_mut(..produced.len()).ok_or(CompressionResultCode::InsufficientBuffer)?;
    target.copy_from_slice(produced);
    Ok(produced.len())
}

fn compress_bare_block(options: &ResolvedOptions, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    let mut encoder = LzmaEncoder::new(options).map_err(|_| CompressionResultCode::InvalidParameter)?;
    let (mut input, mut output) = block_buffers(src, dst.len())?;
    while !input.is_empty() {
        let before = input.available_read();
        let produced = encoder
            .encode(&mut input, &mut output)
            .map_err(|_| CompressionResultCode::Error)?;
        if produced == 0 && before == input.available_read() {
            return Err(CompressionResultCode::InsufficientBuffer);
        }
    }
    loop {
        let progress = encoder.finish(&mut output).map_err(|_| CompressionResultCode::Error)?;
        if progress.stream_end {
            break;
        }
        if progress.produced == 0 {
            return Err(CompressionResultCode::InsufficientBuffer);
        }
    }
    copy_out(&output, dst)
}

fn decompress_bare_block(options: &ResolvedOptions, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    let mut decoder = LzmaDecoder::new(options).map_err(|error| match error {
        CompressionError::InvalidArgument { .. } => CompressionResultCode::InvalidParameter,
        _ => CompressionResultCode::Error,
    })?;
    let (mut input, mut output) = block_buffers(src, dst.len())?;
    while !decoder.finished() {
        let before = input.available_read();
        let produced = decoder
            .decode(&mut input, &mut output)
            .map_err(|_| CompressionResultCode::InvalidData)?;
        if produced == 0 && before == input.available_read() {
            if output.available_write() == 0 {
                return Err(CompressionResultCode::InsufficientBuffer);
            }
            decoder.end_of_input().map_err(|_| CompressionResultCode::InvalidData)?;
            break;
        }
    }
    copy_out(&output, dst)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::error::DataFaultKind;
    use crate::options::CompressionOptions;

    fn resolved(algorithm: CompressionAlgorithm, options: CompressionOptions) -> ResolvedOptions {
        options.resolve(algorithm).expect("resolve")
    }

    fn encode_all(encoder: &mut LzmaEncoder, data: &[u8]) -> Vec<u8> {
        let mut input = Buffer::unpooled(data.len().max(1)).expect("capacity");
        input.write_from(data);
        let mut output = Buffer::unpooled(4096).expect("capacity");
        let mut compressed = Vec::new();
        while !input.is_empty() {
            encoder.encode(&mut input, &mut output).expect("encode");
            compressed.extend_from_slice(output.readable());
            output.reset();
        }
        loop {
            let progress = encoder.finish(&mut output).expect("finish");
            compressed.extend_from_slice(output.readable());
            output.reset();
            if progress.stream_end {
                return compressed;
            }
        }
    }

    fn decode_all(decoder: &mut LzmaDecoder, compressed: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut input = Buffer::unpooled(compressed.len().max(1)).expect("capacity");
        input.write_from(compressed);
        let mut output = Buffer::unpooled(4096).expect("capacity");
        let mut decoded = Vec::new();
        while !decoder.finished() {
            let before = input.available_read();
            let produced = decoder.decode(&mut input, &mut output)?;
            decoded.extend_from_slice(output.readable());
            output.reset();
            if produced == 0 && before == input.available_read() {
                decoder.end_of_input()?;
                break;
            }
        }
        Ok(decoded)
    }

    #[test]
    fn property_encodings() {
        assert_eq!(lzma_properties(1 << 20), [0x5d, 0x00, 0x00, 0x10, 0x00]);
        assert_eq!(lzma2_properties(4096), 0);
        assert_eq!(lzma2_properties(1 << 20), 16);
        assert_eq!(lzma2_properties(3 << 20), 19);
        assert_eq!(lzma2_properties(u32::MAX), 40);
        assert_eq!(dictionary_size(5), 8 << 20);
    }

    #[test]
    fn lzma_alone_stream_reads_back_with_xz2() {
        let data = b"lzma alone container ".repeat(300);
        let options = resolved(CompressionAlgorithm::Lzma, CompressionOptions::level(6));
        let mut encoder = LzmaEncoder::new(&options).expect("encoder");
        let compressed = encode_all(&mut encoder, &data);

        let properties = encoder.properties().expect("properties");
        assert_eq!(properties.len(), 5);
        assert_eq!(&compressed[..5], properties.as_slice());

        let stream = Stream::new_lzma_decoder(u64::MAX).expect("decoder");
        let mut decoded = Vec::new();
        xz2::read::XzDecoder::new_stream(compressed.as_slice(), stream)
            .read_to_end(&mut decoded)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn xz_streams_interoperate() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 13) as u8).collect();
        for algorithm in [CompressionAlgorithm::Lzma2, CompressionAlgorithm::FastLzma2] {
            let options = resolved(algorithm, CompressionOptions::level(1).with_thread_count(2));
            let mut encoder = LzmaEncoder::new(&options).expect("encoder");
            let compressed = encode_all(&mut encoder, &data);
            assert_eq!(encoder.properties().map(|p| p.len()), Some(1));

            let mut decoded = Vec::new();
            xz2::read::XzDecoder::new(compressed.as_slice())
                .read_to_end(&mut decoded)
                .expect("decode");
            assert_eq!(decoded, data, "{algorithm}");
        }
    }

    #[test]
    fn decoder_leaves_bytes_after_stream() {
        let options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::level(1));
        let mut compressed = encode_all(&mut LzmaEncoder::new(&options).expect("encoder"), b"first");
        compressed.extend_from_slice(b"rest");

        let decode_options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::decompress());
        let mut decoder = LzmaDecoder::new(&decode_options).expect("decoder");
        let mut input = Buffer::unpooled(compressed.len()).expect("capacity");
        input.write_from(&compressed);
        let mut output = Buffer::unpooled(64).expect("capacity");
        while !decoder.finished() {
            decoder.decode(&mut input, &mut output).expect("decode");
        }
        assert_eq!(output.readable(), b"first");
        assert_eq!(input.readable(), b"rest");
    }

    #[test]
    fn sync_flush_emits_decodable_prefix() {
        let options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::level(3));
        let mut encoder = LzmaEncoder::new(&options).expect("encoder");
        let mut input = Buffer::unpooled(64).expect("capacity");
        input.write_from(b"flush me");
        let mut output = Buffer::unpooled(4096).expect("capacity");
        while !input.is_empty() {
            encoder.encode(&mut input, &mut output).expect("encode");
        }
        while encoder.flush(&mut output).expect("flush").pending {}

        let decode_options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::decompress());
        let mut decoder = LzmaDecoder::new(&decode_options).expect("decoder");
        let mut compressed = Buffer::unpooled(4096).expect("capacity");
        compressed.write_from(output.readable());
        let mut decoded = Buffer::unpooled(64).expect("capacity");
        decoder.decode(&mut compressed, &mut decoded).expect("decode");
        assert_eq!(decoded.readable(), b"flush me");
        assert!(!decoder.finished());
    }

    #[test]
    fn bare_data_decodes_with_out_of_band_properties() {
        let data = b"stored in an archive entry ".repeat(200);
        for algorithm in [CompressionAlgorithm::Lzma, CompressionAlgorithm::Lzma2, CompressionAlgorithm::FastLzma2] {
            let options = resolved(algorithm, CompressionOptions::level(3).with_raw(true));
            let mut encoder = LzmaEncoder::new(&options).expect("encoder");
            let compressed = encode_all(&mut encoder, &data);
            let properties = encoder.properties().expect("properties");
            assert_ne!(&compressed[..2], &[0xfd, b'7'], "{algorithm}: no xz magic");

            let decode_options = resolved(
                algorithm,
                CompressionOptions::decompress().with_init_properties(properties),
            );
            let mut decoder = LzmaDecoder::new(&decode_options).expect("decoder");
            assert_eq!(decode_all(&mut decoder, &compressed).expect("decode"), data, "{algorithm}");
            assert!(decoder.finished());
        }
    }

    #[test]
    fn bare_framing_is_accepted_by_stock_decoders() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        for algorithm in [CompressionAlgorithm::Lzma, CompressionAlgorithm::Lzma2] {
            let options = resolved(algorithm, CompressionOptions::level(2).with_raw(true));
            let mut encoder = LzmaEncoder::new(&options).expect("encoder");
            let bare = encode_all(&mut encoder, &data);
            let properties = encoder.properties().expect("properties");

            let mut wrapped = bare_prefix(algorithm, &properties).expect("prefix");
            wrapped.extend_from_slice(&bare);
            let mut decoded = Vec::new();
            if algorithm == CompressionAlgorithm::Lzma {
                let stream = Stream::new_lzma_decoder(u64::MAX).expect("decoder");
                xz2::read::XzDecoder::new_stream(wrapped.as_slice(), stream)
                    .read_to_end(&mut decoded)
                    .expect("decode .lzma");
            } else {
                wrapped.extend_from_slice(&xz_tail(bare.len() as u64, data.len() as u64));
                xz2::read::XzDecoder::new(wrapped.as_slice())
                    .read_to_end(&mut decoded)
                    .expect("decode .xz");
            }
            assert_eq!(decoded, data, "{algorithm}");
        }
    }

    #[test]
    fn bare_lzma2_is_the_block_data_of_an_xz_stream() {
        let data = b"block payload ".repeat(2000);
        let options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::level(4).with_raw(true));
        let bare = encode_all(&mut LzmaEncoder::new(&options).expect("encoder"), &data);

        let mut container = Vec::new();
        let stream = build_encoder(&options).expect("stream encoder");
        let mut writer = xz2::write::XzEncoder::new_stream(&mut container, stream);
        std::io::Write::write_all(&mut writer, &data).expect("write");
        writer.finish().expect("finish");

        let start = XZ_STREAM_HEADER_LEN + XZ_BLOCK_HEADER_LEN;
        assert_eq!(container[XZ_STREAM_HEADER_LEN], 2, "twelve-byte block header");
        assert_eq!(&container[start..start + bare.len()], bare.as_slice());
        assert_eq!(
            xz_payload_len(&container[start..], XZ_BLOCK_HEADER_LEN),
            Some(bare.len() as u64)
        );
    }

    #[test]
    fn truncated_bare_lzma2_is_reported() {
        let data = b"cut short ".repeat(500);
        let options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::level(1).with_raw(true));
        let mut encoder = LzmaEncoder::new(&options).expect("encoder");
        let bare = encode_all(&mut encoder, &data);
        let decode_options = resolved(
            CompressionAlgorithm::Lzma2,
            CompressionOptions::decompress().with_init_properties(encoder.properties().expect("properties")),
        );

        let err = decode_all(
            &mut LzmaDecoder::new(&decode_options).expect("decoder"),
            &bare[..bare.len() - 3],
        )
        .expect_err("truncated");
        assert_eq!(err.data_fault(), Some(DataFaultKind::Truncated));
    }

    #[test]
    fn bare_prefix_validates_properties() {
        let prefix = bare_prefix(CompressionAlgorithm::Lzma, &lzma_properties(1 << 16)).expect("lzma");
        assert_eq!(prefix.len(), ALONE_HEADER_LEN);
        assert_eq!(&prefix[5..], &[0xff; 8]);
        let prefix = bare_prefix(CompressionAlgorithm::Lzma2, &[16]).expect("lzma2");
        assert_eq!(prefix.len(), XZ_STREAM_HEADER_LEN + XZ_BLOCK_HEADER_LEN);
        assert_eq!(&prefix[..6], &XZ_MAGIC);

        assert!(bare_prefix(CompressionAlgorithm::Lzma, &[225, 0, 0, 1, 0]).is_err());
        // lc 4, lp 1
        assert!(bare_prefix(CompressionAlgorithm::Lzma, &[13, 0, 0, 1, 0]).is_err());
        assert!(bare_prefix(CompressionAlgorithm::Lzma2, &[41]).is_err());
        assert!(bare_prefix(CompressionAlgorithm::FastLzma2, &[16, 0]).is_err());
        assert_eq!(lzma2_dictionary_size(16), 1 << 20);
        assert_eq!(lzma2_dictionary_size(40), u64::from(u32::MAX));
    }

    #[test]
    fn bare_block_round_trip() {
        let data = b"bare block ".repeat(300);
        let cases = [
            (CompressionAlgorithm::Lzma, lzma_properties(dictionary_size(2)).to_vec()),
            (CompressionAlgorithm::Lzma2, vec![lzma2_properties(dictionary_size(2))]),
        ];
        for (algorithm, properties) in cases {
            let options = resolved(algorithm, CompressionOptions::level(2).with_raw(true));
            let mut dst = vec![0u8; compress_bound(algorithm, data.len())];
            let written = compress_block(&options, &data, &mut dst).expect("compress");

            let decode_options = resolved(algorithm, CompressionOptions::decompress().with_init_properties(properties));
            let mut decoded = vec![0u8; data.len()];
            assert_eq!(decompress_block(&decode_options, &dst[..written], &mut decoded), Ok(data.len()));
            assert_eq!(decoded, data, "{algorithm}");

            let mut short = vec![0u8; data.len() - 1];
            assert_eq!(
                decompress_block(&decode_options, &dst[..written], &mut short),
                Err(CompressionResultCode::InsufficientBuffer)
            );
        }
    }

    #[test]
    fn bad_properties_are_rejected() {
        let bad_length = resolved(
            CompressionAlgorithm::Lzma2,
            CompressionOptions::decompress().with_init_properties(vec![1, 2]),
        );
        assert!(matches!(
            LzmaDecoder::new(&bad_length),
            Err(CompressionError::InvalidArgument { name: "init_properties", .. })
        ));

        let options = resolved(CompressionAlgorithm::Lzma, CompressionOptions::level(1));
        let container = encode_all(&mut LzmaEncoder::new(&options).expect("encoder"), b"props");
        let decode_options = resolved(
            CompressionAlgorithm::Lzma,
            CompressionOptions::decompress().with_init_properties(lzma_properties(1 << 20).to_vec()),
        );
        // A `.lzma` header is not valid bare data.
        let mut decoder = LzmaDecoder::new(&decode_options).expect("decoder");
        assert!(decode_all(&mut decoder, &container).is_err());
    }

    #[test]
    fn truncation_and_garbage() {
        let options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::level(1));
        let compressed = encode_all(&mut LzmaEncoder::new(&options).expect("encoder"), &[9u8; 5000]);
        let decode_options = resolved(CompressionAlgorithm::Lzma2, CompressionOptions::decompress());

        let err = decode_all(
            &mut LzmaDecoder::new(&decode_options).expect("decoder"),
            &compressed[..compressed.len() - 8],
        )
        .expect_err("truncated");
        assert_eq!(err.data_fault(), Some(DataFaultKind::Truncated));

        let err = decode_all(
            &mut LzmaDecoder::new(&decode_options).expect("decoder"),
            b"this is not an xz stream",
        )
        .expect_err("garbage");
        assert_eq!(err.data_fault(), Some(DataFaultKind::Corrupt));
    }

    #[test]
    fn block_codec_round_trip_and_small_buffer() {
        let data = b"lzma block ".repeat(400);
        for algorithm in [CompressionAlgorithm::Lzma, CompressionAlgorithm::Lzma2] {
            let options = resolved(algorithm, CompressionOptions::level(2));
            let mut dst = vec![0u8; compress_bound(algorithm, data.len())];
            let written = compress_block(&options, &data, &mut dst).expect("compress");

            let mut decoded = vec![0u8; data.len()];
            let decode_options = resolved(algorithm, CompressionOptions::decompress());
            assert_eq!(decompress_block(&decode_options, &dst[..written], &mut decoded), Ok(data.len()));
            assert_eq!(decoded, data);

            let mut tiny = vec![0u8; 8];
            assert_eq!(
                compress_block(&options, &data, &mut tiny),
                Err(CompressionResultCode::InsufficientBuffer)
            );
        }
    }
}
