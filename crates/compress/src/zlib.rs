//! # Overview
//!
//! Deflate family adapters built on [`flate2`]'s raw [`Compress`] and
//! [`Decompress`] state machines. One encoder and one decoder serve all
//! three framings:
//!
//! - [`DeflateFraming::Raw`]: bare deflate blocks.
//! - [`DeflateFraming::Zlib`]: zlib header and Adler-32 trailer, produced by
//!   flate2 itself.
//! - [`DeflateFraming::Gzip`]: the RFC 1952 member header and CRC-32/ISIZE
//!   trailer, handled here around a raw deflate body.
//!
//! # Concatenated GZip members
//!
//! When a member ends and the remaining input starts with the GZip magic,
//! the decoder resets in place and keeps going. Anything else after a member
//! finishes the stream and stays unconsumed. A member that ends exactly at
//! the end of the buffered input does not finish the stream: the decoder asks
//! for more input, and only an exhausted sink settles the boundary.
//!
//! Member headers and trailers are staged inside the adapter, so optional
//! header fields may be longer than the exchange buffer. Staged bytes count
//! as internally buffered until the field is complete.

mod gzip;

use buffers::Buffer;
use flate2::{Compress, Compression, Crc, Decompress, FlushCompress, FlushDecompress, Status};

use crate::algorithm::CompressionAlgorithm;
use crate::codec::{Decoder, Encoder, FinishProgress, FlushProgress, PendingOutput};
use crate::error::{CompressionError, CompressionResultCode, DataFaultKind};
use crate::trace::{trace_decoder_finished, trace_gzip_member};

/// Framing applied around deflate blocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeflateFraming {
    /// No header or trailer.
    Raw,
    /// zlib header and Adler-32 trailer.
    Zlib,
    /// GZip member header and CRC-32/ISIZE trailer.
    Gzip,
}

impl DeflateFraming {
    /// Returns the framing used by a deflate family algorithm.
    #[must_use]
    pub const fn for_algorithm(algorithm: CompressionAlgorithm) -> Option<Self> {
        match algorithm {
            CompressionAlgorithm::Deflate => Some(Self::Raw),
            CompressionAlgorithm::ZLib => Some(Self::Zlib),
            CompressionAlgorithm::GZip => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Interprets a zlib `windowBits` value: `-15..=-8` selects raw deflate,
    /// `8..=15` zlib and `24..=31` (16 added) GZip.
    pub fn from_window_bits(bits: i32) -> Result<Self, CompressionError> {
        match bits {
            -15..=-8 => Ok(Self::Raw),
            8..=15 => Ok(Self::Zlib),
            24..=31 => Ok(Self::Gzip),
            other => Err(CompressionError::invalid_argument(
                "window_bits",
                format!("{other} is not a valid deflate window"),
            )),
        }
    }

    /// The canonical `windowBits` value for this framing.
    #[must_use]
    pub const fn window_bits(self) -> i32 {
        match self {
            Self::Raw => -15,
            Self::Zlib => 15,
            Self::Gzip => 31,
        }
    }

    /// Algorithm reported in errors.
    #[must_use]
    pub const fn algorithm(self) -> CompressionAlgorithm {
        match self {
            Self::Raw => CompressionAlgorithm::Deflate,
            Self::Zlib => CompressionAlgorithm::ZLib,
            Self::Gzip => CompressionAlgorithm::GZip,
        }
    }

    const fn zlib_header(self) -> bool {
        matches!(self, Self::Zlib)
    }
}

fn compression_for(level: i32) -> Result<Compression, CompressionError> {
    u32::try_from(level)
        .ok()
        .filter(|level| *level <= 9)
        .map(Compression::new)
        .ok_or_else(|| {
            CompressionError::invalid_argument("level", format!("{level} is outside 0..=9"))
        })
}

/// Steps `compress` once over `input`, advancing `output` by what it wrote.
/// Returns the input bytes consumed, the bytes produced and the status.
fn compress_step(
    compress: &mut Compress,
    input: &[u8],
    output: &mut Buffer,
    flush: FlushCompress,
    algorithm: CompressionAlgorithm,
) -> Result<(usize, usize, Status), CompressionError> {
    let (before_in, before_out) = (compress.total_in(), compress.total_out());
    let status = compress
        .compress(input, output.writable(), flush)
        .map_err(|error| CompressionError::native(algorithm, "deflate", -2, error.to_string()))?;
    let consumed = (compress.total_in() - before_in) as usize;
    let produced = (compress.total_out() - before_out) as usize;
    output.advance_write(produced)?;
    Ok((consumed, produced, status))
}

/// Encoder for raw deflate, zlib and GZip.
pub struct DeflateEncoder {
    compress: Compress,
    framing: DeflateFraming,
    level: i32,
    crc: Crc,
    pending: PendingOutput,
    header_written: bool,
    body_finished: bool,
}

impl DeflateEncoder {
    /// Creates an encoder at `level` (`0..=9`).
    pub fn new(framing: DeflateFraming, level: i32) -> Result<Self, CompressionError> {
        Ok(Self {
            compress: Compress::new(compression_for(level)?, framing.zlib_header()),
            framing,
            level,
            crc: Crc::new(),
            pending: PendingOutput::default(),
            header_written: false,
            body_finished: false,
        })
    }

    /// Queues the GZip header and hands over queued framing bytes. Returns the
    /// bytes copied and whether the queue is now empty.
    fn drain_framing(&mut self, output: &mut Buffer) -> (usize, bool) {
        if !self.header_written {
            self.header_written = true;
            if self.framing == DeflateFraming::Gzip {
                self.pending.push(&gzip::header(self.level));
            }
        }
        let copied = self.pending.drain_into(output);
        (copied, self.pending.is_empty())
    }
}

impl Encoder for DeflateEncoder {
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        let (copied, drained) = self.drain_framing(output);
        if !drained {
            return Ok(copied);
        }
        let (consumed, produced, _) = compress_step(
            &mut self.compress,
            input.readable(),
            output,
            FlushCompress::None,
            self.framing.algorithm(),
        )?;
        if self.framing == DeflateFraming::Gzip {
            self.crc.update(&input.readable()[..consumed]);
        }
        input.advance_read(consumed)?;
        Ok(copied + produced)
    }

    fn flush(&mut self, output: &mut Buffer) -> Result<FlushProgress, CompressionError> {
        let (copied, drained) = self.drain_framing(output);
        if !drained {
            return Ok(FlushProgress {
                produced: copied,
                pending: true,
            });
        }
        let (_, produced, _) = compress_step(
            &mut self.compress,
            &[],
            output,
            FlushCompress::Sync,
            self.framing.algorithm(),
        )?;
        Ok(FlushProgress {
            produced: copied + produced,
            pending: output.trailing_space() == 0,
        })
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<FinishProgress, CompressionError> {
        let (mut produced, drained) = self.drain_framing(output);
        if !drained {
            return Ok(FinishProgress {
                produced,
                stream_end: false,
            });
        }
        if !self.body_finished {
            let (_, written, status) = compress_step(
                &mut self.compress,
                &[],
                output,
                FlushCompress::Finish,
                self.framing.algorithm(),
            )?;
            produced += written;
            if status != Status::StreamEnd {
                return Ok(FinishProgress {
                    produced,
                    stream_end: false,
                });
            }
            self.body_finished = true;
            if self.framing == DeflateFraming::Gzip {
                self.pending.push(&gzip::trailer(&self.crc));
            }
            produced += self.pending.drain_into(output);
        }
        Ok(FinishProgress {
            produced,
            stream_end: self.pending.is_empty(),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum GzipPhase {
    Header,
    Body,
    Trailer,
    MemberEnd,
}

/// Decoder for raw deflate, zlib and (multi-member) GZip.
pub struct DeflateDecoder {
    decompress: Decompress,
    framing: DeflateFraming,
    phase: GzipPhase,
    crc: Crc,
    /// Header or trailer bytes taken from the input before the field is complete.
    staged: Vec<u8>,
    members: u32,
    finished: bool,
    non_empty_input: bool,
}

impl DeflateDecoder {
    /// Creates a decoder for `framing`.
    #[must_use]
    pub fn new(framing: DeflateFraming) -> Self {
        Self {
            decompress: Decompress::new(framing.zlib_header()),
            framing,
            phase: if framing == DeflateFraming::Gzip {
                GzipPhase::Header
            } else {
                GzipPhase::Body
            },
            crc: Crc::new(),
            staged: Vec::new(),
            members: 0,
            finished: false,
            non_empty_input: false,
        }
    }

    /// Number of GZip members fully decoded so far.
    #[must_use]
    pub const fn members(&self) -> u32 {
        self.members
    }

    /// Inflates once; returns bytes produced and whether the deflate body ended.
    fn inflate(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<(usize, bool), CompressionError> {
        let algorithm = self.framing.algorithm();
        let (before_in, before_out) = (self.decompress.total_in(), self.decompress.total_out());
        let status = self
            .decompress
            .decompress(input.readable(), output.writable(), FlushDecompress::None)
            .map_err(|error| CompressionError::corrupt(algorithm, error.to_string()))?;
        let consumed = (self.decompress.total_in() - before_in) as usize;
        let produced = (self.decompress.total_out() - before_out) as usize;
        if self.framing == DeflateFraming::Gzip {
            self.crc.update(&output.writable()[..produced]);
        }
        input.advance_read(consumed)?;
        output.advance_write(produced)?;
        Ok((produced, status == Status::StreamEnd))
    }

    fn finish_members(&mut self, input: &Buffer) {
        self.finished = true;
        let leftover = input.available_read() + self.staged.len();
        trace_decoder_finished(CompressionAlgorithm::GZip, leftover as u64);
    }

    /// Stages input into the member header. Returns `false` while the header
    /// is incomplete or when the bytes after a member are not another member.
    fn stage_header(&mut self, input: &mut Buffer) -> Result<bool, CompressionError> {
        let prior = self.staged.len();
        let available = input.available_read();
        self.staged.extend_from_slice(input.readable());

        if self.members > 0 && self.staged.len() >= 2 && self.staged[..2] != gzip::MAGIC {
            self.staged.truncate(prior);
            self.finish_members(input);
            return Ok(false);
        }
        match gzip::parse_header(&self.staged)? {
            Some(length) => {
                input.advance_read(length - prior)?;
                self.staged.clear();
                Ok(true)
            }
            None if self.staged.len() > gzip::MAX_HEADER_LEN => Err(CompressionError::corrupt(
                CompressionAlgorithm::GZip,
                format!("member header is longer than {} bytes", gzip::MAX_HEADER_LEN),
            )),
            None => {
                input.advance_read(available)?;
                Ok(false)
            }
        }
    }

    /// Stages input into the trailer. Returns it once all eight bytes arrived.
    fn stage_trailer(&mut self, input: &mut Buffer) -> Result<Option<[u8; gzip::TRAILER_LEN]>, CompressionError> {
        let take = (gzip::TRAILER_LEN - self.staged.len()).min(input.available_read());
        self.staged.extend_from_slice(&input.readable()[..take]);
        input.advance_read(take)?;
        if self.staged.len() < gzip::TRAILER_LEN {
            return Ok(None);
        }
        let mut trailer = [0u8; gzip::TRAILER_LEN];
        trailer.copy_from_slice(&self.staged);
        self.staged.clear();
        Ok(Some(trailer))
    }

    fn decode_gzip(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        let mut produced = 0;
        loop {
            match self.phase {
                GzipPhase::Header => {
                    if !self.stage_header(input)? {
                        return Ok(produced);
                    }
                    self.phase = GzipPhase::Body;
                }
                GzipPhase::Body => {
                    let (written, ended) = self.inflate(input, output)?;
                    produced += written;
                    if !ended {
                        return Ok(produced);
                    }
                    self.phase = GzipPhase::Trailer;
                }
                GzipPhase::Trailer => {
                    let Some(trailer) = self.stage_trailer(input)? else {
                        return Ok(produced);
                    };
                    let (crc, size) = gzip::parse_trailer(&trailer);
                    if crc != self.crc.sum() || size != self.crc.amount() {
                        return Err(CompressionError::data(
                            CompressionAlgorithm::GZip,
                            DataFaultKind::Checksum,
                            format!("member {} trailer does not match its content", self.members),
                        ));
                    }
                    self.members += 1;
                    self.phase = GzipPhase::MemberEnd;
                }
                // An empty input says nothing yet; the next member may still be in the source.
                GzipPhase::MemberEnd => match input.readable().first() {
                    None => return Ok(produced),
                    Some(&byte) if byte == gzip::MAGIC[0] => {
                        self.decompress.reset(false);
                        self.crc.reset();
                        self.phase = GzipPhase::Header;
                        trace_gzip_member(self.members);
                    }
                    Some(_) => {
                        self.finish_members(input);
                        return Ok(produced);
                    }
                },
            }
        }
    }

    /// The source ended between members: nothing or a lone magic byte follows.
    fn at_member_boundary(&self) -> bool {
        self.members > 0
            && match self.phase {
                GzipPhase::MemberEnd => true,
                GzipPhase::Header => self.staged.len() < 2,
                GzipPhase::Body | GzipPhase::Trailer => false,
            }
    }
}

impl Decoder for DeflateDecoder {
    fn algorithm(&self) -> CompressionAlgorithm {
        self.framing.algorithm()
    }

    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        if self.finished {
            return Ok(0);
        }
        self.non_empty_input |= !input.is_empty();
        if self.framing == DeflateFraming::Gzip {
            return self.decode_gzip(input, output);
        }

        let (produced, ended) = self.inflate(input, output)?;
        if ended {
            self.finished = true;
            trace_decoder_finished(self.framing.algorithm(), input.available_read() as u64);
        }
        Ok(produced)
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn non_empty_input(&self) -> bool {
        self.non_empty_input
    }

    fn internal_buffered_bytes(&self) -> u64 {
        self.staged.len() as u64
    }

    fn end_of_input(&mut self) -> Result<(), CompressionError> {
        if !self.finished && self.at_member_boundary() {
            self.finished = true;
            trace_decoder_finished(CompressionAlgorithm::GZip, self.staged.len() as u64);
        }
        if self.non_empty_input && !self.finished {
            return Err(CompressionError::truncated(self.framing.algorithm()));
        }
        Ok(())
    }
}

// ============================================================================
// Block codec
// ============================================================================

/// Worst-case compressed size (zlib `compressBound`, plus GZip framing).
pub(crate) const fn compress_bound(framing: DeflateFraming, len: usize) -> usize {
    let bound = len + (len >> 12) + (len >> 14) + (len >> 25) + 13;
    match framing {
        DeflateFraming::Gzip => bound + 18,
        DeflateFraming::Raw | DeflateFraming::Zlib => bound,
    }
}

pub(crate) fn compress_block(
    framing: DeflateFraming,
    level: i32,
    src: &[u8],
    dst: &mut [u8],
) -> Result<usize, CompressionResultCode> {
    let compression = compression_for(level).map_err(|_| CompressionResultCode::InvalidParameter)?;
    let mut compress = Compress::new(compression, framing.zlib_header());

    let (header_len, body_end) = match framing {
        DeflateFraming::Gzip => {
            let header = gzip::header(level);
            let body_end = dst
                .len()
                .checked_sub(gzip::TRAILER_LEN)
                .filter(|end| *end >= header.len())
                .ok_or(CompressionResultCode::InsufficientBuffer)?;
            dst[..header.len()].copy_from_slice(&header);
            (header.len(), body_end)
        }
        DeflateFraming::Raw | DeflateFraming::Zlib => (0, dst.len()),
    };

    let status = compress
        .compress(src, &mut dst[header_len..body_end], FlushCompress::Finish)
        .map_err(|_| CompressionResultCode::Error)?;
    if status != Status::StreamEnd {
        return Err(CompressionResultCode::InsufficientBuffer);
    }
    let mut written = header_len + compress.total_out() as usize;

    if framing == DeflateFraming::Gzip {
        let mut crc = Crc::new();
        crc.update(src);
        dst[written..written + gzip::TRAILER_LEN].copy_from_slice(&gzip::trailer(&crc));
        written += gzip::TRAILER_LEN;
    }
    Ok(written)
}

pub(crate) fn decompress_block(
    framing: DeflateFraming,
    src: &[u8],
    dst: &mut [u8],
) -> Result<usize, CompressionResultCode> {
    let body = match framing {
        DeflateFraming::Gzip => match gzip::parse_header(src) {
            Ok(Some(length)) => &src[length..],
            Ok(None) | Err(_) => return Err(CompressionResultCode::InvalidData),
        },
        DeflateFraming::Raw | DeflateFraming::Zlib => src,
    };

    let mut decompress = Decompress::new(framing.zlib_header());
    let status = decompress
        .decompress(body, dst, FlushDecompress::Finish)
        .map_err(|_| CompressionResultCode::InvalidData)?;
    let written = decompress.total_out() as usize;
    if status != Status::StreamEnd {
        return Err(if written == dst.len() {
            CompressionResultCode::InsufficientBuffer
        } else {
            CompressionResultCode::InvalidData
        });
    }

    if framing == DeflateFraming::Gzip {
        let consumed = decompress.total_in() as usize;
        let Some(bytes) = body.get(consumed..consumed + gzip::TRAILER_LEN) else {
            return Err(CompressionResultCode::InvalidData);
        };
        let mut trailer = [0u8; gzip::TRAILER_LEN];
        trailer.copy_from_slice(bytes);
        let mut crc = Crc::new();
        crc.update(&dst[..written]);
        if gzip::parse_trailer(&trailer) != (crc.sum(), crc.amount()) {
            return Err(CompressionResultCode::InvalidData);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_encoder(framing: DeflateFraming, level: i32, data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(framing, level).expect("encoder");
        let mut input = Buffer::unpooled(data.len().max(1)).expect("capacity");
        input.write_from(data);
        let mut output = Buffer::unpooled(64).expect("capacity");
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
                break;
            }
        }
        compressed
    }

    fn run_decoder(framing: DeflateFraming, compressed: &[u8]) -> (Vec<u8>, DeflateDecoder, usize) {
        let mut decoder = DeflateDecoder::new(framing);
        let mut input = Buffer::unpooled(compressed.len().max(1)).expect("capacity");
        input.write_from(compressed);
        let mut output = Buffer::unpooled(32).expect("capacity");
        let mut plain = Vec::new();

        loop {
            let before = input.available_read();
            let produced = decoder.decode(&mut input, &mut output).expect("decode");
            plain.extend_from_slice(output.readable());
            output.reset();
            if decoder.finished() || (produced == 0 && input.available_read() == before) {
                break;
            }
        }
        let leftover = input.available_read();
        (plain, decoder, leftover)
    }

    #[test]
    fn window_bits_select_framing() {
        assert_eq!(DeflateFraming::from_window_bits(-15).expect("raw"), DeflateFraming::Raw);
        assert_eq!(DeflateFraming::from_window_bits(15).expect("zlib"), DeflateFraming::Zlib);
        assert_eq!(DeflateFraming::from_window_bits(31).expect("gzip"), DeflateFraming::Gzip);
        assert!(DeflateFraming::from_window_bits(0).is_err());
        assert!(DeflateFraming::from_window_bits(16).is_err());
    }

    #[test]
    fn zlib_output_is_readable_by_flate2() {
        use std::io::Read;

        let data = b"zlib payload zlib payload zlib payload".repeat(20);
        let compressed = run_encoder(DeflateFraming::Zlib, 6, &data);

        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .expect("flate2 decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn gzip_output_is_readable_by_flate2() {
        use std::io::Read;

        let data = b"gzip payload ".repeat(100);
        let compressed = run_encoder(DeflateFraming::Gzip, 9, &data);
        assert_eq!(&compressed[..2], &gzip::MAGIC);

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .expect("flate2 decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn decoder_reads_flate2_gzip_with_file_name() {
        use std::io::Write;

        let data = b"named member".repeat(10);
        let mut encoder = flate2::GzBuilder::new()
            .filename("payload.txt")
            .comment("test")
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(&data).expect("write");
        let compressed = encoder.finish().expect("finish");

        let (plain, decoder, leftover) = run_decoder(DeflateFraming::Gzip, &compressed);
        assert_eq!(plain, data);
        assert!(decoder.finished());
        assert_eq!(leftover, 0);
    }

    #[test]
    fn concatenated_gzip_members_decode_in_sequence() {
        let mut compressed = run_encoder(DeflateFraming::Gzip, 6, b"first member;");
        compressed.extend(run_encoder(DeflateFraming::Gzip, 1, b"second member"));

        let (plain, decoder, _) = run_decoder(DeflateFraming::Gzip, &compressed);
        assert_eq!(plain, b"first member;second member");
        assert_eq!(decoder.members(), 2);
    }

    #[test]
    fn trailing_garbage_after_member_is_left_unused() {
        let mut compressed = run_encoder(DeflateFraming::Gzip, 6, b"payload");
        compressed.extend_from_slice(b"TAIL");

        let (plain, decoder, leftover) = run_decoder(DeflateFraming::Gzip, &compressed);
        assert_eq!(plain, b"payload");
        assert!(decoder.finished());
        assert_eq!(leftover, 4);
    }

    #[test]
    fn single_magic_byte_waits_then_finishes_at_end_of_input() {
        let mut compressed = run_encoder(DeflateFraming::Gzip, 6, b"payload");
        compressed.push(0x1f);

        let (plain, mut decoder, leftover) = run_decoder(DeflateFraming::Gzip, &compressed);
        assert_eq!(plain, b"payload");
        assert!(!decoder.finished());
        assert_eq!(leftover as u64 + decoder.internal_buffered_bytes(), 1);

        decoder.end_of_input().expect("member boundary is a clean end");
        assert!(decoder.finished());
    }

    #[test]
    fn member_ending_with_the_input_waits_for_more() {
        let compressed = run_encoder(DeflateFraming::Gzip, 6, b"first ");
        let (plain, mut decoder, leftover) = run_decoder(DeflateFraming::Gzip, &compressed);
        assert_eq!(plain, b"first ");
        assert_eq!(leftover, 0);
        assert!(!decoder.finished());

        let next = run_encoder(DeflateFraming::Gzip, 6, b"second");
        let mut input = Buffer::unpooled(next.len()).expect("capacity");
        input.write_from(&next);
        let mut output = Buffer::unpooled(64).expect("capacity");
        decoder.decode(&mut input, &mut output).expect("decode");
        assert_eq!(output.readable(), b"second");
        assert_eq!(decoder.members(), 2);
        assert!(!decoder.finished());
        decoder.end_of_input().expect("clean member boundary");
        assert!(decoder.finished());
    }

    #[test]
    fn non_member_bytes_after_a_split_magic_stay_unused() {
        let mut compressed = run_encoder(DeflateFraming::Gzip, 6, b"payload");
        compressed.extend_from_slice(&[0x1f, 0x00, 0x01]);

        let (plain, decoder, leftover) = run_decoder(DeflateFraming::Gzip, &compressed);
        assert_eq!(plain, b"payload");
        assert!(decoder.finished());
        assert_eq!(leftover as u64 + decoder.internal_buffered_bytes(), 3);
    }

    #[test]
    fn long_header_fields_are_staged_across_small_inputs() {
        use std::io::Write;

        let name = "a-rather-long-file-name-for-a-small-buffer.txt";
        let mut encoder = flate2::GzBuilder::new()
            .filename(name)
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"staged header").expect("write");
        let compressed = encoder.finish().expect("finish");

        let mut decoder = DeflateDecoder::new(DeflateFraming::Gzip);
        let mut output = Buffer::unpooled(64).expect("capacity");
        let mut plain = Vec::new();
        for chunk in compressed.chunks(8) {
            let mut input = Buffer::unpooled(8).expect("capacity");
            input.write_from(chunk);
            while !input.is_empty() {
                decoder.decode(&mut input, &mut output).expect("decode");
                plain.extend_from_slice(output.readable());
                output.reset();
            }
        }
        decoder.end_of_input().expect("complete member");
        assert_eq!(plain, b"staged header");
        assert_eq!(decoder.internal_buffered_bytes(), 0);
    }

    #[test]
    fn corrupted_crc_is_a_checksum_fault() {
        let mut compressed = run_encoder(DeflateFraming::Gzip, 6, b"checksummed payload");
        let crc_offset = compressed.len() - 8;
        compressed[crc_offset] ^= 0xff;

        let mut decoder = DeflateDecoder::new(DeflateFraming::Gzip);
        let mut input = Buffer::unpooled(compressed.len()).expect("capacity");
        input.write_from(&compressed);
        let mut output = Buffer::unpooled(256).expect("capacity");
        let err = decoder.decode(&mut input, &mut output).expect_err("checksum");
        assert_eq!(err.data_fault(), Some(DataFaultKind::Checksum));
    }

    #[test]
    fn truncated_zlib_reports_truncation_at_end_of_input() {
        let compressed = run_encoder(DeflateFraming::Zlib, 6, &b"truncate me ".repeat(50));
        let (_, mut decoder, _) = run_decoder(DeflateFraming::Zlib, &compressed[..compressed.len() - 3]);
        assert!(!decoder.finished());
        let err = decoder.end_of_input().expect_err("truncated");
        assert_eq!(err.data_fault(), Some(DataFaultKind::Truncated));
    }

    #[test]
    fn sync_flush_makes_prefix_decodable() {
        let mut encoder = DeflateEncoder::new(DeflateFraming::Raw, 6).expect("encoder");
        let mut input = Buffer::unpooled(64).expect("capacity");
        input.write_from(b"flushed prefix");
        let mut output = Buffer::unpooled(256).expect("capacity");
        encoder.encode(&mut input, &mut output).expect("encode");
        let progress = encoder.flush(&mut output).expect("flush");
        assert!(!progress.pending);

        let (plain, decoder, _) = run_decoder(DeflateFraming::Raw, output.readable());
        assert_eq!(plain, b"flushed prefix");
        assert!(!decoder.finished());
    }

    #[test]
    fn block_round_trip_for_every_framing() {
        let data = b"block payload ".repeat(64);
        for framing in [DeflateFraming::Raw, DeflateFraming::Zlib, DeflateFraming::Gzip] {
            let mut dst = vec![0u8; compress_bound(framing, data.len())];
            let written = compress_block(framing, 6, &data, &mut dst).expect("compress");

            let mut plain = vec![0u8; data.len()];
            let read = decompress_block(framing, &dst[..written], &mut plain).expect("decompress");
            assert_eq!(&plain[..read], data.as_slice(), "{framing:?}");
        }
    }

    #[test]
    fn block_decompress_reports_small_destination() {
        let data = vec![b'a'; 4096];
        let mut dst = vec![0u8; compress_bound(DeflateFraming::Zlib, data.len())];
        let written = compress_block(DeflateFraming::Zlib, 6, &data, &mut dst).expect("compress");

        let mut small = vec![0u8; 100];
        assert_eq!(
            decompress_block(DeflateFraming::Zlib, &dst[..written], &mut small),
            Err(CompressionResultCode::InsufficientBuffer)
        );
    }
}
