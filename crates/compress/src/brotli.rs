//! Brotli adapters.
//!
//! Compression drives the `brotli` crate's `CompressorWriter` over an owned
//! `Vec<u8>` and hands the produced bytes to the engine through a pending
//! queue. Decompression calls `BrotliDecompressStream` directly so input and
//! output cursors map one to one onto the exchange buffers.

use std::io::Write;

use brotli::enc::StandardAlloc;
use brotli::{BrotliDecompressStream, BrotliResult, BrotliState, CompressorWriter};
use buffers::Buffer;

use crate::algorithm::CompressionAlgorithm;
use crate::codec::{Decoder, Encoder, FinishProgress, FlushProgress, PendingOutput};
use crate::error::{CompressionError, CompressionResultCode};
use crate::trace::trace_decoder_finished;

const ALGORITHM: CompressionAlgorithm = CompressionAlgorithm::Brotli;

/// Sliding window exponent used by the encoder.
pub const WINDOW_BITS: u32 = 22;

type DecoderState = BrotliState<StandardAlloc, StandardAlloc, StandardAlloc>;

fn new_state() -> Box<DecoderState> {
    Box::new(BrotliState::new(
        StandardAlloc::default(),
        StandardAlloc::default(),
        StandardAlloc::default(),
    ))
}

fn quality(level: i32) -> u32 {
    level.clamp(0, 11).unsigned_abs()
}

/// Streaming Brotli encoder.
pub struct BrotliEncoder {
    writer: Option<CompressorWriter<Vec<u8>>>,
    pending: PendingOutput,
}

impl BrotliEncoder {
    /// Creates an encoder at `level` with an internal buffer of `buffer_size`.
    #[must_use]
    pub fn new(level: i32, buffer_size: usize) -> Self {
        Self {
            writer: Some(CompressorWriter::new(
                Vec::new(),
                buffer_size,
                quality(level),
                WINDOW_BITS,
            )),
            pending: PendingOutput::default(),
        }
    }

    /// Moves whatever the compressor wrote so far onto the pending queue.
    fn collect(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let produced = std::mem::take(writer.get_mut());
            self.pending.push(&produced);
        }
    }

    fn writer(&mut self) -> Result<&mut CompressorWriter<Vec<u8>>, CompressionError> {
        self.writer
            .as_mut()
            .ok_or(CompressionError::Contract("brotli encoder used after finish"))
    }
}

fn write_failed(function: &'static str, error: &std::io::Error) -> CompressionError {
    CompressionError::native(ALGORITHM, function, -1, error.to_string())
}

impl Encoder for BrotliEncoder {
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        let mut produced = self.pending.drain_into(output);
        if !self.pending.is_empty() || input.is_empty() {
            return Ok(produced);
        }
        self.writer()?
            .write_all(input.readable())
            .map_err(|error| write_failed("BrotliEncoderCompressStream", &error))?;
        input.advance_read(input.available_read())?;
        self.collect();
        produced += self.pending.drain_into(output);
        Ok(produced)
    }

    fn flush(&mut self, output: &mut Buffer) -> Result<FlushProgress, CompressionError> {
        let mut produced = self.pending.drain_into(output);
        if self.pending.is_empty() {
            self.writer()?
                .flush()
                .map_err(|error| write_failed("BrotliEncoderCompressStream", &error))?;
            self.collect();
            produced += self.pending.drain_into(output);
        }
        Ok(FlushProgress {
            produced,
            pending: !self.pending.is_empty(),
        })
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<FinishProgress, CompressionError> {
        let mut produced = self.pending.drain_into(output);
        if self.pending.is_empty() {
            if let Some(writer) = self.writer.take() {
                self.pending.push(&writer.into_inner());
                produced += self.pending.drain_into(output);
            }
        }
        Ok(FinishProgress {
            produced,
            stream_end: self.writer.is_none() && self.pending.is_empty(),
        })
    }
}

/// Outcome of one `BrotliDecompressStream` call.
struct Step {
    consumed: usize,
    produced: usize,
    result: BrotliResult,
}

fn decompress_step(state: &mut DecoderState, total_out: &mut usize, input: &[u8], output: &mut [u8]) -> Step {
    let mut available_in = input.len();
    let mut input_offset = 0;
    let mut available_out = output.len();
    let mut output_offset = 0;
    let result = BrotliDecompressStream(
        &mut available_in,
        &mut input_offset,
        input,
        &mut available_out,
        &mut output_offset,
        output,
        total_out,
        state,
    );
    Step {
        consumed: input_offset,
        produced: output_offset,
        result,
    }
}

/// Streaming Brotli decoder.
pub struct BrotliDecoder {
    state: Box<DecoderState>,
    total_out: usize,
    finished: bool,
    non_empty_input: bool,
}

impl Default for BrotliDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BrotliDecoder {
    /// Creates a decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: new_state(),
            total_out: 0,
            finished: false,
            non_empty_input: false,
        }
    }
}

impl Decoder for BrotliDecoder {
    fn algorithm(&self) -> CompressionAlgorithm {
        ALGORITHM
    }

    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        if self.finished {
            return Ok(0);
        }
        self.non_empty_input |= !input.is_empty();
        let step = decompress_step(&mut self.state, &mut self.total_out, input.readable(), output.writable());
        input.advance_read(step.consumed)?;
        output.advance_write(step.produced)?;

        match step.result {
            BrotliResult::ResultSuccess => {
                self.finished = true;
                trace_decoder_finished(ALGORITHM, input.available_read() as u64);
            }
            BrotliResult::NeedsMoreInput | BrotliResult::NeedsMoreOutput => {}
            BrotliResult::ResultFailure => {
                return Err(CompressionError::corrupt(ALGORITHM, "BrotliDecompressStream failed"));
            }
        }
        Ok(step.produced)
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn non_empty_input(&self) -> bool {
        self.non_empty_input
    }
}

// ============================================================================
// Block codec
// ============================================================================

pub(crate) const fn compress_bound(len: usize) -> usize {
    if len == 0 {
        return 2;
    }
    len + 2 + 4 * (len >> 14) + 3 + 1
}

pub(crate) fn compress_block(level: i32, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    let mut writer = CompressorWriter::new(
        Vec::with_capacity(compress_bound(src.len())),
        4096,
        quality(level),
        WINDOW_BITS,
    );
    writer
        .write_all(src)
        .map_err(|_| CompressionResultCode::Error)?;
    let compressed = writer.into_inner();
    let target = dst
        .get_mut(..compressed.len())
        .ok_or(CompressionResultCode::InsufficientBuffer)?;
    target.copy_from_slice(&compressed);
    Ok(compressed.len())
}

pub(crate) fn decompress_block(src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    let mut state = new_state();
    let mut total_out = 0;
    let step = decompress_step(&mut state, &mut total_out, src, dst);
    match step.result {
        BrotliResult::ResultSuccess => Ok(step.produced),
        BrotliResult::NeedsMoreOutput => Err(CompressionResultCode::InsufficientBuffer),
        BrotliResult::NeedsMoreInput | BrotliResult::ResultFailure => Err(CompressionResultCode::InvalidData),
    }
}
