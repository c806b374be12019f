//! Zstandard adapters over the raw streaming contexts of the [`zstd`] crate.
//!
//! The encoder maps `thread_count` onto `ZSTD_c_nbWorkers`; the decoder
//! stops at the end of the first frame so bytes after it remain available to
//! the caller.

use buffers::Buffer;
use zstd::stream::raw::{CParameter, Decoder as RawDecoder, Encoder as RawEncoder, Operation, OutBuffer};

use crate::algorithm::CompressionAlgorithm;
use crate::codec::{Decoder, Encoder, FinishProgress, FlushProgress};
use crate::error::{CompressionError, CompressionResultCode};
use crate::trace::trace_decoder_finished;

const ALGORITHM: CompressionAlgorithm = CompressionAlgorithm::ZStd;

fn native(function: &'static str, error: &std::io::Error) -> CompressionError {
    CompressionError::native(ALGORITHM, function, -1, error.to_string())
}

/// Streaming Zstandard encoder.
pub struct ZstdEncoder {
    inner: RawEncoder<'static>,
}

impl ZstdEncoder {
    /// Creates an encoder at `level`, using `threads` workers when above one.
    pub fn new(level: i32, threads: u32) -> Result<Self, CompressionError> {
        let mut inner = RawEncoder::new(level).map_err(|error| native("ZSTD_initCStream", &error))?;
        if threads > 1 {
            inner
                .set_parameter(CParameter::NbWorkers(threads))
                .map_err(|error| native("ZSTD_CCtx_setParameter", &error))?;
        }
        Ok(Self { inner })
    }
}

impl Encoder for ZstdEncoder {
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        let status = self
            .inner
            .run_on_buffers(input.readable(), output.writable())
            .map_err(|error| native("ZSTD_compressStream2", &error))?;
        input.advance_read(status.bytes_read)?;
        output.advance_write(status.bytes_written)?;
        Ok(status.bytes_written)
    }

    fn flush(&mut self, output: &mut Buffer) -> Result<FlushProgress, CompressionError> {
        let (remaining, produced) = {
            let mut out = OutBuffer::around(output.writable());
            let remaining = self
                .inner
                .flush(&mut out)
                .map_err(|error| native("ZSTD_flushStream", &error))?;
            (remaining, out.pos())
        };
        output.advance_write(produced)?;
        Ok(FlushProgress {
            produced,
            pending: remaining > 0,
        })
    }

    fn finish(&mut self, output: &mut Buffer) -> Result<FinishProgress, CompressionError> {
        let (remaining, produced) = {
            let mut out = OutBuffer::around(output.writable());
            let remaining = self
                .inner
                .finish(&mut out, true)
                .map_err(|error| native("ZSTD_endStream", &error))?;
            (remaining, out.pos())
        };
        output.advance_write(produced)?;
        Ok(FinishProgress {
            produced,
            stream_end: remaining == 0,
        })
    }
}

/// Streaming Zstandard decoder for a single frame.
pub struct ZstdDecoder {
    inner: RawDecoder<'static>,
    finished: bool,
    non_empty_input: bool,
}

impl ZstdDecoder {
    /// Creates a decoder.
    pub fn new() -> Result<Self, CompressionError> {
        Ok(Self {
            inner: RawDecoder::new().map_err(|error| native("ZSTD_initDStream", &error))?,
            finished: false,
            non_empty_input: false,
        })
    }
}

impl Decoder for ZstdDecoder {
    fn algorithm(&self) -> CompressionAlgorithm {
        ALGORITHM
    }

    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        if self.finished {
            return Ok(0);
        }
        self.non_empty_input |= !input.is_empty();
        let status = self
            .inner
            .run_on_buffers(input.readable(), output.writable())
            .map_err(|error| CompressionError::corrupt(ALGORITHM, error.to_string()))?;
        input.advance_read(status.bytes_read)?;
        output.advance_write(status.bytes_written)?;

        // A zero hint means the frame is complete and fully flushed.
        if status.remaining == 0 && self.non_empty_input {
            self.finished = true;
            trace_decoder_finished(ALGORITHM, input.available_read() as u64);
        }
        Ok(status.bytes_written)
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

pub(crate) fn compress_bound(len: usize) -> usize {
    zstd::zstd_safe::compress_bound(len)
}

pub(crate) fn compress_block(level: i32, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    zstd::bulk::compress_to_buffer(src, dst, level).map_err(|error| {
        if is_destination_too_small(&error) {
            CompressionResultCode::InsufficientBuffer
        } else {
            CompressionResultCode::Error
        }
    })
}

pub(crate) fn decompress_block(src: &[u8], dst: &mut [u8]) -> Result<usize, CompressionResultCode> {
    zstd::bulk::decompress_to_buffer(src, dst).map_err(|error| {
        if is_destination_too_small(&error) {
            CompressionResultCode::InsufficientBuffer
        } else {
            CompressionResultCode::InvalidData
        }
    })
}

fn is_destination_too_small(error: &std::io::Error) -> bool {
    error.to_string().contains("Destination buffer is too small")
}
