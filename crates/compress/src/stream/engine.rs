//! Direction-agnostic buffered engine behind [`CompressStream`] and
//! [`DecompressStream`].
//!
//! The engine owns the codec adapter and two exchange buffers. For
//! compression `input` stages caller bytes and `output` collects encoded
//! bytes on their way to the sink; for decompression `input` holds bytes
//! pulled from the sink and `output` holds decoded bytes waiting to be
//! served. The sink itself stays with the wrapping stream type and is lent
//! to every hook as a trait object.
//!
//! [`CompressStream`]: super::CompressStream
//! [`DecompressStream`]: super::DecompressStream

use std::io::{self, Read, Write};

use buffers::Buffer;

use super::StreamPositions;
use crate::algorithm::CompressionAlgorithm;
use crate::cancel::CancellableToken;
use crate::codec::{self, Decoder, Encoder};
use crate::error::{CompressionError, DataFaultKind};
use crate::options::ResolvedOptions;
use crate::trace::{trace_stream_complete, trace_stream_open, trace_sync_flush, trace_threads_ignored};

/// Consecutive codec calls without any progress before the engine gives up.
const MAX_STALLS: u32 = 256;

enum Codec {
    Encode(Box<dyn Encoder>),
    Decode(Box<dyn Decoder>),
}

pub(crate) struct Engine {
    options: ResolvedOptions,
    codec: Codec,
    input: Buffer,
    output: Buffer,
    /// Bytes moved across the sink boundary.
    base_position: u64,
    /// Bytes moved across the uncompressed boundary.
    position_full_size: u64,
    complete: bool,
    /// Finalization was attempted and failed; the sink holds no end marker.
    finalize_failed: bool,
    written_any: bool,
    sink_exhausted: bool,
    decode_done: bool,
    cancel: CancellableToken,
}

impl Engine {
    pub(crate) fn new(options: ResolvedOptions) -> Result<Self, CompressionError> {
        let codec = if options.is_compress {
            Codec::Encode(codec::new_encoder(&options)?)
        } else {
            Codec::Decode(codec::new_decoder(&options)?)
        };
        if options.is_compress && options.threads > 1 && !options.algorithm.supports_threads() {
            trace_threads_ignored(options.algorithm, options.threads);
        }
        trace_stream_open(
            options.algorithm,
            options.is_compress,
            options.level,
            options.buffer_size,
        );

        Ok(Self {
            input: Buffer::rent(options.buffer_size)?,
            output: Buffer::rent(options.buffer_size)?,
            options,
            codec,
            base_position: 0,
            position_full_size: 0,
            complete: false,
            finalize_failed: false,
            written_any: false,
            sink_exhausted: false,
            decode_done: false,
            cancel: CancellableToken::none(),
        })
    }

    pub(crate) fn set_cancellation(&mut self, token: CancellableToken) {
        self.cancel = token;
    }

    pub(crate) const fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub(crate) const fn algorithm(&self) -> CompressionAlgorithm {
        self.options.algorithm
    }

    pub(crate) const fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) const fn finalize_failed(&self) -> bool {
        self.finalize_failed
    }

    // ------------------------------------------------------------------
    // Accounting
    // ------------------------------------------------------------------

    pub(crate) fn internal_buffered_bytes(&self) -> u64 {
        match &self.codec {
            Codec::Decode(decoder) => decoder.internal_buffered_bytes(),
            Codec::Encode(_) => 0,
        }
    }

    pub(crate) fn buffered_bytes_total(&self) -> u64 {
        self.input.size() as u64
    }

    pub(crate) fn buffered_bytes_used(&self) -> u64 {
        self.input.pos() as u64
    }

    /// Bytes taken from the sink (or the caller) that the codec has not
    /// consumed yet.
    pub(crate) fn buffered_bytes_unused(&self) -> u64 {
        self.buffered_bytes_total() - self.buffered_bytes_used() + self.internal_buffered_bytes()
    }

    pub(crate) const fn base_position(&self) -> u64 {
        self.base_position
    }

    pub(crate) fn position(&self) -> u64 {
        if self.options.is_compress {
            self.base_position
        } else {
            self.base_position.saturating_sub(self.buffered_bytes_unused())
        }
    }

    pub(crate) const fn position_full_size(&self) -> u64 {
        self.position_full_size
    }

    pub(crate) fn positions(&self) -> StreamPositions {
        StreamPositions {
            position: self.position(),
            base_position: self.base_position,
            position_full_size: self.position_full_size,
            buffered_bytes_total: self.buffered_bytes_total(),
            buffered_bytes_used: self.buffered_bytes_used(),
            buffered_bytes_unused: self.buffered_bytes_unused(),
            internal_buffered_bytes: self.internal_buffered_bytes(),
        }
    }

    pub(crate) fn properties(&self) -> Option<Vec<u8>> {
        match &self.codec {
            Codec::Encode(encoder) => encoder.properties(),
            Codec::Decode(_) => self.options.init_properties.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Sink transfers
    // ------------------------------------------------------------------

    /// Refills `input` from `source`, honouring `position_limit`. Returns
    /// zero once the source is exhausted or the limit is reached.
    fn base_read(&mut self, source: &mut dyn Read) -> Result<usize, CompressionError> {
        self.input.tidy();
        let mut space = self.input.trailing_space();
        if space == 0 {
            return Err(CompressionError::corrupt(
                self.algorithm(),
                "input buffer is full but the decoder made no progress",
            ));
        }
        if let Some(limit) = self.options.position_limit {
            let remaining = limit.saturating_sub(self.base_position);
            space = space.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            if space == 0 {
                return Ok(0);
            }
        }

        let read = loop {
            match source.read(&mut self.input.writable()[..space]) {
                Ok(read) => break read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        };
        self.input.advance_write(read)?;
        self.base_position += read as u64;
        Ok(read)
    }

    /// Hands everything in `output` to `sink`, honouring `position_limit`.
    fn base_write(&mut self, sink: &mut dyn Write) -> Result<(), CompressionError> {
        let pending = self.output.available_read() as u64;
        if pending == 0 {
            return Ok(());
        }
        if let Some(limit) = self.options.position_limit {
            if self.base_position + pending > limit {
                return Err(CompressionError::data(
                    self.algorithm(),
                    DataFaultKind::LimitExceeded,
                    format!("compressed output would exceed the position limit of {limit} bytes"),
                ));
            }
        }
        sink.write_all(self.output.readable())?;
        self.base_position += pending;
        self.output.reset();
        Ok(())
    }

    fn encoder(codec: &mut Codec) -> Result<&mut dyn Encoder, CompressionError> {
        match codec {
            Codec::Encode(encoder) => Ok(encoder.as_mut()),
            Codec::Decode(_) => Err(CompressionError::Contract("encode on a decompression engine")),
        }
    }

    fn decoder(codec: &mut Codec) -> Result<&mut dyn Decoder, CompressionError> {
        match codec {
            Codec::Decode(decoder) => Ok(decoder.as_mut()),
            Codec::Encode(_) => Err(CompressionError::Contract("decode on a compression engine")),
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Stages `buf`, encoding whenever the threshold is reached.
    pub(crate) fn write_bytes(&mut self, buf: &[u8], sink: &mut dyn Write) -> Result<usize, CompressionError> {
        if self.complete {
            return Err(CompressionError::Contract("write after the stream was completed"));
        }
        if let Some(limit) = self.options.position_full_size_limit {
            let accepted = self.position_full_size + self.input.available_read() as u64;
            if accepted + buf.len() as u64 > limit {
                return Err(CompressionError::data(
                    self.algorithm(),
                    DataFaultKind::LimitExceeded,
                    format!("uncompressed input would exceed the limit of {limit} bytes"),
                ));
            }
        }

        let mut written = 0;
        while written < buf.len() {
            self.cancel.check()?;
            let copied = self.input.write_from(&buf[written..]);
            written += copied;
            self.written_any |= copied > 0;
            if self.input.available_read() >= self.options.buffer_threshold || self.input.available_write() == 0 {
                self.on_write(sink)?;
            }
        }
        Ok(written)
    }

    /// Encodes all staged input and drains the result to `sink`.
    fn on_write(&mut self, sink: &mut dyn Write) -> Result<(), CompressionError> {
        let mut stalls = 0;
        while !self.input.is_empty() {
            self.cancel.check()?;
            self.output.tidy();
            let before = self.input.available_read();
            let produced = Self::encoder(&mut self.codec)?.encode(&mut self.input, &mut self.output)?;
            let consumed = before - self.input.available_read();
            self.position_full_size += consumed as u64;

            if consumed == 0 && produced == 0 {
                if self.output.is_empty() {
                    stalls += 1;
                    if stalls > MAX_STALLS {
                        return Err(CompressionError::Contract("encoder made no progress"));
                    }
                }
            } else {
                stalls = 0;
            }
            if self.output.trailing_space() == 0 || consumed == 0 {
                self.base_write(sink)?;
            }
        }
        self.input.reset();
        self.base_write(sink)
    }

    /// Encodes staged input, emits a sync flush and flushes `sink`.
    pub(crate) fn on_flush(&mut self, sink: &mut dyn Write) -> Result<(), CompressionError> {
        if self.complete {
            sink.flush()?;
            return Ok(());
        }
        self.on_write(sink)?;
        if self.written_any || self.options.sync_flush_when_empty {
            let mut produced = 0;
            let mut stalls = 0;
            loop {
                self.cancel.check()?;
                self.output.tidy();
                let progress = Self::encoder(&mut self.codec)?.flush(&mut self.output)?;
                produced += progress.produced;
                self.base_write(sink)?;
                if !progress.pending {
                    break;
                }
                stalls = if progress.produced == 0 { stalls + 1 } else { 0 };
                if stalls > MAX_STALLS {
                    return Err(CompressionError::Contract("encoder flush made no progress"));
                }
            }
            trace_sync_flush(self.algorithm(), produced);
        }
        sink.flush()?;
        Ok(())
    }

    /// Emits the end-of-stream marker and flushes `sink`.
    fn on_dispose(&mut self, sink: &mut dyn Write) -> Result<(), CompressionError> {
        self.on_write(sink)?;
        let mut stalls = 0;
        loop {
            self.cancel.check()?;
            self.output.tidy();
            let progress = Self::encoder(&mut self.codec)?.finish(&mut self.output)?;
            self.base_write(sink)?;
            if progress.stream_end {
                break;
            }
            stalls = if progress.produced == 0 { stalls + 1 } else { 0 };
            if stalls > MAX_STALLS {
                return Err(CompressionError::Contract("encoder finish made no progress"));
            }
        }
        sink.flush()?;
        Ok(())
    }

    /// Finalizes a compression engine once. Later calls return `Ok(())`
    /// after a success and a contract error after a failure.
    pub(crate) fn complete(&mut self, sink: &mut dyn Write) -> Result<(), CompressionError> {
        if self.finalize_failed {
            return Err(CompressionError::Contract(
                "stream finalization failed; the output has no end-of-stream marker",
            ));
        }
        if self.complete {
            return Ok(());
        }
        self.complete = true;
        if let Err(error) = self.on_dispose(sink) {
            self.finalize_failed = true;
            return Err(error);
        }
        trace_stream_complete(self.algorithm(), self.base_position, self.position_full_size);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Serves decoded bytes into `buf`, decoding from `source` when none are
    /// buffered. Returns zero at the end of the stream.
    pub(crate) fn read_bytes(&mut self, buf: &mut [u8], source: &mut dyn Read) -> Result<usize, CompressionError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            self.cancel.check()?;
            if !self.output.is_empty() {
                let served = self.output.read_into(buf);
                self.position_full_size += served as u64;
                return Ok(served);
            }
            if self.decode_done {
                return Ok(0);
            }
            self.on_read(source)?;
        }
    }

    /// Runs the decoder until it produced output or the stream ended.
    fn on_read(&mut self, source: &mut dyn Read) -> Result<(), CompressionError> {
        if let Some(limit) = self.options.position_full_size_limit {
            let remaining = limit.saturating_sub(self.position_full_size);
            if remaining == 0 {
                self.finish_decoding();
                return Ok(());
            }
            self.output
                .limit_writable(Some(usize::try_from(remaining).unwrap_or(usize::MAX)));
        }
        // Retain served bytes for `rewind_read` until the buffer is used up.
        if self.output.size() == self.output.capacity() {
            self.output.reset();
        }

        let mut stalls = 0;
        loop {
            self.cancel.check()?;
            let decoder = Self::decoder(&mut self.codec)?;
            let before = self.input.available_read();
            let produced = decoder.decode(&mut self.input, &mut self.output)?;
            let consumed = before - self.input.available_read();
            if produced > 0 {
                return Ok(());
            }
            if decoder.finished() {
                self.finish_decoding();
                return Ok(());
            }
            if consumed > 0 {
                stalls = 0;
                continue;
            }

            if self.sink_exhausted {
                decoder.end_of_input()?;
                self.finish_decoding();
                return Ok(());
            }
            if self.base_read(source)? == 0 {
                self.sink_exhausted = true;
            } else {
                stalls += 1;
                if stalls > MAX_STALLS {
                    return Err(CompressionError::Contract("decoder made no progress"));
                }
            }
        }
    }

    fn finish_decoding(&mut self) {
        self.decode_done = true;
        self.output.limit_writable(None);
    }

    /// Un-consumes `count` decoded bytes so the next read serves them again.
    pub(crate) fn rewind_read(&mut self, count: usize) -> Result<(), CompressionError> {
        self.output.rewind_read(count)?;
        self.position_full_size -= count as u64;
        Ok(())
    }

    /// Marks a decompression engine finished; decoders own no output.
    pub(crate) fn complete_read(&mut self) {
        if !self.complete {
            self.complete = true;
            trace_stream_complete(self.algorithm(), self.base_position, self.position_full_size);
        }
    }
}
