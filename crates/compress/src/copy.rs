//! Pass-through adapters for [`CompressionAlgorithm::Copy`].

use buffers::Buffer;

use crate::algorithm::CompressionAlgorithm;
use crate::codec::{Decoder, Encoder, FinishProgress, FlushProgress};
use crate::error::CompressionError;

fn copy_across(input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
    let copied = output.write_from(input.readable());
    input.advance_read(copied)?;
    Ok(copied)
}

/// Stores input unchanged.
#[derive(Debug, Default)]
pub struct CopyEncoder;

impl Encoder for CopyEncoder {
    fn encode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        copy_across(input, output)
    }

    fn flush(&mut self, _output: &mut Buffer) -> Result<FlushProgress, CompressionError> {
        Ok(FlushProgress::default())
    }

    fn finish(&mut self, _output: &mut Buffer) -> Result<FinishProgress, CompressionError> {
        Ok(FinishProgress {
            produced: 0,
            stream_end: true,
        })
    }
}

/// Returns input unchanged; finishes when the sink is exhausted.
#[derive(Debug, Default)]
pub struct CopyDecoder {
    fed: bool,
    finished: bool,
}

impl Decoder for CopyDecoder {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Copy
    }

    fn decode(&mut self, input: &mut Buffer, output: &mut Buffer) -> Result<usize, CompressionError> {
        self.fed |= !input.is_empty();
        copy_across(input, output)
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn non_empty_input(&self) -> bool {
        self.fed
    }

    fn end_of_input(&mut self) -> Result<(), CompressionError> {
        self.finished = true;
        Ok(())
    }
}
