//! Position accounting, thresholds, limits and source re-positioning.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use compress::{
    CompressStream, CompressionAlgorithm, CompressionError, CompressionOptions, DataFaultKind,
    DecompressStream, StreamPositions,
};

fn compress(algorithm: CompressionAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut stream = CompressStream::new(Vec::new(), algorithm, &CompressionOptions::default()).expect("compress stream");
    stream.write_all(data).expect("write");
    stream.into_inner().expect("finish stream")
}

/// A source that fails the test if it is ever read.
struct Untouched;

impl Read for Untouched {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("source must not be read"))
    }
}

// =============================================================================
// Write path
// =============================================================================

#[test]
fn threshold_triggers_encode_pass() {
    let options = CompressionOptions::default()
        .with_buffer_size(64)
        .with_buffer_threshold(16);
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::Copy, &options).expect("compress stream");

    stream.write_all(&[1u8; 10]).expect("write");
    assert_eq!(stream.get_ref().map(Vec::len), Some(0));
    assert_eq!(stream.buffered_bytes_unused(), 10);
    assert_eq!(stream.position_full_size(), 0);

    stream.write_all(&[2u8; 10]).expect("write");
    assert_eq!(stream.get_ref().map(Vec::len), Some(20));
    assert_eq!(stream.buffered_bytes_unused(), 0);
    assert_eq!(stream.position_full_size(), 20);
    assert_eq!(stream.position(), 20);
}

#[test]
fn single_byte_writes_accumulate() {
    let options = CompressionOptions::default().with_buffer_size(4);
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::Copy, &options).expect("compress stream");
    for byte in b"abcdefg" {
        stream.write_byte(*byte).expect("write byte");
    }
    assert_eq!(stream.get_ref().map(Vec::as_slice), Some(&b"abcd"[..]));
    assert_eq!(stream.into_inner().expect("finish stream"), b"abcdefg");
}

#[test]
fn compressed_position_tracks_the_sink() {
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::ZLib, &CompressionOptions::default()).expect("compress stream");
    stream.write_all(b"tracked").expect("write");
    stream.complete().expect("complete");
    let positions = stream.positions();
    let written = stream.get_ref().map_or(0, Vec::len) as u64;
    assert_eq!(positions.position, written);
    assert_eq!(positions.base_position, written);
    assert_eq!(positions.position_full_size, 7);
    assert_eq!(positions.buffered_bytes_unused, 0);
}

#[test]
fn full_size_limit_rejects_oversized_writes() {
    let options = CompressionOptions::default().with_position_full_size_limit(10);
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::Copy, &options).expect("compress stream");
    stream.write_all(b"0123456789").expect("write");
    let error = stream.write_bytes(b"x").expect_err("over the full-size limit");
    assert_eq!(error.data_fault(), Some(DataFaultKind::LimitExceeded));
    assert_eq!(stream.into_inner().expect("finish stream"), b"0123456789");
}

#[test]
fn position_limit_fails_compressed_output() {
    let options = CompressionOptions::default().with_position_limit(10);
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::Copy, &options).expect("compress stream");
    stream.write_all(&[0u8; 20]).expect("write");
    let error = stream.complete().expect_err("over the position limit");
    assert_eq!(error.data_fault(), Some(DataFaultKind::LimitExceeded));
    assert_eq!(stream.get_ref().map(Vec::len), Some(0));
}

#[test]
fn failed_finalization_is_not_reported_as_success_later() {
    let options = CompressionOptions::default().with_position_limit(10);
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::Copy, &options).expect("compress stream");
    stream.write_all(&[0u8; 20]).expect("write");
    assert!(stream.complete().is_err());
    assert!(matches!(stream.complete(), Err(CompressionError::Contract(_))));
    assert!(matches!(stream.into_inner(), Err(CompressionError::Contract(_))));
}

#[test]
fn failed_finalization_fails_close() {
    let token = compress::CancellableToken::new();
    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::ZLib, &CompressionOptions::default())
        .expect("compress stream")
        .with_cancellation(token.clone());
    stream.write_all(b"never finished").expect("write");
    token.cancel();
    assert!(matches!(stream.complete(), Err(CompressionError::Cancelled)));
    assert!(matches!(stream.close(), Err(CompressionError::Contract(_))));
}

// =============================================================================
// Read path
// =============================================================================

#[test]
fn zero_length_read_does_not_touch_the_source() {
    let mut stream =
        DecompressStream::new(Untouched, CompressionAlgorithm::ZLib, &CompressionOptions::decompress()).expect("decompress stream");
    assert_eq!(stream.read_bytes(&mut []).expect("read"), 0);
    assert_eq!(stream.positions(), StreamPositions::default());
}

#[test]
fn source_can_be_repositioned_after_the_first_stream() {
    let first: Vec<u8> = b"alpha ".repeat(100);
    let second: Vec<u8> = b"omega ".repeat(100);
    let first_compressed = compress(CompressionAlgorithm::ZLib, &first);
    let second_compressed = compress(CompressionAlgorithm::ZLib, &second);
    let mut joined = first_compressed.clone();
    joined.extend_from_slice(&second_compressed);

    let mut stream =
        DecompressStream::new(Cursor::new(joined), CompressionAlgorithm::ZLib, &CompressionOptions::decompress())
            .expect("decompress stream");
    let mut decoded = Vec::new();
    stream.read_to_end(&mut decoded).expect("read to end");
    assert_eq!(decoded, first);
    assert_eq!(stream.position(), first_compressed.len() as u64);
    assert_eq!(stream.buffered_bytes_unused(), second_compressed.len() as u64);

    let unused = i64::try_from(stream.buffered_bytes_unused()).expect("unused fits i64");
    let mut source = stream.into_inner();
    source.seek(SeekFrom::Current(-unused)).expect("seek");
    assert_eq!(source.position(), first_compressed.len() as u64);

    let mut stream =
        DecompressStream::new(source, CompressionAlgorithm::ZLib, &CompressionOptions::decompress()).expect("decompress stream");
    let mut decoded = Vec::new();
    stream.read_to_end(&mut decoded).expect("read to end");
    assert_eq!(decoded, second);
}

#[test]
fn rewind_read_serves_bytes_again() {
    let data: Vec<u8> = (0u8..=255).collect();
    let compressed = compress(CompressionAlgorithm::Deflate, &data);
    let mut stream =
        DecompressStream::new(compressed.as_slice(), CompressionAlgorithm::Deflate, &CompressionOptions::decompress())
            .expect("decompress stream");

    let mut head = [0u8; 10];
    stream.read_exact(&mut head).expect("read exact");
    stream.rewind_read(4).expect("rewind");
    assert_eq!(stream.position_full_size(), 6);

    let mut again = [0u8; 4];
    stream.read_exact(&mut again).expect("read exact");
    assert_eq!(again, [6, 7, 8, 9]);

    let error = stream.rewind_read(10_000).expect_err("rewind past the buffer");
    assert!(matches!(error, CompressionError::OutOfRange(_)));
}

#[test]
fn position_limit_ends_decompression_early() {
    let data = [9u8; 100];
    let options = CompressionOptions::decompress().with_position_limit(40);
    let mut stream = DecompressStream::new(&data[..], CompressionAlgorithm::Copy, &options).expect("decompress stream");
    let mut decoded = Vec::new();
    stream.read_to_end(&mut decoded).expect("read to end");
    assert_eq!(decoded.len(), 40);
    assert_eq!(stream.base_position(), 40);
}

#[test]
fn full_size_limit_clamps_gzip_output() {
    let compressed = compress(CompressionAlgorithm::GZip, &[b'z'; 5000]);
    let options = CompressionOptions::decompress().with_position_full_size_limit(1234);
    let mut stream = DecompressStream::new(compressed.as_slice(), CompressionAlgorithm::GZip, &options).expect("decompress stream");
    let mut decoded = Vec::new();
    stream.read_to_end(&mut decoded).expect("read to end");
    assert_eq!(decoded.len(), 1234);
    assert_eq!(stream.position_full_size(), 1234);
}

#[test]
fn close_returns_the_source_only_when_left_open() {
    let compressed = compress(CompressionAlgorithm::ZLib, b"x");
    let stream = DecompressStream::new(
        compressed.as_slice(),
        CompressionAlgorithm::ZLib,
        &CompressionOptions::decompress().with_leave_open(true),
    )
    .expect("decompress stream");
    assert!(stream.close().is_some());

    let stream =
        DecompressStream::new(compressed.as_slice(), CompressionAlgorithm::ZLib, &CompressionOptions::decompress())
            .expect("decompress stream");
    assert!(stream.close().is_none());
}
