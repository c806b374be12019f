//! Streams emit their lifecycle events through `tracing`.

#![cfg(feature = "tracing")]

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use compress::{CompressStream, CompressionAlgorithm, CompressionOptions, DecompressStream};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn lifecycle_events_are_logged() {
    let captured = Captured::default();
    let _guard = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("compress=trace"))
        .with_writer(captured.clone())
        .with_ansi(false)
        .finish()
        .set_default();

    let mut stream = CompressStream::new(Vec::new(), CompressionAlgorithm::GZip, &CompressionOptions::default()).expect("compress stream");
    stream.write_all(b"logged").expect("write");
    stream.flush().expect("flush");
    let compressed = stream.into_inner().expect("finish stream");

    let mut reader =
        DecompressStream::new(compressed.as_slice(), CompressionAlgorithm::GZip, &CompressionOptions::decompress())
            .expect("decompress stream");
    reader.read_to_end(&mut Vec::new()).expect("read to end");
    reader.complete();

    let log = String::from_utf8(captured.0.lock().expect("log lock").clone()).expect("utf-8 log");
    assert!(log.contains("stream: opened"), "{log}");
    assert!(log.contains("stream: completed"), "{log}");
    assert!(log.contains("algorithm=gzip"), "{log}");
}
