//! Async facade over the blocking streams.
//!
//! The wrapped stream sits behind a shared lock. Each call runs the operation
//! on tokio's blocking pool with a handle to that lock. Outside a tokio
//! runtime the operation runs inline on the calling thread, so the wrapper
//! also works under executors such as `futures::executor::block_on`.
//!
//! Dropping a pending future does not cancel its operation: it finishes on
//! the blocking pool and the next call waits for it. A panicking operation
//! poisons the wrapper; later operations fail but
//! [`into_inner`](AsyncCompressionStream::into_inner) still returns the
//! stream.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;

use super::{CompressStream, DecompressStream};
use crate::error::CompressionError;

type Shared<T> = Arc<Mutex<Option<T>>>;

/// Owns a [`CompressStream`] or [`DecompressStream`] and exposes its
/// operations as futures. Calls take `&mut self` and therefore never overlap.
#[derive(Debug)]
pub struct AsyncCompressionStream<T> {
    inner: Shared<T>,
}

fn lock<T>(shared: &Shared<T>) -> Result<MutexGuard<'_, Option<T>>, CompressionError> {
    shared
        .lock()
        .map_err(|_| CompressionError::Contract("a previous operation on this stream panicked"))
}

fn join_error(error: tokio::task::JoinError) -> CompressionError {
    CompressionError::Io(std::io::Error::other(error))
}

impl<T: Send + 'static> AsyncCompressionStream<T> {
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(inner))),
        }
    }

    /// A previous operation panicked; only [`into_inner`](Self::into_inner)
    /// still works.
    pub fn is_poisoned(&self) -> bool {
        self.inner.is_poisoned()
    }

    /// Unwraps the stream, waiting for an abandoned operation that is still
    /// running on the blocking pool.
    ///
    /// # Errors
    ///
    /// [`CompressionError::Contract`] when a consuming operation already
    /// took the stream.
    pub fn into_inner(self) -> Result<T, CompressionError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CompressionError::Contract("stream was already closed"))
    }

    async fn run<O, F>(&mut self, operation: F) -> Result<O, CompressionError>
    where
        O: Send + 'static,
        F: FnOnce(&mut T) -> Result<O, CompressionError> + Send + 'static,
    {
        let shared = Arc::clone(&self.inner);
        let task = move || {
            let mut guard = lock(&shared)?;
            let inner = guard
                .as_mut()
                .ok_or(CompressionError::Contract("stream was already closed"))?;
            operation(inner)
        };
        match Handle::try_current() {
            Ok(handle) => handle.spawn_blocking(task).await.map_err(join_error)?,
            Err(_) => task(),
        }
    }

    async fn run_consuming<O, F>(self, operation: F) -> Result<O, CompressionError>
    where
        O: Send + 'static,
        F: FnOnce(T) -> Result<O, CompressionError> + Send + 'static,
    {
        let shared = self.inner;
        let task = move || {
            let inner = lock(&shared)?
                .take()
                .ok_or(CompressionError::Contract("stream was already closed"))?;
            operation(inner)
        };
        match Handle::try_current() {
            Ok(handle) => handle.spawn_blocking(task).await.map_err(join_error)?,
            Err(_) => task(),
        }
    }
}

impl<W: Write + Send + 'static> AsyncCompressionStream<CompressStream<W>> {
    /// Writes all of `buf`.
    ///
    /// # Errors
    ///
    /// See [`CompressStream::write_bytes`].
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), CompressionError> {
        let data = buf.to_vec();
        self.run(move |stream| stream.write_bytes(&data).map(drop)).await
    }

    /// Flushes staged input and the sink.
    ///
    /// # Errors
    ///
    /// See [`CompressStream::flush_stream`].
    pub async fn flush(&mut self) -> Result<(), CompressionError> {
        self.run(CompressStream::flush_stream).await
    }

    /// Emits the end-of-stream marker.
    ///
    /// # Errors
    ///
    /// See [`CompressStream::complete`].
    pub async fn complete(&mut self) -> Result<(), CompressionError> {
        self.run(CompressStream::complete).await
    }

    /// Finalizes and closes the stream.
    ///
    /// # Errors
    ///
    /// See [`CompressStream::close`].
    pub async fn close(self) -> Result<Option<W>, CompressionError> {
        self.run_consuming(CompressStream::close).await
    }
}

impl<R: Read + Send + 'static> AsyncCompressionStream<DecompressStream<R>> {
    /// Reads decompressed bytes into `buf`.
    ///
    /// # Errors
    ///
    /// See [`DecompressStream::read_bytes`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CompressionError> {
        let capacity = buf.len();
        let chunk = self
            .run(move |stream| {
                let mut chunk = vec![0u8; capacity];
                let read = stream.read_bytes(&mut chunk)?;
                chunk.truncate(read);
                Ok(chunk)
            })
            .await?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    /// Reads the rest of the stream.
    ///
    /// # Errors
    ///
    /// See [`DecompressStream::read_bytes`].
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, CompressionError> {
        self.run(|stream| {
            let mut decoded = Vec::new();
            stream
                .read_to_end(&mut decoded)
                .map_err(CompressionError::from_io)?;
            Ok(decoded)
        })
        .await
    }
}
