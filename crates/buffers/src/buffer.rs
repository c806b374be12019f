//! Fixed-capacity exchange buffer with independent read and write cursors.

use std::fmt;
use std::sync::Arc;

use crate::error::BufferError;
use crate::pool::BufferPool;

/// A fixed-capacity byte window shared between a stream and its codec.
///
/// Bytes in `[pos, size)` are readable. Bytes in `[size, limit)` are the
/// writable tail, where `limit` is the capacity unless a write window has
/// been set with [`limit_writable`](Self::limit_writable). The invariant
/// `pos <= size <= capacity` holds after every operation.
pub struct Buffer {
    data: Vec<u8>,
    pos: usize,
    size: usize,
    write_window: Option<usize>,
    pool: Option<Arc<BufferPool>>,
}

impl Buffer {
    /// Rents a buffer of `capacity` bytes from the global pool.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroCapacity`] when `capacity` is zero.
    pub fn rent(capacity: usize) -> Result<Self, BufferError> {
        Self::rent_from(BufferPool::global(), capacity)
    }

    /// Rents a buffer of `capacity` bytes from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroCapacity`] when `capacity` is zero.
    pub fn rent_from(pool: &Arc<BufferPool>, capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            data: pool.rent(capacity),
            pos: 0,
            size: 0,
            write_window: None,
            pool: Some(Arc::clone(pool)),
        })
    }

    /// Allocates a buffer that is not returned to any pool on drop.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroCapacity`] when `capacity` is zero.
    pub fn unpooled(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            data: vec![0u8; capacity],
            pos: 0,
            size: 0,
            write_window: None,
            pool: None,
        })
    }

    /// Total storage in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Read cursor.
    #[must_use]
    pub const fn pos(&self) -> usize {
        self.pos
    }

    /// Write cursor.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Bytes that can still be read: `size - pos`.
    #[must_use]
    pub const fn available_read(&self) -> usize {
        self.size - self.pos
    }

    /// Bytes that could be written after a [`tidy`](Self::tidy):
    /// `capacity - size + pos`, clamped by the write window.
    #[must_use]
    pub fn available_write(&self) -> usize {
        let space = self.capacity() - self.size + self.pos;
        self.write_window.map_or(space, |window| space.min(window))
    }

    /// Bytes that can be written right now without moving data.
    #[must_use]
    pub fn trailing_space(&self) -> usize {
        let space = self.capacity() - self.size;
        self.write_window.map_or(space, |window| space.min(window))
    }

    /// True when no readable bytes remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pos == self.size
    }

    /// The readable region `[pos, size)`.
    #[must_use]
    pub fn readable(&self) -> &[u8] {
        &self.data[self.pos..self.size]
    }

    /// The writable tail handed to codec calls.
    #[must_use]
    pub fn writable(&mut self) -> &mut [u8] {
        let end = self.size + self.trailing_space();
        &mut self.data[self.size..end]
    }

    /// Caps how many bytes [`writable`](Self::writable) exposes, or lifts the
    /// cap with `None`.
    pub const fn limit_writable(&mut self, window: Option<usize>) {
        self.write_window = window;
    }

    /// Copies up to `dest.len()` readable bytes into `dest` and advances the
    /// read cursor. Returns the number of bytes copied.
    pub fn read_into(&mut self, dest: &mut [u8]) -> usize {
        let count = dest.len().min(self.available_read());
        dest[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        count
    }

    /// Moves the read cursor forward without copying.
    ///
    /// # Errors
    ///
    /// Fails when `count` exceeds the readable bytes.
    pub fn advance_read(&mut self, count: usize) -> Result<(), BufferError> {
        let available = self.available_read();
        if count > available {
            return Err(BufferError::out_of_range("advance_read", count, available));
        }
        self.pos += count;
        Ok(())
    }

    /// Copies as much of `src` as fits, tidying first when the trailing space
    /// is smaller than `src`. Returns the number of bytes copied.
    pub fn write_from(&mut self, src: &[u8]) -> usize {
        if self.trailing_space() < src.len() {
            self.tidy();
        }
        let count = src.len().min(self.trailing_space());
        self.data[self.size..self.size + count].copy_from_slice(&src[..count]);
        self.size += count;
        count
    }

    /// Moves the write cursor forward after bytes were written through
    /// [`writable`](Self::writable).
    ///
    /// # Errors
    ///
    /// Fails when `count` exceeds the trailing space.
    pub fn advance_write(&mut self, count: usize) -> Result<(), BufferError> {
        let available = self.trailing_space();
        if count > available {
            return Err(BufferError::out_of_range("advance_write", count, available));
        }
        self.size += count;
        Ok(())
    }

    /// Moves the readable bytes to the front of the storage.
    pub fn tidy(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.data.copy_within(self.pos..self.size, 0);
        self.size -= self.pos;
        self.pos = 0;
    }

    /// Moves the read cursor back so already read bytes become readable again.
    ///
    /// # Errors
    ///
    /// Fails when `count` exceeds the bytes read since the last tidy.
    pub fn rewind_read(&mut self, count: usize) -> Result<(), BufferError> {
        if count > self.pos {
            return Err(BufferError::out_of_range("rewind_read", count, self.pos));
        }
        self.pos -= count;
        Ok(())
    }

    /// Discards all contents.
    pub const fn reset(&mut self) {
        self.pos = 0;
        self.size = 0;
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("pos", &self.pos)
            .field("size", &self.size)
            .field("write_window", &self.write_window)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}
