#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Pooled exchange buffers for the streaming compression engine.
//!
//! Two pieces live here:
//!
//! - [`BufferPool`]: a process-wide, thread-safe cache of byte storage keyed
//!   by exact size. Idle storage is evicted lazily by a sweep that piggybacks
//!   on `rent`/`give_back` calls, so no background thread is ever spawned.
//! - [`Buffer`]: a fixed-capacity byte window with independent read (`pos`)
//!   and write (`size`) cursors. Codec adapters consume from
//!   [`Buffer::readable`] and produce into [`Buffer::writable`], then advance
//!   the cursors explicitly.
//!
//! Storage rented for a [`Buffer`] goes back to its pool when the buffer is
//! dropped.
//!
//! # Example
//!
//! ```
//! use buffers::Buffer;
//!
//! let mut buffer = Buffer::rent(8).expect("non-zero capacity");
//! assert_eq!(buffer.write_from(b"hello"), 5);
//!
//! let mut out = [0u8; 3];
//! assert_eq!(buffer.read_into(&mut out), 3);
//! assert_eq!(&out, b"hel");
//! assert_eq!(buffer.readable(), b"lo");
//! ```

mod buffer;
mod error;
mod pool;

pub use buffer::Buffer;
pub use error::BufferError;
pub use pool::{BufferPool, DEFAULT_STALE_AFTER, DEFAULT_SWEEP_INTERVAL};
