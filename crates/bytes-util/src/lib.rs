//! Small, dependency-light helpers for working with [`bytes`] buffers and
//! byte-backed strings that show up everywhere in wire-protocol code:
//! copy-on-write byte/string types that can stay borrowed when the caller
//! already owns the buffer, and a cursor extension for carving fixed-size
//! slices out of a [`bytes::Bytes`] without an extra copy.

mod bytes_cursor;
mod cow;
mod zero_copy;

pub use bytes_cursor::BytesCursorExt;
pub use cow::{BytesCow, StringCow};
pub use zero_copy::{BytesBuf, IoRead, Slice, ZeroCopyReader};

#[cfg(feature = "serde")]
mod serde_impl;
