use std::io;

use bytes::Buf;

use crate::BytesCow;

/// Abstraction over a byte source that can hand back a [`BytesCow`] for a
/// requested size, borrowing instead of copying whenever the underlying
/// source already holds the data contiguously in memory.
pub trait ZeroCopyReader<'a> {
    /// Attempts to read exactly `size` bytes, returning them as a
    /// [`BytesCow`] that borrows from the source when possible.
    fn try_read(&mut self, size: usize) -> Result<BytesCow<'a>, io::Error>;

    /// Adapts this reader to [`std::io::Read`] for callers that need the
    /// standard trait instead.
    fn as_std(&mut self) -> impl io::Read + '_
    where
        Self: Sized,
    {
        ZeroCopyReaderAsStd(self)
    }
}

struct ZeroCopyReaderAsStd<'r, R>(&'r mut R);

impl<'a, R: ZeroCopyReader<'a>> io::Read for ZeroCopyReaderAsStd<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.0.try_read(buf.len())?;
        let bytes = chunk.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// A [`ZeroCopyReader`] over anything implementing [`bytes::Buf`]. Reads
/// copy out of the buffer since `Buf` doesn't expose contiguous borrowed
/// slices in general.
pub struct BytesBuf<B>(pub B);

impl<B: Buf> ZeroCopyReader<'static> for BytesBuf<B> {
    fn try_read(&mut self, size: usize) -> Result<BytesCow<'static>, io::Error> {
        if self.0.remaining() < size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes remaining in buffer",
            ));
        }

        let mut out = vec![0u8; size];
        self.0.copy_to_slice(&mut out);
        Ok(BytesCow::from_vec(out))
    }
}

/// A [`ZeroCopyReader`] over anything implementing [`std::io::Read`].
/// Always copies, since a generic reader has no borrowable backing buffer.
pub struct IoRead<R>(pub R);

impl<R: io::Read> ZeroCopyReader<'static> for IoRead<R> {
    fn try_read(&mut self, size: usize) -> Result<BytesCow<'static>, io::Error> {
        let mut out = vec![0u8; size];
        self.0.read_exact(&mut out)?;
        Ok(BytesCow::from_vec(out))
    }
}

/// A [`ZeroCopyReader`] over a borrowed `&[u8]`, the common case where the
/// whole message is already buffered in memory and slices can be handed out
/// without any copying at all.
pub struct Slice<'a>(io::Cursor<&'a [u8]>);

impl<'a> Slice<'a> {
    /// Wraps a byte slice for zero-copy reading.
    pub fn new(slice: &'a [u8]) -> Self {
        Self(io::Cursor::new(slice))
    }
}

impl<'a> ZeroCopyReader<'a> for Slice<'a> {
    fn try_read(&mut self, size: usize) -> Result<BytesCow<'a>, io::Error> {
        let pos = self.0.position() as usize;
        let slice = *self.0.get_ref();

        if slice.len().saturating_sub(pos) < size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes remaining in slice",
            ));
        }

        self.0.set_position((pos + size) as u64);
        Ok(BytesCow::from_slice(&slice[pos..pos + size]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_reader_borrows() {
        let data = b"hello world".to_vec();
        let mut reader = Slice::new(&data);
        let first = reader.try_read(5).unwrap();
        assert_eq!(first.as_bytes(), b"hello");
        assert!(matches!(first, BytesCow::Slice(_)));
    }

    #[test]
    fn slice_reader_eof() {
        let data = b"short".to_vec();
        let mut reader = Slice::new(&data);
        assert!(reader.try_read(10).is_err());
    }

    #[test]
    fn io_read_copies() {
        let mut reader = IoRead(io::Cursor::new(b"abcdef".to_vec()));
        let chunk = reader.try_read(3).unwrap();
        assert_eq!(chunk.as_bytes(), b"abc");
        assert!(matches!(chunk, BytesCow::Vec(_)));
    }
}
