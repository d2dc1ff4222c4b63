use std::io::{self, Cursor, Seek, SeekFrom};

use bytes::Bytes;

/// Extension trait for pulling fixed-size slices out of a [`Cursor<Bytes>`]
/// without copying, advancing the cursor's position past the extracted range.
pub trait BytesCursorExt {
    /// Extracts `len` bytes starting at the cursor's current position,
    /// advancing it past them.
    ///
    /// Returns an [`io::ErrorKind::UnexpectedEof`] error if fewer than `len`
    /// bytes remain.
    fn extract_bytes(&mut self, len: usize) -> io::Result<Bytes>;
}

impl BytesCursorExt for Cursor<Bytes> {
    fn extract_bytes(&mut self, len: usize) -> io::Result<Bytes> {
        let pos = self.position();
        let buf = self.get_ref();

        if (buf.len() as u64).saturating_sub(pos) < len as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes remaining in cursor",
            ));
        }

        let start = pos as usize;
        let slice = buf.slice(start..start + len);
        self.seek(SeekFrom::Current(len as i64))?;

        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_advances_position() {
        let mut cursor = Cursor::new(Bytes::from_static(b"hello world"));
        let first = cursor.extract_bytes(5).unwrap();
        assert_eq!(&first[..], b"hello");
        assert_eq!(cursor.position(), 5);

        let rest = cursor.extract_bytes(6).unwrap();
        assert_eq!(&rest[..], b" world");
    }

    #[test]
    fn extract_past_end_errors() {
        let mut cursor = Cursor::new(Bytes::from_static(b"short"));
        assert!(cursor.extract_bytes(10).is_err());
    }
}
