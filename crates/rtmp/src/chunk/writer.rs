//! Chunk framing, encode side (RTMP Specification 1.0 - 5.3).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use super::define::{Chunk, ChunkMessageHeader, ChunkType, INIT_CHUNK_SIZE};

/// What we remember about the last chunk sent on a given chunk stream ID, so
/// the next one can be encoded with the tightest format that's still correct.
#[derive(Clone)]
struct OutboundHeader {
    msg_stream_id: u32,
    msg_length: u32,
    msg_type_id: crate::messages::MessageType,
    /// Absolute timestamp of the last chunk sent.
    timestamp: u32,
    /// Timestamp delta used by the last chunk sent (0 for the first, type 0, chunk).
    delta: u32,
    /// Whether the last chunk's timestamp/delta field used extended timestamp encoding.
    extended: bool,
}

/// A chunk writer.
///
/// Splits outbound messages into chunks of at most `chunk_size` bytes,
/// choosing the tightest chunk format (0-3) that's valid given what was last
/// sent on that chunk stream ID.
pub struct ChunkWriter {
    chunk_size: usize,
    previous_headers: RefCell<HashMap<u32, OutboundHeader>>,
}

impl Default for ChunkWriter {
    fn default() -> Self {
        Self {
            chunk_size: INIT_CHUNK_SIZE,
            previous_headers: RefCell::new(HashMap::new()),
        }
    }
}

impl ChunkWriter {
    /// Set the chunk size used to split outbound message payloads.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size;
    }

    /// Picks the tightest format for `header` given the last header sent on
    /// its chunk stream ID, and returns it along with the timestamp delta
    /// (relative to the last chunk sent) to encode.
    fn select_format(previous: Option<&OutboundHeader>, header: &ChunkMessageHeader) -> (ChunkType, u32) {
        let Some(previous) = previous else {
            return (ChunkType::Type0, 0);
        };

        let delta = header.timestamp.wrapping_sub(previous.timestamp);

        if previous.msg_stream_id != header.msg_stream_id {
            (ChunkType::Type0, delta)
        } else if previous.msg_length != header.msg_length || previous.msg_type_id != header.msg_type_id {
            (ChunkType::Type1, delta)
        } else if previous.delta != delta {
            (ChunkType::Type2, delta)
        } else {
            (ChunkType::Type3, delta)
        }
    }

    /// Internal function to write the basic header.
    #[inline]
    fn write_basic_header(io: &mut impl io::Write, fmt: ChunkType, csid: u32) -> io::Result<()> {
        let fmt = fmt.0;

        if csid >= 64 + 255 {
            io.write_u8((fmt << 6) | 1)?;
            let csid = csid - 64;

            let div = csid / 256;
            let rem = csid % 256;

            io.write_u8(rem as u8)?;
            io.write_u8(div as u8)?;
        } else if csid >= 64 {
            io.write_u8(fmt << 6)?;
            io.write_u8((csid - 64) as u8)?;
        } else {
            io.write_u8((fmt << 6) | csid as u8)?;
        }

        Ok(())
    }

    /// Writes the timestamp/delta field for `fmt`, returning the 24 bit
    /// value actually written so the caller can decide whether an extended
    /// timestamp follows.
    #[inline]
    fn write_timestamp_field(io: &mut impl io::Write, fmt: ChunkType, timestamp: u32, delta: u32) -> io::Result<u32> {
        let value = match fmt {
            ChunkType::Type0 => timestamp,
            _ => delta,
        };

        let field = value.min(0xFFFFFF);
        io.write_u24::<BigEndian>(field)?;

        Ok(value)
    }

    /// Internal function to write the message header (everything after the
    /// basic header: timestamp/delta, and for types 0-1 the length/type and,
    /// for type 0 only, the stream ID).
    #[inline]
    fn write_message_header(
        io: &mut impl io::Write,
        fmt: ChunkType,
        message_header: &ChunkMessageHeader,
        delta: u32,
    ) -> io::Result<()> {
        if fmt == ChunkType::Type3 {
            if message_header.is_extended_timestamp() {
                Self::write_extended_timestamp(io, delta)?;
            }
            return Ok(());
        }

        let value = Self::write_timestamp_field(io, fmt, message_header.timestamp, delta)?;

        if fmt != ChunkType::Type2 {
            io.write_u24::<BigEndian>(message_header.msg_length)?;
            io.write_u8(message_header.msg_type_id.0)?;
        }

        if fmt == ChunkType::Type0 {
            io.write_u32::<LittleEndian>(message_header.msg_stream_id)?;
        }

        if value >= 0xFFFFFF {
            Self::write_extended_timestamp(io, value)?;
        }

        Ok(())
    }

    /// Internal function to write the extended timestamp.
    #[inline]
    fn write_extended_timestamp(io: &mut impl io::Write, value: u32) -> io::Result<()> {
        io.write_u32::<BigEndian>(value)?;

        Ok(())
    }

    /// Write a chunk (a complete message) into some writer, splitting it
    /// into as many wire chunks as `chunk_size` requires.
    pub fn write_chunk(&self, io: &mut impl io::Write, mut chunk_info: Chunk) -> io::Result<()> {
        let csid = chunk_info.basic_header.chunk_stream_id;

        let (fmt, delta) = {
            let previous = self.previous_headers.borrow();
            Self::select_format(previous.get(&csid), &chunk_info.message_header)
        };

        let extended = match fmt {
            ChunkType::Type0 => chunk_info.message_header.timestamp >= 0xFFFFFF,
            _ => delta >= 0xFFFFFF,
        };

        self.previous_headers.borrow_mut().insert(
            csid,
            OutboundHeader {
                msg_stream_id: chunk_info.message_header.msg_stream_id,
                msg_length: chunk_info.message_header.msg_length,
                msg_type_id: chunk_info.message_header.msg_type_id,
                timestamp: chunk_info.message_header.timestamp,
                delta,
                extended,
            },
        );

        Self::write_basic_header(io, fmt, csid)?;
        Self::write_message_header(io, fmt, &chunk_info.message_header, delta)?;

        loop {
            let cur_payload_size = chunk_info.payload.len().min(self.chunk_size);
            let payload_bytes = chunk_info.payload.split_to(cur_payload_size);
            io.write_all(&payload_bytes[..])?;

            if chunk_info.payload.is_empty() {
                break;
            }

            Self::write_basic_header(io, ChunkType::Type3, csid)?;

            if extended {
                let continuation_value = if fmt == ChunkType::Type0 {
                    chunk_info.message_header.timestamp
                } else {
                    delta
                };
                Self::write_extended_timestamp(io, continuation_value)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::messages::MessageType;

    #[test]
    fn test_writer_write_small_chunk() {
        let writer = ChunkWriter::default();
        let mut buf = Vec::new();

        let chunk = Chunk::new(
            0,
            0,
            MessageType::Abort,
            0,
            Bytes::from(vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]),
        );

        writer.write_chunk(&mut buf, chunk).unwrap();

        #[rustfmt::skip]
        assert_eq!(
            buf,
            vec![
                (0x00 << 6), // chunk basic header - fmt: 0, csid: 0
                0x00, 0x00, 0x00, // timestamp (0)
                0x00, 0x00, 0x08, // message length (8 bytes)
                0x02, // message type id (abort)
                0x00, 0x00, 0x00, 0x00, // message stream id (0)
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, // message payload
            ]
        );
    }

    #[test]
    fn test_writer_write_large_chunk() {
        let writer = ChunkWriter::default();
        let mut buf = Vec::new();

        let mut payload = Vec::new();
        for i in 0..129 {
            payload.push(i);
        }

        let chunk = Chunk::new(10, 100, MessageType::Audio, 13, Bytes::from(payload));

        writer.write_chunk(&mut buf, chunk).unwrap();

        #[rustfmt::skip]
        let mut expected = vec![
            0x0A, // chunk basic header - fmt: 0, csid: 10
            0x00, 0x00, 0x64, // timestamp (100)
            0x00, 0x00, 0x81, // message length (129 bytes)
            0x08, // message type id (audio)
            0x0D, 0x00, 0x00, 0x00, // message stream id (13)
        ];

        for i in 0..128 {
            expected.push(i);
        }

        expected.push((0x03 << 6) | 0x0A); // chunk basic header - fmt: 3, csid: 10
        expected.push(128); // The rest of the payload should have been written

        assert_eq!(buf, expected);
    }

    #[test]
    fn test_writer_extended_timestamp() {
        let writer = ChunkWriter::default();
        let mut buf = Vec::new();

        let chunk = Chunk::new(
            0,
            0xFFFFFFFF,
            MessageType::Abort,
            0,
            Bytes::from(vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]),
        );

        writer.write_chunk(&mut buf, chunk).unwrap();

        #[rustfmt::skip]
        assert_eq!(
            buf,
            vec![
                (0x00 << 6), // chunk basic header - fmt: 0, csid: 0
                0xFF, 0xFF, 0xFF, // timestamp (0xFFFFFF)
                0x00, 0x00, 0x08, // message length (8 bytes)
                0x02, // message type id (abort)
                0x00, 0x00, 0x00, 0x00, // message stream id (0)
                0xFF, 0xFF, 0xFF, 0xFF, // extended timestamp
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, // message payload
            ]
        );
    }

    #[test]
    fn test_writer_extended_csid() {
        let writer = ChunkWriter::default();
        let mut buf = Vec::new();

        let chunk = Chunk::new(
            64,
            0,
            MessageType::Abort,
            0,
            Bytes::from(vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]),
        );

        writer.write_chunk(&mut buf, chunk).unwrap();

        #[rustfmt::skip]
        assert_eq!(
            buf,
            vec![
                (0x00 << 6), // chunk basic header - fmt: 0, csid: 0
                0x00, // extended csid (64 + 0) = 64
                0x00, 0x00, 0x00, // timestamp (0)
                0x00, 0x00, 0x08, // message length (8 bytes)
                0x02, // message type id (abort)
                0x00, 0x00, 0x00, 0x00, // message stream id (0)
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, // message payload
            ]
        );
    }

    #[test]
    fn test_writer_extended_csid_ext() {
        let writer = ChunkWriter::default();
        let mut buf = Vec::new();

        let chunk = Chunk::new(
            320,
            0,
            MessageType::Abort,
            0,
            Bytes::from(vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]),
        );

        writer.write_chunk(&mut buf, chunk).unwrap();

        #[rustfmt::skip]
        assert_eq!(
            buf,
            vec![
                0x01, // chunk basic header - fmt: 0, csid: 1
                0x00, // extended csid (64 + 0) = 64
                0x01, // extended csid (256 * 1) = 256 + 64 + 0 = 320
                0x00, 0x00, 0x00, // timestamp (0)
                0x00, 0x00, 0x08, // message length (8 bytes)
                0x02, // message type id (abort)
                0x00, 0x00, 0x00, 0x00, // message stream id (0)
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, // message payload
            ]
        );
    }

    #[test]
    fn test_writer_tightest_format_selection() {
        let writer = ChunkWriter::default();
        let mut buf = Vec::new();

        // First message on csid 5: must be a full (type 0) header.
        writer
            .write_chunk(&mut buf, Chunk::new(5, 1000, MessageType::Video, 1, Bytes::from_static(&[0x01])))
            .unwrap();
        // Same stream/length/type, timestamp advances by 40: type 2 (delta only).
        writer
            .write_chunk(&mut buf, Chunk::new(5, 1040, MessageType::Video, 1, Bytes::from_static(&[0x02])))
            .unwrap();
        // Same delta again: type 3 (nothing new to say).
        writer
            .write_chunk(&mut buf, Chunk::new(5, 1080, MessageType::Video, 1, Bytes::from_static(&[0x03])))
            .unwrap();
        // Length changes: type 1.
        writer
            .write_chunk(
                &mut buf,
                Chunk::new(5, 1120, MessageType::Video, 1, Bytes::from_static(&[0x04, 0x05])),
            )
            .unwrap();

        let mut reader = super::super::reader::ChunkReader::default();
        let mut read_buf = bytes::BytesMut::from(&buf[..]);

        let c1 = reader.read_chunk(&mut read_buf).unwrap().expect("chunk 1");
        assert_eq!(c1.message_header.timestamp, 1000);
        assert_eq!(c1.payload, Bytes::from_static(&[0x01]));

        let c2 = reader.read_chunk(&mut read_buf).unwrap().expect("chunk 2");
        assert_eq!(c2.message_header.timestamp, 1040);
        assert_eq!(c2.payload, Bytes::from_static(&[0x02]));

        let c3 = reader.read_chunk(&mut read_buf).unwrap().expect("chunk 3");
        assert_eq!(c3.message_header.timestamp, 1080);
        assert_eq!(c3.payload, Bytes::from_static(&[0x03]));

        let c4 = reader.read_chunk(&mut read_buf).unwrap().expect("chunk 4");
        assert_eq!(c4.message_header.timestamp, 1120);
        assert_eq!(c4.payload, Bytes::from_static(&[0x04, 0x05]));

        assert!(read_buf.is_empty());
    }
}
