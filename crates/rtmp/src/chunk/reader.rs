//! Chunk reassembly (RTMP Specification 1.0 - 5.3).

use std::collections::HashMap;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::BytesMut;

use super::define::{Chunk, ChunkBasicHeader, ChunkMessageHeader, ChunkType, INIT_CHUNK_SIZE};
use super::error::ChunkReadError;
use crate::messages::MessageType;

/// Caps the number of distinct chunk stream IDs we'll remember a previous
/// header for. A well-behaved client uses a handful; this is a DoS backstop.
const MAX_PREVIOUS_HEADERS: usize = 128;

/// Caps the number of chunk stream IDs with an in-progress (multi-chunk)
/// message at once.
const MAX_PARTIAL_CHUNKS: usize = 128;

/// Caps how large a single message's payload is allowed to grow while being
/// reassembled across chunks.
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

struct PartialChunk {
    header: ChunkMessageHeader,
    payload: BytesMut,
}

/// Reassembles chunks read off the wire into complete [`Chunk`] messages.
///
/// Chunk streams are identified by chunk stream ID; each one has its own
/// "previous header" (for types 1-3, which omit fields inherited from it)
/// and, while a message longer than the negotiated chunk size is being
/// split across chunks, its own in-progress payload buffer.
pub struct ChunkReader {
    max_chunk_size: usize,
    previous_headers: HashMap<u32, ChunkMessageHeader>,
    partials: HashMap<u32, PartialChunk>,
}

impl Default for ChunkReader {
    fn default() -> Self {
        Self {
            max_chunk_size: INIT_CHUNK_SIZE,
            previous_headers: HashMap::new(),
            partials: HashMap::new(),
        }
    }
}

/// The basic header's decoded chunk stream ID plus how many bytes it took.
struct BasicHeader {
    len: usize,
    fmt: ChunkType,
    chunk_stream_id: u32,
}

fn peek_basic_header(buf: &[u8]) -> Option<BasicHeader> {
    let first = *buf.first()?;
    let fmt = ChunkType::from(first >> 6);

    match first & 0x3F {
        0 => {
            let low = *buf.get(1)? as u32;
            Some(BasicHeader {
                len: 2,
                fmt,
                chunk_stream_id: 64 + low,
            })
        }
        1 => {
            let low = *buf.get(1)? as u32;
            let high = *buf.get(2)? as u32;
            Some(BasicHeader {
                len: 3,
                fmt,
                chunk_stream_id: 64 + low + high * 256,
            })
        }
        csid => Some(BasicHeader {
            len: 1,
            fmt,
            chunk_stream_id: csid as u32,
        }),
    }
}

impl ChunkReader {
    /// Updates the max chunk size in effect for the stream being read, as
    /// negotiated by a `Set Chunk Size` protocol control message. Returns
    /// false (and leaves the previous size in place) if `chunk_size` is not
    /// usable.
    pub fn update_max_chunk_size(&mut self, chunk_size: usize) -> bool {
        if chunk_size == 0 || chunk_size > MAX_MESSAGE_SIZE {
            return false;
        }

        self.max_chunk_size = chunk_size;
        true
    }

    /// Attempts to read a single complete [`Chunk`] (message) out of `buf`.
    ///
    /// Consumes exactly the bytes that made up whatever chunk header/payload
    /// piece was parsed. Returns `Ok(None)` if `buf` doesn't yet contain a
    /// full chunk piece; the caller should read more bytes and try again.
    /// Call this in a loop, since one buffer can contain several chunks.
    pub fn read_chunk(&mut self, buf: &mut BytesMut) -> Result<Option<Chunk>, ChunkReadError> {
        let Some(basic) = peek_basic_header(buf) else {
            return Ok(None);
        };

        let csid = basic.chunk_stream_id;

        let header_len = match basic.fmt {
            ChunkType::Type0 => 11,
            ChunkType::Type1 => 7,
            ChunkType::Type2 => 3,
            _ => 0,
        };

        if buf.len() < basic.len + header_len {
            return Ok(None);
        }

        let header_bytes = &buf[basic.len..basic.len + header_len];

        // Whether this chunk carries a 4 byte extended timestamp depends on the
        // (possibly not-yet-known) timestamp/delta value for types 0-2, and on
        // whatever the inherited header used for type 3.
        let (raw_timestamp, extended) = match basic.fmt {
            ChunkType::Type0 | ChunkType::Type1 | ChunkType::Type2 => {
                let mut r = header_bytes;
                let ts = r.read_u24::<BigEndian>().expect("header_len checked above");
                (ts, ts >= 0xFFFFFF)
            }
            _ => {
                let previous = self
                    .previous_headers
                    .get(&csid)
                    .ok_or(ChunkReadError::MissingPreviousChunkHeader(csid))?;
                (previous.timestamp, previous.is_extended_timestamp())
            }
        };

        let ext_len = if extended { 4 } else { 0 };
        let total_header = basic.len + header_len + ext_len;

        if buf.len() < total_header {
            return Ok(None);
        }

        let message_header = match basic.fmt {
            ChunkType::Type0 => {
                let mut r = &header_bytes[3..];
                let msg_length = r.read_u24::<BigEndian>().expect("checked above");
                let msg_type_id = MessageType::from(r.read_u8().expect("checked above"));
                let msg_stream_id = r.read_u32::<LittleEndian>().expect("checked above");

                let timestamp = if extended {
                    (&buf[basic.len + header_len..])
                        .read_u32::<BigEndian>()
                        .expect("checked above")
                } else {
                    raw_timestamp
                };

                ChunkMessageHeader {
                    timestamp,
                    msg_length,
                    msg_type_id,
                    msg_stream_id,
                }
            }
            ChunkType::Type1 => {
                let previous = self
                    .previous_headers
                    .get(&csid)
                    .ok_or(ChunkReadError::MissingPreviousChunkHeader(csid))?;

                let mut r = &header_bytes[3..];
                let msg_length = r.read_u24::<BigEndian>().expect("checked above");
                let msg_type_id = MessageType::from(r.read_u8().expect("checked above"));

                let delta = if extended {
                    (&buf[basic.len + header_len..])
                        .read_u32::<BigEndian>()
                        .expect("checked above")
                } else {
                    raw_timestamp
                };

                let timestamp = previous
                    .timestamp
                    .checked_add(delta)
                    .ok_or(ChunkReadError::TimestampOverflow(previous.timestamp, delta))?;

                ChunkMessageHeader {
                    timestamp,
                    msg_length,
                    msg_type_id,
                    msg_stream_id: previous.msg_stream_id,
                }
            }
            ChunkType::Type2 => {
                let previous = self
                    .previous_headers
                    .get(&csid)
                    .ok_or(ChunkReadError::MissingPreviousChunkHeader(csid))?;

                let delta = if extended {
                    (&buf[basic.len + header_len..])
                        .read_u32::<BigEndian>()
                        .expect("checked above")
                } else {
                    raw_timestamp
                };

                let timestamp = previous
                    .timestamp
                    .checked_add(delta)
                    .ok_or(ChunkReadError::TimestampOverflow(previous.timestamp, delta))?;

                ChunkMessageHeader {
                    timestamp,
                    msg_length: previous.msg_length,
                    msg_type_id: previous.msg_type_id,
                    msg_stream_id: previous.msg_stream_id,
                }
            }
            _ => self
                .previous_headers
                .get(&csid)
                .ok_or(ChunkReadError::MissingPreviousChunkHeader(csid))?
                .clone(),
        };

        if message_header.msg_length as usize > MAX_MESSAGE_SIZE {
            return Err(ChunkReadError::PartialChunkTooLarge(message_header.msg_length as usize));
        }

        // A fresh format 0 header always starts a new message; any previous
        // reassembly in progress for this csid is abandoned, not appended to.
        if basic.fmt == ChunkType::Type0 {
            self.partials.remove(&csid);
        }

        let already_read = self.partials.get(&csid).map(|p| p.payload.len()).unwrap_or(0);
        // Type1/Type2 headers carry (or inherit) a `msg_length` for the message in progress; if it's
        // smaller than what's already been buffered for this csid, the sender switched messages
        // without a fresh Type0 header. Reject rather than underflow into a bogus `remaining`.
        let remaining = (message_header.msg_length as usize).checked_sub(already_read).ok_or(
            ChunkReadError::InconsistentPartialChunkLength(csid, message_header.msg_length, already_read),
        )?;
        let piece_len = remaining.min(self.max_chunk_size);

        if buf.len() < total_header + piece_len {
            return Ok(None);
        }

        if !self.partials.contains_key(&csid) && self.partials.len() >= MAX_PARTIAL_CHUNKS {
            return Err(ChunkReadError::TooManyPartialChunks);
        }

        if !self.previous_headers.contains_key(&csid) && self.previous_headers.len() >= MAX_PREVIOUS_HEADERS {
            return Err(ChunkReadError::TooManyPreviousChunkHeaders);
        }

        // Everything needed is buffered and within limits. Consume it for real now.
        let _ = buf.split_to(total_header);
        let piece = buf.split_to(piece_len).freeze();

        self.previous_headers.insert(csid, message_header.clone());

        let entry = self.partials.entry(csid).or_insert_with(|| PartialChunk {
            header: message_header.clone(),
            payload: BytesMut::with_capacity(message_header.msg_length as usize),
        });
        entry.header = message_header.clone();
        entry.payload.extend_from_slice(&piece);

        if entry.payload.len() as u32 >= message_header.msg_length {
            let PartialChunk { header, payload } = self.partials.remove(&csid).expect("just inserted");

            return Ok(Some(Chunk {
                basic_header: ChunkBasicHeader { chunk_stream_id: csid },
                message_header: header,
                payload: payload.freeze(),
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;

    fn basic_header(fmt: u8, csid: u32) -> Vec<u8> {
        assert!(csid < 64);
        vec![(fmt << 6) | csid as u8]
    }

    #[test]
    fn reads_type0_small_message() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&basic_header(0, 5));
        buf.put_u24(0); // timestamp
        buf.put_u24(4); // message length
        buf.put_u8(MessageType::Audio.0);
        buf.put_u32_le(0); // message stream id
        buf.extend_from_slice(&[1, 2, 3, 4]);

        let mut reader = ChunkReader::default();
        let chunk = reader.read_chunk(&mut buf).unwrap().expect("complete chunk");

        assert_eq!(chunk.basic_header.chunk_stream_id, 5);
        assert_eq!(chunk.message_header.msg_type_id, MessageType::Audio);
        assert_eq!(chunk.payload, Bytes::from_static(&[1, 2, 3, 4]));
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_on_incomplete_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&basic_header(0, 5));
        buf.put_u24(0);
        buf.put_u24(4);
        buf.put_u8(MessageType::Audio.0);
        // missing the rest of the header and payload

        let mut reader = ChunkReader::default();
        assert!(reader.read_chunk(&mut buf).unwrap().is_none());
    }

    #[test]
    fn type3_without_previous_header_errors() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&basic_header(3, 5));

        let mut reader = ChunkReader::default();
        assert!(matches!(
            reader.read_chunk(&mut buf),
            Err(ChunkReadError::MissingPreviousChunkHeader(5))
        ));
    }

    #[test]
    fn reassembles_across_max_chunk_size() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&basic_header(0, 5));
        buf.put_u24(0);
        buf.put_u24(6); // message length, larger than our chunk size below
        buf.put_u8(MessageType::Audio.0);
        buf.put_u32_le(0);
        buf.extend_from_slice(&[1, 2, 3]);

        // continuation chunk (type 3, same csid)
        buf.extend_from_slice(&basic_header(3, 5));
        buf.extend_from_slice(&[4, 5, 6]);

        let mut reader = ChunkReader::default();
        reader.update_max_chunk_size(3);

        assert!(reader.read_chunk(&mut buf).unwrap().is_none());
        let chunk = reader.read_chunk(&mut buf).unwrap().expect("complete chunk");
        assert_eq!(chunk.payload, Bytes::from_static(&[1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let mut reader = ChunkReader::default();
        assert!(!reader.update_max_chunk_size(0));
    }

    #[test]
    fn type1_with_shorter_length_than_already_read_errors() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&basic_header(0, 5));
        buf.put_u24(0);
        buf.put_u24(6); // message length, larger than our chunk size below
        buf.put_u8(MessageType::Audio.0);
        buf.put_u32_le(0);
        buf.extend_from_slice(&[1, 2, 3]);

        let mut reader = ChunkReader::default();
        reader.update_max_chunk_size(3);
        assert!(reader.read_chunk(&mut buf).unwrap().is_none());

        // Type1 continuation for the same csid, declaring a message length shorter than the 3
        // bytes already buffered for it.
        buf.extend_from_slice(&basic_header(1, 5));
        buf.put_u24(0); // timestamp delta
        buf.put_u24(2); // msg_length, smaller than already_read
        buf.put_u8(MessageType::Audio.0);
        buf.extend_from_slice(&[4, 5]);

        assert!(matches!(
            reader.read_chunk(&mut buf),
            Err(ChunkReadError::InconsistentPartialChunkLength(5, 2, 3))
        ));
    }
}
