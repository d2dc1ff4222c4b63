//! Chunk wire types (RTMP Specification 1.0 - 5.3).

use bytes::Bytes;

use crate::messages::MessageType;

/// Chunk size assumed before any `Set Chunk Size` message has been exchanged.
pub const INIT_CHUNK_SIZE: usize = 128;

/// Chunk size this server negotiates for itself right after the handshake.
pub const CHUNK_SIZE: usize = 4096;

/// Chunk stream ID reserved for AMF0/AMF3 command and data messages.
pub const CHUNK_STREAM_ID_COMMAND: u32 = 3;

/// Chunk stream ID this server uses to push audio frames to a player.
pub const CHUNK_STREAM_ID_AUDIO: u32 = 4;

/// Chunk stream ID this server uses to push AMF0 data (e.g. onMetaData) to a player.
pub const CHUNK_STREAM_ID_DATA: u32 = 5;

/// Chunk stream ID this server uses to push video frames to a player.
pub const CHUNK_STREAM_ID_VIDEO: u32 = 6;

nutype_enum::nutype_enum! {
    /// The 2 bit chunk type (`fmt`) carried in a chunk's basic header.
    ///
    /// Determines which fields of the message header are present: type 0 carries
    /// the full header, each following type omits more of it, and type 3 carries
    /// none at all (the chunk inherits everything from the previous chunk on the
    /// same chunk stream).
    pub enum ChunkType(u8) {
        /// Full message header: timestamp, message length, type ID, stream ID.
        Type0 = 0,
        /// Same message stream ID as the previous chunk; timestamp is a delta.
        Type1 = 1,
        /// Same message stream ID and length/type as the previous chunk; timestamp is a delta.
        Type2 = 2,
        /// No message header at all; everything is inherited from the previous chunk.
        Type3 = 3,
    }
}

/// The basic header of a chunk: just the chunk stream ID, since the `fmt`
/// bits are only meaningful while encoding/decoding and aren't retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBasicHeader {
    /// The chunk stream ID this chunk belongs to.
    pub chunk_stream_id: u32,
}

/// The (possibly inherited) message header of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessageHeader {
    /// The absolute timestamp of the message, in milliseconds.
    pub timestamp: u32,
    /// The length of the complete message, in bytes.
    pub msg_length: u32,
    /// The type of the message.
    pub msg_type_id: MessageType,
    /// The message stream ID this chunk belongs to.
    pub msg_stream_id: u32,
}

impl ChunkMessageHeader {
    /// Returns true if the timestamp doesn't fit in the 3 byte timestamp
    /// field and must be carried as a 4 byte extended timestamp instead.
    pub fn is_extended_timestamp(&self) -> bool {
        self.timestamp >= 0xFFFFFF
    }
}

/// A complete RTMP message, reassembled from one or more chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The basic header.
    pub basic_header: ChunkBasicHeader,
    /// The message header.
    pub message_header: ChunkMessageHeader,
    /// The message payload.
    pub payload: Bytes,
}

impl Chunk {
    /// Creates a new chunk representing a complete message ready to be split
    /// and written out by [`ChunkWriter`](super::writer::ChunkWriter).
    pub fn new(chunk_stream_id: u32, timestamp: u32, msg_type_id: MessageType, msg_stream_id: u32, payload: Bytes) -> Self {
        Self {
            basic_header: ChunkBasicHeader { chunk_stream_id },
            message_header: ChunkMessageHeader {
                timestamp,
                msg_length: payload.len() as u32,
                msg_type_id,
                msg_stream_id,
            },
            payload,
        }
    }
}
