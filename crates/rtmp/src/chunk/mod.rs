//! RTMP chunk framing (RTMP Specification 1.0 - 5.3).

pub mod define;
pub mod error;
pub mod reader;
pub mod writer;

pub use self::define::{
    CHUNK_SIZE, CHUNK_STREAM_ID_AUDIO, CHUNK_STREAM_ID_COMMAND, CHUNK_STREAM_ID_DATA, CHUNK_STREAM_ID_VIDEO, Chunk,
};
pub use self::error::ChunkReadError;
pub use self::reader::ChunkReader;
pub use self::writer::ChunkWriter;
