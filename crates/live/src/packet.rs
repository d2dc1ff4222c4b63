//! Opaque media units moving through a [`Stream`](crate::stream::Stream).

use bytes::Bytes;

/// What kind of media a [`Packet`] carries, and any flags describing it.
#[bitmask_enum::bitmask(u8)]
pub enum PacketType {
    /// Video payload (FLV `VideoTagHeader` + body).
    Video = 0b0000_0001,
    /// Audio payload (FLV `AudioTagHeader` + body).
    Audio = 0b0000_0010,
    /// AMF0 metadata (`onMetaData` and similar).
    Meta = 0b0000_0100,
    /// AMF3 metadata.
    Meta3 = 0b0000_1000,
    /// Marks a video packet as a keyframe (IDR or otherwise).
    KeyFrame = 0b0001_0000,
    /// Marks a video packet as carrying an IDR frame specifically.
    Idr = 0b0010_0000,
    /// Marks the packet as a codec sequence header (AVC/AAC config) rather than media.
    CodecHeader = 0b0100_0000,
}

impl PacketType {
    /// True if this packet should live in the stream's header cache instead of (or in
    /// addition to) the ring — metadata or a codec sequence header.
    pub fn is_header(self) -> bool {
        self.intersects(Self::Meta | Self::Meta3 | Self::CodecHeader)
    }
}

/// An optional extension carried alongside a packet's raw payload.
///
/// Populated by the chunk framer on ingress with details that don't survive into the
/// wire-independent [`Packet`] fields but are occasionally useful to the protocol layer
/// (e.g. when re-deriving an RTMP message header for a packet pulled back out of the ring).
#[derive(Debug, Clone, Default)]
pub struct PacketExtension {
    /// The RTMP message stream ID the packet originally arrived on, if known.
    pub msg_stream_id: Option<u32>,
}

/// A single unit of media: one audio frame, one video frame, or one metadata blob.
///
/// Cheap to clone — [`Bytes::clone`] is a refcount bump, so fanning the same packet out to
/// many players never copies the payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// What this packet is.
    pub kind: PacketType,
    /// Timestamp in milliseconds, already corrected by the owning stream's [`TimeCorrector`](crate::time_corrector::TimeCorrector).
    pub timestamp: u32,
    /// Monotonically assigned by the owning stream; dense, starts at 0. `None` before the
    /// stream has assigned it an index (e.g. immediately after construction by the framer).
    pub index: Option<u64>,
    /// The raw payload bytes (FLV tag body, without the FLV tag header).
    pub payload: Bytes,
    /// Optional protocol-layer context.
    pub extension: Option<PacketExtension>,
}

impl Packet {
    /// Creates a new packet not yet assigned a stream index.
    pub fn new(kind: PacketType, timestamp: u32, payload: Bytes) -> Self {
        Self {
            kind,
            timestamp,
            index: None,
            payload,
            extension: None,
        }
    }

    /// True if this is a video keyframe.
    pub fn is_key_frame(&self) -> bool {
        self.kind.contains(PacketType::Video) && self.kind.contains(PacketType::KeyFrame)
    }

    /// True if this is a codec sequence header or metadata packet.
    pub fn is_header(&self) -> bool {
        self.kind.is_header()
    }

    /// Detects a codec sequence header using the same "second byte is zero" heuristic the
    /// RTMP/FLV ecosystem uses for both AVC and AAC payloads: byte 0 is the FLV
    /// codec/packet-type prefix, byte 1 is 0 for a sequence header and nonzero for frame data.
    pub fn looks_like_codec_header(payload: &[u8]) -> bool {
        payload.len() >= 2 && payload[1] == 0
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn codec_header_heuristic() {
        assert!(Packet::looks_like_codec_header(&[0x17, 0x00, 0x00, 0x00, 0x00]));
        assert!(!Packet::looks_like_codec_header(&[0x17, 0x01, 0x00, 0x00, 0x00]));
        assert!(!Packet::looks_like_codec_header(&[0x17]));
    }

    #[test]
    fn key_frame_detection() {
        let p = Packet::new(PacketType::Video | PacketType::KeyFrame, 0, Bytes::new());
        assert!(p.is_key_frame());

        let p = Packet::new(PacketType::Video, 0, Bytes::new());
        assert!(!p.is_key_frame());
    }

    #[test]
    fn header_classification() {
        let p = Packet::new(PacketType::Audio | PacketType::CodecHeader, 0, Bytes::new());
        assert!(p.is_header());

        let p = Packet::new(PacketType::Audio, 0, Bytes::new());
        assert!(!p.is_header());
    }
}
