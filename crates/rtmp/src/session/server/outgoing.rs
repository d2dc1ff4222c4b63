//! Server-to-client frame push.
//!
//! [`ServerSession`](super::ServerSession) is read-driven by default: [`ServerSession::drive`](super::ServerSession::drive)
//! only wakes up when the client sends bytes. A session playing back a stream needs to be woken up
//! by whatever is feeding it frames instead, so [`ServerSession::with_outgoing`](super::ServerSession::with_outgoing)
//! attaches a channel that `drive` races against the socket read.

use bytes::Bytes;
use tokio::sync::mpsc;

/// A frame queued for delivery to a connected player.
#[derive(Debug, Clone)]
pub enum OutgoingFrame {
    /// An audio message, as originally received from the publisher.
    Audio {
        /// The timestamp to stamp the outgoing chunk with.
        timestamp: u32,
        /// The message payload (FLV audio tag body).
        data: Bytes,
    },
    /// A video message, as originally received from the publisher.
    Video {
        /// The timestamp to stamp the outgoing chunk with.
        timestamp: u32,
        /// The message payload (FLV video tag body).
        data: Bytes,
    },
    /// An AMF0 data message (e.g. `onMetaData`).
    Amf0Data {
        /// The timestamp to stamp the outgoing chunk with.
        timestamp: u32,
        /// The already-encoded AMF0 payload.
        data: Bytes,
    },
}

/// The sending half of a session's outgoing frame queue.
///
/// Cloning this and handing it to a playback task is the only way to push media into
/// a running [`ServerSession`](super::ServerSession) from outside its own read loop.
pub type OutgoingSender = mpsc::UnboundedSender<OutgoingFrame>;

/// Creates a fresh outgoing frame channel.
///
/// The receiver half is passed to [`ServerSession::with_outgoing`](super::ServerSession::with_outgoing);
/// the sender half is retained by whoever feeds this session its frames.
pub fn channel() -> (OutgoingSender, mpsc::UnboundedReceiver<OutgoingFrame>) {
    mpsc::unbounded_channel()
}
