//! User control messages.
//!
//! Defined by:
//! - Legacy RTMP spec, 6.2

pub mod reader;
pub mod writer;

nutype_enum::nutype_enum! {
    /// The type of user control message event.
    pub enum EventType(u16) {
        /// > The server sends this event to notify the client
        /// > that a stream has become functional and can be
        /// > used for communication. By default, this event
        /// > is sent on ID 0 after the application connect
        /// > command is successfully received from the
        /// > client. The event data is 4-byte and represents
        /// > the stream ID of the stream that became
        /// > functional.
        StreamBegin = 0,
        /// > The server sends this event to notify the client
        /// > that the playback of data is over as requested
        /// > on this stream. No more data is sent without
        /// > issuing additional commands. The client discards
        /// > the messages received for the stream. The
        /// > 4 bytes of event data represent the ID of the
        /// > stream on which playback has ended.
        StreamEOF = 1,
        /// > The server sends this event to notify the client
        /// > that there is no more data on the stream. If the
        /// > server does not detect any message for a time
        /// > period, it can notify the subscribed clients
        /// > that the stream is dry. The 4 bytes of event
        /// > data represent the stream ID of the dry stream.
        StreamDry = 2,
        /// > The client sends this event to inform the server
        /// > of the buffer size (in milliseconds) that is
        /// > used to buffer any data coming over a stream.
        /// > This event is sent before the server starts
        /// > processing the stream. The first 4 bytes of the
        /// > event data represent the stream ID and the next
        /// > 4 bytes represent the buffer length, in milliseconds.
        SetBufferLength = 3,
        /// > The server sends this event to notify the client
        /// > that the stream is a recorded stream. The
        /// > 4 bytes event data represent the stream ID of
        /// > the recorded stream.
        StreamIsRecorded = 4,
        /// > The server sends this event to test whether the
        /// > client is reachable. Event data is a 4-byte
        /// > timestamp, representing the local server time
        /// > when the server dispatched the command. The
        /// > client responds with PingResponse on receiving
        /// > MsgPingRequest.
        PingRequest = 6,
        /// > The client sends this event to the server in
        /// > response to the ping request. The event data is
        /// > a 4-byte timestamp, which was received with the
        /// > PingRequest request.
        PingResponse = 7,
    }
}

/// > The server sends this event to notify the client
/// > that a stream has become functional and can be
/// > used for communication. By default, this event
/// > is sent on ID 0 after the application connect
/// > command is successfully received from the
/// > client. The event data is 4-byte and represents
/// > the stream ID of the stream that became
/// > functional.
pub struct EventMessageStreamBegin {
    /// The stream ID of the stream that became functional.
    pub stream_id: u32,
}

/// > The server sends this event to test whether the
/// > client is reachable. Event data is a 4-byte
/// > timestamp, representing the local server time
/// > when the server dispatched the command. The
/// > client responds with PingResponse on receiving
/// > MsgPingRequest.
pub struct EventMessagePingRequest {
    /// The local server time, in milliseconds, when the request was sent.
    pub timestamp: u32,
}

/// > The client sends this event to the server in
/// > response to the ping request. The event data is
/// > a 4-byte timestamp, which was received with the
/// > PingRequest request.
pub struct EventMessagePingResponse {
    /// The timestamp echoed back from the request that prompted this response.
    pub timestamp: u32,
}

/// A user control event as received from the peer.
///
/// Defined by:
/// - Legacy RTMP spec, 6.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserControlEvent {
    /// Client informing the server of its buffer length, in milliseconds, for a stream.
    SetBufferLength {
        /// The stream the buffer length applies to.
        stream_id: u32,
        /// The buffer length, in milliseconds.
        buffer_length: u32,
    },
    /// Client asking the server to confirm it is still reachable.
    ///
    /// The server must answer with [`EventMessagePingResponse`] carrying the same timestamp.
    PingRequest {
        /// The timestamp to echo back in the response.
        timestamp: u32,
    },
    /// Client responding to a [`EventMessagePingRequest`] with the timestamp it received.
    PingResponse {
        /// The timestamp echoed back from the request.
        timestamp: u32,
    },
    /// Any other event this server doesn't act on.
    Unknown {
        /// The event type.
        event_type: EventType,
        /// The raw event data.
        data: bytes::Bytes,
    },
}
