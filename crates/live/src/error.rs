//! Error types for the session/stream-distribution engine.

/// Errors surfaced by the session registry, a [`Session`](crate::session::Session), or a
/// [`Stream`](crate::stream::Stream).
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// The underlying RTMP connection failed.
    #[error("rtmp error: {0}")]
    Rtmp(#[from] scuffle_rtmp::error::RtmpError),
    /// A publish was requested for a session name that couldn't be parsed out of the
    /// connect/publish arguments.
    #[error("invalid session name: {0}")]
    InvalidSessionName(String),
    /// A play was requested for a session that doesn't exist (no publisher has ever
    /// attached, or it has already been garbage collected).
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    /// The session has already been torn down (publisher evicted mid-operation, or GC raced
    /// the caller).
    #[error("session is closed")]
    SessionClosed,
}

impl LiveError {
    /// True if this represents an ordinary disconnect rather than a genuine fault, for the
    /// purposes of choosing a log level (disconnects log at `DEBUG`, faults at `WARN`/`ERROR`).
    pub fn is_client_closed(&self) -> bool {
        matches!(self, Self::Rtmp(err) if err.is_client_closed())
    }
}
