//! Error type for server sessions.

/// Errors that can occur during a server session.
#[derive(Debug, thiserror::Error)]
pub enum ServerSessionError {
    /// Timeout.
    #[error("timeout: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
    /// Received publish command before connect command.
    #[error("received publish command before connect command")]
    PublishBeforeConnect,
    /// Received play command before connect command.
    #[error("received play command before connect command")]
    PlayBeforeConnect,
    /// Play command is missing a stream name.
    #[error("play command is missing a stream name")]
    MissingStreamName,
    /// Requested stream was not found.
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    /// Invalid chunk size.
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),
}
