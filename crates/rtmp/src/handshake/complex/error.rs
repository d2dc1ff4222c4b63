#[derive(Debug, thiserror::Error)]
pub enum ComplexHandshakeError {
    #[error("not enough data")]
    NotEnoughData,
    #[error("digest length not correct")]
    DigestLengthNotCorrect,
    #[error("cannot generate digest")]
    CannotGenerate,
    #[error("unknown schema")]
    UnknownSchema,
    /// Returned by [`HandshakeServer::strict`](crate::handshake::HandshakeServer) mode when C2's
    /// echoed digest doesn't match what was sent in S2.
    #[error("c2 digest does not match")]
    DigestMismatch,
}
