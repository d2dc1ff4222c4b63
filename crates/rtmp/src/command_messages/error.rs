//! Command message errors.

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("amf0: {0}")]
    Amf0(#[from] scuffle_amf0::Amf0Error),
    #[error("no app name of type string in connect command")]
    NoAppName,
    #[error("invalid onStatus info object")]
    InvalidOnStatusInfoObject,
    #[error("the rtmp client is not implemented yet")]
    NoClientImplementation,
}
