//! Defines types for handling session events.

use bytes::Bytes;

use super::error::ServerSessionError;
use crate::command_messages::UnknownCommand;
use crate::messages::UnknownMessage;

/// Data received from a session.
#[derive(Debug, Clone)]
pub enum SessionData {
    /// Video data.
    Video {
        /// Timestamp of the data.
        timestamp: u32,
        /// Data.
        data: Bytes,
    },
    /// Audio data.
    Audio {
        /// Timestamp of the data.
        timestamp: u32,
        /// Data.
        data: Bytes,
    },
    /// Metadata.
    Amf0 {
        /// Timestamp of the data.
        timestamp: u32,
        /// Data.
        data: Bytes,
    },
}

/// Handler for session events.
pub trait SessionHandler {
    /// Called when a stream is published.
    fn on_publish(
        &mut self,
        stream_id: u32,
        app_name: &str,
        stream_name: &str,
    ) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send;

    /// Called when a stream is unpublished.
    fn on_unpublish(&mut self, stream_id: u32) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send;

    /// Called when a client wants to play a stream.
    ///
    /// Returning `Err` causes the session to respond with `NetStream.Play.Failed` /
    /// `NetStream.Play.StreamNotFound` depending on the error, instead of starting playback.
    fn on_play(
        &mut self,
        stream_id: u32,
        app_name: &str,
        stream_name: &str,
    ) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send;

    /// Called when a client stops playing a stream (deleteStream, closeStream, or disconnect).
    fn on_stop_play(&mut self, stream_id: u32) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send;

    /// Called when data is received.
    fn on_data(
        &mut self,
        stream_id: u32,
        data: SessionData,
    ) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send;

    /// Called when a message of a type this crate doesn't act on is received.
    ///
    /// The default implementation ignores it.
    fn on_unknown_message(
        &mut self,
        _stream_id: u32,
        _message: UnknownMessage,
    ) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send {
        async { Ok(()) }
    }

    /// Called when a command this crate doesn't recognize is received.
    ///
    /// e.g. FFmpeg sends some commands that don't appear in any spec.
    /// The default implementation ignores it.
    fn on_unknown_command(
        &mut self,
        _stream_id: u32,
        _command: UnknownCommand<'_>,
    ) -> impl std::future::Future<Output = Result<(), ServerSessionError>> + Send {
        async { Ok(()) }
    }
}
