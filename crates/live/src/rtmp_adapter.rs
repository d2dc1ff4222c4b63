//! Bridges `scuffle_rtmp`'s per-connection [`SessionHandler`] callbacks onto this crate's
//! session/stream/user model, and implements [`PlayerSink`] over an RTMP connection's
//! outgoing-frame queue.
//!
//! This is the only player protocol adapter this crate ships (see [`PlayerSink`]'s docs).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use scuffle_rtmp::{OutgoingFrame, OutgoingSender, ServerSessionError, SessionData, SessionHandler};

use crate::packet::{Packet, PacketType};
use crate::registry::SessionRegistry;
use crate::session::{AppSettings, Session};
use crate::user::{PlayerCursor, PlayerSink, TcUrl, User, UserKind, UserType};

/// Pushes packets to a playing RTMP connection by encoding them as [`OutgoingFrame`]s onto its
/// outgoing-frame queue; the connection's own `ServerSession::drive` loop (raced against its
/// socket read via `with_outgoing`) chunk-encodes and flushes them.
struct RtmpPlayerSink {
    sender: OutgoingSender,
}

impl PlayerSink for RtmpPlayerSink {
    fn push_header(&self, packet: &Packet) {
        // A disconnected receiver means the connection's drive loop has already exited;
        // nothing to do but drop the frame.
        let _ = self.sender.send(to_outgoing_frame(packet));
    }

    fn push_media(&self, packets: &[Packet]) {
        for packet in packets {
            let _ = self.sender.send(to_outgoing_frame(packet));
        }
    }
}

fn to_outgoing_frame(packet: &Packet) -> OutgoingFrame {
    if packet.kind.contains(PacketType::Video) {
        OutgoingFrame::Video {
            timestamp: packet.timestamp,
            data: packet.payload.clone(),
        }
    } else if packet.kind.contains(PacketType::Audio) {
        OutgoingFrame::Audio {
            timestamp: packet.timestamp,
            data: packet.payload.clone(),
        }
    } else {
        OutgoingFrame::Amf0Data {
            timestamp: packet.timestamp,
            data: packet.payload.clone(),
        }
    }
}

/// FLV video tag heuristic: high nibble of the first payload byte is the frame type, `1` means
/// a key frame (interframe is `2`, and so on).
fn classify_video(payload: &Bytes) -> PacketType {
    let mut kind = PacketType::Video;
    if payload.first().is_some_and(|b| b >> 4 == 1) {
        kind |= PacketType::KeyFrame | PacketType::Idr;
    }
    if Packet::looks_like_codec_header(payload) {
        kind |= PacketType::CodecHeader;
    }
    kind
}

fn classify_audio(payload: &Bytes) -> PacketType {
    let mut kind = PacketType::Audio;
    if Packet::looks_like_codec_header(payload) {
        kind |= PacketType::CodecHeader;
    }
    kind
}

fn session_data_to_packet(data: SessionData) -> Packet {
    match data {
        SessionData::Video { timestamp, data } => Packet::new(classify_video(&data), timestamp, data),
        SessionData::Audio { timestamp, data } => Packet::new(classify_audio(&data), timestamp, data),
        SessionData::Amf0 { timestamp, data } => Packet::new(PacketType::Meta, timestamp, data),
    }
}

/// Splits `"stream-key?foo=bar"` into `("stream-key", Some("foo=bar"))`.
fn split_stream_name(stream_name: &str) -> (String, Option<String>) {
    match stream_name.split_once('?') {
        Some((name, query)) => (name.to_string(), Some(query.to_string())),
        None => (stream_name.to_string(), None),
    }
}

/// Resolves the effective [`AppSettings`] for an RTMP app name.
///
/// A connection's app isn't known until its first `publish`/`play` command, so `RtmpHandler`
/// can't be handed a fixed `AppSettings` up front the way it's handed its `peer_addr` — it
/// instead holds one of these and resolves settings once the app name is in hand, per call.
/// `AppSettings` itself implements this trait by ignoring the app name, for callers with no
/// per-app configuration to offer.
pub trait AppSettingsResolver: Send + Sync {
    /// Looks up the tunables for `app_name`, falling back to defaults for an unknown app.
    fn app_settings(&self, app_name: &str) -> AppSettings;
}

impl AppSettingsResolver for AppSettings {
    fn app_settings(&self, _app_name: &str) -> AppSettings {
        *self
    }
}

/// A `scuffle_rtmp::SessionHandler` that attaches published/played RTMP streams to the
/// [`SessionRegistry`].
///
/// One instance is created per accepted connection. A single RTMP connection may publish and/or
/// play several stream keys concurrently (one per `createStream`/`publish`/`play` pair), so
/// state is keyed by the RTMP stream id the underlying crate assigns.
pub struct RtmpHandler {
    registry: Arc<SessionRegistry>,
    apps: Arc<dyn AppSettingsResolver>,
    peer_addr: String,
    outgoing: OutgoingSender,
    ctx: scuffle_context::Context,
    publishers: HashMap<u32, (Arc<Session>, Arc<User>, u64)>,
    players: HashMap<u32, (Arc<Session>, Arc<User>)>,
}

/// Whether the Nth ingested packet on a publisher should wake its players: every one of the
/// first 300, then every 5th after that.
fn should_wake_players(packet_count: u64) -> bool {
    packet_count <= 300 || packet_count % 5 == 0
}

impl RtmpHandler {
    /// Creates a handler for one connection from `peer_addr`.
    ///
    /// `outgoing` is the sender half of the channel whose receiver was attached to this
    /// connection's `ServerSession` via `with_outgoing`; it's handed to every [`RtmpPlayerSink`]
    /// created for a `play` on this connection.
    pub fn new(
        registry: Arc<SessionRegistry>,
        apps: Arc<dyn AppSettingsResolver>,
        peer_addr: String,
        outgoing: OutgoingSender,
        ctx: scuffle_context::Context,
    ) -> Self {
        Self {
            registry,
            apps,
            peer_addr,
            outgoing,
            ctx,
            publishers: HashMap::new(),
            players: HashMap::new(),
        }
    }

    fn tc_url(&self, app_name: &str, stream: String, param: Option<String>) -> TcUrl {
        TcUrl {
            domain: String::new(),
            app: app_name.to_string(),
            stream,
            param,
        }
    }
}

impl SessionHandler for RtmpHandler {
    async fn on_publish(&mut self, stream_id: u32, app_name: &str, stream_name: &str) -> Result<(), ServerSessionError> {
        let (name, param) = split_stream_name(stream_name);
        let session_name = format!("{app_name}/{name}");
        let session = self.registry.get_or_create(&session_name, self.apps.app_settings(app_name));

        let tc_url = self.tc_url(app_name, name, param);
        let user = Arc::new(User::new(
            UserKind::Publisher,
            &session,
            tc_url,
            self.peer_addr.clone(),
            UserType::PublishRtmp,
        ));

        if let Some(evicted) = session.set_publisher(user.clone()) {
            tracing::info!(session = %session_name, peer = %self.peer_addr, "evicted previous publisher");
            evicted.mark_destroyed();
        }

        tracing::info!(session = %session_name, peer = %self.peer_addr, "publisher attached");
        self.publishers.insert(stream_id, (session, user, 0));
        Ok(())
    }

    async fn on_unpublish(&mut self, stream_id: u32) -> Result<(), ServerSessionError> {
        if let Some((session, user, _)) = self.publishers.remove(&stream_id) {
            session.clear_publisher_if(&user);
            user.mark_destroyed();
            tracing::info!(session = %session.session_name(), "publisher detached");
        }
        Ok(())
    }

    async fn on_play(&mut self, stream_id: u32, app_name: &str, stream_name: &str) -> Result<(), ServerSessionError> {
        let (name, param) = split_stream_name(stream_name);
        let session_name = format!("{app_name}/{name}");
        let app_settings = self.apps.app_settings(app_name);
        let session = self.registry.get_or_create(&session_name, app_settings);

        let tc_url = self.tc_url(app_name, name, param);
        let sink = RtmpPlayerSink {
            sender: self.outgoing.clone(),
        };
        let user = Arc::new(User::new(
            UserKind::Player {
                cursor: PlayerCursor::new(),
                sink: Box::new(sink),
            },
            &session,
            tc_url,
            self.peer_addr.clone(),
            UserType::PlayerRtmp,
        ));

        session.add_player(user.clone());
        tracing::info!(session = %session_name, peer = %self.peer_addr, "player attached");

        let content_latency_ms = app_settings.content_latency.as_millis() as u32;
        tokio::spawn(crate::player::run(user.clone(), content_latency_ms, self.ctx.clone()));

        self.players.insert(stream_id, (session, user));
        Ok(())
    }

    async fn on_stop_play(&mut self, stream_id: u32) -> Result<(), ServerSessionError> {
        if let Some((session, user)) = self.players.remove(&stream_id) {
            session.remove_player(&user);
            user.mark_destroyed();
            tracing::info!(session = %session.session_name(), "player detached");
        }
        Ok(())
    }

    async fn on_data(&mut self, stream_id: u32, data: SessionData) -> Result<(), ServerSessionError> {
        let Some((session, _, packet_count)) = self.publishers.get_mut(&stream_id) else {
            // Data for a stream id we never saw a `publish` for; ignore rather than error, the
            // same tolerance the underlying crate extends to unknown commands.
            return Ok(());
        };

        let packet = session_data_to_packet(data);
        if session.stream().ingest(packet).is_some() {
            *packet_count += 1;
            if should_wake_players(*packet_count) {
                session.active_all_players();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn splits_stream_name_and_query() {
        assert_eq!(split_stream_name("abc"), ("abc".to_string(), None));
        assert_eq!(
            split_stream_name("abc?token=xyz"),
            ("abc".to_string(), Some("token=xyz".to_string()))
        );
    }

    #[test]
    fn classifies_key_frame_video() {
        let payload = Bytes::from_static(&[0x17, 0x01, 0, 0, 0]);
        let kind = classify_video(&payload);
        assert!(kind.contains(PacketType::Video));
        assert!(kind.contains(PacketType::KeyFrame));
    }

    #[test]
    fn classifies_interframe_video() {
        let payload = Bytes::from_static(&[0x27, 0x01, 0, 0, 0]);
        let kind = classify_video(&payload);
        assert!(kind.contains(PacketType::Video));
        assert!(!kind.contains(PacketType::KeyFrame));
    }

    #[test]
    fn wakes_every_packet_early_then_every_fifth() {
        assert!(should_wake_players(1));
        assert!(should_wake_players(300));
        assert!(!should_wake_players(301));
        assert!(should_wake_players(305));
    }

    #[tokio::test]
    async fn publish_then_unpublish_clears_the_session_publisher() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = scuffle_rtmp::outgoing_channel();
        let (ctx, _handler) = scuffle_context::Context::new();
        let apps: Arc<dyn AppSettingsResolver> = Arc::new(AppSettings::default());
        let mut handler = RtmpHandler::new(registry.clone(), apps, "127.0.0.1:1".to_string(), tx, ctx);

        handler.on_publish(1, "live", "stream").await.unwrap();
        let session = registry.get("live/stream").unwrap();
        assert!(session.has_publisher());

        handler.on_unpublish(1).await.unwrap();
        assert!(!session.has_publisher());
    }
}
