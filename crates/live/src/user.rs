//! Publisher and player connections attached to a [`Session`](crate::session::Session).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Weak};
use std::time::Instant;

use crate::packet::Packet;
use crate::session::Session;
use crate::time_corrector::TimeCorrector;

nutype_enum::nutype_enum! {
    /// The media protocol and role a [`User`] connected with.
    ///
    /// Only the `*Rtmp` variants have a corresponding implementation in this crate; the rest
    /// are carried so session bookkeeping has a stable vocabulary to grow into (see the
    /// `PlayerSink` non-goal around additional player protocols).
    pub enum UserType(u8) {
        /// RTMP publisher.
        PublishRtmp = 0,
        /// MPEG-TS publisher.
        PublishMpegts = 1,
        /// PAV (private av) publisher.
        PublishPav = 2,
        /// WebRTC publisher.
        PublishWebrtc = 3,
        /// RTMP player.
        PlayerRtmp = 4,
        /// FLV-over-HTTP player.
        PlayerFlv = 5,
        /// HLS player.
        PlayerHls = 6,
        /// PAV player.
        PlayerPav = 7,
        /// WebRTC player.
        PlayerWebrtc = 8,
    }
}

/// A capability interface implemented by a connection's protocol adapter, used to hand a
/// player its headers and media without the session/stream layer knowing anything about the
/// wire protocol in use.
///
/// This crate ships exactly one implementation, for RTMP (see `rtmp_adapter`), per the
/// project's non-goal of supporting other player protocols; the trait boundary is what makes
/// adding FLV/HLS/WebRTC sinks later additive rather than a rewrite.
pub trait PlayerSink: Send + Sync {
    /// Pushes a header packet (metadata or codec sequence header). Bypasses time correction:
    /// the packet's timestamp is sent as-is.
    fn push_header(&self, packet: &Packet);

    /// Pushes one or more media packets, each individually time-corrected by the caller
    /// before this call.
    fn push_media(&self, packets: &[Packet]);
}

/// Cursor state tracked for a playing connection (`PlayerUser` in the data model).
pub struct PlayerCursor {
    /// `true` until the corresponding header has been (re-)emitted from the current GOP.
    pub wait_meta: AtomicBool,
    /// See [`wait_meta`](Self::wait_meta).
    pub wait_audio: AtomicBool,
    /// See [`wait_meta`](Self::wait_meta).
    pub wait_video: AtomicBool,
    /// Woken by the publisher's ingress path (`ActiveAllPlayers`) and by the connection's own
    /// write-ready callback; the player's task re-enters GetFrames/PostFrames on each wakeup.
    pub notify: tokio::sync::Notify,
    state: Mutex<PlayerCursorState>,
}

struct PlayerCursorState {
    /// Last packet index emitted. `None` means "unset" (no GetFrames cycle has located a
    /// starting keyframe yet).
    out_index: Option<u64>,
    out_frame_timestamp: u32,
    /// Stream version as of the last locate; a mismatch against `Stream::version()` forces a
    /// re-locate before the next Prefetch.
    out_version: u64,
    /// Packets staged for the next write cycle by Prefetch, consumed by PostFrames.
    out_frames: Vec<Packet>,
    /// Headers captured at locate time, awaiting transmission ahead of `out_frames`.
    meta: Option<Packet>,
    audio_header: Option<Packet>,
    video_header: Option<Packet>,
    /// One-shot diagnostic latch: set once a player has waited >= 1s without a qualifying
    /// keyframe. Never cleared; purely informational for logging.
    wait_timeout: AtomicBool,
    locate_started_at: Option<Instant>,
    /// Per-player time corrector, used only if the adapter chooses to rewrite outbound
    /// timestamps again (most adapters forward the stream-corrected timestamp unchanged).
    time_corrector: TimeCorrector,
}

impl Default for PlayerCursorState {
    fn default() -> Self {
        Self {
            out_index: None,
            out_frame_timestamp: 0,
            out_version: 0,
            out_frames: Vec::new(),
            meta: None,
            audio_header: None,
            video_header: None,
            wait_timeout: AtomicBool::new(false),
            locate_started_at: None,
            time_corrector: TimeCorrector::new(),
        }
    }
}

impl Default for PlayerCursor {
    fn default() -> Self {
        Self {
            wait_meta: AtomicBool::new(true),
            wait_audio: AtomicBool::new(true),
            wait_video: AtomicBool::new(true),
            notify: tokio::sync::Notify::new(),
            state: Mutex::new(PlayerCursorState::default()),
        }
    }
}

impl PlayerCursor {
    /// Creates a fresh cursor with no location yet established.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last emitted index, or `None` if this player hasn't located a starting point yet.
    pub fn out_index(&self) -> Option<u64> {
        self.state.lock().unwrap().out_index
    }

    /// The timestamp of the last emitted frame, used for the Lag-skip check.
    pub fn out_frame_timestamp(&self) -> u32 {
        self.state.lock().unwrap().out_frame_timestamp
    }

    /// True if this cursor needs to (re-)locate before its next Prefetch: either it has never
    /// located, or the stream's header cache has changed since it last did.
    pub fn needs_locate(&self, stream_version: u64) -> bool {
        let state = self.state.lock().unwrap();
        state.out_index.is_none() || state.out_version < stream_version
    }

    /// True if this cursor has staged headers or packets still waiting to be flushed — per
    /// §4.5, GetFrames is a no-op while any of these remain.
    pub fn has_pending_output(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.meta.is_some() || state.audio_header.is_some() || state.video_header.is_some() || !state.out_frames.is_empty()
    }

    /// Attempts to locate a keyframe, priming headers current as of that keyframe's index from
    /// the stream's cache. Returns `true` only once every header this stream will ever have
    /// (per `media_flags`) has been found.
    ///
    /// `wait_meta`/`wait_audio`/`wait_video` latch which headers are still missing: a call that
    /// finds some but not all of them leaves the missing ones set so the next call only retries
    /// those, instead of re-resolving headers that were already found. They're only reset back
    /// to `true` — ready to latch again on the *next* locate — once a call finds everything.
    /// A stream that will never carry a given media type (per `media_flags`) stops waiting on
    /// it immediately rather than retrying forever.
    pub fn locate(
        &self,
        keyframe_index: u64,
        keyframe_timestamp: u32,
        stream_version: u64,
        headers: crate::stream::LocatedHeaders,
        media_flags: (bool, bool, bool),
    ) -> bool {
        let (has_audio, has_video, has_meta) = media_flags;
        let mut state = self.state.lock().unwrap();

        if self.wait_meta.load(Ordering::Acquire) && !has_meta {
            self.wait_meta.store(false, Ordering::Release);
        }
        if self.wait_meta.load(Ordering::Acquire) {
            if let Some(meta) = headers.meta {
                self.wait_meta.store(false, Ordering::Release);
                state.meta = Some(meta);
            }
        }

        if self.wait_audio.load(Ordering::Acquire) && !has_audio {
            self.wait_audio.store(false, Ordering::Release);
        }
        if self.wait_audio.load(Ordering::Acquire) {
            if let Some(audio_header) = headers.audio_header {
                self.wait_audio.store(false, Ordering::Release);
                state.audio_header = Some(audio_header);
            }
        }

        if self.wait_video.load(Ordering::Acquire) && !has_video {
            self.wait_video.store(false, Ordering::Release);
        }
        if self.wait_video.load(Ordering::Acquire) {
            if let Some(video_header) = headers.video_header {
                self.wait_video.store(false, Ordering::Release);
                state.video_header = Some(video_header);
            }
        }

        if self.wait_meta.load(Ordering::Acquire) || self.wait_audio.load(Ordering::Acquire) || self.wait_video.load(Ordering::Acquire) {
            return false;
        }

        // Only commit the new position once every required header has been found — leaving
        // `out_index` unset on a partial locate keeps `needs_locate` true so the next cycle
        // retries instead of silently starting playback without some of its headers.
        state.out_index = Some(keyframe_index.saturating_sub(1));
        state.out_frame_timestamp = keyframe_timestamp;
        state.out_version = stream_version;
        state.locate_started_at = None;
        drop(state);

        self.wait_meta.store(true, Ordering::Release);
        self.wait_audio.store(true, Ordering::Release);
        self.wait_video.store(true, Ordering::Release);
        true
    }

    /// Marks that this cursor started (or continued) waiting for a qualifying keyframe, and
    /// returns whether it has now been waiting >= 1 second (only ever transitions false->true;
    /// purely diagnostic, never blocks progress).
    pub fn note_waiting(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let started = *state.locate_started_at.get_or_insert(now);
        let waited_too_long = now.duration_since(started) >= std::time::Duration::from_secs(1);
        if waited_too_long {
            state.wait_timeout.store(true, Ordering::Release);
        }
        waited_too_long
    }

    /// Appends packets fetched by Prefetch, advancing `out_index`/`out_frame_timestamp`.
    pub fn stage_frames(&self, packets: Vec<Packet>) {
        let mut state = self.state.lock().unwrap();
        if let Some(last) = packets.last() {
            state.out_index = last.index;
            state.out_frame_timestamp = last.timestamp;
        }
        state.out_frames.extend(packets);
    }

    /// Takes the staged meta header, if any, clearing it.
    pub fn take_meta(&self) -> Option<Packet> {
        self.state.lock().unwrap().meta.take()
    }

    /// Takes the staged audio header, if any, clearing it.
    pub fn take_audio_header(&self) -> Option<Packet> {
        self.state.lock().unwrap().audio_header.take()
    }

    /// Takes the staged video header, if any, clearing it.
    pub fn take_video_header(&self) -> Option<Packet> {
        self.state.lock().unwrap().video_header.take()
    }

    /// Takes all staged media packets, clearing the queue.
    pub fn take_frames(&self) -> Vec<Packet> {
        std::mem::take(&mut self.state.lock().unwrap().out_frames)
    }

    /// Applies this player's own time corrector to a packet pulled from the ring, for
    /// adapters that choose to rewrite outbound timestamps a second time.
    pub fn correct(&self, packet: &Packet) -> Option<u32> {
        self.state.lock().unwrap().time_corrector.correct(packet)
    }
}

/// What kind of connection a [`User`] represents.
pub enum UserKind {
    /// A publisher: the connection feeding a [`Stream`](crate::stream::Stream).
    Publisher,
    /// A player: the connection reading a [`Stream`](crate::stream::Stream) via a cursor and
    /// a protocol-specific [`PlayerSink`].
    Player {
        /// Playback cursor state.
        cursor: PlayerCursor,
        /// The connection's push capability.
        sink: Box<dyn PlayerSink>,
    },
}

/// Per-connection parsed `tcUrl` components: `rtmp://<domain>[:<port>]/<app>/<stream>[?query]`.
#[derive(Debug, Clone, Default)]
pub struct TcUrl {
    /// Host, with any `:port` suffix stripped.
    pub domain: String,
    /// Application name (first path segment).
    pub app: String,
    /// Stream name (second path segment, query string stripped).
    pub stream: String,
    /// Verbatim query string after `?`, if any.
    pub param: Option<String>,
}

/// A publisher or player attached to a [`Session`].
///
/// Per the weak/strong back-pointer discipline: a `Session` holds its users strongly
/// (`Arc<User>`); a `User` holds its session weakly, upgraded per-operation, so dropping the
/// registry's `Arc<Session>` deterministically drops every user not otherwise kept alive.
pub struct User {
    /// What this connection is doing and its protocol-specific state.
    pub kind: UserKind,
    /// The session this user is attached to.
    session: Weak<Session>,
    /// Parsed `tcUrl` components plus stream-argument query params.
    pub tc_url: TcUrl,
    /// The peer's `"ip:port"`.
    pub user_id: String,
    /// The media protocol / role this user connected with.
    pub user_type: UserType,
    /// When this user attached.
    pub start_timestamp: Instant,
    destroyed: AtomicBool,
}

impl User {
    /// Creates a new user attached (weakly) to `session`.
    pub fn new(kind: UserKind, session: &std::sync::Arc<Session>, tc_url: TcUrl, user_id: String, user_type: UserType) -> Self {
        Self {
            kind,
            session: std::sync::Arc::downgrade(session),
            tc_url,
            user_id,
            user_type,
            start_timestamp: Instant::now(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Upgrades the weak back-pointer to this user's session, if it still exists.
    pub fn session(&self) -> Option<std::sync::Arc<Session>> {
        self.session.upgrade()
    }

    /// Flips the single-shot `destroyed` flag, returning `true` the first time (and only the
    /// first time) this is called — guarantees close logic runs exactly once even if a
    /// connection-destroyed callback races a session sweep.
    pub fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    /// True if [`mark_destroyed`](Self::mark_destroyed) has already fired for this user.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn destroyed_flag_fires_once() {
        let session = Session::new("live/stream".to_string(), crate::session::AppSettings::default());
        let user = User::new(
            UserKind::Publisher,
            &session,
            TcUrl::default(),
            "127.0.0.1:1234".to_string(),
            UserType::PublishRtmp,
        );
        assert!(user.mark_destroyed());
        assert!(!user.mark_destroyed());
        assert!(user.is_destroyed());
    }

    #[test]
    fn cursor_needs_locate_until_located() {
        let cursor = PlayerCursor::new();
        assert!(cursor.needs_locate(0));
        // A stream with no media at all never keeps the cursor waiting on any header.
        let located = cursor.locate(5, 1000, 3, crate::stream::LocatedHeaders::default(), (false, false, false));
        assert!(located);
        assert!(!cursor.needs_locate(3));
        assert!(cursor.needs_locate(4));
    }

    #[test]
    fn cursor_locate_retries_only_missing_headers() {
        let cursor = PlayerCursor::new();

        // First attempt: meta found, audio/video still missing (stream has both).
        let headers = crate::stream::LocatedHeaders {
            meta: Some(crate::packet::Packet::new(crate::packet::PacketType::Meta, 0, bytes::Bytes::new())),
            audio_header: None,
            video_header: None,
        };
        assert!(!cursor.locate(5, 1000, 1, headers, (true, true, false)));
        assert!(!cursor.wait_meta.load(Ordering::Acquire));
        assert!(cursor.wait_audio.load(Ordering::Acquire));
        assert!(cursor.wait_video.load(Ordering::Acquire));
        // Not yet committed: still needs to locate.
        assert!(cursor.needs_locate(1));

        // Second attempt: audio and video headers now available too.
        let headers = crate::stream::LocatedHeaders {
            meta: None,
            audio_header: Some(crate::packet::Packet::new(crate::packet::PacketType::Audio, 0, bytes::Bytes::new())),
            video_header: Some(crate::packet::Packet::new(crate::packet::PacketType::Video, 0, bytes::Bytes::new())),
        };
        assert!(cursor.locate(5, 1000, 1, headers, (true, true, false)));
        assert!(!cursor.needs_locate(1));
        // All three latch back to waiting, ready for the next locate.
        assert!(cursor.wait_meta.load(Ordering::Acquire));
        assert!(cursor.wait_audio.load(Ordering::Acquire));
        assert!(cursor.wait_video.load(Ordering::Acquire));
    }
}
