//! GetFrames / PostFrames: the push loop that fans a stream's ring out to one player.

use std::sync::Arc;

use crate::session::Session;
use crate::stream::Stream;
use crate::user::{PlayerCursor, PlayerSink, User, UserKind};

/// Runs one GetFrames+PostFrames cycle for a single player. Returns once the cursor has no
/// more staged output to flush (the caller should then wait for the next wakeup).
fn service_once(stream: &Stream, cursor: &PlayerCursor, content_latency_ms: u32, sink: &dyn PlayerSink) {
    if stream.is_ready() && !cursor.has_pending_output() {
        get_frames(stream, cursor, content_latency_ms);
    }
    post_frames(cursor, sink);
}

fn get_frames(stream: &Stream, cursor: &PlayerCursor, content_latency_ms: u32) {
    let latest_ts = stream.latest_timestamp();
    let stream_version = stream.version();

    let needs_locate = cursor.needs_locate(stream_version);
    let lagging = !needs_locate && {
        let out_index = cursor.out_index().unwrap_or(0);
        let floor = stream.next_index().saturating_sub(stream.capacity() as u64);
        let out_ts = cursor.out_frame_timestamp();
        out_index < floor || latest_ts.saturating_sub(out_ts) > 2 * content_latency_ms
    };

    if needs_locate || lagging {
        match stream.locate_keyframe(latest_ts, content_latency_ms) {
            Some(keyframe) => {
                let headers = stream.snapshot_headers(keyframe.index);
                let located = cursor.locate(keyframe.index, keyframe.timestamp, stream_version, headers, stream.media_flags());
                if !located {
                    cursor.note_waiting();
                    return;
                }
            }
            None => {
                cursor.note_waiting();
                return;
            }
        }
    }

    let mut staged = Vec::new();
    let mut idx = cursor.out_index().map_or(0, |i| i + 1);
    for _ in 0..10 {
        let Some(packet) = stream.get(idx) else { break };
        staged.push(packet);
        idx += 1;
    }

    if !staged.is_empty() {
        cursor.stage_frames(staged);
    }
}

fn post_frames(cursor: &PlayerCursor, sink: &dyn PlayerSink) {
    if let Some(meta) = cursor.take_meta() {
        sink.push_header(&meta);
        return;
    }
    if let Some(header) = cursor.take_audio_header() {
        sink.push_header(&header);
        return;
    }
    if let Some(header) = cursor.take_video_header() {
        sink.push_header(&header);
        return;
    }

    let frames = cursor.take_frames();
    if frames.is_empty() {
        return;
    }

    let corrected: Vec<_> = frames
        .into_iter()
        .filter_map(|mut packet| {
            let ts = cursor.correct(&packet)?;
            packet.timestamp = ts;
            Some(packet)
        })
        .collect();

    if !corrected.is_empty() {
        sink.push_media(&corrected);
    }
}

/// Drives `user` (which must be a [`UserKind::Player`]) until its session disappears, it's
/// marked destroyed, or `ctx` is cancelled.
///
/// Wakes on the player's own [`PlayerCursor::notify`] (signalled by `Session::active_all_players`
/// on publisher ingress) and drains every staged header/frame batch before waiting again, so a
/// single publisher wakeup can flush several PostFrames cycles' worth of queued media.
pub async fn run(user: Arc<User>, content_latency_ms: u32, ctx: scuffle_context::Context) {
    let UserKind::Player { cursor, sink } = &user.kind else {
        tracing::error!("player push loop invoked on a non-player user");
        return;
    };

    loop {
        if user.is_destroyed() {
            return;
        }

        let Some(session) = user.session() else {
            return;
        };

        loop {
            service_once(session.stream(), cursor, content_latency_ms, sink.as_ref());
            if !cursor.has_pending_output() {
                break;
            }
        }

        drop(session);

        tokio::select! {
            _ = cursor.notify.notified() => {}
            _ = ctx.done() => return,
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::sync::Mutex as StdMutex;

    use bytes::Bytes;

    use super::*;
    use crate::packet::{Packet, PacketType};
    use crate::session::AppSettings;
    use crate::user::{TcUrl, UserType};

    #[derive(Default)]
    struct RecordingSink {
        headers: StdMutex<Vec<Packet>>,
        media: StdMutex<Vec<Packet>>,
    }

    impl PlayerSink for RecordingSink {
        fn push_header(&self, packet: &Packet) {
            self.headers.lock().unwrap().push(packet.clone());
        }

        fn push_media(&self, packets: &[Packet]) {
            self.media.lock().unwrap().extend(packets.iter().cloned());
        }
    }

    fn key_frame(ts: u32) -> Packet {
        Packet::new(PacketType::Video | PacketType::KeyFrame, ts, Bytes::from_static(&[0x17, 0x01]))
    }

    fn video_header(ts: u32) -> Packet {
        Packet::new(PacketType::Video | PacketType::CodecHeader, ts, Bytes::from_static(&[0x17, 0, 0, 0]))
    }

    #[test]
    fn new_player_locates_and_receives_the_gop() {
        let session = Session::new("live/stream".to_string(), AppSettings::default());
        // A video-only stream needs its sequence header cached before a player can fully
        // locate (it never latches `wait_audio`/`wait_meta` since it carries neither).
        session.stream().ingest(video_header(0));
        session.stream().ingest(key_frame(0));
        session.stream().ingest(key_frame(40));

        let cursor = PlayerCursor::new();
        let sink = RecordingSink::default();
        service_once(session.stream(), &cursor, 3000, &sink);
        // First cycle only sends (or queues) headers/frames one batch type at a time; drain.
        while cursor.has_pending_output() {
            service_once(session.stream(), &cursor, 3000, &sink);
        }

        assert_eq!(sink.media.lock().unwrap().len(), 2);
    }

    #[test]
    fn player_without_ready_stream_produces_nothing() {
        let session = Session::new("live/stream".to_string(), AppSettings::default());
        let cursor = PlayerCursor::new();
        let sink = RecordingSink::default();
        service_once(session.stream(), &cursor, 3000, &sink);
        assert!(sink.media.lock().unwrap().is_empty());
        assert!(sink.headers.lock().unwrap().is_empty());
    }

    #[test]
    fn destroyed_player_user_is_recognized_as_a_player() {
        let session = Session::new("live/stream".to_string(), AppSettings::default());
        let user = User::new(
            UserKind::Player {
                cursor: PlayerCursor::new(),
                sink: Box::new(RecordingSink::default()),
            },
            &session,
            TcUrl::default(),
            "127.0.0.1:2".to_string(),
            UserType::PlayerRtmp,
        );
        assert!(matches!(user.kind, UserKind::Player { .. }));
    }
}
