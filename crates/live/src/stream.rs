//! Ring buffer of recent packets, GOP index, and cached codec headers for one published
//! stream.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::packet::{Packet, PacketType};
use crate::time_corrector::TimeCorrector;

/// Default ring capacity (`max_buffer` in the configuration grammar).
pub const DEFAULT_CAPACITY: usize = 1000;

/// One entry in a stream's GOP index: a keyframe's ring index and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopEntry {
    /// The keyframe's index in the stream (see [`Packet::index`]).
    pub index: u64,
    /// The keyframe's corrected timestamp, in milliseconds.
    pub timestamp: u32,
}

/// The cached codec headers and metadata for a stream, kept so a newly joining (or
/// re-locating) player can be primed without waiting for the publisher to resend them.
///
/// Each header type keeps a short history tagged with the packet index it was ingested at,
/// alongside the single latest one. A player locating an old keyframe (because it's lagging,
/// or just joined while the ring still holds stale packets) is handed the header that was
/// current *as of that keyframe's index*, not whatever the publisher has sent since — handing
/// it the latest SPS/PPS instead could mismatch the GOP it's about to decode.
#[derive(Debug, Clone, Default)]
pub struct HeaderCache {
    meta_history: Vec<Packet>,
    audio_header_history: Vec<Packet>,
    video_header_history: Vec<Packet>,
}

/// Headers resolved for one located keyframe index, handed to a player's cursor.
#[derive(Debug, Clone, Default)]
pub struct LocatedHeaders {
    /// The `onMetaData` (or equivalent) packet current as of the located index, if any meta
    /// packet has ever been cached.
    pub meta: Option<Packet>,
    /// The audio sequence header current as of the located index, if any has been cached.
    pub audio_header: Option<Packet>,
    /// The video sequence header current as of the located index, if any has been cached.
    pub video_header: Option<Packet>,
}

impl HeaderCache {
    fn push_meta(&mut self, packet: Packet) {
        self.meta_history.push(packet);
    }

    fn push_audio_header(&mut self, packet: Packet) {
        self.audio_header_history.push(packet);
    }

    fn push_video_header(&mut self, packet: Packet) {
        self.video_header_history.push(packet);
    }

    /// Drops history entries that fell below `floor`, except the single latest one — the
    /// latest header always stays reachable, even once its index has aged out of the ring,
    /// since a sequence header is rarely resent by the publisher.
    fn prune(&mut self, floor: u64) {
        prune_history(&mut self.meta_history, floor);
        prune_history(&mut self.audio_header_history, floor);
        prune_history(&mut self.video_header_history, floor);
    }

    /// The meta packet at or before `idx`, falling back to the latest cached one if `idx` is
    /// `0` or predates every entry still held.
    pub fn meta_at(&self, idx: u64) -> Option<Packet> {
        lookup(&self.meta_history, idx)
    }

    /// The audio sequence header at or before `idx`. See [`meta_at`](Self::meta_at).
    pub fn audio_header_at(&self, idx: u64) -> Option<Packet> {
        lookup(&self.audio_header_history, idx)
    }

    /// The video sequence header at or before `idx`. See [`meta_at`](Self::meta_at).
    pub fn video_header_at(&self, idx: u64) -> Option<Packet> {
        lookup(&self.video_header_history, idx)
    }

    fn resolve(&self, idx: u64) -> LocatedHeaders {
        LocatedHeaders {
            meta: self.meta_at(idx),
            audio_header: self.audio_header_at(idx),
            video_header: self.video_header_at(idx),
        }
    }
}

fn lookup(history: &[Packet], idx: u64) -> Option<Packet> {
    if idx > 0 {
        if let Some(pkt) = history.iter().rev().find(|p| p.index.is_some_and(|i| i <= idx)) {
            return Some(pkt.clone());
        }
    }
    history.last().cloned()
}

fn prune_history(history: &mut Vec<Packet>, floor: u64) {
    let latest = history.last().cloned();
    history.retain(|p| p.index.is_none_or(|i| i >= floor));
    if history.is_empty() {
        if let Some(latest) = latest {
            history.push(latest);
        }
    }
}

struct StreamInner {
    /// Fixed-capacity ring keyed by `index % capacity`.
    ring: Vec<Option<Packet>>,
    gop_index: VecDeque<GopEntry>,
    headers: HeaderCache,
    has_audio: bool,
    has_video: bool,
    has_meta: bool,
    start_timestamp: Option<Instant>,
    ready_timestamp: Option<Instant>,
    data_coming_timestamp: Option<Instant>,
    last_packet_wall_clock: Option<Instant>,
    time_corrector: TimeCorrector,
}

/// The buffered, live state of one published RTMP stream.
///
/// `next_index` and `version` are kept as atomics so readers (a player's own task, deciding
/// whether it needs to re-locate) can check them without taking the stream lock; every
/// mutation that touches the ring, GOP index, or header cache still holds the lock, keeping
/// it consistent with those counters.
pub struct Stream {
    session_name: String,
    capacity: usize,
    next_index: AtomicU64,
    version: AtomicU64,
    ready: AtomicBool,
    inner: Mutex<StreamInner>,
}

impl Stream {
    /// Creates an empty stream with the given ring capacity.
    pub fn new(session_name: impl Into<String>, capacity: usize) -> Self {
        Self {
            session_name: session_name.into(),
            capacity: capacity.max(1),
            next_index: AtomicU64::new(0),
            version: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            inner: Mutex::new(StreamInner {
                ring: vec![None; capacity.max(1)],
                gop_index: VecDeque::new(),
                headers: HeaderCache::default(),
                has_audio: false,
                has_video: false,
                has_meta: false,
                start_timestamp: None,
                ready_timestamp: None,
                data_coming_timestamp: None,
                last_packet_wall_clock: None,
                time_corrector: TimeCorrector::new(),
            }),
        }
    }

    /// The canonical `"domain/app/name"` key this stream is registered under.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// The ring's fixed capacity (`max_buffer`).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The next index that will be assigned — also the total number of packets ever ingested.
    pub fn next_index(&self) -> u64 {
        self.next_index.load(Ordering::Acquire)
    }

    /// Monotonic counter bumped whenever a cached header changes (P4).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// True once the first video keyframe has been ingested (I3); stays true thereafter.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Ingests one packet from the publisher: corrects its timestamp, assigns it a dense
    /// index, updates the GOP index / header cache / version as needed, and stores it in the
    /// ring. Returns `None` if the time corrector declines to distribute the packet (unknown
    /// type).
    pub fn ingest(&self, mut packet: Packet) -> Option<Packet> {
        let mut inner = self.inner.lock().unwrap();

        let corrected = inner.time_corrector.correct(&packet)?;
        packet.timestamp = corrected;

        let index = self.next_index.fetch_add(1, Ordering::AcqRel);
        packet.index = Some(index);

        let now = Instant::now();
        if inner.data_coming_timestamp.is_none() {
            inner.data_coming_timestamp = Some(now);
        }
        inner.last_packet_wall_clock = Some(now);

        if packet.is_key_frame() {
            self.ready.store(true, Ordering::Release);
            inner.gop_index.push_back(GopEntry {
                index,
                timestamp: packet.timestamp,
            });
        }

        if packet.kind.contains(PacketType::Video) {
            inner.has_video = true;
        }
        if packet.kind.contains(PacketType::Audio) {
            inner.has_audio = true;
        }

        let is_meta = packet.kind.contains(PacketType::Meta) || packet.kind.contains(PacketType::Meta3);
        let is_codec_header =
            (packet.kind.contains(PacketType::Audio) || packet.kind.contains(PacketType::Video))
                && Packet::looks_like_codec_header(&packet.payload);

        if is_meta {
            inner.headers.push_meta(packet.clone());
            inner.has_meta = true;
            self.version.fetch_add(1, Ordering::AcqRel);
        } else if is_codec_header && packet.kind.contains(PacketType::Audio) {
            inner.headers.push_audio_header(packet.clone());
            self.version.fetch_add(1, Ordering::AcqRel);
        } else if is_codec_header && packet.kind.contains(PacketType::Video) {
            inner.headers.push_video_header(packet.clone());
            self.version.fetch_add(1, Ordering::AcqRel);
        }

        let slot = (index as usize) % self.capacity;
        inner.ring[slot] = Some(packet.clone());

        // I2: prune GOP entries and header history that fell off the ring.
        let floor = self.next_index.load(Ordering::Acquire).saturating_sub(self.capacity as u64);
        while inner.gop_index.front().is_some_and(|e| e.index < floor) {
            inner.gop_index.pop_front();
        }
        inner.headers.prune(floor);

        Some(packet)
    }

    /// Fetches a previously ingested packet by index, if it's still within the ring.
    pub fn get(&self, index: u64) -> Option<Packet> {
        let inner = self.inner.lock().unwrap();
        let floor = self.next_index.load(Ordering::Acquire).saturating_sub(self.capacity as u64);
        if index < floor || index >= self.next_index.load(Ordering::Acquire) {
            return None;
        }
        inner.ring[(index as usize) % self.capacity].clone()
    }

    /// Finds the newest keyframe whose timestamp satisfies
    /// `latest_timestamp - keyframe.timestamp <= max_age_ms`, if any.
    pub fn locate_keyframe(&self, latest_timestamp: u32, max_age_ms: u32) -> Option<GopEntry> {
        let inner = self.inner.lock().unwrap();
        inner
            .gop_index
            .iter()
            .rev()
            .find(|entry| latest_timestamp.saturating_sub(entry.timestamp) <= max_age_ms)
            .copied()
    }

    /// The timestamp of the most recently ingested packet, or `0` if nothing has arrived yet.
    pub fn latest_timestamp(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner
            .ring
            .iter()
            .flatten()
            .map(|p| p.timestamp)
            .max()
            .unwrap_or(0)
    }

    /// Resolves the meta/audio/video headers current as of `idx` (normally the index of the
    /// keyframe a player just located), for priming a newly joined or re-located player.
    pub fn snapshot_headers(&self, idx: u64) -> LocatedHeaders {
        self.inner.lock().unwrap().headers.resolve(idx)
    }

    /// True if the publisher has not sent a packet for longer than `timeout` (S3).
    pub fn is_timed_out(&self, timeout: std::time::Duration) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.last_packet_wall_clock {
            Some(last) => last.elapsed() >= timeout,
            // No packet has ever arrived; the session-level connect-timeout handles this case
            // instead, so an empty stream is never considered "timed out" by this check alone.
            None => false,
        }
    }

    /// `(has_audio, has_video, has_meta)`.
    pub fn media_flags(&self) -> (bool, bool, bool) {
        let inner = self.inner.lock().unwrap();
        (inner.has_audio, inner.has_video, inner.has_meta)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn key_frame(ts: u32) -> Packet {
        Packet::new(PacketType::Video | PacketType::KeyFrame, ts, Bytes::from_static(&[0x17, 0x01, 0, 0, 0]))
    }

    fn inter_frame(ts: u32) -> Packet {
        Packet::new(PacketType::Video, ts, Bytes::from_static(&[0x27, 0x01, 0, 0, 0]))
    }

    #[test]
    fn assigns_dense_monotonic_indexes() {
        let stream = Stream::new("live/stream", 16);
        let p0 = stream.ingest(key_frame(0)).unwrap();
        let p1 = stream.ingest(inter_frame(40)).unwrap();
        let p2 = stream.ingest(inter_frame(80)).unwrap();
        assert_eq!(p0.index, Some(0));
        assert_eq!(p1.index, Some(1));
        assert_eq!(p2.index, Some(2));
        assert_eq!(stream.next_index(), 3);
    }

    #[test]
    fn ready_flips_on_first_keyframe() {
        let stream = Stream::new("live/stream", 16);
        assert!(!stream.is_ready());
        stream.ingest(key_frame(0));
        assert!(stream.is_ready());
    }

    #[test]
    fn ring_respects_capacity_and_prunes_gop_index() {
        let stream = Stream::new("live/stream", 4);
        for i in 0..10u32 {
            stream.ingest(key_frame(i * 40));
        }
        assert_eq!(stream.next_index(), 10);
        // Only the last `capacity` indexes remain fetchable.
        assert!(stream.get(5).is_none());
        assert!(stream.get(6).is_some());
        assert!(stream.get(9).is_some());
    }

    #[test]
    fn codec_header_bumps_version() {
        let stream = Stream::new("live/stream", 16);
        assert_eq!(stream.version(), 0);
        let header = Packet::new(PacketType::Video | PacketType::CodecHeader, 0, Bytes::from_static(&[0x17, 0, 0, 0]));
        stream.ingest(header);
        assert_eq!(stream.version(), 1);
    }

    #[test]
    fn locate_keyframe_respects_max_age() {
        let stream = Stream::new("live/stream", 64);
        stream.ingest(key_frame(0));
        stream.ingest(inter_frame(1000));
        stream.ingest(key_frame(2000));

        let located = stream.locate_keyframe(2500, 600).unwrap();
        assert_eq!(located.timestamp, 2000);

        assert!(stream.locate_keyframe(2500, 100).is_none());
    }
}
