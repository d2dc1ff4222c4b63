//! Per-stream/per-player audio/video timestamp sanitization.

use crate::packet::Packet;

/// Default substituted delta when a video timestamp jumps further than `MAX_DELTA_MS` from
/// its predecessor.
const DEFAULT_VIDEO_DELTA_MS: u32 = 40;
/// Default substituted delta when an audio timestamp jumps further than `MAX_DELTA_MS` from
/// its predecessor.
const DEFAULT_AUDIO_DELTA_MS: u32 = 20;
/// A computed delta further than this from zero is considered bogus and replaced by the
/// type-appropriate default above.
const MAX_DELTA_MS: i64 = 100;

/// Rewrites publisher/player timestamps so that audio and video stay synchronized even when
/// the source feed's own timestamps are jittery, reordered in small ways, or reset.
///
/// One instance lives on each [`Stream`](crate::stream::Stream) (correcting on ingress) and,
/// optionally, one per player (for players that rewrite again on egress).
#[derive(Debug, Clone, Default)]
pub struct TimeCorrector {
    last_video_in: Option<u32>,
    last_video_out: u32,
    last_audio_in: Option<u32>,
    last_audio_out: u32,
    /// Number of audio packets seen since the last video packet. `0` means "the very next
    /// audio packet is the first one after a video packet" (or no video has been seen yet).
    audio_since_video: u32,
}

impl TimeCorrector {
    /// Creates a fresh corrector with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Corrects a packet's timestamp given the packet's kind.
    ///
    /// Returns `None` for packet types this corrector doesn't distribute (caller should drop
    /// the packet rather than forward it). Header packets (codec sequence headers, metadata)
    /// pass through unchanged and do not perturb the corrector's state.
    pub fn correct(&mut self, packet: &Packet) -> Option<u32> {
        if packet.is_header() {
            return Some(packet.timestamp);
        }

        if packet.kind.contains(crate::packet::PacketType::Video) {
            Some(self.correct_video(packet.timestamp))
        } else if packet.kind.contains(crate::packet::PacketType::Audio) {
            Some(self.correct_audio(packet.timestamp))
        } else {
            None
        }
    }

    fn correct_video(&mut self, ts: u32) -> u32 {
        self.audio_since_video = 0;

        let Some(last_video_in) = self.last_video_in else {
            // First video packet ever. Seed from this packet's own timestamp, unless audio has
            // already established a baseline that has drifted from it by more than 100ms — in
            // that case seed from audio's baseline instead, so the two tracks start in sync.
            // This resync only ever happens here, on the very first video packet; later packets
            // fall through to the normal branch below and never re-seed.
            let (baseline_in, baseline_out) = match self.last_audio_in {
                Some(last_audio_in) if (last_audio_in as i64 - ts as i64).abs() >= MAX_DELTA_MS => {
                    (last_audio_in, self.last_audio_out)
                }
                _ => (ts, ts),
            };

            let delta = delta_or_default(baseline_in, ts, DEFAULT_VIDEO_DELTA_MS);
            let output = baseline_out.saturating_add_signed(delta as i32);

            self.last_video_in = Some(ts);
            self.last_video_out = output;
            return output;
        };

        let delta = delta_or_default(last_video_in, ts, DEFAULT_VIDEO_DELTA_MS);
        let output = self.last_video_out.saturating_add_signed(delta as i32);

        self.last_video_in = Some(ts);
        self.last_video_out = output;
        output
    }

    fn correct_audio(&mut self, ts: u32) -> u32 {
        let output = if self.audio_since_video == 0 {
            // First audio packet after a video packet (or the very first audio packet ever).
            match self.last_video_in {
                None => {
                    if self.last_audio_in.is_none() {
                        self.last_audio_out = ts;
                    }
                    ts
                }
                Some(last_video_in) => {
                    let delta = delta_or_default(last_video_in, ts, DEFAULT_AUDIO_DELTA_MS);
                    self.last_video_out.saturating_add_signed(delta as i32)
                }
            }
        } else {
            let last_audio_in = self.last_audio_in.unwrap_or(ts);
            let delta = delta_or_default(last_audio_in, ts, DEFAULT_AUDIO_DELTA_MS);
            self.last_audio_out.saturating_add_signed(delta as i32)
        };

        self.audio_since_video += 1;
        self.last_audio_in = Some(ts);
        self.last_audio_out = output;
        output
    }
}

/// `ts - baseline`, substituting `default` if the magnitude exceeds [`MAX_DELTA_MS`].
fn delta_or_default(baseline: u32, ts: u32, default: u32) -> i64 {
    let delta = ts as i64 - baseline as i64;
    if delta.unsigned_abs() >= MAX_DELTA_MS as u64 { default as i64 } else { delta }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::packet::PacketType;

    fn video(ts: u32) -> Packet {
        Packet::new(PacketType::Video, ts, Bytes::new())
    }

    fn audio(ts: u32) -> Packet {
        Packet::new(PacketType::Audio, ts, Bytes::new())
    }

    fn header(ts: u32) -> Packet {
        Packet::new(PacketType::Video | PacketType::CodecHeader, ts, Bytes::new())
    }

    #[test]
    fn header_passes_through_without_mutating_state() {
        let mut tc = TimeCorrector::new();
        assert_eq!(tc.correct(&header(12345)), Some(12345));
        // State untouched: the next video packet is still treated as the first one.
        assert_eq!(tc.correct(&video(0)), Some(0));
    }

    #[test]
    fn unknown_packet_type_is_not_distributed() {
        let mut tc = TimeCorrector::new();
        let unknown = Packet::new(PacketType::none(), 10, Bytes::new());
        assert_eq!(tc.correct(&unknown), None);
    }

    #[test]
    fn first_video_passes_through() {
        let mut tc = TimeCorrector::new();
        assert_eq!(tc.correct(&video(0)), Some(0));
    }

    #[test]
    fn normal_video_deltas_are_preserved() {
        let mut tc = TimeCorrector::new();
        assert_eq!(tc.correct(&video(0)), Some(0));
        assert_eq!(tc.correct(&video(40)), Some(40));
        assert_eq!(tc.correct(&video(80)), Some(80));
    }

    #[test]
    fn large_video_jump_is_replaced_with_default_delta() {
        let mut tc = TimeCorrector::new();
        assert_eq!(tc.correct(&video(0)), Some(0));
        // A 10 second jump is clearly bogus; substitute the 40ms default.
        assert_eq!(tc.correct(&video(10_000)), Some(40));
    }

    #[test]
    fn audio_interleaved_with_video_tracks_video_baseline() {
        let mut tc = TimeCorrector::new();
        assert_eq!(tc.correct(&video(0)), Some(0));
        // First audio after video: corrected against the video baseline.
        assert_eq!(tc.correct(&audio(23)), Some(23));
        assert_eq!(tc.correct(&video(40)), Some(40));
    }

    #[test]
    fn video_resyncs_to_audio_baseline_only_on_first_video_packet() {
        let mut tc = TimeCorrector::new();
        // Audio establishes a baseline first.
        assert_eq!(tc.correct(&audio(5_000)), Some(5_000));
        // The first video packet ever arrives far from audio's baseline: video resyncs onto
        // audio's baseline once, using the default delta since the raw gap is bogus.
        assert_eq!(tc.correct(&video(0)), Some(5_040));
        // A later video packet that drifts just as far from its own predecessor is NOT
        // resynced again — only the default delta applies, video's own baseline stays
        // authoritative from here on.
        assert_eq!(tc.correct(&video(10_000)), Some(5_080));
    }
}
