//! A `"domain/app/name"`-keyed binding between one publisher and many players.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::stream::Stream;
use crate::user::User;

/// Per-app tunables, loaded from the `domains[].app[]` configuration grammar.
#[derive(Debug, Clone, Copy)]
pub struct AppSettings {
    /// Ring buffer capacity (packets retained per stream).
    pub max_buffer: usize,
    /// How far behind the latest keyframe a newly joining player is allowed to start.
    pub content_latency: Duration,
    /// How long a session with no publisher and no players is kept before GC (S2).
    pub stream_idle_time: Duration,
    /// How long a session's stream may go without a new packet before GC, even with players
    /// still attached (S3).
    pub stream_timeout_time: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_buffer: crate::stream::DEFAULT_CAPACITY,
            content_latency: Duration::from_secs(3),
            stream_idle_time: Duration::from_secs(30),
            stream_timeout_time: Duration::from_secs(30),
        }
    }
}

struct SessionInner {
    publisher: Option<Arc<User>>,
    players: Vec<Arc<User>>,
    last_player_activity: Option<Instant>,
}

/// The server-side object keyed by `"domain/app/stream"` binding one publisher to many
/// players.
///
/// (S1) At most one publisher exists at any time; installing a new one evicts the old one.
/// (S2)/(S3) govern garbage collection, checked by [`is_timeout`](Self::is_timeout).
pub struct Session {
    session_name: String,
    app_settings: AppSettings,
    stream: Arc<Stream>,
    inner: Mutex<SessionInner>,
    created_at: Instant,
}

impl Session {
    /// Creates a fresh, publisher-less, player-less session with its own stream.
    pub fn new(session_name: String, app_settings: AppSettings) -> Arc<Self> {
        let stream = Arc::new(Stream::new(session_name.clone(), app_settings.max_buffer));
        Arc::new(Self {
            session_name,
            app_settings,
            stream,
            inner: Mutex::new(SessionInner {
                publisher: None,
                players: Vec::new(),
                last_player_activity: None,
            }),
            created_at: Instant::now(),
        })
    }

    /// The canonical `"domain/app/name"` key.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// This session's app tunables.
    pub fn app_settings(&self) -> &AppSettings {
        &self.app_settings
    }

    /// The stream this session buffers media into.
    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    /// Installs `publisher` as this session's publisher (S1). If one was already attached, it
    /// is evicted first and returned so the caller can close its connection ("last-writer-wins";
    /// see scenario #4).
    pub fn set_publisher(&self, publisher: Arc<User>) -> Option<Arc<User>> {
        let mut inner = self.inner.lock().unwrap();
        let evicted = inner.publisher.replace(publisher);
        if let Some(evicted) = &evicted {
            evicted.mark_destroyed();
        }
        evicted
    }

    /// Removes the publisher if `publisher` is still the one installed (avoids a stale
    /// connection-close callback clobbering a publisher that has since taken over).
    pub fn clear_publisher_if(&self, publisher: &Arc<User>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.publisher.as_ref().is_some_and(|p| Arc::ptr_eq(p, publisher)) {
            inner.publisher = None;
        }
    }

    /// True if a publisher is currently attached.
    pub fn has_publisher(&self) -> bool {
        self.inner.lock().unwrap().publisher.is_some()
    }

    /// Attaches a player (no uniqueness constraint — any number may be attached).
    pub fn add_player(&self, player: Arc<User>) {
        let mut inner = self.inner.lock().unwrap();
        inner.players.push(player);
        inner.last_player_activity = Some(Instant::now());
    }

    /// Detaches a player.
    pub fn remove_player(&self, player: &Arc<User>) {
        let mut inner = self.inner.lock().unwrap();
        inner.players.retain(|p| !Arc::ptr_eq(p, player));
        inner.last_player_activity = Some(Instant::now());
    }

    /// Number of players currently attached.
    pub fn player_count(&self) -> usize {
        self.inner.lock().unwrap().players.len()
    }

    /// Wakes every attached player's cursor task. Over-waking is fine: GetFrames/PostFrames
    /// tolerate spurious wakeups by returning early when there's nothing to do.
    pub fn active_all_players(&self) {
        let inner = self.inner.lock().unwrap();
        for player in &inner.players {
            if let crate::user::UserKind::Player { cursor, .. } = &player.kind {
                cursor.notify.notify_one();
            }
        }
    }

    /// (S2)/(S3): true if this session should be garbage collected by the sweeper.
    pub fn is_timeout(&self) -> bool {
        let inner = self.inner.lock().unwrap();

        let idle = inner.publisher.is_none() && inner.players.is_empty();
        if idle {
            let since = inner
                .last_player_activity
                .unwrap_or(self.created_at)
                .elapsed();
            if since >= self.app_settings.stream_idle_time {
                return true;
            }
        }

        if inner.publisher.is_some() && self.stream.is_timed_out(self.app_settings.stream_timeout_time) {
            return true;
        }

        false
    }

    /// Best-effort teardown: marks the publisher and every player destroyed. The caller is
    /// responsible for having already removed this session from the registry so no new users
    /// can join concurrently.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(publisher) = inner.publisher.take() {
            publisher.mark_destroyed();
        }
        for player in inner.players.drain(..) {
            player.mark_destroyed();
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::user::{TcUrl, UserKind, UserType};

    fn publisher(session: &Arc<Session>) -> Arc<User> {
        Arc::new(User::new(
            UserKind::Publisher,
            session,
            TcUrl::default(),
            "127.0.0.1:1".to_string(),
            UserType::PublishRtmp,
        ))
    }

    #[test]
    fn new_publisher_evicts_the_old_one() {
        let session = Session::new("live/s".to_string(), AppSettings::default());
        let first = publisher(&session);
        let second = publisher(&session);

        assert!(session.set_publisher(first.clone()).is_none());
        assert!(!first.is_destroyed());

        let evicted = session.set_publisher(second).unwrap();
        assert!(Arc::ptr_eq(&evicted, &first));
        assert!(evicted.is_destroyed());
    }

    #[test]
    fn idle_session_times_out_after_grace_period() {
        let mut settings = AppSettings::default();
        settings.stream_idle_time = Duration::from_millis(0);
        let session = Session::new("live/s".to_string(), settings);
        assert!(session.is_timeout());
    }

    #[test]
    fn session_with_publisher_and_no_recent_data_times_out() {
        let mut settings = AppSettings::default();
        settings.stream_timeout_time = Duration::from_millis(0);
        let session = Session::new("live/s".to_string(), settings);
        let pub_user = publisher(&session);
        session.set_publisher(pub_user);
        // No packets ever ingested means `is_timed_out` returns false (see Stream::is_timed_out),
        // so a fresh session with a publisher but no data isn't immediately GC'd.
        assert!(!session.is_timeout());
    }
}
