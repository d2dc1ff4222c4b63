//! Maps `"app/stream"` session names to live [`Session`]s and periodically sweeps timed-out
//! ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::session::{AppSettings, Session};

/// Registry of all sessions currently live on this server.
///
/// A session is created lazily on first publish or play, and removed either when the sweeper
/// finds it timed out (S2/S3) or when a caller explicitly tears it down.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `session_name`, creating it with `app_settings` if it doesn't
    /// exist yet.
    pub fn get_or_create(&self, session_name: &str, app_settings: AppSettings) -> Arc<Session> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_name.to_string())
            .or_insert_with(|| Session::new(session_name.to_string(), app_settings))
            .clone()
    }

    /// Returns the session for `session_name` if one currently exists, without creating one.
    pub fn get(&self, session_name: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(session_name).cloned()
    }

    /// Removes `session_name` from the registry, if present, returning it.
    pub fn remove(&self, session_name: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().remove(session_name)
    }

    /// Number of sessions currently tracked.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// True if no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and clears every session whose [`Session::is_timeout`] currently reports true.
    ///
    /// Sessions are removed from the map first, so no new publisher/player can join one that's
    /// about to be cleared, then cleared outside the map lock.
    pub fn sweep(&self) {
        let timed_out: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().unwrap();
            let mut timed_out = Vec::new();
            sessions.retain(|name, session| {
                if session.is_timeout() {
                    tracing::info!(session = %name, "garbage collecting timed out session");
                    timed_out.push(session.clone());
                    false
                } else {
                    true
                }
            });
            timed_out
        };

        for session in timed_out {
            session.clear();
        }
    }

    /// Runs [`sweep`](Self::sweep) every `interval` until `ctx` is cancelled.
    pub async fn run_sweeper(self: &Arc<Self>, ctx: scuffle_context::Context, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep(),
                _ = ctx.done() => {
                    tracing::debug!("session sweeper shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_session() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("live/stream", AppSettings::default());
        let b = registry.get_or_create("live/stream", AppSettings::default());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sweep_removes_idle_sessions() {
        let registry = SessionRegistry::new();
        let mut settings = AppSettings::default();
        settings.stream_idle_time = Duration::from_millis(0);
        registry.get_or_create("live/stream", settings);
        assert_eq!(registry.len(), 1);

        registry.sweep();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn sweep_keeps_active_sessions() {
        let registry = SessionRegistry::new();
        registry.get_or_create("live/stream", AppSettings::default());
        registry.sweep();
        assert_eq!(registry.len(), 1);
    }
}
