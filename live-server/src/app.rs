//! Process-wide state shared by every accepted connection and the background sweeper.

use std::collections::HashMap;
use std::sync::Arc;

use scuffle_live::{AppSettings, SessionRegistry};

use crate::config::{DomainConfig, Settings};

/// One configured application, keyed by `"{domain}/{app}"` the way session names are built.
#[derive(Debug, Clone, Copy)]
pub struct AppEntry {
    pub settings: AppSettings,
    pub rtmp_support: bool,
}

/// The server's global context: configuration, the session registry, and per-app tunables.
///
/// Handed to every connection handler and to the background sweeper as an `Arc`, mirroring how
/// `scuffle_context::Context` is threaded for cancellation.
pub struct App {
    pub settings: Settings,
    pub registry: Arc<SessionRegistry>,
    apps: HashMap<String, AppEntry>,
}

impl App {
    pub fn new(settings: Settings, domains: Vec<DomainConfig>) -> Arc<Self> {
        let mut apps = HashMap::new();
        for domain in domains {
            for app in domain.domain.app {
                let key = format!("{}/{}", domain.domain.name, app.name);
                apps.insert(
                    key,
                    AppEntry {
                        settings: app.to_app_settings(),
                        rtmp_support: app.rtmp_support,
                    },
                );
            }
        }

        Arc::new(Self {
            settings,
            registry: Arc::new(SessionRegistry::new()),
            apps,
        })
    }

    /// Looks up an app's tunables by its RTMP app name. Matches on the trailing path segment of
    /// the `"{domain}/{app}"` key since this server's RTMP adapter doesn't see a connection's
    /// virtual host, only its `app` path segment.
    pub fn app_settings(&self, app_name: &str) -> AppSettings {
        self.apps
            .iter()
            .find(|(key, _)| key.rsplit('/').next() == Some(app_name))
            .map(|(_, entry)| entry.settings)
            .unwrap_or_default()
    }
}

impl scuffle_live::AppSettingsResolver for App {
    fn app_settings(&self, app_name: &str) -> AppSettings {
        App::app_settings(self, app_name)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DomainBody, LogSettings, ServiceSettings};

    fn sample_settings() -> Settings {
        Settings {
            name: "live".to_string(),
            cpu_start: 0,
            threads: 1,
            log: LogSettings::default(),
            service: vec![ServiceSettings {
                addr: "0.0.0.0".to_string(),
                port: 1935,
                protocol: crate::config::ServiceProtocol::Rtmp,
                transport: crate::config::ServiceTransport::Tcp,
            }],
            domains_path: "domains".into(),
        }
    }

    #[test]
    fn looks_up_app_settings_by_name() {
        let domain = DomainConfig {
            domain: DomainBody {
                name: "default".to_string(),
                kind: "rtmp".to_string(),
                app: vec![AppConfig {
                    name: "live".to_string(),
                    max_buffer: 42,
                    hls_support: false,
                    flv_support: false,
                    rtmp_support: true,
                    content_latency: 3,
                    stream_idle_time: 30_000,
                    stream_timeout_time: 30_000,
                }],
            },
        };

        let app = App::new(sample_settings(), vec![domain]);
        assert_eq!(app.app_settings("live").max_buffer, 42);
    }

    #[test]
    fn unknown_app_falls_back_to_defaults() {
        let app = App::new(sample_settings(), vec![]);
        assert_eq!(app.app_settings("nonexistent").max_buffer, scuffle_live::stream::DEFAULT_CAPACITY);
    }
}
