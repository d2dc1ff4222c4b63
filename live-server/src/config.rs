//! The server's configuration tree: one main file plus a directory of per-domain app files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Log rotation cadence for the file appender.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogRotation {
    Day,
    Hour,
    Minute,
    #[default]
    Never,
}

/// `tracing` level names accepted in configuration.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The `tracing::Level` this configuration value maps to.
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// `log` configuration block.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub rotate: LogRotation,
    /// Directory the rolling file appender writes into. `None` means stdout only.
    pub path: Option<PathBuf>,
    /// Base file name for the rolling file appender.
    pub name: String,
}

/// Supported listener protocols. This server only implements `Rtmp`, but the field exists so
/// configuration files that list other protocols (reserved for future adapters) don't fail to
/// parse — unsupported listeners are rejected at startup with a logged error instead.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProtocol {
    Rtmp,
}

/// Supported transports. Only `Tcp` is implemented.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTransport {
    Tcp,
}

/// One listener the service loop binds at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    pub addr: String,
    pub port: u16,
    pub protocol: ServiceProtocol,
    pub transport: ServiceTransport,
}

/// Top-level configuration, loaded from the main config file named on the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub name: String,
    #[serde(default)]
    pub cpu_start: usize,
    pub threads: usize,
    #[serde(default)]
    pub log: LogSettings,
    pub service: Vec<ServiceSettings>,
    /// Directory globbed for per-domain app configuration files.
    pub domains_path: PathBuf,
}

/// One application's tunables within a domain's configuration file, before unit conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,
    #[serde(default)]
    pub hls_support: bool,
    #[serde(default)]
    pub flv_support: bool,
    #[serde(default = "default_true")]
    pub rtmp_support: bool,
    /// Seconds; converted to milliseconds by [`AppConfig::to_app_settings`].
    #[serde(default = "default_content_latency_secs")]
    pub content_latency: u64,
    #[serde(default = "default_stream_idle_time_ms")]
    pub stream_idle_time: u64,
    #[serde(default = "default_stream_timeout_time_ms")]
    pub stream_timeout_time: u64,
}

fn default_max_buffer() -> usize {
    scuffle_live::stream::DEFAULT_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_content_latency_secs() -> u64 {
    3
}
fn default_stream_idle_time_ms() -> u64 {
    30_000
}
fn default_stream_timeout_time_ms() -> u64 {
    30_000
}

impl AppConfig {
    /// Converts this config block into the runtime tunables `scuffle_live::Session` consumes.
    pub fn to_app_settings(&self) -> scuffle_live::AppSettings {
        scuffle_live::AppSettings {
            max_buffer: self.max_buffer,
            content_latency: Duration::from_secs(self.content_latency),
            stream_idle_time: Duration::from_millis(self.stream_idle_time),
            stream_timeout_time: Duration::from_millis(self.stream_timeout_time),
        }
    }
}

/// One `domain: { name, type, app: [...] }` configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub domain: DomainBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainBody {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub app: Vec<AppConfig>,
}

/// Loads the main settings file plus every domain file in `domains_path`.
pub fn load(config_path: &Path) -> Result<(Settings, Vec<DomainConfig>), anyhow::Error> {
    let settings: Settings = scuffle_settings::parse(
        &scuffle_settings::Options::new().with_file(scuffle_settings::ConfigFile::required(config_path)),
    )?;

    let mut domains = Vec::new();
    for path in scuffle_settings::glob_config_files(&settings.domains_path)? {
        let domain: DomainConfig =
            scuffle_settings::parse(&scuffle_settings::Options::new().with_file(scuffle_settings::ConfigFile::required(&path)))?;
        domains.push(domain);
    }

    Ok((settings, domains))
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn app_config_converts_seconds_to_duration() {
        let app = AppConfig {
            name: "live".to_string(),
            max_buffer: 500,
            hls_support: false,
            flv_support: false,
            rtmp_support: true,
            content_latency: 5,
            stream_idle_time: 1000,
            stream_timeout_time: 2000,
        };
        let settings = app.to_app_settings();
        assert_eq!(settings.content_latency, Duration::from_secs(5));
        assert_eq!(settings.stream_idle_time, Duration::from_millis(1000));
    }

    #[test]
    fn load_reads_main_file_and_globs_domain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let domains_dir = dir.path().join("domains");
        std::fs::create_dir_all(&domains_dir).unwrap();

        std::fs::write(
            dir.path().join("live-server.json"),
            format!(
                r#"{{
                    "name": "test-server",
                    "threads": 4,
                    "service": [{{"addr": "0.0.0.0", "port": 1935, "protocol": "rtmp", "transport": "tcp"}}],
                    "domains_path": "{}"
                }}"#,
                domains_dir.display().to_string().replace('\\', "\\\\")
            ),
        )
        .unwrap();

        std::fs::write(
            domains_dir.join("default.json"),
            r#"{
                "domain": {
                    "name": "__defaultServer__",
                    "type": "server",
                    "app": [{"name": "live"}]
                }
            }"#,
        )
        .unwrap();

        let (settings, domains) = load(&dir.path().join("live-server.json")).unwrap();

        assert_eq!(settings.name, "test-server");
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.service.len(), 1);
        assert_eq!(settings.service[0].port, 1935);

        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].domain.app[0].name, "live");
        assert_eq!(domains[0].domain.app[0].max_buffer, default_max_buffer());
    }

    #[test]
    fn load_fails_on_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("missing.json")).is_err());
    }
}
