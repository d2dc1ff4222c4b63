//! Tools for managing configuration from environment variables or config files.
//!
//! This is a thin, opinionated layer over the [`config`] crate: callers describe where their
//! settings live (a list of files, plus an optional environment variable prefix) and get back a
//! `serde`-deserialized tree, with [`ConfigError`] collapsing everything that can go wrong into
//! one type suitable for a CLI's top-level error path.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]

#[cfg(feature = "cli")]
mod cli;

#[cfg(feature = "cli")]
pub use cli::Cli;

use std::path::{Path, PathBuf};

pub use config::FileFormat;
use config::{Config, Environment, File};

/// Everything that can go wrong while assembling or deserializing a configuration tree.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The underlying `config` crate failed to build or deserialize the merged configuration
    /// (missing required file, malformed syntax, a field that doesn't match its target type).
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

/// One configuration source layered into a [`Options`] builder.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Path to the file.
    pub path: PathBuf,
    /// Explicit format override. `None` lets `config` infer the format from the extension.
    pub format: Option<FileFormat>,
    /// If `true`, a missing file is an error; if `false`, it's silently skipped.
    pub required: bool,
}

impl ConfigFile {
    /// A required config file whose format is inferred from its extension.
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            required: true,
        }
    }

    /// An optional config file (e.g. a glob match that may not exist) whose format is inferred
    /// from its extension.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            required: false,
        }
    }

    /// Overrides the format inference for this file.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Describes where to find configuration: an ordered list of files (later files override
/// earlier ones) plus an optional environment variable prefix (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Files to load, in increasing precedence order.
    pub files: Vec<ConfigFile>,
    /// If set, environment variables named `{prefix}__{FIELD}` (nested fields joined by `__`)
    /// override whatever the files produced.
    pub env_prefix: Option<String>,
}

impl Options {
    /// Starts from an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a config file source.
    pub fn with_file(mut self, file: ConfigFile) -> Self {
        self.files.push(file);
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }
}

/// Loads and deserializes a configuration tree of type `T` from the sources described by
/// `options`.
pub fn parse<T: serde::de::DeserializeOwned>(options: &Options) -> Result<T, ConfigError> {
    let mut builder = Config::builder();

    for file in &options.files {
        let mut source = File::from(file.path.as_path()).required(file.required);
        if let Some(format) = file.format {
            source = source.format(format);
        }
        builder = builder.add_source(source);
    }

    if let Some(prefix) = &options.env_prefix {
        builder = builder.add_source(Environment::with_prefix(prefix).separator("__"));
    }

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

/// Globs `*.json`/`*.toml`/`*.yaml`/`*.yml` files (format inferred per-file) directly inside
/// `dir`, each as an optional source, in directory-listing order.
///
/// Used for the "one file per domain" configuration layout: every matching file in `dir`
/// contributes, none are required (an empty directory just means no domains configured), and
/// the caller decides how to merge the resulting values (e.g. deserializing each file
/// separately rather than via [`parse`]'s single-tree model).
pub fn glob_config_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut paths = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(paths);
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_config = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("json" | "toml" | "yaml" | "yml")
        );
        if is_config {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        threads: u32,
    }

    #[test]
    fn env_prefix_overrides_defaults() {
        // SAFETY: test-local, not shared across threads in this test binary's run of this test.
        unsafe {
            std::env::set_var("TEST_PARSE__THREADS", "8");
        }

        let mut builder = config::Config::builder();
        builder = builder.set_default("name", "server").unwrap();
        builder = builder.set_default("threads", 1).unwrap();
        builder = builder.add_source(Environment::with_prefix("TEST_PARSE").separator("__"));
        let settings: Sample = builder.build().unwrap().try_deserialize().unwrap();

        assert_eq!(settings.threads, 8);
        assert_eq!(settings.name, "server");

        // SAFETY: see above.
        unsafe {
            std::env::remove_var("TEST_PARSE__THREADS");
        }
    }

    #[test]
    fn glob_config_files_only_matches_known_extensions() {
        let dir = std::env::temp_dir().join(format!("scuffle-settings-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.json"), "{}").unwrap();
        std::fs::write(dir.join("b.toml"), "").unwrap();
        std::fs::write(dir.join("README.md"), "").unwrap();

        let found = glob_config_files(&dir).unwrap();
        assert_eq!(found.len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
