//! CLI argument parsing, enabled by the `cli` feature.

use std::path::PathBuf;

use clap::Parser;

/// The CLI surface a `scuffle-settings`-based binary typically exposes: a single positional
/// argument naming the main configuration file.
#[derive(Debug, Parser)]
pub struct Cli {
    /// Path to the main configuration file.
    pub config: PathBuf,
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parses_the_config_path() {
        let cli = Cli::parse_from(["bin", "config.json"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }
}
