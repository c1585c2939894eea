//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tally_core::SleepConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rule file used when `--rules` is not given.
    pub rules_path: PathBuf,
    /// Activity logs used when no `--log` is given.
    pub log_paths: Vec<PathBuf>,
    /// Sleep activity names and night boundaries.
    pub sleep: SleepConfig,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs_config_path().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            rules_path: config_dir.join("rules.grc"),
            log_paths: vec![data_dir.join("activities.log")],
            sleep: SleepConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // TALLY_RULES_PATH, TALLY_SLEEP__MAIN_SLEEP, ...
        figment = figment.merge(Env::prefixed("TALLY_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for tally.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tally"))
}

/// Returns the platform-specific data directory for tally.
///
/// On Linux: `~/.local/share/tally`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tally"))
}
