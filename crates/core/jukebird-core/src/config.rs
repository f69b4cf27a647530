//! Bot configuration
//!
//! Loaded once at startup from a JSON file, with environment overrides for
//! the values that differ between deployments. Paths are interpreted
//! relative to the working directory.

use crate::error::{JukebirdError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable carrying the gateway token.
pub const ENV_TOKEN: &str = "JUKEBIRD_TOKEN";
/// Environment variable overriding the command prefix.
pub const ENV_PREFIX: &str = "JUKEBIRD_PREFIX";

/// Top-level configuration of the bot process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Gateway token; usually supplied via `JUKEBIRD_TOKEN` instead
    pub token: String,
    /// Prefix that marks a message as a command
    pub command_prefix: String,
    /// Folder holding the audio clip files
    pub clip_folder: PathBuf,
    /// JSON descriptor mapping clip IDs to files
    pub catalog_file: PathBuf,
    /// JSON file of response templates
    pub responses_file: PathBuf,
    /// Directory for per-group settings files
    pub settings_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            command_prefix: "!".to_string(),
            clip_folder: PathBuf::from("clips"),
            catalog_file: PathBuf::from("assets/catalog.json"),
            responses_file: PathBuf::from("assets/responses.json"),
            settings_dir: PathBuf::from("settings"),
        }
    }
}

impl BotConfig {
    /// Loads the configuration file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let config: Self = serde_json::from_str(&raw).map_err(|e| {
                    JukebirdError::Config(format!(
                        "malformed config file {}: {e}",
                        path.display()
                    ))
                })?;
                info!(file = %path.display(), "configuration loaded");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(file = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(JukebirdError::Config(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Applies environment overrides on top of the file values.
    pub fn apply_env(mut self) -> Self {
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            self.token = token;
        }
        if let Ok(prefix) = std::env::var(ENV_PREFIX) {
            self.command_prefix = prefix;
        }
        self
    }

    /// Checks the invariants a running bot depends on.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(JukebirdError::Config(format!(
                "no gateway token configured, set {ENV_TOKEN} or the token field"
            )));
        }
        if self.command_prefix.is_empty() {
            return Err(JukebirdError::Config(
                "command prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.clip_folder, PathBuf::from("clips"));
        assert_eq!(config.catalog_file, PathBuf::from("assets/catalog.json"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BotConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.command_prefix, "!");
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "command_prefix": "." }"#).unwrap();

        let config = BotConfig::load(&path).unwrap();
        assert_eq!(config.command_prefix, ".");
        assert_eq!(config.clip_folder, PathBuf::from("clips"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"{").unwrap();

        assert!(matches!(
            BotConfig::load(&path),
            Err(JukebirdError::Config(_))
        ));
    }

    #[test]
    fn test_validate_requires_token_and_prefix() {
        let mut config = BotConfig::default();
        assert!(config.validate().is_err());

        config.token = "secret".to_string();
        assert!(config.validate().is_ok());

        config.command_prefix.clear();
        assert!(config.validate().is_err());
    }
}
