//! TabMaster configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::election::ElectionConfig;
use crate::events::DEFAULT_CHANNEL_CAPACITY;
use crate::storage::StorageConfig;

/// Main TabMaster configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Election timing
    pub election: ElectionConfig,

    /// Shared storage behaviour
    pub storage: StorageConfig,

    /// Local event bus
    pub events: EventsConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.election.backoff_slots == 0 {
            return Err(eyre::eyre!("election.backoff-slots must be at least 1"));
        }
        if self.election.backoff_step_ms == 0 {
            return Err(eyre::eyre!("election.backoff-step-ms must be at least 1"));
        }
        if self.events.channel_capacity == 0 {
            return Err(eyre::eyre!("events.channel-capacity must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tabmaster.yml
        let local_config = PathBuf::from(".tabmaster.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tabmaster/tabmaster.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabmaster").join("tabmaster.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Local event bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it starts lagging
    #[serde(rename = "channel-capacity", default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.election.claim_delay_ms, 70);
        assert_eq!(config.election.backoff_slots, 40);
        assert!(config.storage.notify_unchanged);
        assert_eq!(config.events.channel_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
election:
  claim-delay-ms: 100
  confirm-delay-ms: 120
  backoff-step-ms: 50
  backoff-slots: 10
  seed: 7

storage:
  max-entry-bytes: 4096
  notify-unchanged: false

events:
  channel-capacity: 64
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.election.claim_delay_ms, 100);
        assert_eq!(config.election.confirm_delay_ms, 120);
        assert_eq!(config.election.backoff_slots, 10);
        assert_eq!(config.election.seed, Some(7));
        assert_eq!(config.storage.max_entry_bytes, 4096);
        assert!(!config.storage.notify_unchanged);
        assert_eq!(config.events.channel_capacity, 64);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
election:
  backoff-slots: 8
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.election.backoff_slots, 8);
        assert_eq!(config.election.claim_delay_ms, 70);
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.events, EventsConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_slots() {
        let mut config = Config::default();
        config.election.backoff_slots = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backoff-slots"));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "election:\n  seed: 42\nevents:\n  channel-capacity: 8").unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.election.seed, Some(42));
        assert_eq!(config.events.channel_capacity, 8);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yml");

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "election: [not, a, map").unwrap();

        let path = file.path().to_path_buf();
        assert!(Config::load(Some(&path)).is_err());
    }
}
