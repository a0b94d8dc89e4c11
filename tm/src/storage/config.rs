//! Storage hub configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Storage hub configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Largest key + value accepted by a single write (browsers allow ~5MB per origin)
    #[serde(rename = "max-entry-bytes", default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// Raise a change event even when the written value equals the stored one
    ///
    /// Browsers suppress the `storage` event in that case; `false` reproduces it.
    #[serde(rename = "notify-unchanged", default = "default_notify_unchanged")]
    pub notify_unchanged: bool,
}

fn default_max_entry_bytes() -> usize {
    debug!("default_max_entry_bytes: called");
    5 * 1024 * 1024
}

fn default_notify_unchanged() -> bool {
    debug!("default_notify_unchanged: called");
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        debug!("StorageConfig::default: called");
        Self {
            max_entry_bytes: 5 * 1024 * 1024,
            notify_unchanged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.max_entry_bytes, 5 * 1024 * 1024);
        assert!(config.notify_unchanged);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: StorageConfig = serde_yaml::from_str("notify-unchanged: false").unwrap();
        assert!(!config.notify_unchanged);
        assert_eq!(config.max_entry_bytes, 5 * 1024 * 1024);
    }
}
