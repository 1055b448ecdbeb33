//! Queue server configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// User-configurable settings for the queue server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Host address to listen on (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on (default: 8377)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for the durable store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Cadence of the delayed-partition sweep in seconds (default: 1)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Nacks tolerated for one head value before it is dead-lettered.
    /// Unset means never dead-letter automatically.
    #[serde(default)]
    pub max_nacks: Option<u32>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8377
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./miniqueue-data")
}

fn default_sweep_interval_secs() -> u64 {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_nacks: None,
        }
    }
}

impl QueueConfig {
    /// Load configuration from a TOML file.
    /// Returns default config if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                crate::error::QueueError::Config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let config: QueueConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the listen address string (e.g., "127.0.0.1:8377").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sweep cadence as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8377);
        assert_eq!(config.sweep_interval_secs, 1);
        assert!(config.max_nacks.is_none());
    }

    #[test]
    fn test_bind_address() {
        let config = QueueConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8377");
    }

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000
            sweep_interval_secs = 5
            max_nacks = 3
        "#;
        let config: QueueConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.sweep_interval_secs, 5);
        assert_eq!(config.max_nacks, Some(3));
    }

    #[test]
    fn test_sweep_interval_clamped() {
        let config: QueueConfig = toml::from_str("sweep_interval_secs = 0").unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");

        let config = QueueConfig {
            host: "0.0.0.0".to_string(),
            port: 9999,
            data_dir: dir.path().join("data"),
            sweep_interval_secs: 2,
            max_nacks: Some(5),
        };
        config.save(&path).unwrap();

        let loaded = QueueConfig::load(&path).unwrap();
        assert_eq!(loaded.host, "0.0.0.0");
        assert_eq!(loaded.port, 9999);
        assert_eq!(loaded.max_nacks, Some(5));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let loaded = QueueConfig::load("/nonexistent/miniqueue.toml").unwrap();
        assert_eq!(loaded.port, 8377);
    }
}
