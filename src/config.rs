//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - MqttConfig: broker endpoint, credentials, keep-alive.
//!     - TopicsConfig: primary topic prefix and the diagnostic `#` toggle.
//!     - StorageConfig: where snapshot records are persisted.
//!     - ReloadConfig: how often the snapshot store is re-merged.
//!     - ServerConfig: bind address for the JSON status API.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// client id is `<prefix>_<random suffix>` so parallel instances never clash
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id_prefix: "water_monitor".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicsConfig {
    /// primary naming scheme prefix; subscription pattern is `<prefix>/#`
    pub primary_prefix: String,
    /// also subscribe to the universal wildcard `#` for diagnostics
    pub diagnostic_wildcard: bool,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            primary_prefix: "simrhoic/water".to_string(),
            diagnostic_wildcard: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReloadConfig {
    /// snapshot store re-merge period
    pub interval_seconds: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: HostConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("host.toml"),
            std::path::PathBuf::from("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("loaded config from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("no config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HUB CONFIGURATION             │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Broker: {}:{}", self.mqtt.host, self.mqtt.port);
        println!("│ Primary Topics: {}/#", self.topics.primary_prefix);
        println!("│ Reload Interval: {}s", self.reload.interval_seconds);
        println!("│ Storage Dir: {}", self.storage.dir);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            topics: TopicsConfig::default(),
            storage: StorageConfig::default(),
            reload: ReloadConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml = r#"
            [mqtt]
            host = "broker.example.net"
            port = 8883
            client_id_prefix = "test"
            keep_alive_secs = 15

            [topics]
            primary_prefix = "root/water"
            diagnostic_wildcard = false
        "#;
        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.host, "broker.example.net");
        assert_eq!(config.topics.primary_prefix, "root/water");
        assert!(!config.topics.diagnostic_wildcard);
        // omitted sections fall back to defaults
        assert_eq!(config.reload.interval_seconds, 5);
        assert_eq!(config.storage.dir, "data");
    }
}
