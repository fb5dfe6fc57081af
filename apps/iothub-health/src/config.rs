//! Service configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `$XDG_CONFIG_HOME/iothub-health/config.toml`
//! - Windows: `%APPDATA%/iothub-health/config.toml`
//!
//! `IOTHUB_HEALTH_CONFIG` overrides the path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use iothub_connection::store::{app_dir, default_store_path};
use iothub_connection::{ManagerSettings, MqttTransportSettings, ReconnectConfig, TrustAnchors};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "IOTHUB_HEALTH_CONFIG";

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Credential store file. Defaults to `credentials.json` next to the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Unix seconds placed in the SAS token's `se=` field.
    #[serde(default = "default_sas_expiry")]
    pub sas_expiry: u64,

    /// PEM trust bundle for the hub's TLS certificate. Platform roots when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_sas_expiry() -> u64 {
    iothub_auth::DEFAULT_EXPIRY
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_initial_ms() -> u64 {
    250
}

fn default_reconnect_max_ms() -> u64 {
    15_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            sas_expiry: default_sas_expiry(),
            ca_file: None,
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl HealthConfig {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads from `path`, writing defaults there when the file is missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: HealthConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = HealthConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Resolved credential store location.
    pub fn store_path(&self) -> anyhow::Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => default_store_path().context("no config directory for the credential store"),
        }
    }

    /// Builds manager settings, reading the CA bundle if one is configured.
    pub fn manager_settings(&self) -> anyhow::Result<ManagerSettings> {
        let trust_anchors = match &self.ca_file {
            Some(path) => TrustAnchors::Pem(
                std::fs::read(path)
                    .with_context(|| format!("reading CA bundle {}", path.display()))?,
            ),
            None => TrustAnchors::Platform,
        };
        Ok(ManagerSettings {
            sas_expiry: self.sas_expiry,
            trust_anchors,
        })
    }

    pub fn transport_settings(&self) -> MqttTransportSettings {
        MqttTransportSettings {
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.reconnect_initial_ms),
                max_delay: Duration::from_millis(self.reconnect_max_ms),
                ..ReconnectConfig::default()
            },
            ..MqttTransportSettings::default()
        }
    }
}

/// Returns the configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    app_dir()
        .map(|d| d.join("config.toml"))
        .context("could not determine config directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = HealthConfig::default();
        assert_eq!(config.sas_expiry, 9_000_000_000);
        assert_eq!(config.keep_alive_secs, 30);
        assert!(config.ca_file.is_none());
        assert!(config.store_path.is_none());
    }

    #[test]
    fn config_partial_toml() {
        let config: HealthConfig = toml::from_str("sas_expiry = 1700000000").unwrap();
        assert_eq!(config.sas_expiry, 1_700_000_000);
        assert_eq!(config.reconnect_initial_ms, 250);
        assert_eq!(config.reconnect_max_ms, 15_000);
    }

    #[test]
    fn missing_file_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = HealthConfig::load_from(&path).unwrap();
        assert_eq!(config, HealthConfig::default());
        assert!(path.exists());

        let reloaded = HealthConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let config = HealthConfig {
            store_path: Some(tmp.path().join("creds.json")),
            keep_alive_secs: 60,
            ..HealthConfig::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(HealthConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "keep_alive_secs = \"soon\"").unwrap();
        assert!(HealthConfig::load_from(&path).is_err());
    }

    #[test]
    fn settings_follow_config() {
        let config = HealthConfig {
            sas_expiry: 42,
            keep_alive_secs: 10,
            reconnect_initial_ms: 100,
            reconnect_max_ms: 2_000,
            ..HealthConfig::default()
        };

        let manager = config.manager_settings().unwrap();
        assert_eq!(manager.sas_expiry, 42);
        assert_eq!(manager.trust_anchors, TrustAnchors::Platform);

        let transport = config.transport_settings();
        assert_eq!(transport.keep_alive, Duration::from_secs(10));
        assert_eq!(transport.reconnect.initial_delay, Duration::from_millis(100));
        assert_eq!(transport.reconnect.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn ca_file_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let ca = tmp.path().join("ca.pem");
        std::fs::write(&ca, b"-----BEGIN CERTIFICATE-----\n").unwrap();

        let config = HealthConfig {
            ca_file: Some(ca),
            ..HealthConfig::default()
        };
        match config.manager_settings().unwrap().trust_anchors {
            TrustAnchors::Pem(bytes) => assert!(bytes.starts_with(b"-----BEGIN")),
            other => panic!("expected PEM anchors, got {other:?}"),
        }

        let missing = HealthConfig {
            ca_file: Some(tmp.path().join("absent.pem")),
            ..HealthConfig::default()
        };
        assert!(missing.manager_settings().is_err());
    }

    #[test]
    fn explicit_store_path_wins() {
        let config = HealthConfig {
            store_path: Some(PathBuf::from("/var/lib/iothub/creds.json")),
            ..HealthConfig::default()
        };
        assert_eq!(
            config.store_path().unwrap(),
            PathBuf::from("/var/lib/iothub/creds.json")
        );
    }
}
