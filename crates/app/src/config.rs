//! Application configuration
//!
//! Read from `config.toml` in the platform config directory, or from the
//! file named by `STACK_CONFIG`. A missing file yields defaults. A handful of
//! environment variables override individual settings afterwards.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use stack_net::{ConnectionConfig, DEFAULT_RELAY_PORT};
use tracing::{debug, warn};

use crate::error::{AppError, Result};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Where the database lives; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Relay the connection manager probes; the local relay when unset
    pub backend_addr: Option<SocketAddr>,
    /// Key observers must present to the relay
    pub api_key: Option<String>,
    pub connection: ConnectionConfig,
    pub housekeeping: HousekeepingConfig,
    pub relay: RelayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: None,
            backend_addr: None,
            api_key: None,
            connection: ConnectionConfig::default(),
            housekeeping: HousekeepingConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    /// Inactive, empty meetings older than this are purged
    pub retention_hours: u64,
    pub interval_secs: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            interval_secs: 3600,
        }
    }
}

impl HousekeepingConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.min(i64::MAX as u64) as i64)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
        }
    }
}

impl AppConfig {
    /// Load from disk and apply environment overrides
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os("STACK_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)),
        };

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Apply `STACK_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("STACK_BACKEND_ADDR") {
            let addr = addr
                .parse()
                .map_err(|_| AppError::Config(format!("invalid STACK_BACKEND_ADDR: {}", addr)))?;
            self.backend_addr = Some(addr);
        }
        if let Some(key) = lookup("STACK_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(dir) = lookup("STACK_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(port) = lookup("STACK_RELAY_PORT") {
            self.relay.port = port
                .parse()
                .map_err(|_| AppError::Config(format!("invalid STACK_RELAY_PORT: {}", port)))?;
        }
        if let Some(level) = lookup("STACK_LOG") {
            self.log_level = level;
        }

        if self.api_key.is_none() {
            warn!("No API key configured; the relay accepts any subscriber");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => project_dirs()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or(AppError::NoProjectDir("data")),
        }
    }

    pub fn relay_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.relay.bind, self.relay.port)
            .parse()
            .map_err(|_| AppError::Config(format!("invalid relay bind address: {}", self.relay.bind)))
    }

    /// Address the health probe targets
    pub fn backend_addr(&self) -> Result<SocketAddr> {
        match self.backend_addr {
            Some(addr) => Ok(addr),
            None => self.relay_addr(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "stack", "stack-facilitation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.connection.retry_count, 3);
        assert_eq!(config.connection.timeout_ms, 10_000);
        assert_eq!(config.housekeeping.retention_hours, 24);
        assert_eq!(config.relay.port, DEFAULT_RELAY_PORT);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
log_level = "debug"

[connection]
retry_count = 5

[housekeeping]
retention_hours = 48
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.connection.retry_count, 5);
        // Unspecified keys keep their defaults
        assert_eq!(config.connection.base_backoff_ms, 200);
        assert_eq!(config.housekeeping.retention_hours, 48);
        assert_eq!(config.housekeeping.interval_secs, 3600);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retry_count = [").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("STACK_BACKEND_ADDR", "10.0.0.5:9000"),
                ("STACK_API_KEY", "public-key"),
                ("STACK_DATA_DIR", "/tmp/stack"),
                ("STACK_RELAY_PORT", "7500"),
                ("STACK_LOG", "trace"),
            ]))
            .unwrap();

        assert_eq!(config.backend_addr().unwrap(), "10.0.0.5:9000".parse().unwrap());
        assert_eq!(config.api_key.as_deref(), Some("public-key"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/stack"));
        assert_eq!(config.relay.port, 7500);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_backend_defaults_to_local_relay() {
        let mut config = AppConfig::default();
        config.relay.port = 7400;
        assert_eq!(config.backend_addr().unwrap(), "127.0.0.1:7400".parse().unwrap());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(env(&[("STACK_RELAY_PORT", "lots")]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_empty_api_key_is_none() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("STACK_API_KEY", "")])).unwrap();
        assert!(config.api_key.is_none());
    }
}
