//! Host configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "CADLINK_CONFIG";
pub const TCP_ADDR_ENV: &str = "CADLINK_TCP_ADDR";
pub const HTTP_ADDR_ENV: &str = "CADLINK_HTTP_ADDR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Execution bridge tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// How long a caller waits for its result
    pub timeout_ms: u64,
    /// Maximum number of queued calls
    pub queue_capacity: usize,
    /// How often the host loop wakes up when idle
    pub poll_interval_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            queue_capacity: 256,
            poll_interval_ms: 10,
        }
    }
}

impl BridgeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Measurement grid dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub columns: u32,
    pub rows: u32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self { columns: 8, rows: 6 }
    }
}

/// Virtual viewport size in pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    pub width: u32,
    pub height: u32,
    /// Largest screenshot edge accepted, in pixels
    pub max_screenshot_px: u32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            max_screenshot_px: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonSettings {
    /// Hausdorff tolerance in mm
    pub default_tolerance: f64,
    /// Linear deflection used when sampling the scene
    pub default_tessellation: f64,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            default_tolerance: 1.0,
            default_tessellation: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Line-delimited JSON endpoint
    pub tcp_addr: String,
    /// HTTP API endpoint
    pub http_addr: String,
    /// Socket clients idle for longer are disconnected
    pub client_timeout_secs: u64,
    /// Longest request line accepted on the socket
    pub max_request_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tcp_addr: "127.0.0.1:9876".into(),
            http_addr: "127.0.0.1:3001".into(),
            client_timeout_secs: 30,
            max_request_bytes: 1 << 20,
        }
    }
}

impl ServerSettings {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

/// All host settings; every section falls back to defaults when missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub bridge: BridgeSettings,
    pub grid: GridSettings,
    pub viewport: ViewportSettings,
    pub comparison: ComparisonSettings,
    pub server: ServerSettings,
}

impl HostConfig {
    /// Default settings file in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cadlink", "cadlink")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Load settings from `CADLINK_CONFIG` or the platform config dir.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    /// Address overrides from the environment are applied last.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Ok(addr) = std::env::var(TCP_ADDR_ENV) {
            config.server.tcp_addr = addr;
        }
        if let Ok(addr) = std::env::var(HTTP_ADDR_ENV) {
            config.server.http_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.columns == 0 {
            return Err(ConfigError::Invalid("grid.columns must be at least 1".into()));
        }
        if !(1..=26).contains(&self.grid.rows) {
            return Err(ConfigError::Invalid(format!(
                "grid.rows must be between 1 and 26, got {}",
                self.grid.rows
            )));
        }
        if self.bridge.queue_capacity == 0 {
            return Err(ConfigError::Invalid("bridge.queue_capacity must be positive".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid("viewport size must be positive".into()));
        }
        let max_px = self.viewport.max_screenshot_px;
        if max_px < self.viewport.width || max_px < self.viewport.height {
            return Err(ConfigError::Invalid(format!(
                "viewport.max_screenshot_px ({max_px}) is smaller than the viewport"
            )));
        }
        if self.server.client_timeout_secs == 0 || self.server.max_request_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server client timeout and request size limit must be positive".into(),
            ));
        }
        if !(self.comparison.default_tolerance >= 0.0) {
            return Err(ConfigError::Invalid("comparison.default_tolerance must be >= 0".into()));
        }
        if !(self.comparison.default_tessellation > 0.0) {
            return Err(ConfigError::Invalid(
                "comparison.default_tessellation must be positive".into(),
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
        let config = HostConfig::default();
        assert_eq!(config.bridge.timeout_ms, 30_000);
        assert_eq!(config.grid.columns, 8);
        assert_eq!(config.grid.rows, 6);
        assert_eq!(config.comparison.default_tolerance, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HostConfig = serde_json::from_str(r#"{"grid": {"rows": 4}}"#).unwrap();
        assert_eq!(config.grid.rows, 4);
        assert_eq!(config.grid.columns, 8);
        assert_eq!(config.server.tcp_addr, "127.0.0.1:9876");
    }

    #[test]
    fn test_validate_rejects_too_many_rows() {
        let mut config = HostConfig::default();
        config.grid.rows = 27;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_screenshot_limit() {
        let mut config = HostConfig::default();
        assert_eq!(config.viewport.max_screenshot_px, 4096);
        config.viewport.max_screenshot_px = 640;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.viewport.max_screenshot_px = 800;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut config = HostConfig::default();
        config.bridge.timeout_ms = 500;
        config.save(&path).unwrap();

        let loaded = HostConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            HostConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
