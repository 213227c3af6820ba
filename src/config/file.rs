//! Configuration file support

use crate::audio::{EngineConfig, DEFAULT_VOLUME_MULTIPLIER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up next to the executable
pub const CONFIG_FILE_NAME: &str = "loopback-router.toml";

/// Settings loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Channels to capture (6 = 5.1, 8 = 7.1)
    pub channels: u16,

    /// Capture the first output whose name contains this text (empty = system default)
    pub capture_device: String,

    /// Device ID to forward to (empty = first other output)
    pub forward_device_id: String,

    /// Forward to the installed virtual audio cable, overriding `forward_device_id`
    pub forward_to_virtual_cable: bool,

    /// Forward gain multiplier
    pub volume: f32,

    /// How long to wait for the capture thread on shutdown
    pub shutdown_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    pub log_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            capture_device: String::new(),
            forward_device_id: String::new(),
            forward_to_virtual_cable: false,
            volume: DEFAULT_VOLUME_MULTIPLIER,
            shutdown_timeout_ms: 2000,
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path_str.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path_str.clone(),
            source: e,
        })?;

        config.validate().map_err(|message| ConfigError::Invalid {
            path: path_str,
            message,
        })?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. Same directory as executable: loopback-router.toml
    /// 2. User config directory: loopback-router/config.toml
    ///
    /// Returns the defaults and `None` if no file exists.
    pub fn load_default() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                paths.push(exe_dir.join(CONFIG_FILE_NAME));
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("loopback-router").join("config.toml"));
        }
        paths
    }

    fn validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("channels must be at least 1".to_string());
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(format!("volume must be a non-negative number, got {}", self.volume));
        }
        Ok(())
    }

    /// Capture device name filter, if set
    pub fn capture_device(&self) -> Option<&str> {
        Some(self.capture_device.as_str()).filter(|s| !s.is_empty())
    }

    /// Forward device ID, if set
    pub fn forward_device_id(&self) -> Option<&str> {
        Some(self.forward_device_id.as_str()).filter(|s| !s.is_empty())
    }

    /// Log file path, if set
    pub fn log_file(&self) -> Option<&str> {
        Some(self.log_file.as_str()).filter(|s| !s.is_empty())
    }

    /// Convert to EngineConfig
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            initial_volume: self.volume,
            ..EngineConfig::default()
        }
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# loopback-router configuration
# Place next to the executable as loopback-router.toml, or in
# <user config dir>/loopback-router/config.toml

# Channels to capture: 2, 6 (5.1) or 8 (7.1). Surround is only used when the
# output device supports it; otherwise its own layout is captured.
channels = 2

# Capture the first output device whose name contains this text
# (case-sensitive, empty = system default output)
capture_device = ""

# Device ID to forward to (empty = first output other than the captured one)
# Run `loopback-router list --show-ids` to see IDs
forward_device_id = ""

# Forward to the installed virtual audio cable instead
forward_to_virtual_cable = false

# Gain applied to the forwarded downmix (default: 2.0)
volume = 2.0

# How long to wait for the capture thread on shutdown, in milliseconds
shutdown_timeout_ms = 2000

# Log level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Log file path (empty = no file logging)
log_file = ""
"#
        .to_string()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io {
        path: String,
        source: std::io::Error,
    },
    /// Error parsing TOML
    Parse {
        path: String,
        source: toml::de::Error,
    },
    /// Parsed values out of range
    Invalid { path: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path, source)
            }
            ConfigError::Invalid { path, message } => {
                write!(f, "Invalid config file '{}': {}", path, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}
