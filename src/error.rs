//! Unified error types for loopback-router

use std::time::Duration;
use thiserror::Error;

/// Main error type for capture and forwarding operations
#[derive(Error, Debug)]
pub enum LoopbackError {
    /// Native audio API call failed
    #[cfg(windows)]
    #[error("Windows audio API error: {0}")]
    Windows(#[from] windows::core::Error),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device operation error
    #[error("Device '{device_id}' error: {message}")]
    DeviceError {
        device_id: String,
        message: String,
    },

    /// Negotiated format has a sample encoding the converter cannot decode
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Engine not initialized
    #[error("Capture engine not initialized")]
    NotInitialized,

    /// Engine already running
    #[error("Capture engine already running")]
    AlreadyRunning,

    /// Worker did not exit within the shutdown timeout and was detached
    #[error("Capture thread did not exit within {0:?}; it was detached")]
    ShutdownTimeout(Duration),

    /// Worker thread could not be spawned
    #[error("Thread error: {0}")]
    Thread(String),

    /// No native backend for this platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Result type alias for loopback-router operations
pub type Result<T> = std::result::Result<T, LoopbackError>;

impl LoopbackError {
    /// Create a device error with context
    pub fn device_error(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceError {
            device_id: device_id.into(),
            message: message.into(),
        }
    }
}
