//! Command line and configuration file handling

pub mod args;
mod file;

pub use file::{AppConfig, ConfigError, CONFIG_FILE_NAME};
