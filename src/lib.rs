//! loopback-router - loopback capture and forwarding of an audio output
//!
//! Captures what an output endpoint plays, keeps the most recent packet
//! available for polling, and forwards a stereo downmix to a second output
//! endpoint in real time.

pub mod audio;
pub mod backend;
pub mod config;
pub mod device;
pub mod error;

pub use audio::{CaptureEngine, EngineConfig};
pub use error::{LoopbackError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
