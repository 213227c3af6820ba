//! Capability interface over the native device API
//!
//! The engine only talks to audio devices through these traits, so format
//! negotiation, conversion and the capture loop run the same against WASAPI
//! and against the in-memory fake used by the tests.

#[cfg(test)]
pub mod mock;
#[cfg(windows)]
pub mod wasapi;

use crate::audio::AudioFormat;
use crate::device::DeviceDescriptor;
use crate::error::{LoopbackError, Result};

/// Answer of a format support query
#[derive(Debug, Clone, PartialEq)]
pub enum FormatSupport {
    /// Format accepted as requested
    Exact,
    /// Format rejected, but the device suggested this alternative
    Closest(AudioFormat),
    /// Format rejected without a usable alternative
    Rejected(String),
}

/// Entry point of a native audio API
pub trait AudioBackend: Send {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// All active output endpoints
    fn enumerate_render_endpoints(&self) -> Result<Vec<DeviceDescriptor>>;

    /// The system default output endpoint
    fn default_render_endpoint(&self) -> Result<DeviceDescriptor>;

    /// Open an output endpoint for loopback capture
    fn open_loopback(&self, device_id: &str) -> Result<Box<dyn LoopbackEndpoint>>;

    /// Open and initialize a render stream on an output endpoint
    fn open_render(&self, device_id: &str) -> Result<Box<dyn RenderStream>>;
}

/// An activated, not yet initialized loopback endpoint
pub trait LoopbackEndpoint: Send {
    fn device(&self) -> &DeviceDescriptor;

    /// Native shared-mode format of the endpoint
    fn mix_format(&self) -> Result<AudioFormat>;

    /// Three-way shared-mode support query
    fn is_format_supported(&self, format: &AudioFormat) -> FormatSupport;

    /// Initialize loopback capture with the negotiated format
    fn initialize(self: Box<Self>, format: &AudioFormat) -> Result<Box<dyn CaptureStream>>;
}

/// Packet returned by [`CaptureStream::read_packet`]
///
/// `data` is only valid until the packet is released.
pub struct CapturedPacket<'a> {
    pub data: Option<&'a [u8]>,
    pub frames: u32,
    pub silent: bool,
}

/// Pull-based capture packet pump
pub trait CaptureStream: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;

    /// Frames in the next pending packet (0 = nothing pending)
    fn next_packet_size(&mut self) -> Result<u32>;

    /// Acquire the next packet
    fn read_packet(&mut self) -> Result<CapturedPacket<'_>>;

    /// Give a packet back to the device
    fn release_packet(&mut self, frames: u32) -> Result<()>;
}

/// Initialized render stream on the forward endpoint
pub trait RenderStream: Send {
    fn device(&self) -> &DeviceDescriptor;
    fn format(&self) -> &AudioFormat;

    /// Total render buffer size in frames
    fn buffer_frames(&self) -> u32;

    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;

    /// Frames queued in the render buffer and not yet played
    fn padding(&mut self) -> Result<u32>;

    /// Acquire a writable region of `frames` frames
    fn acquire_region(&mut self, frames: u32) -> Result<&mut [u8]>;

    /// Commit a region acquired with [`RenderStream::acquire_region`]
    fn release_region(&mut self, frames: u32) -> Result<()>;
}

/// Create the native backend for the current platform
///
/// # Errors
///
/// Returns `UnsupportedPlatform` where no loopback-capable API is wired up.
#[allow(unreachable_code)]
pub fn platform_backend() -> Result<Box<dyn AudioBackend>> {
    #[cfg(windows)]
    {
        return Ok(Box::new(wasapi::WasapiBackend::new()?));
    }

    Err(LoopbackError::UnsupportedPlatform(format!(
        "loopback capture is only implemented for WASAPI, not {}",
        std::env::consts::OS
    )))
}
