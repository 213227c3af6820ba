//! Forwarding captured audio into a second output endpoint

use super::{convert, AudioFormat};
use crate::backend::RenderStream;
use crate::device::DeviceDescriptor;
use crate::error::Result;
use tracing::{debug, trace};

/// Render side of a capture session
///
/// Never blocks: a packet that does not fit in the free part of the render
/// buffer is dropped from the forward path.
pub struct ForwardSession {
    stream: Box<dyn RenderStream>,
    format: AudioFormat,
    capacity: u32,
    /// Downmix scratch, grown to the largest packet seen
    mix: Vec<f32>,
}

impl ForwardSession {
    pub fn new(stream: Box<dyn RenderStream>) -> Self {
        let format = stream.format().clone();
        let capacity = stream.buffer_frames();
        debug!(
            "Forward session on {}: {}, {} frames buffer",
            stream.device().name,
            format,
            capacity
        );
        Self {
            stream,
            format,
            capacity,
            mix: Vec::new(),
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        self.stream.device()
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Render buffer size in frames
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn start(&mut self) -> Result<()> {
        self.stream.start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.stream.stop()
    }

    /// Frames that can be written without blocking
    pub fn room(&mut self) -> Result<u32> {
        let padding = self.stream.padding()?;
        Ok(self.capacity.saturating_sub(padding))
    }

    /// Downmix `frames` frames of `input` and queue them for playback
    ///
    /// Returns `Ok(false)` without touching the stream if the render buffer
    /// has no room for the whole packet.
    pub fn write(&mut self, input: &[f32], in_channels: u16, frames: u32, gain: f32) -> Result<bool> {
        if frames == 0 {
            return Ok(true);
        }

        let room = self.room()?;
        if room < frames {
            trace!("Forward buffer full ({} < {} frames), skipping", room, frames);
            return Ok(false);
        }

        let out_channels = self.format.channels as usize;
        let len = frames as usize * out_channels;
        if self.mix.len() < len {
            self.mix.resize(len, 0.0);
        }
        let mix = &mut self.mix[..len];
        convert::downmix(input, in_channels as usize, mix, out_channels, gain);

        let region = self.stream.acquire_region(frames)?;
        convert::encode_into(mix, self.format.sample_encoding(), region);
        self.stream.release_region(frames)?;
        Ok(true)
    }
}
