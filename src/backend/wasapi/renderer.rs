//! WASAPI render stream for the forward endpoint

use super::format::from_wave_format;
use crate::audio::{AudioFormat, DevicePeriod};
use crate::backend::RenderStream;
use crate::device::DeviceDescriptor;
use crate::error::Result;
use tracing::{debug, info};
use windows::Win32::{
    Media::Audio::{IAudioClient, IAudioRenderClient, IMMDevice, AUDCLNT_SHAREMODE_SHARED},
    System::Com::{CoTaskMemFree, CLSCTX_ALL},
};

/// Shared-mode render stream in the endpoint's mix format
pub struct WasapiRenderStream {
    device: DeviceDescriptor,
    audio_client: IAudioClient,
    render_client: IAudioRenderClient,
    format: AudioFormat,
    buffer_frames: u32,
    started: bool,
}

// SAFETY: WASAPI objects live in the MTA, see `WasapiBackend`
unsafe impl Send for WasapiRenderStream {}

impl WasapiRenderStream {
    /// Create a render stream for the given device
    pub fn new(device: &IMMDevice, descriptor: DeviceDescriptor) -> Result<Self> {
        unsafe {
            debug!("Creating render stream for: {}", descriptor);

            let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None)?;

            let format_ptr = audio_client.GetMixFormat()?;
            let format = from_wave_format(format_ptr);
            info!("Render format for {}: {}", descriptor.name, format);

            // Size the buffer from the device period
            let buffer_duration = query_device_period(&audio_client)
                .map(|period| period.render_buffer_duration())
                .unwrap_or_else(|e| {
                    debug!("Failed to query device period: {}, using default", e);
                    crate::audio::DEFAULT_RENDER_BUFFER_DURATION
                });

            let initialized = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                0,
                buffer_duration,
                0,
                format_ptr,
                None,
            );
            CoTaskMemFree(Some(format_ptr as *const _));
            initialized?;

            let buffer_frames = audio_client.GetBufferSize()?;
            debug!(
                "Render stream {} buffer size: {} frames",
                descriptor.name, buffer_frames
            );

            let render_client: IAudioRenderClient = audio_client.GetService()?;

            Ok(Self {
                device: descriptor,
                audio_client,
                render_client,
                format,
                buffer_frames,
                started: false,
            })
        }
    }
}

/// Query the device period of an audio client
fn query_device_period(audio_client: &IAudioClient) -> Result<DevicePeriod> {
    unsafe {
        let mut default_period: i64 = 0;
        let mut min_period: i64 = 0;

        audio_client.GetDevicePeriod(Some(&mut default_period), Some(&mut min_period))?;

        let period = DevicePeriod {
            min_period,
            default_period,
        };
        debug!(
            "Device period: min={:.2}ms, latency class {:?}",
            period.min_period_ms(),
            period.latency_class()
        );
        Ok(period)
    }
}

impl RenderStream for WasapiRenderStream {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        unsafe {
            self.audio_client.Start()?;
        }
        self.started = true;
        info!("Render stream started: {}", self.device.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        unsafe {
            self.audio_client.Stop()?;
        }
        self.started = false;
        info!("Render stream stopped: {}", self.device.name);
        Ok(())
    }

    fn padding(&mut self) -> Result<u32> {
        Ok(unsafe { self.audio_client.GetCurrentPadding()? })
    }

    fn acquire_region(&mut self, frames: u32) -> Result<&mut [u8]> {
        let bytes = self.format.frames_to_bytes(frames);
        unsafe {
            let buffer_ptr = self.render_client.GetBuffer(frames)?;
            // SAFETY: the engine hands out `frames` frames until ReleaseBuffer
            Ok(std::slice::from_raw_parts_mut(buffer_ptr, bytes))
        }
    }

    fn release_region(&mut self, frames: u32) -> Result<()> {
        unsafe {
            self.render_client.ReleaseBuffer(frames, 0)?;
        }
        Ok(())
    }
}

impl Drop for WasapiRenderStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
