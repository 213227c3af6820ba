//! WASAPI loopback capture from an audio output endpoint

use super::format::{from_wave_format, to_wave_format};
use crate::audio::AudioFormat;
use crate::backend::{CaptureStream, CapturedPacket, FormatSupport, LoopbackEndpoint};
use crate::device::DeviceDescriptor;
use crate::error::Result;
use std::ptr;
use tracing::{debug, info, trace};
use windows::{
    core::Error as WinError,
    Win32::{
        Foundation::{S_FALSE, S_OK},
        Media::Audio::{
            IAudioCaptureClient, IAudioClient, IMMDevice, AUDCLNT_BUFFERFLAGS_SILENT,
            AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_LOOPBACK, WAVEFORMATEX,
        },
        System::Com::{CoTaskMemFree, CLSCTX_ALL},
    },
};

/// Capture buffer duration (50ms in 100-nanosecond units)
const CAPTURE_BUFFER_DURATION: i64 = 500_000;

/// Activated audio client on an output endpoint, before initialization
pub struct WasapiLoopbackEndpoint {
    device: DeviceDescriptor,
    audio_client: IAudioClient,
}

// SAFETY: WASAPI objects live in the MTA, see `WasapiBackend`
unsafe impl Send for WasapiLoopbackEndpoint {}

impl WasapiLoopbackEndpoint {
    pub fn new(device: &IMMDevice, descriptor: DeviceDescriptor) -> Result<Self> {
        debug!("Creating loopback endpoint for: {}", descriptor);
        let audio_client: IAudioClient = unsafe { device.Activate(CLSCTX_ALL, None)? };
        Ok(Self {
            device: descriptor,
            audio_client,
        })
    }
}

impl LoopbackEndpoint for WasapiLoopbackEndpoint {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn mix_format(&self) -> Result<AudioFormat> {
        unsafe {
            let format_ptr = self.audio_client.GetMixFormat()?;
            let format = from_wave_format(format_ptr);
            CoTaskMemFree(Some(format_ptr as *const _));
            Ok(format)
        }
    }

    fn is_format_supported(&self, format: &AudioFormat) -> FormatSupport {
        let wave = to_wave_format(format);
        let mut closest: *mut WAVEFORMATEX = ptr::null_mut();

        unsafe {
            let hr = self.audio_client.IsFormatSupported(
                AUDCLNT_SHAREMODE_SHARED,
                &wave as *const _ as *const WAVEFORMATEX,
                Some(&mut closest),
            );

            let closest_format = if closest.is_null() {
                None
            } else {
                let parsed = from_wave_format(closest);
                CoTaskMemFree(Some(closest as *const _));
                Some(parsed)
            };

            if hr == S_OK {
                FormatSupport::Exact
            } else if hr == S_FALSE {
                match closest_format {
                    Some(alt) => FormatSupport::Closest(alt),
                    None => FormatSupport::Rejected("no closest match offered".to_string()),
                }
            } else {
                FormatSupport::Rejected(WinError::from(hr).to_string())
            }
        }
    }

    fn initialize(self: Box<Self>, format: &AudioFormat) -> Result<Box<dyn CaptureStream>> {
        let wave = to_wave_format(format);

        unsafe {
            self.audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK,
                CAPTURE_BUFFER_DURATION,
                0,
                &wave as *const _ as *const WAVEFORMATEX,
                None,
            )?;

            let buffer_frames = self.audio_client.GetBufferSize()?;
            debug!("Capture buffer size: {} frames", buffer_frames);

            let capture_client: IAudioCaptureClient = self.audio_client.GetService()?;

            Ok(Box::new(WasapiCaptureStream {
                device: self.device,
                audio_client: self.audio_client,
                capture_client,
                block_align: format.block_align() as usize,
                started: false,
            }))
        }
    }
}

/// Initialized loopback capture stream
pub struct WasapiCaptureStream {
    device: DeviceDescriptor,
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    block_align: usize,
    started: bool,
}

// SAFETY: WASAPI objects live in the MTA, see `WasapiBackend`
unsafe impl Send for WasapiCaptureStream {}

impl CaptureStream for WasapiCaptureStream {
    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        unsafe {
            self.audio_client.Start()?;
        }
        self.started = true;
        info!("Loopback capture started: {}", self.device.name);
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
        info!("Loopback capture stopped: {}", self.device.name);
        Ok(())
    }

    fn next_packet_size(&mut self) -> Result<u32> {
        Ok(unsafe { self.capture_client.GetNextPacketSize()? })
    }

    fn read_packet(&mut self) -> Result<CapturedPacket<'_>> {
        let mut data_ptr: *mut u8 = ptr::null_mut();
        let mut num_frames: u32 = 0;
        let mut flags: u32 = 0;

        unsafe {
            self.capture_client
                .GetBuffer(&mut data_ptr, &mut num_frames, &mut flags, None, None)?;
        }

        let silent = (flags & AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
        trace!("Captured {} frames, silent={}", num_frames, silent);

        let data = if data_ptr.is_null() || num_frames == 0 {
            None
        } else {
            // SAFETY: the engine guarantees `num_frames` frames at `data_ptr`
            // until ReleaseBuffer, which needs `&mut self` again
            Some(unsafe {
                std::slice::from_raw_parts(data_ptr, num_frames as usize * self.block_align)
            })
        };

        Ok(CapturedPacket {
            data,
            frames: num_frames,
            silent,
        })
    }

    fn release_packet(&mut self, frames: u32) -> Result<()> {
        if frames == 0 {
            return Ok(());
        }
        unsafe {
            self.capture_client.ReleaseBuffer(frames)?;
        }
        Ok(())
    }
}

impl Drop for WasapiCaptureStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
