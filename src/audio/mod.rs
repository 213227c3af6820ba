//! Audio capture, conversion, caching and forwarding

mod buffer;
pub mod convert;
mod engine;
mod forward;
mod latency;
mod negotiate;
mod volume;

pub use buffer::{AudioSnapshot, BufferWriter, LatestBuffer};
pub use engine::{CaptureEngine, EngineConfig, EngineState, EngineStats, StatsSnapshot};
pub use forward::ForwardSession;
pub use latency::{DevicePeriod, LatencyClass, DEFAULT_RENDER_BUFFER_DURATION};
pub use negotiate::negotiate_capture_format;
pub use volume::{VolumeMultiplier, DEFAULT_VOLUME_MULTIPLIER};

/// Speaker mask for front left + front right
pub const CHANNEL_MASK_STEREO: u32 = 0x3;
/// Speaker mask for FL|FR|FC|LFE|BL|BR
pub const CHANNEL_MASK_5_1: u32 = 0x3F;
/// Speaker mask for FL|FR|FC|LFE|BL|BR|SL|SR
pub const CHANNEL_MASK_7_1: u32 = 0x63F;

/// Whether samples are stored as integers or IEEE floats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Integer,
    Float,
}

/// Sample encodings the converter knows how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 16-bit signed integer
    I16,
    /// 24-bit signed integer, packed in 3 bytes
    I24,
    /// 32-bit signed integer
    I32,
    /// 32-bit IEEE float
    F32,
}

impl SampleEncoding {
    /// Size of one sample in bytes
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleEncoding::I16 => 2,
            SampleEncoding::I24 => 3,
            SampleEncoding::I32 | SampleEncoding::F32 => 4,
        }
    }
}

/// Audio format information
///
/// `channel_mask` is present only for formats described with the extensible
/// (channel-mask) layout; only those can be re-negotiated to more channels.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_type: SampleType,
    pub channel_mask: Option<u32>,
}

impl AudioFormat {
    /// Shared-mode float format, the usual mix format of an endpoint
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            sample_type: SampleType::Float,
            channel_mask: Some(default_channel_mask(channels)),
        }
    }

    /// Plain 16-bit PCM format
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            sample_type: SampleType::Integer,
            channel_mask: None,
        }
    }

    /// Bytes per frame (all channels of one sample instant)
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    /// Calculate bytes per second
    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Whether the format uses the extensible channel-mask description
    pub fn is_extensible(&self) -> bool {
        self.channel_mask.is_some()
    }

    /// Decodable encoding of this format, if any
    pub fn sample_encoding(&self) -> Option<SampleEncoding> {
        match (self.sample_type, self.bits_per_sample) {
            (SampleType::Integer, 16) => Some(SampleEncoding::I16),
            (SampleType::Integer, 24) => Some(SampleEncoding::I24),
            (SampleType::Integer, 32) => Some(SampleEncoding::I32),
            (SampleType::Float, 32) => Some(SampleEncoding::F32),
            _ => None,
        }
    }

    /// Calculate number of frames for given bytes
    pub fn bytes_to_frames(&self, bytes: usize) -> u32 {
        (bytes / self.block_align() as usize) as u32
    }

    /// Calculate bytes for given number of frames
    pub fn frames_to_bytes(&self, frames: u32) -> usize {
        frames as usize * self.block_align() as usize
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.sample_type {
            SampleType::Integer => "int",
            SampleType::Float => "float",
        };
        write!(
            f,
            "{}Hz {}ch {}bit {}",
            self.sample_rate, self.channels, self.bits_per_sample, kind
        )?;
        if let Some(mask) = self.channel_mask {
            write!(f, " mask=0x{:X}", mask)?;
        }
        Ok(())
    }
}

/// Standard speaker mask for a channel count
pub fn default_channel_mask(channels: u16) -> u32 {
    match channels {
        1 => 0x4,
        2 => CHANNEL_MASK_STEREO,
        6 => CHANNEL_MASK_5_1,
        8 => CHANNEL_MASK_7_1,
        n => (1u32 << n.min(18)) - 1,
    }
}
