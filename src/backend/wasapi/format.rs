//! Conversion between `AudioFormat` and WAVEFORMATEX descriptors

use crate::audio::{AudioFormat, SampleType};
use std::ptr;
use windows::core::GUID;
use windows::Win32::Media::Audio::{WAVEFORMATEX, WAVEFORMATEXTENSIBLE, WAVEFORMATEXTENSIBLE_0};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const KSDATAFORMAT_SUBTYPE_PCM: GUID = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
const KSDATAFORMAT_SUBTYPE_IEEE_FLOAT: GUID =
    GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

/// Extra bytes of the extensible descriptor after the WAVEFORMATEX header
const EXTENSIBLE_EXTRA_BYTES: u16 =
    (std::mem::size_of::<WAVEFORMATEXTENSIBLE>() - std::mem::size_of::<WAVEFORMATEX>()) as u16;

/// Read a format descriptor returned by the audio engine
///
/// # Safety
/// `format` must point to a valid WAVEFORMATEX, followed by the extensible
/// fields when its tag says so.
pub unsafe fn from_wave_format(format: *const WAVEFORMATEX) -> AudioFormat {
    let base = ptr::read_unaligned(format);
    let tag = base.wFormatTag;

    let (sample_type, channel_mask) =
        if tag == WAVE_FORMAT_EXTENSIBLE && base.cbSize >= EXTENSIBLE_EXTRA_BYTES {
            let ext = format as *const WAVEFORMATEXTENSIBLE;
            // Descriptor may not be aligned
            let sub_format = ptr::read_unaligned(ptr::addr_of!((*ext).SubFormat));
            let mask = ptr::read_unaligned(ptr::addr_of!((*ext).dwChannelMask));
            let sample_type = if sub_format == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT {
                SampleType::Float
            } else {
                SampleType::Integer
            };
            (sample_type, Some(mask))
        } else if tag == WAVE_FORMAT_IEEE_FLOAT {
            (SampleType::Float, None)
        } else {
            (SampleType::Integer, None)
        };

    AudioFormat {
        sample_rate: base.nSamplesPerSec,
        channels: base.nChannels,
        bits_per_sample: base.wBitsPerSample,
        sample_type,
        channel_mask,
    }
}

/// Build a format descriptor to pass to the audio engine
///
/// Formats with a channel mask are described with the extensible layout.
/// Pass `&descriptor as *const _ as *const WAVEFORMATEX` to the API.
pub fn to_wave_format(format: &AudioFormat) -> WAVEFORMATEXTENSIBLE {
    let base = WAVEFORMATEX {
        wFormatTag: match format.sample_type {
            SampleType::Float => WAVE_FORMAT_IEEE_FLOAT,
            SampleType::Integer => WAVE_FORMAT_PCM,
        },
        nChannels: format.channels,
        nSamplesPerSec: format.sample_rate,
        nAvgBytesPerSec: format.avg_bytes_per_sec(),
        nBlockAlign: format.block_align(),
        wBitsPerSample: format.bits_per_sample,
        cbSize: 0,
    };

    match format.channel_mask {
        Some(mask) => WAVEFORMATEXTENSIBLE {
            Format: WAVEFORMATEX {
                wFormatTag: WAVE_FORMAT_EXTENSIBLE,
                cbSize: EXTENSIBLE_EXTRA_BYTES,
                ..base
            },
            Samples: WAVEFORMATEXTENSIBLE_0 {
                wValidBitsPerSample: format.bits_per_sample,
            },
            dwChannelMask: mask,
            SubFormat: match format.sample_type {
                SampleType::Float => KSDATAFORMAT_SUBTYPE_IEEE_FLOAT,
                SampleType::Integer => KSDATAFORMAT_SUBTYPE_PCM,
            },
        },
        None => WAVEFORMATEXTENSIBLE {
            Format: base,
            ..Default::default()
        },
    }
}
