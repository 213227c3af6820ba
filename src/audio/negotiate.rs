//! Capture format negotiation

use super::{AudioFormat, CHANNEL_MASK_5_1, CHANNEL_MASK_7_1};
use crate::backend::{FormatSupport, LoopbackEndpoint};
use crate::error::Result;
use tracing::info;

/// Pick the capture format for a loopback endpoint
///
/// Starts from the endpoint's mix format and, for extensible formats, tries to
/// raise the channel count to 5.1 or 7.1 when the caller asks for more than
/// the device mixes natively. Failing to get the extra channels is not an
/// error; the endpoint's own layout is used instead.
///
/// # Errors
///
/// Only a failed mix format query is an error.
pub fn negotiate_capture_format(
    endpoint: &dyn LoopbackEndpoint,
    requested_channels: u16,
) -> Result<AudioFormat> {
    let native = endpoint.mix_format()?;
    info!("Mix format of {}: {}", endpoint.device().name, native);

    if requested_channels <= native.channels {
        return Ok(native);
    }
    if !native.is_extensible() {
        info!(
            "Mix format is not extensible, keeping {} channels (requested {})",
            native.channels, requested_channels
        );
        return Ok(native);
    }

    let (channels, mask) = if requested_channels >= 8 {
        (8, CHANNEL_MASK_7_1)
    } else if requested_channels >= 6 {
        (6, CHANNEL_MASK_5_1)
    } else {
        info!(
            "No surround layout for {} channels, keeping {}",
            requested_channels, native.channels
        );
        return Ok(native);
    };

    if channels <= native.channels {
        return Ok(native);
    }

    let wanted = AudioFormat {
        channels,
        channel_mask: Some(mask),
        ..native.clone()
    };

    match endpoint.is_format_supported(&wanted) {
        FormatSupport::Exact => {
            info!("Capturing {} channels (mask 0x{:X})", channels, mask);
            Ok(wanted)
        }
        FormatSupport::Closest(closest) => {
            info!(
                "{} channels not supported as requested, using closest match: {}",
                channels, closest
            );
            Ok(closest)
        }
        FormatSupport::Rejected(reason) => {
            info!(
                "{} channels rejected ({}), keeping native {} channels",
                channels, reason, native.channels
            );
            Ok(native)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockSupport};
    use crate::backend::AudioBackend;

    fn negotiate(backend: &MockBackend, requested: u16) -> AudioFormat {
        let endpoint = backend.open_loopback("{speakers}").unwrap();
        negotiate_capture_format(endpoint.as_ref(), requested).unwrap()
    }

    #[test]
    fn test_no_raise_when_native_suffices() {
        let backend = MockBackend::new();
        backend.set_mix_format(AudioFormat::float32(48000, 8));

        let format = negotiate(&backend, 6);
        assert_eq!(format.channels, 8);
        assert!(backend.support_queries().is_empty());
    }

    #[test]
    fn test_raise_to_7_1() {
        let backend = MockBackend::new();

        let format = negotiate(&backend, 8);
        assert_eq!(format.channels, 8);
        assert_eq!(format.channel_mask, Some(CHANNEL_MASK_7_1));
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.block_align(), 32);
    }

    #[test]
    fn test_request_capped_at_eight() {
        let backend = MockBackend::new();

        let format = negotiate(&backend, 12);
        assert_eq!(format.channels, 8);
        assert_eq!(backend.support_queries()[0].channels, 8);
    }

    #[test]
    fn test_raise_to_5_1() {
        let backend = MockBackend::new();

        let format = negotiate(&backend, 7);
        assert_eq!(format.channels, 6);
        assert_eq!(format.channel_mask, Some(CHANNEL_MASK_5_1));
    }

    #[test]
    fn test_between_layouts_keeps_native() {
        let backend = MockBackend::new();

        let format = negotiate(&backend, 4);
        assert_eq!(format, AudioFormat::float32(48000, 2));
        assert!(backend.support_queries().is_empty());
    }

    #[test]
    fn test_rejected_reverts_to_native() {
        let backend = MockBackend::new();
        backend.set_support(MockSupport::RejectAbove(2));

        let format = negotiate(&backend, 8);
        assert_eq!(format.channels, 2);
        assert_eq!(format.channel_mask, Some(0x3));
    }

    #[test]
    fn test_closest_match_adopted() {
        let backend = MockBackend::new();
        let closest = AudioFormat::float32(48000, 6);
        backend.set_support(MockSupport::Closest(closest.clone()));

        let format = negotiate(&backend, 8);
        assert_eq!(format, closest);
    }

    #[test]
    fn test_non_extensible_never_raised() {
        let backend = MockBackend::new();
        backend.set_mix_format(AudioFormat::pcm16(44100, 2));

        let format = negotiate(&backend, 8);
        assert_eq!(format, AudioFormat::pcm16(44100, 2));
        assert!(backend.support_queries().is_empty());
    }

    #[test]
    fn test_mix_format_failure() {
        let backend = MockBackend::new();
        backend.fail_mix_format(true);

        let endpoint = backend.open_loopback("{speakers}").unwrap();
        assert!(negotiate_capture_format(endpoint.as_ref(), 2).is_err());
    }
}
