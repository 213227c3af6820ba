//! Forward-path gain control

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Gain applied when downmixing surround audio for the forward sink
pub const DEFAULT_VOLUME_MULTIPLIER: f32 = 2.0;

/// Gain multiplier stored as u32 bits of an f32
///
/// Written by any caller and read by the capture thread for every forwarded
/// packet. Relaxed ordering: a reader may see the previous value for a packet.
pub struct VolumeMultiplier(AtomicU32);

impl VolumeMultiplier {
    /// Create with the given initial gain
    pub fn new(multiplier: f32) -> Self {
        let volume = Self(AtomicU32::new(DEFAULT_VOLUME_MULTIPLIER.to_bits()));
        volume.set(multiplier);
        volume
    }

    /// Get current gain
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set gain; negative values become 0, non-finite values are ignored
    pub fn set(&self, multiplier: f32) {
        if !multiplier.is_finite() {
            warn!("Ignoring non-finite volume multiplier {}", multiplier);
            return;
        }
        self.0.store(multiplier.max(0.0).to_bits(), Ordering::Relaxed);
    }
}

impl Default for VolumeMultiplier {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_MULTIPLIER)
    }
}
