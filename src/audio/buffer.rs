//! Latest-buffer cache shared between the capture thread and pollers

use crate::audio::convert;
use parking_lot::Mutex;
use std::sync::Arc;

/// Copy of the most recently published capture packet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSnapshot {
    /// Interleaved normalized samples, `frames * channels` long
    pub samples: Vec<f32>,
    pub frames: u32,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioSnapshot {
    /// RMS level over all channels
    pub fn rms(&self) -> f32 {
        convert::rms(&self.samples)
    }

    /// Absolute peak over all channels
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

#[derive(Default)]
struct Slot {
    data: Vec<f32>,
    frames: u32,
    channels: u16,
    sample_rate: u32,
    published: bool,
    generation: u64,
}

impl Slot {
    fn len(&self) -> usize {
        self.frames as usize * self.channels as usize
    }
}

/// Single-writer, multi-reader store of the most recent captured buffer
///
/// Samples and their metadata live behind one lock, so a reader never sees a
/// frame count that belongs to other data. The backing allocation only grows
/// while a session runs; `reset` releases it.
#[derive(Default)]
pub struct LatestBuffer {
    slot: Mutex<Slot>,
}

impl LatestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer bound to the current generation
    pub fn writer(self: &Arc<Self>) -> BufferWriter {
        BufferWriter {
            cache: Arc::clone(self),
            generation: self.slot.lock().generation,
        }
    }

    /// Forget the published buffer and free its allocation
    ///
    /// Writers created before the reset can no longer publish.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        let generation = slot.generation.wrapping_add(1);
        *slot = Slot {
            generation,
            ..Slot::default()
        };
    }

    /// Full copy of the latest buffer, or `None` if nothing was published
    pub fn snapshot(&self) -> Option<AudioSnapshot> {
        let slot = self.slot.lock();
        if !slot.published {
            return None;
        }
        Some(AudioSnapshot {
            samples: slot.data[..slot.len()].to_vec(),
            frames: slot.frames,
            channels: slot.channels,
            sample_rate: slot.sample_rate,
        })
    }

    /// Copy the latest buffer into `out`, reusing its allocation
    ///
    /// Returns `false` (leaving `out` untouched) if nothing was published.
    pub fn read_into(&self, out: &mut AudioSnapshot) -> bool {
        let slot = self.slot.lock();
        if !slot.published {
            return false;
        }
        out.samples.clear();
        out.samples.extend_from_slice(&slot.data[..slot.len()]);
        out.frames = slot.frames;
        out.channels = slot.channels;
        out.sample_rate = slot.sample_rate;
        true
    }

    /// RMS of the latest buffer
    pub fn rms(&self) -> Option<f32> {
        let slot = self.slot.lock();
        slot.published.then(|| convert::rms(&slot.data[..slot.len()]))
    }

    /// Size of the backing allocation in samples
    pub fn capacity(&self) -> usize {
        self.slot.lock().data.len()
    }

    /// Whether anything was published since the last reset
    pub fn is_published(&self) -> bool {
        self.slot.lock().published
    }
}

/// Publishing side of a [`LatestBuffer`], owned by the capture thread
pub struct BufferWriter {
    cache: Arc<LatestBuffer>,
    generation: u64,
}

impl BufferWriter {
    /// Replace the cached buffer with `samples`
    ///
    /// `samples` must hold `frames * channels` interleaved values. Returns
    /// `false` if the cache was reset after this writer was created.
    pub fn publish(&self, samples: &[f32], frames: u32, channels: u16, sample_rate: u32) -> bool {
        let len = frames as usize * channels as usize;
        debug_assert!(samples.len() >= len);
        let len = len.min(samples.len());

        let mut slot = self.cache.slot.lock();
        if slot.generation != self.generation {
            return false;
        }
        if slot.data.len() < len {
            slot.data.resize(len, 0.0);
        }
        slot.data[..len].copy_from_slice(&samples[..len]);
        slot.frames = (len / channels.max(1) as usize) as u32;
        slot.channels = channels;
        slot.sample_rate = sample_rate;
        slot.published = true;
        true
    }

    /// The cache this writer publishes into
    pub fn cache(&self) -> &LatestBuffer {
        &self.cache
    }
}
