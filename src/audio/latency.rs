//! Render buffer sizing from the device period

use tracing::debug;

/// Fallback render buffer duration when the device period is unknown (35ms)
pub const DEFAULT_RENDER_BUFFER_DURATION: i64 = 350_000;

/// Latency classification based on device characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    /// Low latency devices (professional/gaming cards)
    LowLatency,
    /// Standard consumer devices
    Standard,
    /// High latency devices (USB/Bluetooth, virtual cables)
    HighLatency,
}

impl LatencyClass {
    /// Classify from the minimum device period (100-nanosecond units)
    pub fn from_min_period(min_period: i64) -> Self {
        let min_period_ms = min_period as f64 / 10_000.0;
        if min_period_ms < 5.0 {
            LatencyClass::LowLatency
        } else if min_period_ms < 15.0 {
            LatencyClass::Standard
        } else {
            LatencyClass::HighLatency
        }
    }

    /// Render buffer duration in milliseconds for this latency class
    pub fn render_buffer_ms(&self) -> u32 {
        match self {
            LatencyClass::LowLatency => 25,
            LatencyClass::Standard => 35,
            LatencyClass::HighLatency => 50,
        }
    }
}

/// Device period as reported by the audio client (100-nanosecond units)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePeriod {
    pub min_period: i64,
    pub default_period: i64,
}

impl DevicePeriod {
    pub fn latency_class(&self) -> LatencyClass {
        LatencyClass::from_min_period(self.min_period)
    }

    /// Render buffer duration in 100-nanosecond units
    ///
    /// At least twice the minimum period, and never below the class default.
    /// A larger forward buffer leaves more room before packets get skipped.
    pub fn render_buffer_duration(&self) -> i64 {
        let min_safe_buffer = self.min_period * 2;
        let class_recommended = self.latency_class().render_buffer_ms() as i64 * 10_000;
        let duration = min_safe_buffer.max(class_recommended);

        debug!(
            "Render buffer duration: {}ms (min_safe={}ms, class={:?})",
            duration / 10_000,
            min_safe_buffer / 10_000,
            self.latency_class()
        );

        duration
    }

    /// Minimum period in milliseconds
    pub fn min_period_ms(&self) -> f64 {
        self.min_period as f64 / 10_000.0
    }
}

impl Default for DevicePeriod {
    fn default() -> Self {
        Self {
            min_period: 100_000,
            default_period: 100_000,
        }
    }
}
