//! On-demand loudness metering over the most recent frame.

use std::sync::Mutex;

/// Holds a copy of the last emitted frame's samples and computes RMS
/// loudness on demand. Shared between the capture thread (writer) and the
/// UI-facing controller (reader).
#[derive(Debug, Default)]
pub struct LevelMeter {
    last_frame: Mutex<Vec<i16>>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored samples with those of the latest frame.
    pub fn store(&self, samples: &[i16]) {
        let mut guard = self.last_frame.lock().unwrap();
        guard.clear();
        guard.extend_from_slice(samples);
    }

    /// Drop the stored samples; `level` reports 0.0 until the next frame.
    pub fn reset(&self) {
        self.last_frame.lock().unwrap().clear();
    }

    /// RMS loudness of the last frame, normalized to [0.0, 1.0].
    pub fn level(&self) -> f32 {
        let guard = self.last_frame.lock().unwrap();
        if guard.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = guard.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_sq / guard.len() as f64).sqrt();
        (rms / i16::MIN.unsigned_abs() as f64).min(1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_meter_reads_zero() {
        assert_eq!(LevelMeter::new().level(), 0.0);
    }

    #[test]
    fn silence_reads_zero() {
        let meter = LevelMeter::new();
        meter.store(&[0; 4096]);
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn full_scale_reads_one() {
        let meter = LevelMeter::new();
        meter.store(&[i16::MIN; 4096]);
        assert_eq!(meter.level(), 1.0);
    }

    #[test]
    fn half_scale_reads_half() {
        let meter = LevelMeter::new();
        meter.store(&[16384; 4096]);
        let level = meter.level();
        assert!((level - 0.5).abs() < 1e-3, "level = {}", level);
    }

    #[test]
    fn store_replaces_previous_frame() {
        let meter = LevelMeter::new();
        meter.store(&[16384; 64]);
        meter.store(&[0; 64]);
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn reset_clears_the_meter() {
        let meter = LevelMeter::new();
        meter.store(&[16384; 64]);
        meter.reset();
        assert_eq!(meter.level(), 0.0);
    }
}
