//! ALSA PCM device wrapper for audio capture.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames
    pub period_size: usize,
}

/// Open a PCM device for capture in 32-bit float format.
///
/// The pipeline converts float samples to 16-bit itself, so the device is
/// asked for `FloatLE`; the "default"/plug devices synthesize it when the
/// hardware only does integer formats.
pub fn open_capture(device: &str, sample_rate: u32, channels: u32) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, Direction::Capture, false)
        .with_context(|| format!("Failed to open PCM device '{}' for capture", device))?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::FloatLE)?;
        hwp.set_channels(channels)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    let params = AlsaParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size,
    };

    log::info!(
        "ALSA capture: device={}, rate={}, channels={}, period_size={}",
        device,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok((pcm, params))
}
