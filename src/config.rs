use crate::audio::CaptureConstraints;

#[derive(Debug, Clone)]
pub struct Config {
    // Application identity
    pub app_name: &'static str,
    pub app_version: &'static str,

    // Network configuration
    pub ws_url: &'static str,

    // Audio capture configuration
    pub capture_device: &'static str,
    pub sample_rate: u32,
    pub channels: u32,
    pub block_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,

    // Session configuration
    pub channel_buffer: usize,
}

impl Config {
    /// Create the configuration from environment variables set at compile
    /// time. All values come from config.toml via build.rs.
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            ws_url: env!("WS_URL"),

            capture_device: env!("CAPTURE_DEVICE"),
            sample_rate: env!("SAMPLE_RATE")
                .parse()
                .map_err(|_| "Failed to parse SAMPLE_RATE")?,
            channels: env!("CHANNELS")
                .parse()
                .map_err(|_| "Failed to parse CHANNELS")?,
            block_size: env!("BLOCK_SIZE")
                .parse()
                .map_err(|_| "Failed to parse BLOCK_SIZE")?,
            echo_cancellation: env!("ECHO_CANCELLATION")
                .parse()
                .map_err(|_| "Failed to parse ECHO_CANCELLATION")?,
            noise_suppression: env!("NOISE_SUPPRESSION")
                .parse()
                .map_err(|_| "Failed to parse NOISE_SUPPRESSION")?,

            channel_buffer: env!("CHANNEL_BUFFER")
                .parse()
                .map_err(|_| "Failed to parse CHANNEL_BUFFER")?,
        })
    }

    /// Capture constraints derived from the audio section.
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            device: self.capture_device.to_string(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baked_in_defaults_match_call_pipeline() {
        let config = Config::new().expect("build-time config should parse");
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.block_size, 4096);
        assert!(config.echo_cancellation);
        assert!(config.noise_suppression);
    }
}
