//! audio - Microphone capture and PCM framing.
//!
//! Uses ALSA for capture in a dedicated OS thread; raw float blocks are
//! assembled into fixed-size 16-bit frames by the frame processor.

mod alsa_device;
mod capture;
mod frame;
mod level;

pub use capture::{
    AlsaBackend, BlockSource, CaptureBackend, CaptureConstraints, capture_thread,
};
pub use frame::{AudioFrame, FrameProcessor, sample_to_i16};
pub use level::LevelMeter;
