//! Fixed-size PCM frames and the float-block to frame assembler.

use bytes::{BufMut, Bytes, BytesMut};

/// One outbound audio frame: a fixed-length block of signed 16-bit mono
/// samples, tagged with a monotone sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Sequence number for ordering frames.
    pub sequence: u64,
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Wire payload: the samples as raw little-endian bytes, one binary
    /// WebSocket message per frame.
    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            buf.put_i16_le(s);
        }
        buf.freeze()
    }

    /// Duration of this frame in milliseconds at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        (self.samples.len() as u32 * 1000) / sample_rate
    }
}

/// Convert one float sample in [-1.0, 1.0] to signed 16-bit PCM.
///
/// Out-of-range input is clamped before scaling, and the scaled value is
/// saturated to the representable range (1.0 * 32768 would overflow).
/// No dithering.
pub fn sample_to_i16(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Assembles raw float blocks into fixed-size `AudioFrame`s.
///
/// Input blocks may be any length; samples accumulate until a full frame
/// is available. Output order matches input order, with no coalescing
/// across the frame boundary. Not restartable: sequence numbers only ever
/// move forward.
pub struct FrameProcessor {
    block_size: usize,
    accum: Vec<f32>,
    next_sequence: u64,
}

impl FrameProcessor {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            accum: Vec::with_capacity(block_size * 2),
            next_sequence: 0,
        }
    }

    /// Number of frames emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Feed one raw block of float samples; returns every complete frame
    /// it unlocked (possibly none, possibly several).
    pub fn push(&mut self, input: &[f32]) -> Vec<AudioFrame> {
        self.accum.extend_from_slice(input);

        let mut frames = Vec::new();
        while self.accum.len() >= self.block_size {
            let samples: Vec<i16> = self.accum[..self.block_size]
                .iter()
                .map(|&s| sample_to_i16(s))
                .collect();
            frames.push(AudioFrame {
                sequence: self.next_sequence,
                samples,
            });
            self.next_sequence += 1;
            // Remove the consumed block from the accumulation buffer
            self.accum.drain(..self.block_size);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_matches_round_clamp_law() {
        let cases: &[(f32, i16)] = &[
            (0.0, 0),
            (0.5, 16384),
            (-0.5, -16384),
            (1.0, 32767),   // 32768 saturates
            (-1.0, -32768),
            (2.0, 32767),   // clamped before scaling
            (-2.0, -32768),
            (0.000_03, 1),  // rounding, not truncation
            (-0.000_03, -1),
        ];
        for &(input, expected) in cases {
            assert_eq!(sample_to_i16(input), expected, "input {}", input);
        }
    }

    #[test]
    fn every_sample_follows_the_law() {
        let block: Vec<f32> = (0..4096).map(|i| (i as f32 / 2048.0) - 1.0).collect();
        let mut processor = FrameProcessor::new(4096);
        let frames = processor.push(&block);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 4096);
        for (raw, converted) in block.iter().zip(&frames[0].samples) {
            let expected = (raw.clamp(-1.0, 1.0) * 32768.0)
                .round()
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            assert_eq!(*converted, expected);
        }
    }

    #[test]
    fn zero_block_yields_zero_frame() {
        let mut processor = FrameProcessor::new(4096);
        let frames = processor.push(&[0.0; 4096]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn partial_blocks_accumulate_without_emitting() {
        let mut processor = FrameProcessor::new(8);
        assert!(processor.push(&[0.1; 5]).is_empty());
        let frames = processor.push(&[0.1; 5]);
        assert_eq!(frames.len(), 1);
        // Two samples carry over into the next frame
        assert!(processor.push(&[0.1; 6]).len() == 1);
    }

    #[test]
    fn frames_preserve_input_order() {
        let mut processor = FrameProcessor::new(4);
        let input: Vec<f32> = (0..12).map(|i| i as f32 / 100.0).collect();
        let frames = processor.push(&input);
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64);
            assert_eq!(frame.samples[0], sample_to_i16(input[i * 4]));
        }
        // A later push continues the sequence
        let more = processor.push(&[0.0; 4]);
        assert_eq!(more[0].sequence, 3);
    }

    #[test]
    fn payload_is_little_endian() {
        let frame = AudioFrame {
            sequence: 0,
            samples: vec![1, -2, 0x1234],
        };
        let payload = frame.payload();
        assert_eq!(&payload[..], &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }

    #[test]
    fn frame_duration_at_16k() {
        let frame = AudioFrame {
            sequence: 0,
            samples: vec![0; 4096],
        };
        assert_eq!(frame.duration_ms(16000), 256);
    }
}
