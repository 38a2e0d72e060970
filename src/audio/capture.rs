//! Capture acquisition and the dedicated capture thread.
//!
//! Real-time reads run on a std::thread (NOT a tokio task) to keep device
//! I/O off the async executor; frames cross to the async side over a
//! bounded mpsc channel that drops instead of blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use alsa::pcm::PCM;
use tokio::sync::mpsc;

use super::alsa_device;
use super::frame::{AudioFrame, FrameProcessor};
use super::level::LevelMeter;
use crate::error::StreamError;

/// Acquisition parameters for the capture device.
///
/// Echo cancellation and noise suppression are requested-processing hints
/// (the source platform treats them the same way); a backend that cannot
/// service them reports so instead of failing.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

/// A live capture stream producing raw float blocks in [-1.0, 1.0].
///
/// Implementations release the underlying device on drop. The capture
/// thread owns the source, so joining the thread guarantees the device
/// has been released.
pub trait BlockSource: Send + 'static {
    /// Read up to `buf.len()` samples; returns the number read.
    fn read_block(&mut self, buf: &mut [f32]) -> Result<usize, StreamError>;

    /// Preferred read granularity in samples.
    fn read_hint(&self) -> usize {
        1024
    }
}

/// Factory for acquiring a capture stream.
pub trait CaptureBackend {
    type Source: BlockSource;

    fn acquire(&self, constraints: &CaptureConstraints) -> Result<Self::Source, StreamError>;
}

// ======================== ALSA backend ========================

pub struct AlsaSource {
    pcm: PCM,
    period_size: usize,
}

impl BlockSource for AlsaSource {
    fn read_block(&mut self, buf: &mut [f32]) -> Result<usize, StreamError> {
        let io = self
            .pcm
            .io_f32()
            .map_err(|e| StreamError::DeviceUnavailable(e.to_string()))?;
        io.readi(buf)
            .map_err(|e| StreamError::DeviceUnavailable(e.to_string()))
    }

    fn read_hint(&self) -> usize {
        self.period_size
    }
}

pub struct AlsaBackend;

impl CaptureBackend for AlsaBackend {
    type Source = AlsaSource;

    fn acquire(&self, constraints: &CaptureConstraints) -> Result<AlsaSource, StreamError> {
        let (pcm, params) = alsa_device::open_capture(
            &constraints.device,
            constraints.sample_rate,
            constraints.channels,
        )
        .map_err(|e| classify_open_error(&e))?;

        if params.sample_rate != constraints.sample_rate {
            log::warn!(
                "Capture rate negotiated to {} Hz (requested {})",
                params.sample_rate,
                constraints.sample_rate,
            );
        }
        if params.channels != constraints.channels {
            log::warn!(
                "Capture channels negotiated to {} (requested {})",
                params.channels,
                constraints.channels,
            );
        }
        if constraints.echo_cancellation {
            log::warn!("Echo cancellation requested but not available on raw ALSA capture");
        }
        if constraints.noise_suppression {
            log::warn!("Noise suppression requested but not available on raw ALSA capture");
        }

        Ok(AlsaSource {
            pcm,
            period_size: params.period_size,
        })
    }
}

/// Map an ALSA open failure onto the acquisition taxonomy: access errors
/// mean a permission problem, everything else an unusable device.
fn classify_open_error(err: &anyhow::Error) -> StreamError {
    if let Some(alsa_err) = err.downcast_ref::<alsa::Error>() {
        match alsa_err.errno() {
            libc::EACCES | libc::EPERM => {
                return StreamError::PermissionDenied(format!("{:#}", err));
            }
            _ => {}
        }
    }
    StreamError::DeviceUnavailable(format!("{:#}", err))
}

// ======================== Capture thread ========================

/// Blocking capture loop: read raw blocks, assemble frames, publish the
/// level, hand frames to the async side.
///
/// Frames that do not fit in the queue are dropped and counted; the loop
/// itself never blocks on the consumer. A read failure stops production
/// (logged, not escalated) which matches the source pipeline's behavior
/// when its processing node is disconnected mid-stream.
pub fn capture_thread<S: BlockSource>(
    mut source: S,
    mut processor: FrameProcessor,
    level: Arc<LevelMeter>,
    frame_tx: mpsc::Sender<AudioFrame>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) {
    let mut buf = vec![0f32; source.read_hint().max(1)];

    while running.load(Ordering::Relaxed) {
        match source.read_block(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                for frame in processor.push(&buf[..n]) {
                    level.store(&frame.samples);
                    match frame_tx.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(frame)) => {
                            // No buffering beyond the in-flight frame
                            dropped.fetch_add(1, Ordering::Relaxed);
                            log::debug!("Frame {} dropped: send queue full", frame.sequence);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            log::warn!("Frame receiver dropped, stopping capture");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Capture read error: {}, stopping capture", e);
                break;
            }
        }
    }

    log::info!(
        "Capture stopped after {} frames",
        processor.frames_emitted()
    );
    // Source drops here, releasing the device before the thread is joined
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic source feeding a fixed script of blocks, then pending
    /// until stopped.
    struct ScriptedSource {
        blocks: Vec<Vec<f32>>,
        next: usize,
    }

    impl BlockSource for ScriptedSource {
        fn read_block(&mut self, buf: &mut [f32]) -> Result<usize, StreamError> {
            if self.next >= self.blocks.len() {
                std::thread::sleep(std::time::Duration::from_millis(2));
                return Ok(0);
            }
            let block = &self.blocks[self.next];
            self.next += 1;
            buf[..block.len()].copy_from_slice(block);
            Ok(block.len())
        }

        fn read_hint(&self) -> usize {
            16
        }
    }

    #[test]
    fn frames_flow_in_production_order() {
        let source = ScriptedSource {
            blocks: vec![vec![0.25; 8], vec![-0.25; 8], vec![0.5; 8]],
            next: 0,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));
        let level = Arc::new(LevelMeter::new());

        let handle = {
            let running = running.clone();
            let dropped = dropped.clone();
            let level = level.clone();
            std::thread::spawn(move || {
                capture_thread(source, FrameProcessor::new(8), level, tx, running, dropped)
            })
        };

        let first = rx.blocking_recv().expect("first frame");
        let second = rx.blocking_recv().expect("second frame");
        let third = rx.blocking_recv().expect("third frame");
        assert_eq!(
            (first.sequence, second.sequence, third.sequence),
            (0, 1, 2)
        );
        assert_eq!(first.samples, vec![8192; 8]);
        assert_eq!(second.samples, vec![-8192; 8]);

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        // Last frame's level is still readable after the thread exits
        assert!(level.level() > 0.0);
    }

    #[test]
    fn overflow_drops_frames_instead_of_blocking() {
        let source = ScriptedSource {
            blocks: (0..5).map(|_| vec![0.1; 8]).collect(),
            next: 0,
        };
        // Queue depth 1 and no consumer: everything past the first frame drops
        let (tx, rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = running.clone();
            let dropped = dropped.clone();
            std::thread::spawn(move || {
                capture_thread(
                    source,
                    FrameProcessor::new(8),
                    Arc::new(LevelMeter::new()),
                    tx,
                    running,
                    dropped,
                )
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
        drop(rx);
        assert_eq!(dropped.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn read_error_stops_production_silently() {
        struct FailingSource;
        impl BlockSource for FailingSource {
            fn read_block(&mut self, _buf: &mut [f32]) -> Result<usize, StreamError> {
                Err(StreamError::DeviceUnavailable("gone".into()))
            }
        }

        let (tx, mut rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));
        capture_thread(
            FailingSource,
            FrameProcessor::new(8),
            Arc::new(LevelMeter::new()),
            tx,
            running,
            Arc::new(AtomicU64::new(0)),
        );
        // Thread function returned on its own; channel closed, no frames
        assert!(rx.blocking_recv().is_none());
    }
}
