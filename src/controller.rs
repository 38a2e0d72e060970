//! Session controller: owns the capture source, frame processor, and call
//! channel for one call at a time and drives their lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use crate::audio::{
    BlockSource, CaptureBackend, CaptureConstraints, FrameProcessor, LevelMeter, capture_thread,
};
use crate::error::StreamError;
use crate::net_link::{ChannelFactory, ConnectionState, NetEvent, OutboundChannel};
use crate::protocol::{self, ServerMessage};

/// Lifecycle of the controller.
///
/// `Idle -> Starting -> Streaming -> Idle` on a clean stop; `Starting ->
/// Idle` when acquisition or connect fails; `Streaming -> Error` when the
/// channel is lost mid-call. `stop` always returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Error,
}

struct SessionShared {
    state: Mutex<SessionState>,
}

/// One live call: at most one capture tap and one channel.
struct CallSession<Ch: OutboundChannel> {
    call_id: String,
    channel: Ch,
    running: Arc<AtomicBool>,
    capture: Option<std::thread::JoinHandle<()>>,
    pump: tokio::task::JoinHandle<()>,
    events: tokio::task::JoinHandle<()>,
}

pub struct SessionController<B: CaptureBackend, F: ChannelFactory> {
    constraints: CaptureConstraints,
    block_size: usize,
    backend: B,
    factory: F,
    shared: Arc<SessionShared>,
    level: Arc<LevelMeter>,
    dropped: Arc<AtomicU64>,
    ready_tx: watch::Sender<bool>,
    session: Option<CallSession<F::Channel>>,
}

impl<B, F> SessionController<B, F>
where
    B: CaptureBackend,
    B::Source: BlockSource,
    F: ChannelFactory,
{
    pub fn new(constraints: CaptureConstraints, block_size: usize, backend: B, factory: F) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            constraints,
            block_size,
            backend,
            factory,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Idle),
            }),
            level: Arc::new(LevelMeter::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            ready_tx,
            session: None,
        }
    }

    /// Start streaming for `call_id`.
    ///
    /// Capture is acquired before the channel is opened, so an acquisition
    /// failure never leaves a channel behind; a connect failure releases
    /// the already-acquired device before returning.
    pub async fn start(&mut self, call_id: &str) -> Result<(), StreamError> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != SessionState::Idle {
                let active = self
                    .session
                    .as_ref()
                    .map(|s| s.call_id.clone())
                    .unwrap_or_default();
                return Err(StreamError::SessionActive(active));
            }
            *state = SessionState::Starting;
        }

        let source = match self.backend.acquire(&self.constraints) {
            Ok(source) => source,
            Err(e) => {
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        let (channel, mut event_rx) = match self.factory.connect(call_id).await {
            Ok(pair) => pair,
            Err(e) => {
                // Releases the capture device
                drop(source);
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        // At most one in-flight frame between capture and send; overflow drops
        let (frame_tx, mut frame_rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));
        self.level.reset();

        let capture = {
            let processor = FrameProcessor::new(self.block_size);
            let level = self.level.clone();
            let running = running.clone();
            let dropped = self.dropped.clone();
            match std::thread::Builder::new()
                .name("call-capture".into())
                .spawn(move || capture_thread(source, processor, level, frame_tx, running, dropped))
            {
                Ok(handle) => handle,
                Err(e) => {
                    channel.close().await;
                    self.set_state(SessionState::Idle);
                    return Err(StreamError::DeviceUnavailable(format!(
                        "failed to spawn capture thread: {}",
                        e
                    )));
                }
            }
        };

        let pump = {
            let channel = channel.clone();
            let dropped = self.dropped.clone();
            tokio::spawn(async move {
                while let Some(frame) = frame_rx.recv().await {
                    if channel.state() == ConnectionState::Open {
                        if let Err(e) = channel.send_binary(frame.payload()).await {
                            log::warn!("Frame {} send failed: {}", frame.sequence, e);
                        }
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Frame {} dropped: channel not open", frame.sequence);
                    }
                }
            })
        };

        let events = {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    match event {
                        NetEvent::Text(text) => handle_server_text(&text),
                        NetEvent::Binary(data) => {
                            // Forwarded partner audio; this client does not play it
                            log::debug!("Ignoring {} inbound audio bytes", data.len());
                        }
                        NetEvent::Disconnected => {
                            let mut state = shared.state.lock().unwrap();
                            if *state == SessionState::Streaming {
                                *state = SessionState::Error;
                                log::error!("Call channel lost mid-stream");
                            }
                        }
                        NetEvent::Connected => {}
                    }
                }
            })
        };

        if let Err(e) = channel
            .send_text(protocol::start_call_message(call_id))
            .await
        {
            log::warn!("Failed to announce call start: {}", e);
        }

        self.set_state(SessionState::Streaming);
        let _ = self.ready_tx.send(true);
        self.session = Some(CallSession {
            call_id: call_id.to_string(),
            channel,
            running,
            capture: Some(capture),
            pump,
            events,
        });
        log::info!("Streaming call {}", call_id);
        Ok(())
    }

    /// Stop streaming and tear down in reverse acquisition order: frame
    /// tap, capture device, channel. Safe to call at any point, including
    /// when already idle.
    pub async fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.set_state(SessionState::Idle);
            return;
        };

        session.running.store(false, Ordering::Relaxed);
        if let Some(handle) = session.capture.take() {
            // Reads are at most one period long, so the join is quick; the
            // thread drops the source, releasing the device.
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        // Capture dropped its sender, so the pump drains and exits
        let _ = session.pump.await;

        // Leave `Streaming` before closing so the resulting disconnect is
        // not mistaken for a mid-call loss
        self.set_state(SessionState::Idle);

        if let Err(e) = session
            .channel
            .send_text(protocol::end_call_message(&session.call_id))
            .await
        {
            log::debug!("Failed to announce call end: {}", e);
        }
        session.channel.close().await;
        let _ = session.events.await;

        self.level.reset();
        let _ = self.ready_tx.send(false);
        log::info!("Stopped call {}", session.call_id);
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock().unwrap()
    }

    /// Instantaneous loudness of the last captured frame, in [0, 1].
    pub fn audio_level(&self) -> f32 {
        self.level.level()
    }

    /// Total frames discarded because the channel was not open (or the
    /// in-flight slot was taken). Cumulative across sessions.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stream-ready notification: flips to `true` once the channel for the
    /// current session is open, back to `false` on stop.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        *self.shared.state.lock().unwrap() = state;
    }
}

/// Log backend control traffic; nothing here feeds the pipeline.
fn handle_server_text(text: &str) {
    let Ok(msg) = serde_json::from_str::<ServerMessage>(text) else {
        log::debug!("Unparseable server message: {}", text);
        return;
    };
    match msg.msg_type.as_str() {
        "call_started" => log::info!(
            "Backend confirmed call start ({})",
            msg.call_id.as_deref().unwrap_or("?")
        ),
        "call_ended" => log::info!(
            "Backend confirmed call end ({})",
            msg.call_id.as_deref().unwrap_or("?")
        ),
        "transcript" => log::info!(
            "Transcript [{}]: {}",
            msg.speaker.as_deref().unwrap_or("unknown"),
            msg.text.as_deref().unwrap_or(""),
        ),
        other => log::debug!("Unhandled server message type: {}", other),
    }
}
