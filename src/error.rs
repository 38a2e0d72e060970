//! Error taxonomy for the streaming pipeline.
//!
//! Capture acquisition failures are split into permission and device
//! problems so the caller can report them differently; everything the
//! WebSocket side raises collapses into `Connection`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The capture device exists but access was refused (EACCES/EPERM).
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device (missing, busy, or failed to configure).
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The call channel could not be opened or failed while sending.
    #[error("call channel error: {0}")]
    Connection(String),

    /// `start` was called while a session is already active.
    #[error("a call session is already active ({0})")]
    SessionActive(String),
}
