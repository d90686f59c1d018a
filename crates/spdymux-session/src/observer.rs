use spdymux_frame::{Frame, FrameError, FrameKind};
use tracing::{debug, error, info, warn};

use crate::error::SessionError;

/// Something observable that happened inside a session.
#[derive(Debug)]
#[non_exhaustive]
pub enum SessionEvent<'a> {
    /// The frame pump read a frame from the transport.
    FrameReceived { frame: &'a Frame },
    /// A session-wide frame was dispatched.
    SessionFrame { kind: FrameKind },
    /// A frame the dispatcher has no route for was dropped.
    FrameIgnored { frame: &'a Frame },
    StreamOpened { stream_id: u32, local: bool },
    /// The peer half-closed its direction of the stream.
    InputClosed { stream_id: u32 },
    /// The stream was removed from the session table.
    StreamClosed { stream_id: u32 },
    /// The peer broke stream id rules; a reset was (or would have been) sent.
    ProtocolViolation {
        stream_id: u32,
        error: &'a SessionError,
    },
    /// A stream failed and was torn down without affecting others.
    StreamFailed {
        stream_id: u32,
        error: &'a SessionError,
    },
    HandlerFailed {
        stream_id: u32,
        error: &'a SessionError,
    },
    GoAwaySent,
    PingAnswered { id: u32 },
    /// The connection failed; the session is closing.
    TransportFailed { error: &'a SessionError },
    SessionClosed { streams: usize },
}

/// Sink for session events.
///
/// The session never logs directly; everything goes through the observer
/// installed at build time.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent<'_>);
}

/// Default observer: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent<'_>) {
        match event {
            SessionEvent::FrameReceived { frame } => {
                debug!(kind = %frame.kind(), stream_id = frame.stream_id(), fin = frame.is_fin(), "frame received");
            }
            SessionEvent::SessionFrame { kind } => debug!(%kind, "session frame"),
            SessionEvent::FrameIgnored { frame } => {
                debug!(kind = %frame.kind(), stream_id = frame.stream_id(), "frame ignored");
            }
            SessionEvent::StreamOpened { stream_id, local } => {
                debug!(stream_id, local, "stream opened");
            }
            SessionEvent::InputClosed { stream_id } => debug!(stream_id, "stream input closed"),
            SessionEvent::StreamClosed { stream_id } => debug!(stream_id, "stream closed"),
            SessionEvent::ProtocolViolation { stream_id, error } => {
                warn!(stream_id, error = %error, "protocol violation");
            }
            SessionEvent::StreamFailed { stream_id, error } => {
                warn!(stream_id, error = %error, "stream failed");
            }
            SessionEvent::HandlerFailed { stream_id, error } => {
                warn!(stream_id, error = %error, "stream handler failed");
            }
            SessionEvent::GoAwaySent => info!("no stream handler; go-away sent"),
            SessionEvent::PingAnswered { id } => debug!(id, "ping answered"),
            SessionEvent::TransportFailed {
                error: SessionError::Transport(FrameError::ConnectionClosed),
            } => info!("peer closed the connection"),
            SessionEvent::TransportFailed { error } => {
                error!(error = %error, "transport failed; closing session");
            }
            SessionEvent::SessionClosed { streams } => info!(streams, "session closed"),
        }
    }
}
