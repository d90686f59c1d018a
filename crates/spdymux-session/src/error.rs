use std::time::Duration;

use spdymux_frame::{FrameError, ResetStatus};

/// Errors that can occur in session and stream operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Graceful end of a stream direction or line source. Not a failure.
    #[error("end of stream")]
    EndOfStream,

    /// Stream id has the wrong parity or is out of sequence.
    #[error("invalid {direction} stream id {id}: {reason}")]
    InvalidStreamId {
        id: u32,
        direction: &'static str,
        reason: &'static str,
    },

    /// Stream id is already registered.
    #[error("stream {0} already exists")]
    DuplicateStream(u32),

    /// A stream-scoped frame arrived for a stream that is not registered.
    #[error("frame for unknown stream {0}")]
    UnknownStream(u32),

    /// A frame arrived on a stream whose inbound half is already closed.
    #[error("stream {0} input already closed")]
    InputClosed(u32),

    /// `close_stream` was called for an id that is not registered.
    #[error("no such stream: {0}")]
    NoSuchStream(u32),

    /// A send was attempted after the outbound half closed.
    #[error("stream {0} output closed")]
    OutputClosed(u32),

    /// A data payload does not fit in one frame.
    #[error("stream {stream_id}: payload of {size} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge {
        stream_id: u32,
        size: usize,
        max: usize,
    },

    /// The local side has used up the 31-bit stream id space.
    #[error("stream ids exhausted")]
    StreamIdsExhausted,

    /// The session has been closed.
    #[error("session closed")]
    SessionClosed,

    /// The peer reset the stream.
    #[error("stream reset by peer: {0}")]
    StreamReset(ResetStatus),

    /// Connection-level failure. Fatal to the session.
    #[error("transport error: {0}")]
    Transport(#[from] FrameError),

    /// A bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The inbound stream handler failed.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Local I/O failure (line sources, thread spawning).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, SessionError::EndOfStream)
    }

    /// True for errors answered with a reset-stream frame to the peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidStreamId { .. }
                | SessionError::DuplicateStream(_)
                | SessionError::UnknownStream(_)
                | SessionError::InputClosed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
