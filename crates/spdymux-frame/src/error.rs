/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A control frame carries a protocol version this codec does not speak.
    #[error("unsupported protocol version {0} (expected 2)")]
    UnsupportedVersion(u16),

    /// The frame body does not match the layout required by its type.
    #[error("malformed {kind} frame: {reason}")]
    InvalidFrame {
        kind: &'static str,
        reason: String,
    },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A stream identifier does not fit in 31 bits.
    #[error("stream id {0} outside the 31-bit range")]
    InvalidStreamId(u32),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for I/O errors caused by a configured read/write timeout expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
