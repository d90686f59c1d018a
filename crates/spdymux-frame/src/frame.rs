use std::fmt;

use bytes::Bytes;

use crate::headers::HeaderMap;

/// Highest stream identifier representable on the wire (31 bits).
pub const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// Per-frame control flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    /// No flags set.
    pub const NONE: Flags = Flags(0);
    /// The sender will send no further frames on this stream.
    pub const FIN: Flags = Flags(0x01);
    /// The recipient must not reply on this stream (open-stream only).
    pub const UNIDIRECTIONAL: Flags = Flags(0x02);

    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// `FIN` when `fin` is true, otherwise no flags.
    pub const fn fin_if(fin: bool) -> Self {
        if fin {
            Flags::FIN
        } else {
            Flags::NONE
        }
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#04x})", self.0)
    }
}

/// Status code carried by a reset-stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetStatus {
    ProtocolError,
    InvalidStream,
    RefusedStream,
    UnsupportedVersion,
    Cancel,
    InternalError,
    FlowControlError,
    Unknown(u32),
}

impl ResetStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ResetStatus::ProtocolError,
            2 => ResetStatus::InvalidStream,
            3 => ResetStatus::RefusedStream,
            4 => ResetStatus::UnsupportedVersion,
            5 => ResetStatus::Cancel,
            6 => ResetStatus::InternalError,
            7 => ResetStatus::FlowControlError,
            other => ResetStatus::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            ResetStatus::ProtocolError => 1,
            ResetStatus::InvalidStream => 2,
            ResetStatus::RefusedStream => 3,
            ResetStatus::UnsupportedVersion => 4,
            ResetStatus::Cancel => 5,
            ResetStatus::InternalError => 6,
            ResetStatus::FlowControlError => 7,
            ResetStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ResetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetStatus::ProtocolError => f.write_str("PROTOCOL_ERROR"),
            ResetStatus::InvalidStream => f.write_str("INVALID_STREAM"),
            ResetStatus::RefusedStream => f.write_str("REFUSED_STREAM"),
            ResetStatus::UnsupportedVersion => f.write_str("UNSUPPORTED_VERSION"),
            ResetStatus::Cancel => f.write_str("CANCEL"),
            ResetStatus::InternalError => f.write_str("INTERNAL_ERROR"),
            ResetStatus::FlowControlError => f.write_str("FLOW_CONTROL_ERROR"),
            ResetStatus::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// One entry of a settings frame. Carried through unchanged; settings are
/// never negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    /// 24-bit setting identifier.
    pub id: u32,
    pub flags: u8,
    pub value: u32,
}

/// Discriminant of a [`Frame`], used for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    SynStream,
    SynReply,
    Headers,
    Data,
    RstStream,
    Settings,
    Noop,
    Ping,
    GoAway,
}

impl FrameKind {
    pub fn name(self) -> &'static str {
        match self {
            FrameKind::SynStream => "SYN_STREAM",
            FrameKind::SynReply => "SYN_REPLY",
            FrameKind::Headers => "HEADERS",
            FrameKind::Data => "DATA",
            FrameKind::RstStream => "RST_STREAM",
            FrameKind::Settings => "SETTINGS",
            FrameKind::Noop => "NOOP",
            FrameKind::Ping => "PING",
            FrameKind::GoAway => "GOAWAY",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded protocol frame.
///
/// The first five variants address a single stream; the rest are
/// session-wide and report a stream id of 0.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Frame {
    /// First frame sent by the side that opens a stream.
    SynStream {
        stream_id: u32,
        flags: Flags,
        headers: HeaderMap,
    },
    /// First frame sent by the side that accepts a stream.
    SynReply {
        stream_id: u32,
        flags: Flags,
        headers: HeaderMap,
    },
    /// Additional headers on an already opened stream.
    Headers {
        stream_id: u32,
        flags: Flags,
        headers: HeaderMap,
    },
    Data {
        stream_id: u32,
        flags: Flags,
        data: Bytes,
    },
    RstStream {
        stream_id: u32,
        status: ResetStatus,
    },
    Settings {
        flags: Flags,
        entries: Vec<Setting>,
    },
    Noop,
    Ping {
        id: u32,
    },
    GoAway {
        last_good_stream_id: u32,
    },
}

impl Frame {
    /// Stream this frame is addressed to, or 0 for session-wide frames.
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::SynStream { stream_id, .. }
            | Frame::SynReply { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Data { stream_id, .. }
            | Frame::RstStream { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Noop | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::SynStream { .. } => FrameKind::SynStream,
            Frame::SynReply { .. } => FrameKind::SynReply,
            Frame::Headers { .. } => FrameKind::Headers,
            Frame::Data { .. } => FrameKind::Data,
            Frame::RstStream { .. } => FrameKind::RstStream,
            Frame::Settings { .. } => FrameKind::Settings,
            Frame::Noop => FrameKind::Noop,
            Frame::Ping { .. } => FrameKind::Ping,
            Frame::GoAway { .. } => FrameKind::GoAway,
        }
    }

    pub fn flags(&self) -> Flags {
        match self {
            Frame::SynStream { flags, .. }
            | Frame::SynReply { flags, .. }
            | Frame::Headers { flags, .. }
            | Frame::Data { flags, .. }
            | Frame::Settings { flags, .. } => *flags,
            Frame::RstStream { .. } | Frame::Noop | Frame::Ping { .. } | Frame::GoAway { .. } => {
                Flags::NONE
            }
        }
    }

    /// True if the sender closes its outbound half with this frame.
    pub fn is_fin(&self) -> bool {
        self.flags().contains(Flags::FIN)
    }

    /// Header block carried by the frame, if its kind carries one.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Frame::SynStream { headers, .. }
            | Frame::SynReply { headers, .. }
            | Frame::Headers { headers, .. } => Some(headers),
            _ => None,
        }
    }
}
