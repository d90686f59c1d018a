//! SPDY-style frame model and blocking framing for stream multiplexing.
//!
//! A connection carries a sequence of frames, each either scoped to one
//! stream (open, reply, headers, data, reset) or to the whole session
//! (settings, no-op, ping, go-away). This crate provides:
//! - The [`Frame`] tagged union and its supporting types
//! - A binary codec ([`encode_frame`] / [`decode_frame`])
//! - Blocking [`FrameReader`] / [`FrameWriter`] over any `Read` / `Write`
//! - The [`FrameReadWriter`] capability consumed by the session layer, and
//!   [`Framer`], a thread-safe implementation of it

pub mod codec;
pub mod error;
pub mod frame;
pub mod framer;
pub mod headers;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_FRAME_PAYLOAD,
    SPDY_VERSION,
};
pub use error::{FrameError, Result};
pub use frame::{Flags, Frame, FrameKind, ResetStatus, Setting, MAX_STREAM_ID};
pub use framer::{FrameReadWriter, Framer};
pub use headers::HeaderMap;
pub use reader::FrameReader;
pub use writer::FrameWriter;
