//! SPDY-style stream multiplexing over a single connection.
//!
//! # Crate Structure
//!
//! - [`frame`]: frame model, wire codec and blocking frame I/O
//! - [`session`]: sessions, streams and their reader/writer halves (behind the
//!   `session` feature, on by default)

/// Re-export frame types.
pub mod frame {
    pub use spdymux_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use spdymux_session::*;
}
