//! Stream multiplexing over a single frame connection.
//!
//! A [`Session`] owns one [`FrameReadWriter`](spdymux_frame::FrameReadWriter)
//! and multiplexes any number of bidirectional [`Stream`]s over it. Each
//! stream has a [`StreamReader`] fed by the session's frame pump and a
//! [`StreamWriter`] whose frames are written by a per-stream thread.
//! Everything is blocking; each stream direction gets its own thread.

pub mod config;
pub mod error;
pub mod handler;
pub mod mq;
pub mod observer;
pub mod reader;
pub mod session;
pub mod stream;
pub mod writer;

pub use config::{Role, SessionConfig};
pub use error::{Result, SessionError};
pub use handler::StreamHandler;
pub use mq::MessageQueue;
pub use observer::{SessionEvent, SessionObserver, TracingObserver};
pub use reader::{StreamMessage, StreamReader};
pub use session::{Session, SessionBuilder};
pub use stream::Stream;
pub use writer::{StreamWriter, WriterState};
