use std::fmt;
use std::sync::Weak;

use spdymux_frame::Frame;

use crate::error::Result;
use crate::reader::StreamReader;
use crate::session::{Session, Shared};
use crate::writer::StreamWriter;

/// One logical bidirectional channel inside a session.
pub struct Stream {
    id: u32,
    is_mine: bool,
    session: Weak<Shared>,
    input: StreamReader,
    output: StreamWriter,
}

impl Stream {
    pub(crate) fn new(id: u32, is_mine: bool, session: Weak<Shared>) -> Self {
        Self {
            id,
            is_mine,
            session,
            input: StreamReader::new(id),
            output: StreamWriter::new(id, is_mine),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// True if this side opened the stream.
    pub fn is_mine(&self) -> bool {
        self.is_mine
    }

    pub fn input(&self) -> &StreamReader {
        &self.input
    }

    pub fn output(&self) -> &StreamWriter {
        &self.output
    }

    /// The owning session, if it is still alive.
    pub fn session(&self) -> Option<Session> {
        self.session.upgrade().map(Session::from_shared)
    }

    /// True once both directions are closed.
    pub fn is_closed(&self) -> bool {
        self.input.is_closed() && self.output.is_closed()
    }

    pub(crate) fn ingest(&self, frame: &Frame) -> Result<()> {
        self.input.ingest(frame)
    }

    /// Close both halves locally without telling the peer.
    pub(crate) fn shutdown(&self) {
        self.input.close();
        self.output.shutdown();
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("is_mine", &self.is_mine)
            .field("input_closed", &self.input.is_closed())
            .field("output", &self.output.state())
            .finish()
    }
}
