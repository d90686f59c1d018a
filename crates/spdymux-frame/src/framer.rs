use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::codec::FrameConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// Synchronous source and sink of already-parsed frames.
///
/// This is the only view a session has of its connection. Implementations
/// must tolerate `write_frame` being called from several threads at once
/// (each call writes one whole frame), and a `read_frame` running
/// concurrently with writes.
pub trait FrameReadWriter: Send + Sync {
    /// Block until the next frame arrives.
    fn read_frame(&self) -> Result<Frame>;

    /// Write one frame. Frames from concurrent callers never interleave.
    fn write_frame(&self, frame: &Frame) -> Result<()>;
}

impl<T: FrameReadWriter + ?Sized> FrameReadWriter for Arc<T> {
    fn read_frame(&self) -> Result<Frame> {
        (**self).read_frame()
    }

    fn write_frame(&self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }
}

/// [`FrameReadWriter`] over a split duplex connection.
///
/// Each half sits behind its own lock, so one reader and any number of
/// writers can make progress independently.
pub struct Framer<R, W> {
    reader: Mutex<FrameReader<R>>,
    writer: Mutex<FrameWriter<W>>,
}

impl<R: Read, W: Write> Framer<R, W> {
    /// Create a framer with default configuration.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, FrameConfig::default())
    }

    /// Create a framer with explicit configuration for both halves.
    pub fn with_config(reader: R, writer: W, config: FrameConfig) -> Self {
        Self {
            reader: Mutex::new(FrameReader::with_config(reader, config.clone())),
            writer: Mutex::new(FrameWriter::with_config(writer, config)),
        }
    }
}

impl Framer<TcpStream, TcpStream> {
    /// Split a TCP connection and apply the configured timeouts.
    pub fn from_tcp(stream: TcpStream, config: FrameConfig) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        let reader = stream.try_clone()?;
        Ok(Self::with_config(reader, stream, config))
    }
}

#[cfg(unix)]
impl Framer<std::os::unix::net::UnixStream, std::os::unix::net::UnixStream> {
    /// Split a Unix domain socket and apply the configured timeouts.
    pub fn from_unix(stream: std::os::unix::net::UnixStream, config: FrameConfig) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        let reader = stream.try_clone()?;
        Ok(Self::with_config(reader, stream, config))
    }
}

impl<R, W> FrameReadWriter for Framer<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn read_frame(&self) -> Result<Frame> {
        let frame = self.reader.lock().read_frame()?;
        trace!(kind = %frame.kind(), stream_id = frame.stream_id(), "frame read");
        Ok(frame)
    }

    fn write_frame(&self, frame: &Frame) -> Result<()> {
        self.writer.lock().write_frame(frame)?;
        trace!(kind = %frame.kind(), stream_id = frame.stream_id(), "frame written");
        Ok(())
    }
}
