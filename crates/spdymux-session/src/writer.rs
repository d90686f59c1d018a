use std::io::BufRead;

use bytes::Bytes;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use spdymux_frame::{Flags, Frame, HeaderMap, MAX_FRAME_PAYLOAD};

use crate::error::{Result, SessionError};
use crate::mq::MessageQueue;

/// Where a writer is in its outbound lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing sent yet; the next frame opens the stream.
    NotStarted,
    Opened,
    /// A final frame was sent or the stream was shut down.
    Closed,
}

/// Outbound half of a stream.
///
/// Frames are queued and written to the connection, in order, by the
/// stream's pump thread. The first frame sent is always a header frame:
/// `SynStream` on streams this side opened, `SynReply` on accepted ones.
pub struct StreamWriter {
    stream_id: u32,
    is_mine: bool,
    inner: Mutex<WriterInner>,
    outbound: MessageQueue<Frame>,
}

struct WriterInner {
    headers: HeaderMap,
    state: WriterState,
    frames_sent: u32,
}

impl StreamWriter {
    pub(crate) fn new(stream_id: u32, is_mine: bool) -> Self {
        Self {
            stream_id,
            is_mine,
            inner: Mutex::new(WriterInner {
                headers: HeaderMap::new(),
                state: WriterState::NotStarted,
                frames_sent: 0,
            }),
            outbound: MessageQueue::new(),
        }
    }

    /// Headers sent by the next header frame.
    ///
    /// Every header frame carries the full current set. Drop the guard
    /// before calling any send method on this writer.
    pub fn headers(&self) -> MappedMutexGuard<'_, HeaderMap> {
        MutexGuard::map(self.inner.lock(), |inner| &mut inner.headers)
    }

    /// Send the current headers. With `fin` set this half-closes the stream.
    pub fn send_headers(&self, fin: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        self.emit_headers(&mut inner, fin)
    }

    /// Send one data frame, opening the stream first if needed.
    ///
    /// Payloads larger than one frame can carry are rejected before
    /// anything is queued.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        if data.len() > MAX_FRAME_PAYLOAD {
            return Err(SessionError::PayloadTooLarge {
                stream_id: self.stream_id,
                size: data.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        let mut inner = self.inner.lock();
        if inner.state == WriterState::NotStarted {
            self.emit_headers(&mut inner, false)?;
        }
        let frame = Frame::Data {
            stream_id: self.stream_id,
            flags: Flags::NONE,
            data,
        };
        self.emit(&mut inner, frame)
    }

    /// Send each line of `source` as its own data frame.
    ///
    /// Line terminators (`\n` and `\r\n`) are stripped. The stream is not
    /// closed at end of input.
    pub fn send_lines<R: BufRead>(&self, mut source: R) -> Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if source.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            if line.last() == Some(&b'\n') {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
            }
            self.send(Bytes::copy_from_slice(&line))?;
        }
    }

    /// Half-close the outbound direction.
    ///
    /// An unopened stream is opened and closed with a single final header
    /// frame. Closing an already closed writer is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match self.state_of(&inner) {
            WriterState::Closed => Ok(()),
            WriterState::NotStarted => self.emit_headers(&mut inner, true),
            WriterState::Opened => {
                let frame = Frame::Data {
                    stream_id: self.stream_id,
                    flags: Flags::FIN,
                    data: Bytes::new(),
                };
                self.emit(&mut inner, frame)
            }
        }
    }

    pub fn state(&self) -> WriterState {
        self.state_of(&self.inner.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Frames accepted for sending so far.
    pub fn frames_sent(&self) -> u32 {
        self.inner.lock().frames_sent
    }

    /// Next frame for the pump. Fails once the writer is closed and drained.
    pub(crate) fn next_frame(&self) -> Result<Frame> {
        self.outbound.receive()
    }

    /// Refuse further sends. Frames already queued still go out.
    pub(crate) fn shutdown(&self) {
        self.outbound.close();
    }

    fn state_of(&self, inner: &WriterInner) -> WriterState {
        if self.outbound.is_closed() {
            WriterState::Closed
        } else {
            inner.state
        }
    }

    fn emit_headers(&self, inner: &mut WriterInner, fin: bool) -> Result<()> {
        let stream_id = self.stream_id;
        let flags = Flags::fin_if(fin);
        let headers = inner.headers.clone();
        let frame = match (inner.state, self.is_mine) {
            (WriterState::NotStarted, true) => Frame::SynStream {
                stream_id,
                flags,
                headers,
            },
            (WriterState::NotStarted, false) => Frame::SynReply {
                stream_id,
                flags,
                headers,
            },
            _ => Frame::Headers {
                stream_id,
                flags,
                headers,
            },
        };
        self.emit(inner, frame)
    }

    fn emit(&self, inner: &mut WriterInner, frame: Frame) -> Result<()> {
        let fin = frame.is_fin();
        if inner.state == WriterState::Closed {
            return Err(SessionError::OutputClosed(self.stream_id));
        }
        self.outbound
            .send(frame)
            .map_err(|_| SessionError::OutputClosed(self.stream_id))?;

        inner.frames_sent += 1;
        if fin {
            inner.state = WriterState::Closed;
            self.outbound.close();
        } else {
            inner.state = WriterState::Opened;
        }
        Ok(())
    }
}
