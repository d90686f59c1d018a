use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use spdymux_frame::{Frame, HeaderMap};

use crate::error::{Result, SessionError};
use crate::mq::MessageQueue;
use crate::writer::StreamWriter;

/// One unit of inbound stream content: a data payload or a header delta.
///
/// The frame router only ever fills one of the two fields, but consumers
/// should be prepared for both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMessage {
    pub data: Option<Bytes>,
    pub headers: Option<HeaderMap>,
}

impl StreamMessage {
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            headers: None,
        }
    }

    pub fn headers(headers: HeaderMap) -> Self {
        Self {
            data: None,
            headers: Some(headers),
        }
    }
}

/// Inbound half of a stream.
///
/// Frames routed to the stream are queued here and handed out in arrival
/// order by [`receive`](Self::receive). Concurrent consumers of one reader
/// race for messages; serializing them is up to the caller.
pub struct StreamReader {
    stream_id: u32,
    headers: Mutex<HeaderMap>,
    queue: MessageQueue<StreamMessage>,
}

impl StreamReader {
    pub(crate) fn new(stream_id: u32) -> Self {
        Self {
            stream_id,
            headers: Mutex::new(HeaderMap::new()),
            queue: MessageQueue::new(),
        }
    }

    /// Headers accumulated from every header message received so far.
    ///
    /// A header message is folded in when [`receive`](Self::receive) hands
    /// it out, so by the time end-of-stream is reported every header frame
    /// has been applied. Drop the guard before receiving again.
    pub fn headers(&self) -> MutexGuard<'_, HeaderMap> {
        self.headers.lock()
    }

    /// Block until the next message arrives.
    ///
    /// Fails with [`SessionError::EndOfStream`] once the peer has
    /// half-closed and every queued message has been consumed.
    pub fn receive(&self) -> Result<StreamMessage> {
        let msg = self.queue.receive()?;
        self.absorb(&msg);
        Ok(msg)
    }

    /// Like [`receive`](Self::receive), giving up after `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<StreamMessage> {
        let msg = self.queue.receive_timeout(timeout)?;
        self.absorb(&msg);
        Ok(msg)
    }

    /// Receive and discard messages until header `key` has been seen, then
    /// return its value.
    pub fn wait_for_header(&self, key: &str) -> Result<String> {
        loop {
            let found = self.headers.lock().get(key).map(str::to_string);
            if let Some(value) = found {
                return Ok(value);
            }
            self.receive()?;
        }
    }

    /// Copy everything this reader yields into `writer`.
    ///
    /// Header messages become non-final header sends, data messages become
    /// data sends. End-of-stream is forwarded as a half-close of `writer`.
    pub fn pipe(&self, writer: &StreamWriter) -> Result<()> {
        loop {
            let msg = match self.receive() {
                Ok(msg) => msg,
                Err(SessionError::EndOfStream) => return writer.close(),
                Err(err) => return Err(err),
            };
            if let Some(headers) = &msg.headers {
                writer.headers().merge(headers);
                writer.send_headers(false)?;
            }
            if let Some(data) = msg.data {
                writer.send(data)?;
            }
        }
    }

    /// True once no more inbound frames will be delivered.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Queue one decoded message for the consumer.
    pub(crate) fn push(&self, data: Option<Bytes>, headers: Option<HeaderMap>) -> Result<()> {
        self.queue
            .send(StreamMessage { data, headers })
            .map_err(|_| SessionError::InputClosed(self.stream_id))
    }

    /// Absorb a frame routed to this stream.
    ///
    /// Returns `EndOfStream` when the frame half-closes the inbound
    /// direction, `StreamReset` when the peer reset the stream, and
    /// `InputClosed` if the direction was already closed.
    pub(crate) fn ingest(&self, frame: &Frame) -> Result<()> {
        if self.queue.is_closed() {
            return Err(SessionError::InputClosed(self.stream_id));
        }

        match frame {
            Frame::SynStream { headers, .. }
            | Frame::SynReply { headers, .. }
            | Frame::Headers { headers, .. } => {
                if !headers.is_empty() {
                    self.push(None, Some(headers.clone()))?;
                }
            }
            Frame::Data { data, .. } => {
                if !data.is_empty() {
                    self.push(Some(data.clone()), None)?;
                }
            }
            Frame::RstStream { status, .. } => {
                self.close();
                return Err(SessionError::StreamReset(*status));
            }
            _ => {}
        }

        if frame.is_fin() {
            self.close();
            return Err(SessionError::EndOfStream);
        }
        Ok(())
    }

    pub(crate) fn close(&self) -> bool {
        self.queue.close()
    }

    fn absorb(&self, msg: &StreamMessage) {
        if let Some(headers) = &msg.headers {
            self.headers.lock().merge(headers);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use spdymux_frame::{Flags, ResetStatus};

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs.iter().copied().collect()
    }

    fn data_frame(data: &'static [u8], flags: Flags) -> Frame {
        Frame::Data {
            stream_id: 1,
            flags,
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn receive_returns_messages_in_order() {
        let reader = StreamReader::new(1);
        reader.push(None, Some(headers(&[("a", "1")]))).unwrap();
        reader.push(Some(Bytes::from_static(b"x")), None).unwrap();

        let first = reader.receive().unwrap();
        assert_eq!(first, StreamMessage::headers(headers(&[("a", "1")])));
        assert_eq!(reader.headers().get("a"), Some("1"));

        let second = reader.receive().unwrap();
        assert_eq!(second, StreamMessage::data(Bytes::from_static(b"x")));
    }

    #[test]
    fn fin_frame_closes_input_after_queueing_payload() {
        let reader = StreamReader::new(1);

        let result = reader.ingest(&data_frame(b"last", Flags::FIN));
        assert!(matches!(result, Err(SessionError::EndOfStream)));
        assert!(reader.is_closed());

        assert_eq!(reader.receive().unwrap().data.unwrap().as_ref(), b"last");
        assert!(reader.receive().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn header_frames_apply_before_end_of_stream() {
        let reader = StreamReader::new(1);
        reader
            .ingest(&Frame::SynStream {
                stream_id: 1,
                flags: Flags::NONE,
                headers: headers(&[(":method", "GET")]),
            })
            .unwrap();
        let _ = reader.ingest(&Frame::Headers {
            stream_id: 1,
            flags: Flags::FIN,
            headers: headers(&[("trailer", "done")]),
        });

        while reader.receive().is_ok() {}

        let accumulated = reader.headers();
        assert_eq!(accumulated.get(":method"), Some("GET"));
        assert_eq!(accumulated.get("trailer"), Some("done"));
    }

    #[test]
    fn empty_fin_frame_queues_nothing() {
        let reader = StreamReader::new(1);
        let _ = reader.ingest(&data_frame(b"", Flags::FIN));
        assert!(reader.receive().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn frame_after_fin_is_rejected() {
        let reader = StreamReader::new(9);
        let _ = reader.ingest(&data_frame(b"", Flags::FIN));

        let err = reader.ingest(&data_frame(b"late", Flags::NONE)).unwrap_err();
        assert!(matches!(err, SessionError::InputClosed(9)));
    }

    #[test]
    fn reset_closes_input() {
        let reader = StreamReader::new(1);
        let err = reader
            .ingest(&Frame::RstStream {
                stream_id: 1,
                status: ResetStatus::Cancel,
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::StreamReset(ResetStatus::Cancel)));
        assert!(reader.is_closed());
    }

    #[test]
    fn wait_for_header_skips_data() {
        let reader = Arc::new(StreamReader::new(1));
        let waiter = {
            let reader = Arc::clone(&reader);
            thread::spawn(move || reader.wait_for_header("Status"))
        };

        reader.push(Some(Bytes::from_static(b"noise")), None).unwrap();
        reader.push(None, Some(headers(&[("status", "200")]))).unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), "200");
        assert!(reader.queue.is_empty());
    }

    #[test]
    fn wait_for_header_reports_end_of_stream() {
        let reader = StreamReader::new(1);
        reader.push(Some(Bytes::from_static(b"x")), None).unwrap();
        reader.close();

        let err = reader.wait_for_header("status").unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn pipe_forwards_headers_data_and_half_close() {
        let reader = StreamReader::new(2);
        let writer = StreamWriter::new(2, false);
        reader.push(None, Some(headers(&[("A", "1")]))).unwrap();
        reader.push(Some(Bytes::from_static(b"x")), None).unwrap();
        reader.push(Some(Bytes::from_static(b"y")), None).unwrap();
        reader.close();

        reader.pipe(&writer).unwrap();

        let mut frames = Vec::new();
        while let Ok(frame) = writer.next_frame() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 4);
        assert!(matches!(
            &frames[0],
            Frame::SynReply { headers, flags, .. } if headers.get("a") == Some("1") && !flags.contains(Flags::FIN)
        ));
        assert_eq!(frames[1], data_frame_for(2, b"x", Flags::NONE));
        assert_eq!(frames[2], data_frame_for(2, b"y", Flags::NONE));
        assert_eq!(frames[3], data_frame_for(2, b"", Flags::FIN));
    }

    fn data_frame_for(stream_id: u32, data: &'static [u8], flags: Flags) -> Frame {
        Frame::Data {
            stream_id,
            flags,
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn receive_timeout_on_idle_stream() {
        let reader = StreamReader::new(1);
        let err = reader
            .receive_timeout(Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
    }
}
