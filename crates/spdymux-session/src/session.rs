use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use spdymux_frame::{Frame, FrameError, FrameReadWriter, ResetStatus, MAX_STREAM_ID};

use crate::config::{Role, SessionConfig};
use crate::error::{Result, SessionError};
use crate::handler::StreamHandler;
use crate::observer::{SessionEvent, SessionObserver, TracingObserver};
use crate::stream::Stream;

/// A multiplexed connection: many streams over one frame transport.
///
/// `Session` is a cheap handle; clones share the same stream table. The
/// frame pump ([`run`](Self::run)) reads frames and routes them to streams,
/// and every registered stream has a thread draining its writer onto the
/// transport.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    transport: Arc<dyn FrameReadWriter>,
    role: Role,
    config: SessionConfig,
    handler: Option<Arc<dyn StreamHandler>>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<SessionState>,
    runner: Mutex<Option<JoinHandle<Result<()>>>>,
}

struct SessionState {
    streams: HashMap<u32, Arc<Stream>>,
    last_outgoing_id: u32,
    last_incoming_id: u32,
    closed: bool,
}

impl SessionState {
    fn next_outgoing_id(&self, role: Role) -> u32 {
        match self.last_outgoing_id {
            0 => role.first_local_id(),
            last => last + 2,
        }
    }

    fn next_incoming_id(&self, role: Role) -> u32 {
        match self.last_incoming_id {
            0 => role.first_remote_id(),
            last => last + 2,
        }
    }
}

/// Configures and starts a [`Session`].
pub struct SessionBuilder {
    transport: Arc<dyn FrameReadWriter>,
    role: Role,
    config: SessionConfig,
    handler: Option<Arc<dyn StreamHandler>>,
    observer: Arc<dyn SessionObserver>,
}

impl SessionBuilder {
    /// Serve streams the peer opens with `handler`.
    ///
    /// Without a handler, peer-opened streams are refused.
    pub fn handler(mut self, handler: impl StreamHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replace the default [`TracingObserver`].
    pub fn observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the session without starting the frame pump.
    ///
    /// The caller is expected to drive [`Session::run`].
    pub fn build(self) -> Session {
        Session {
            shared: Arc::new(Shared {
                transport: self.transport,
                role: self.role,
                config: self.config,
                handler: self.handler,
                observer: self.observer,
                state: Mutex::new(SessionState {
                    streams: HashMap::new(),
                    last_outgoing_id: 0,
                    last_incoming_id: 0,
                    closed: false,
                }),
                runner: Mutex::new(None),
            }),
        }
    }

    /// Build the session and run its frame pump on a new thread.
    pub fn spawn(self) -> Result<Session> {
        let session = self.build();
        let runner = session.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-session", session.shared.config.thread_name_prefix))
            .spawn(move || runner.run())?;
        *session.shared.runner.lock() = Some(handle);
        Ok(session)
    }
}

impl Session {
    /// Start configuring a session over `transport`.
    pub fn builder<T>(transport: T, role: Role) -> SessionBuilder
    where
        T: FrameReadWriter + 'static,
    {
        SessionBuilder {
            transport: Arc::new(transport),
            role,
            config: SessionConfig::default(),
            handler: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Read frames until the transport fails or the session is closed.
    ///
    /// A session without a stream handler first announces a go-away. Read
    /// timeouts only serve to notice a local [`close`](Self::close); any
    /// other transport error closes the session and is returned, unless the
    /// session had already been closed locally.
    pub fn run(&self) -> Result<()> {
        if self.shared.handler.is_none() && self.shared.config.go_away_without_handler {
            let go_away = Frame::GoAway {
                last_good_stream_id: 0,
            };
            if let Err(err) = self.shared.transport.write_frame(&go_away) {
                return Err(self.fail(err));
            }
            self.observe(SessionEvent::GoAwaySent);
        }

        loop {
            match self.shared.transport.read_frame() {
                Ok(frame) => {
                    self.observe(SessionEvent::FrameReceived { frame: &frame });
                    self.process_frame(frame);
                }
                Err(err) if err.is_timeout() => {
                    if self.is_closed() {
                        return Ok(());
                    }
                }
                Err(_) if self.is_closed() => return Ok(()),
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    /// Route one inbound frame.
    ///
    /// This is what the frame pump calls for every frame it reads. Stream
    /// id violations are answered with a `PROTOCOL_ERROR` reset and never
    /// affect other streams.
    pub fn process_frame(&self, frame: Frame) {
        let stream_id = frame.stream_id();
        if stream_id == 0 {
            self.process_session_frame(&frame);
            return;
        }

        let opening = matches!(frame, Frame::SynStream { .. });
        let stream = if opening {
            match self.new_stream(stream_id, false) {
                Ok(stream) => stream,
                Err(err) => {
                    self.protocol_violation(stream_id, &err);
                    return;
                }
            }
        } else {
            match self.stream(stream_id) {
                Some(stream) => stream,
                None if matches!(frame, Frame::RstStream { .. }) => {
                    // never answer a reset with a reset
                    self.observe(SessionEvent::FrameIgnored { frame: &frame });
                    return;
                }
                None => {
                    self.protocol_violation(stream_id, &SessionError::UnknownStream(stream_id));
                    return;
                }
            }
        };

        self.deliver(&stream, &frame);
        if opening {
            self.dispatch(stream);
        }
    }

    fn deliver(&self, stream: &Stream, frame: &Frame) {
        let stream_id = stream.id();
        match stream.ingest(frame) {
            Ok(()) => {}
            Err(SessionError::EndOfStream) => {
                self.observe(SessionEvent::InputClosed { stream_id });
                if stream.output().is_closed() {
                    self.retire(stream_id);
                }
            }
            Err(err) if err.is_protocol_violation() => {
                self.retire(stream_id);
                self.protocol_violation(stream_id, &err);
            }
            Err(err) => {
                self.observe(SessionEvent::StreamFailed {
                    stream_id,
                    error: &err,
                });
                self.retire(stream_id);
            }
        }
    }

    /// Register stream `id` as opened locally (`local`) or by the peer.
    ///
    /// The id must have the parity of the opening side and be exactly the
    /// next id in that side's sequence. On failure nothing changes.
    pub fn new_stream(&self, id: u32, local: bool) -> Result<Arc<Stream>> {
        let stream = {
            let mut state = self.shared.state.lock();
            self.register(&mut state, id, local)?
        };
        self.start(&stream)?;
        Ok(stream)
    }

    /// Open a new stream with the next local id.
    ///
    /// Nothing is sent until the stream's writer sends its first frame.
    pub fn open_stream(&self) -> Result<Arc<Stream>> {
        let stream = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(SessionError::SessionClosed);
            }
            let id = state.next_outgoing_id(self.shared.role);
            if id > MAX_STREAM_ID {
                return Err(SessionError::StreamIdsExhausted);
            }
            self.register(&mut state, id, true)?
        };
        self.start(&stream)?;
        Ok(stream)
    }

    /// Remove stream `id` and close both of its halves locally.
    ///
    /// Nothing is sent to the peer; frames already queued on the writer are
    /// still written.
    pub fn close_stream(&self, id: u32) -> Result<()> {
        if self.retire(id) {
            Ok(())
        } else {
            Err(SessionError::NoSuchStream(id))
        }
    }

    /// Send a reset for stream `id` and remove it.
    pub fn reset_stream(&self, id: u32, status: ResetStatus) -> Result<()> {
        if !self.retire(id) {
            return Err(SessionError::NoSuchStream(id));
        }
        let reset = Frame::RstStream {
            stream_id: id,
            status,
        };
        self.shared
            .transport
            .write_frame(&reset)
            .map_err(|err| self.fail(err))
    }

    /// Write a frame straight to the transport, bypassing stream writers.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        Ok(self.shared.transport.write_frame(frame)?)
    }

    /// Close every stream and refuse new ones. Idempotent.
    ///
    /// This does not interrupt a frame pump blocked in a read; configure a
    /// read timeout on the transport, or shut the connection down, for
    /// [`run`](Self::run) to return promptly.
    pub fn close(&self) {
        let (ids, first) = {
            let mut state = self.shared.state.lock();
            let first = !state.closed;
            state.closed = true;
            (state.streams.keys().copied().collect::<Vec<_>>(), first)
        };
        let streams = ids.len();
        for id in ids {
            self.retire(id);
        }
        if first {
            self.observe(SessionEvent::SessionClosed { streams });
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of registered streams.
    pub fn n_streams(&self) -> usize {
        self.shared.state.lock().streams.len()
    }

    pub fn stream(&self, id: u32) -> Option<Arc<Stream>> {
        self.shared.state.lock().streams.get(&id).cloned()
    }

    /// Id the next locally opened stream would get.
    pub fn next_outgoing_id(&self) -> u32 {
        self.shared
            .state
            .lock()
            .next_outgoing_id(self.shared.role)
    }

    /// Id the peer's next stream must carry.
    pub fn next_incoming_id(&self) -> u32 {
        self.shared
            .state
            .lock()
            .next_incoming_id(self.shared.role)
    }

    /// Wait for a spawned frame pump to finish and return its result.
    ///
    /// Returns immediately for sessions not started with
    /// [`SessionBuilder::spawn`], and on every call after the first.
    pub fn join(&self) -> Result<()> {
        let handle = self.shared.runner.lock().take();
        match handle {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("session thread panicked").into())),
            None => Ok(()),
        }
    }

    fn register(&self, state: &mut SessionState, id: u32, local: bool) -> Result<Arc<Stream>> {
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        if state.streams.contains_key(&id) {
            return Err(SessionError::DuplicateStream(id));
        }

        let direction = if local { "local" } else { "remote" };
        let invalid = |reason| SessionError::InvalidStreamId {
            id,
            direction,
            reason,
        };
        if id == 0 || id > MAX_STREAM_ID {
            return Err(invalid("outside the 31-bit id space"));
        }
        if self.shared.role.is_local_id(id) != local {
            return Err(invalid("wrong parity"));
        }
        let expected = if local {
            state.next_outgoing_id(self.shared.role)
        } else {
            state.next_incoming_id(self.shared.role)
        };
        if id != expected {
            return Err(invalid("out of sequence"));
        }

        let stream = Arc::new(Stream::new(id, local, Arc::downgrade(&self.shared)));
        state.streams.insert(id, Arc::clone(&stream));
        if local {
            state.last_outgoing_id = id;
        } else {
            state.last_incoming_id = id;
        }
        Ok(stream)
    }

    /// Start the writer pump of a freshly registered stream.
    fn start(&self, stream: &Arc<Stream>) -> Result<()> {
        let stream_id = stream.id();
        self.observe(SessionEvent::StreamOpened {
            stream_id,
            local: stream.is_mine(),
        });

        let session = self.clone();
        let pumped = Arc::clone(stream);
        let spawned = thread::Builder::new()
            .name(format!(
                "{}-stream-{stream_id}",
                self.shared.config.thread_name_prefix
            ))
            .spawn(move || session.pump(&pumped));
        if let Err(err) = spawned {
            self.retire(stream_id);
            return Err(err.into());
        }
        Ok(())
    }

    /// Drain a stream's writer onto the transport.
    ///
    /// A frame the transport refuses to encode resets only this stream. An
    /// I/O failure is fatal to the session.
    fn pump(&self, stream: &Stream) {
        let stream_id = stream.id();
        while let Ok(frame) = stream.output().next_frame() {
            match self.shared.transport.write_frame(&frame) {
                Ok(()) => {}
                // the connection may hold a partial frame now
                Err(err @ (FrameError::Io(_) | FrameError::ConnectionClosed)) => {
                    self.fail(err);
                    return;
                }
                // rejected before any byte was written; only this stream is lost
                Err(err) => {
                    let err = SessionError::from(err);
                    self.observe(SessionEvent::StreamFailed {
                        stream_id,
                        error: &err,
                    });
                    self.retire(stream_id);
                    self.send_reset(stream_id, ResetStatus::InternalError);
                    return;
                }
            }
        }
        if stream.input().is_closed() {
            self.retire(stream_id);
        }
    }

    /// Hand a peer-opened stream to the handler, or refuse it.
    fn dispatch(&self, stream: Arc<Stream>) {
        let stream_id = stream.id();
        let Some(handler) = self.shared.handler.clone() else {
            self.retire(stream_id);
            self.send_reset(stream_id, ResetStatus::RefusedStream);
            return;
        };

        let session = self.clone();
        let spawned = thread::Builder::new()
            .name(format!(
                "{}-handler-{stream_id}",
                self.shared.config.thread_name_prefix
            ))
            .spawn(move || session.serve(handler.as_ref(), stream));
        if let Err(err) = spawned {
            let err = SessionError::from(err);
            self.observe(SessionEvent::HandlerFailed {
                stream_id,
                error: &err,
            });
            self.retire(stream_id);
            self.send_reset(stream_id, ResetStatus::InternalError);
        }
    }

    fn serve(&self, handler: &dyn StreamHandler, stream: Arc<Stream>) {
        let stream_id = stream.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.serve(Arc::clone(&stream))))
            .unwrap_or_else(|payload| Err(SessionError::Handler(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => {
                if let Err(err) = stream.output().close() {
                    self.observe(SessionEvent::StreamFailed {
                        stream_id,
                        error: &err,
                    });
                }
            }
            Err(err) => {
                self.observe(SessionEvent::HandlerFailed {
                    stream_id,
                    error: &err,
                });
                self.retire(stream_id);
                self.send_reset(stream_id, ResetStatus::InternalError);
            }
        }
    }

    fn process_session_frame(&self, frame: &Frame) {
        match frame {
            Frame::Ping { id } => {
                self.observe(SessionEvent::SessionFrame { kind: frame.kind() });
                if self.shared.config.reply_to_ping && !self.shared.role.is_local_id(*id) {
                    match self.shared.transport.write_frame(frame) {
                        Ok(()) => self.observe(SessionEvent::PingAnswered { id: *id }),
                        Err(err) => {
                            self.fail(err);
                        }
                    }
                }
            }
            Frame::Settings { .. } | Frame::Noop | Frame::GoAway { .. } => {
                self.observe(SessionEvent::SessionFrame { kind: frame.kind() });
            }
            _ => self.observe(SessionEvent::FrameIgnored { frame }),
        }
    }

    fn protocol_violation(&self, stream_id: u32, err: &SessionError) {
        self.observe(SessionEvent::ProtocolViolation {
            stream_id,
            error: err,
        });
        self.send_reset(stream_id, ResetStatus::ProtocolError);
    }

    fn send_reset(&self, stream_id: u32, status: ResetStatus) {
        let reset = Frame::RstStream { stream_id, status };
        if let Err(err) = self.shared.transport.write_frame(&reset) {
            self.fail(err);
        }
    }

    /// Remove a stream from the table and shut it down. False if absent.
    fn retire(&self, stream_id: u32) -> bool {
        let removed = self.shared.state.lock().streams.remove(&stream_id);
        match removed {
            Some(stream) => {
                stream.shutdown();
                self.observe(SessionEvent::StreamClosed { stream_id });
                true
            }
            None => false,
        }
    }

    fn fail(&self, err: FrameError) -> SessionError {
        let err = SessionError::from(err);
        self.observe(SessionEvent::TransportFailed { error: &err });
        self.close();
        err
    }

    fn observe(&self, event: SessionEvent<'_>) {
        self.shared.observer.on_event(&event);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Session")
            .field("role", &self.shared.role)
            .field("streams", &state.streams.len())
            .field("closed", &state.closed)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}
