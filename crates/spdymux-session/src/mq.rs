use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SessionError};

/// Unbounded FIFO handoff between the frame pump and stream consumers.
///
/// `send` never blocks. `receive` blocks the calling thread until a message
/// arrives or the queue is closed; once closed, queued messages are still
/// delivered in order and every receive after the drain fails with
/// [`SessionError::EndOfStream`].
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Enqueue a message. Hands the message back if the queue is closed.
    pub fn send(&self, msg: T) -> std::result::Result<(), T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(msg);
        }
        state.items.push_back(msg);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until the next message is available.
    pub fn receive(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return Ok(msg);
            }
            if state.closed {
                return Err(SessionError::EndOfStream);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like [`receive`](Self::receive), but gives up after `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return Ok(msg);
            }
            if state.closed {
                return Err(SessionError::EndOfStream);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match state.items.pop_front() {
                    Some(msg) => Ok(msg),
                    None if state.closed => Err(SessionError::EndOfStream),
                    None => Err(SessionError::Timeout(timeout)),
                };
            }
        }
    }

    /// Close the queue and wake every blocked receiver.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);
        self.ready.notify_all();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of messages waiting to be received.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
