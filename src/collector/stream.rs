//! Bounded-wait event sources.
//!
//! Recorders never block indefinitely on a source: every read goes through
//! [`EventStream::poll`] with a timeout, so a cancelled session stops within
//! one poll interval even when no events arrive.

use crate::collector::types::{wall_clock_secs, Event};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;
use thiserror::Error;

/// Errors produced while reading from an event source.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The source ended; no further events will arrive.
    #[error("event stream closed")]
    Closed,

    /// The source failed and cannot be read from again.
    #[error("event stream read failed: {message}")]
    Read { message: String },
}

impl StreamError {
    /// Whether this error ends the stream normally rather than as a fault.
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamError::Closed)
    }
}

/// A source of timestamped events read with a bounded wait.
pub trait EventStream: Send {
    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` when the timeout elapses without an event.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, StreamError>;
}

impl<S: EventStream + ?Sized> EventStream for Box<S> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, StreamError> {
        (**self).poll(timeout)
    }
}

/// Default queue depth between a producer and its [`ChannelStream`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Producer half of a channel-backed stream.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<Event>,
}

impl EventSender {
    /// Queue an event as is. Fails once the stream has been dropped.
    pub fn send(&self, event: Event) -> Result<(), StreamError> {
        self.sender.send(event).map_err(|_| StreamError::Closed)
    }

    /// Stamp the event with the current wall-clock time and queue it.
    pub fn send_now(&self, event: Event) -> Result<(), StreamError> {
        self.send(event.stamped(wall_clock_secs()))
    }

    /// Queue without blocking; the event is dropped if the queue is full.
    ///
    /// Returns `false` if the event was not queued.
    pub fn try_send(&self, event: Event) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half of a channel-backed stream.
///
/// The stream reports [`StreamError::Closed`] once every sender is dropped and
/// the queue is drained.
#[derive(Debug)]
pub struct ChannelStream {
    receiver: Receiver<Event>,
}

impl ChannelStream {
    pub fn from_receiver(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }
}

impl EventStream for ChannelStream {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, StreamError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(StreamError::Closed),
        }
    }
}

/// Create a bounded channel-backed stream.
pub fn channel_stream(capacity: usize) -> (EventSender, ChannelStream) {
    let (sender, receiver) = bounded(capacity);
    (EventSender { sender }, ChannelStream { receiver })
}
