//! Event capture for two independent controller streams.
//!
//! Each source is read by its own [`StreamRecorder`] thread through a
//! bounded-wait [`EventStream`]; [`DualCapture`] runs two of them under one
//! [`CancellationToken`] and hands back both finished [`StreamState`]s.

pub mod cancel;
pub mod dual;
pub mod metronome;
pub mod recorder;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use cancel::{CancelReason, CancellationToken};
pub use dual::{DualCapture, DualCaptureOutcome};
pub use metronome::{Metronome, CLOCK_TICKS_PER_BEAT};
pub use recorder::{CaptureError, Recording, StreamRecorder, StreamState, DEFAULT_POLL_INTERVAL};
pub use stream::{
    channel_stream, ChannelStream, EventSender, EventStream, StreamError,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use types::{wall_clock_secs, Event, EventKind, OnsetPredicate};
