//! Event types observed on a controller stream.
//!
//! Timestamps are wall-clock seconds sampled when the process observes the
//! event, not when the hardware produced it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn wall_clock_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Coarse classification of a controller message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A note-on style message; becomes an onset when the predicate accepts it
    OnsetCandidate,
    /// Timing clock tick
    Clock,
    /// Anything else (control changes, note-off, transport)
    Other,
}

/// A single timestamped message from one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Observation time in seconds
    pub timestamp: f64,
    /// Message kind
    pub kind: EventKind,
    /// Note number, when the message carries one
    pub note: Option<u8>,
    /// Intensity; zero for messages without velocity
    pub velocity: u8,
    /// MIDI channel, when the source reports one; carried into the live log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

impl Event {
    /// A note-on message. A velocity of zero is a release in running status.
    pub fn note_on(timestamp: f64, note: u8, velocity: u8) -> Self {
        Self {
            timestamp,
            kind: EventKind::OnsetCandidate,
            note: Some(note),
            velocity,
            channel: None,
        }
    }

    /// A timing clock tick.
    pub fn clock(timestamp: f64) -> Self {
        Self {
            timestamp,
            kind: EventKind::Clock,
            note: None,
            velocity: 0,
            channel: None,
        }
    }

    /// Any message that is neither a note-on nor a clock tick.
    pub fn other(timestamp: f64) -> Self {
        Self {
            timestamp,
            kind: EventKind::Other,
            note: None,
            velocity: 0,
            channel: None,
        }
    }

    /// Attach a channel number.
    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Copy of this event re-stamped with the given time.
    pub fn stamped(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Decides which observed events count as onsets.
///
/// An event is an onset when it is an onset candidate with positive velocity
/// and, if a note filter is set, carries exactly that note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnsetPredicate {
    pub note_filter: Option<u8>,
}

impl OnsetPredicate {
    pub fn new(note_filter: Option<u8>) -> Self {
        Self { note_filter }
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.kind == EventKind::OnsetCandidate
            && event.velocity > 0
            && self.note_filter.map_or(true, |n| event.note == Some(n))
    }
}
