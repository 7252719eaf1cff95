//! Live observation records and the sinks that consume them.
//!
//! Recorders emit one [`Observation`] per event. Formatting and output are the
//! sink's business, which keeps the capture loop free of printing.

use crate::collector::types::{Event, EventKind};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One observed event as reported to the live log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub device_id: usize,
    pub timestamp: f64,
    pub kind: EventKind,
    pub note: Option<u8>,
    pub velocity: u8,
    /// MIDI channel the message arrived on, if the source reports one
    pub channel: Option<u8>,
    /// Seconds since the previous event on the same device
    pub delta_secs: f64,
    /// Whether the onset predicate accepted the event
    pub is_onset: bool,
}

impl Observation {
    pub fn new(device_id: usize, event: &Event, delta_secs: f64, is_onset: bool) -> Self {
        Self {
            device_id,
            timestamp: event.timestamp,
            kind: event.kind,
            note: event.note,
            velocity: event.velocity,
            channel: event.channel,
            delta_secs,
            is_onset,
        }
    }
}

/// Receives observations from recorder threads.
pub trait ObservationSink: Send + Sync {
    fn observe(&self, observation: &Observation);
}

impl<T: ObservationSink + ?Sized> ObservationSink for Arc<T> {
    fn observe(&self, observation: &Observation) {
        (**self).observe(observation)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ObservationSink for NullSink {
    fn observe(&self, _observation: &Observation) {}
}

/// Writes observations as structured `tracing` events at `info`.
///
/// Every message is logged except clock ticks, which only appear when
/// `print_clock` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    pub print_clock: bool,
}

impl TracingSink {
    pub fn new(print_clock: bool) -> Self {
        Self { print_clock }
    }

    /// Whether this observation is written to the log.
    pub fn logs(&self, obs: &Observation) -> bool {
        obs.is_onset || obs.kind != EventKind::Clock || self.print_clock
    }
}

impl ObservationSink for TracingSink {
    fn observe(&self, obs: &Observation) {
        if !self.logs(obs) {
            return;
        }
        let delta = format!("{:.6}", obs.delta_secs);

        if obs.is_onset {
            tracing::info!(
                device_id = obs.device_id,
                note = ?obs.note,
                velocity = obs.velocity,
                channel = ?obs.channel,
                delta_secs = %delta,
                "onset"
            );
            return;
        }

        match obs.kind {
            EventKind::Clock => tracing::info!(
                device_id = obs.device_id,
                delta_secs = %delta,
                "clock"
            ),
            kind => tracing::info!(
                device_id = obs.device_id,
                kind = ?kind,
                note = ?obs.note,
                velocity = obs.velocity,
                channel = ?obs.channel,
                delta_secs = %delta,
                "message"
            ),
        }
    }
}

/// Forwards observations over a channel without blocking the recorder.
///
/// Observations are dropped when the channel is full or disconnected.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Observation>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Observation>) -> Self {
        Self { sender }
    }
}

impl ObservationSink for ChannelSink {
    fn observe(&self, observation: &Observation) {
        let _ = self.sender.try_send(*observation);
    }
}

/// Sends every observation to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ObservationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ObservationSink for FanoutSink {
    fn observe(&self, observation: &Observation) {
        for sink in &self.sinks {
            sink.observe(observation);
        }
    }
}
