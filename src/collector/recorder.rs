//! Per-stream capture loop and interval bookkeeping.

use crate::collector::cancel::{CancelReason, CancellationToken};
use crate::collector::stream::{EventStream, StreamError};
use crate::collector::types::{wall_clock_secs, Event, OnsetPredicate};
use crate::core::filter::derive_intervals;
use crate::observe::sink::{Observation, ObservationSink};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How long a recorder waits on its stream before re-checking cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that end a capture early.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("stream fault on device {device_id}: {source}")]
    StreamFault {
        device_id: usize,
        #[source]
        source: StreamError,
    },

    #[error("recorder thread for device {device_id} panicked")]
    WorkerPanicked { device_id: usize },

    #[error("failed to start recorder thread for device {device_id}: {source}")]
    Spawn {
        device_id: usize,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn device_id(&self) -> usize {
        match self {
            CaptureError::StreamFault { device_id, .. }
            | CaptureError::WorkerPanicked { device_id }
            | CaptureError::Spawn { device_id, .. } => *device_id,
        }
    }
}

/// Interval and onset buffers for one source.
///
/// Written by exactly one recorder while capture runs; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    /// Wall-clock time at which capture started
    pub start_time: f64,
    /// Latest event timestamp seen (or `start_time` before any event)
    pub previous_time: f64,
    /// Delta to the previous event, for every event
    pub all_intervals: Vec<f64>,
    /// Delta to the previous event, for events accepted as onsets
    pub onset_intervals: Vec<f64>,
    /// Timestamps of accepted onsets, strictly increasing
    pub onset_timestamps: Vec<f64>,
}

impl StreamState {
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time,
            previous_time: start_time,
            ..Self::default()
        }
    }

    /// Book one event. Returns the delta to the previous event and whether the
    /// event was recorded as an onset.
    ///
    /// An event stamped before the previous event (or before the start time)
    /// gets a delta of 0 and leaves `previous_time` where it was, so intervals
    /// are never negative. An accepted onset whose timestamp does not advance
    /// past the last onset is counted as a plain event so `onset_timestamps`
    /// stays strictly increasing.
    pub fn record(&mut self, event: &Event, predicate: &OnsetPredicate) -> (f64, bool) {
        let mut delta = event.timestamp - self.previous_time;
        if delta < 0.0 {
            tracing::warn!(
                timestamp = event.timestamp,
                previous_time = self.previous_time,
                "event stamped before the previous event; delta clamped to 0"
            );
            delta = 0.0;
        } else {
            self.previous_time = event.timestamp;
        }
        self.all_intervals.push(delta);

        let mut is_onset = predicate.matches(event);
        if is_onset {
            if let Some(&last) = self.onset_timestamps.last() {
                if event.timestamp <= last {
                    tracing::warn!(
                        timestamp = event.timestamp,
                        last_onset = last,
                        "onset timestamp did not advance; not recorded as onset"
                    );
                    is_onset = false;
                }
            }
        }

        if is_onset {
            self.onset_intervals.push(delta);
            self.onset_timestamps.push(event.timestamp);
        }

        (delta, is_onset)
    }

    pub fn event_count(&self) -> usize {
        self.all_intervals.len()
    }

    pub fn onset_count(&self) -> usize {
        self.onset_timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_intervals.is_empty()
    }

    /// Smallest delta between consecutive events, if any event was seen.
    pub fn min_delta(&self) -> Option<f64> {
        self.all_intervals.iter().copied().reduce(f64::min)
    }

    /// Timestamps of every observed event, rebuilt from the start time and the
    /// running sum of `all_intervals`.
    pub fn event_timestamps(&self) -> Vec<f64> {
        self.all_intervals
            .iter()
            .scan(self.start_time, |t, delta| {
                *t += delta;
                Some(*t)
            })
            .collect()
    }

    /// Deltas between consecutive onsets only.
    pub fn derived_onset_intervals(&self) -> Vec<f64> {
        derive_intervals(&self.onset_timestamps)
    }
}

/// The result of one recorder run.
///
/// `state` holds whatever was captured before the run ended, including when it
/// ended on a fault.
#[derive(Debug)]
pub struct Recording {
    pub device_id: usize,
    pub state: StreamState,
    pub fault: Option<CaptureError>,
}

impl Recording {
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn into_result(self) -> Result<StreamState, CaptureError> {
        match self.fault {
            Some(err) => Err(err),
            None => Ok(self.state),
        }
    }
}

/// Consumes one event stream into a [`StreamState`].
#[derive(Debug, Clone)]
pub struct StreamRecorder {
    device_id: usize,
    predicate: OnsetPredicate,
    poll_interval: Duration,
    start_time: Option<f64>,
}

impl StreamRecorder {
    pub fn new(device_id: usize, predicate: OnsetPredicate) -> Self {
        Self {
            device_id,
            predicate,
            poll_interval: DEFAULT_POLL_INTERVAL,
            start_time: None,
        }
    }

    /// Upper bound on how long one read may wait before cancellation is
    /// checked again.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Use a fixed start time instead of the wall clock at capture start.
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Run the capture loop until the token is cancelled, the stream closes,
    /// or the stream fails.
    ///
    /// On a fatal read error the token is cancelled so sibling recorders stop
    /// too, and the fault is returned with the data captured so far.
    pub fn capture<S>(
        &self,
        stream: &mut S,
        token: &CancellationToken,
        sink: &dyn ObservationSink,
    ) -> Recording
    where
        S: EventStream + ?Sized,
    {
        let device_id = self.device_id;
        let mut state = StreamState::new(self.start_time.unwrap_or_else(wall_clock_secs));
        tracing::debug!(device_id, "capture started");

        let fault = loop {
            if token.is_cancelled() {
                break None;
            }

            match stream.poll(self.poll_interval) {
                Ok(Some(event)) => {
                    let (delta, is_onset) = state.record(&event, &self.predicate);
                    sink.observe(&Observation::new(device_id, &event, delta, is_onset));
                }
                Ok(None) => {}
                Err(err) if err.is_closed() => {
                    tracing::info!(device_id, "event stream closed");
                    break None;
                }
                Err(source) => {
                    tracing::error!(device_id, error = %source, "event stream failed");
                    token.cancel_with(CancelReason::StreamFault { device_id });
                    break Some(CaptureError::StreamFault { device_id, source });
                }
            }
        };

        tracing::info!(
            device_id,
            events = state.event_count(),
            onsets = state.onset_count(),
            "capture finished"
        );

        Recording {
            device_id,
            state,
            fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::stream::channel_stream;
    use crate::observe::sink::{ChannelSink, NullSink};
    use crossbeam_channel::unbounded;
    use std::collections::VecDeque;

    /// Replays a fixed script of poll results, then reports closed.
    struct ScriptedStream {
        script: VecDeque<Result<Option<Event>, StreamError>>,
    }

    impl ScriptedStream {
        fn new(script: Vec<Result<Option<Event>, StreamError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl EventStream for ScriptedStream {
        fn poll(&mut self, _timeout: Duration) -> Result<Option<Event>, StreamError> {
            self.script.pop_front().unwrap_or(Err(StreamError::Closed))
        }
    }

    fn recorder() -> StreamRecorder {
        StreamRecorder::new(1, OnsetPredicate::default())
            .with_poll_interval(Duration::from_millis(5))
            .with_start_time(10.0)
    }

    #[test]
    fn test_intervals_and_onsets() {
        let mut stream = ScriptedStream::new(vec![
            Ok(Some(Event::note_on(10.5, 60, 100))),
            Ok(Some(Event::clock(10.75))),
            Ok(None),
            Ok(Some(Event::note_on(11.0, 60, 0))),
            Ok(Some(Event::note_on(11.5, 62, 80))),
        ]);

        let recording = recorder().capture(&mut stream, &CancellationToken::new(), &NullSink);
        let state = recording.into_result().unwrap();

        assert_eq!(state.all_intervals, vec![0.5, 0.25, 0.25, 0.5]);
        assert_eq!(state.onset_intervals, vec![0.5, 0.5]);
        assert_eq!(state.onset_timestamps, vec![10.5, 11.5]);
        assert_eq!(state.previous_time, 11.5);
        assert_eq!(state.min_delta(), Some(0.25));
        assert_eq!(state.derived_onset_intervals(), vec![1.0]);
    }

    #[test]
    fn test_onset_intervals_differ_from_derived_intervals() {
        let mut stream = ScriptedStream::new(vec![
            Ok(Some(Event::note_on(10.5, 60, 100))),
            Ok(Some(Event::clock(11.25))),
            Ok(Some(Event::note_on(11.5, 60, 100))),
        ]);

        let state = recorder()
            .capture(&mut stream, &CancellationToken::new(), &NullSink)
            .into_result()
            .unwrap();

        // Gated delta counts from the clock tick; derived delta from the onset.
        assert_eq!(state.onset_intervals, vec![0.5, 0.25]);
        assert_eq!(state.derived_onset_intervals(), vec![1.0]);
    }

    #[test]
    fn test_note_filter_applies() {
        let mut stream = ScriptedStream::new(vec![
            Ok(Some(Event::note_on(10.5, 36, 100))),
            Ok(Some(Event::note_on(11.0, 38, 100))),
        ]);

        let state = StreamRecorder::new(1, OnsetPredicate::new(Some(38)))
            .with_start_time(10.0)
            .capture(&mut stream, &CancellationToken::new(), &NullSink)
            .into_result()
            .unwrap();

        assert_eq!(state.event_count(), 2);
        assert_eq!(state.onset_timestamps, vec![11.0]);
    }

    #[test]
    fn test_every_event_is_observed() {
        let (tx, rx) = unbounded();
        let sink = ChannelSink::new(tx);
        let mut stream = ScriptedStream::new(vec![
            Ok(Some(Event::note_on(10.5, 60, 100))),
            Ok(Some(Event::other(10.6))),
        ]);

        recorder().capture(&mut stream, &CancellationToken::new(), &sink);

        let observed: Vec<Observation> = rx.try_iter().collect();
        assert_eq!(observed.len(), 2);
        assert!(observed[0].is_onset);
        assert_eq!(observed[0].device_id, 1);
        assert!(!observed[1].is_onset);
        assert!((observed[1].delta_secs - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_cancelled_token_stops_before_reading() {
        let token = CancellationToken::new();
        token.cancel();
        let mut stream = ScriptedStream::new(vec![Ok(Some(Event::note_on(10.5, 60, 100)))]);

        let recording = recorder().capture(&mut stream, &token, &NullSink);

        assert!(!recording.is_faulted());
        assert!(recording.state.is_empty());
        assert_eq!(stream.script.len(), 1);
    }

    #[test]
    fn test_idle_stream_honours_cancellation() {
        let (_sender, mut stream) = channel_stream(4);
        let token = CancellationToken::new();
        let canceller = token.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let recording = recorder().capture(&mut stream, &token, &NullSink);
        handle.join().unwrap();

        assert!(recording.state.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_fault_cancels_token_and_keeps_partial_data() {
        let token = CancellationToken::new();
        let mut stream = ScriptedStream::new(vec![
            Ok(Some(Event::note_on(10.5, 60, 100))),
            Err(StreamError::Read {
                message: "device unplugged".to_string(),
            }),
            Ok(Some(Event::note_on(11.5, 60, 100))),
        ]);

        let recording = recorder().capture(&mut stream, &token, &NullSink);

        assert!(token.is_cancelled());
        assert_eq!(
            token.reason(),
            Some(CancelReason::StreamFault { device_id: 1 })
        );
        assert_eq!(recording.state.onset_timestamps, vec![10.5]);
        match recording.fault {
            Some(CaptureError::StreamFault { device_id, .. }) => assert_eq!(device_id, 1),
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[test]
    fn test_non_advancing_onset_is_not_recorded() {
        let mut state = StreamState::new(0.0);
        let predicate = OnsetPredicate::default();

        assert!(state.record(&Event::note_on(1.0, 60, 100), &predicate).1);
        assert!(!state.record(&Event::note_on(1.0, 61, 100), &predicate).1);

        assert_eq!(state.event_count(), 2);
        assert_eq!(state.onset_timestamps, vec![1.0]);
    }

    #[test]
    fn test_event_timestamps_rebuilt_from_intervals() {
        let mut state = StreamState::new(100.0);
        let predicate = OnsetPredicate::default();
        for t in [100.5, 101.0, 101.25] {
            state.record(&Event::clock(t), &predicate);
        }

        let rebuilt = state.event_timestamps();
        assert_eq!(rebuilt.len(), 3);
        for (got, want) in rebuilt.iter().zip([100.5, 101.0, 101.25]) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_state() {
        let state = StreamState::new(5.0);
        assert!(state.is_empty());
        assert_eq!(state.min_delta(), None);
        assert!(state.event_timestamps().is_empty());
        assert!(state.derived_onset_intervals().is_empty());
    }

    #[test]
    fn test_early_event_is_clamped_to_zero_delta() {
        let predicate = OnsetPredicate::default();
        let mut state = StreamState::new(10.0);

        let (delta, is_onset) = state.record(&Event::note_on(9.99, 60, 100), &predicate);
        assert_eq!(delta, 0.0);
        assert!(is_onset);
        assert_eq!(state.previous_time, 10.0);

        state.record(&Event::clock(10.5), &predicate);
        state.record(&Event::clock(10.25), &predicate);

        assert_eq!(state.all_intervals, vec![0.0, 0.5, 0.0]);
        assert_eq!(state.min_delta(), Some(0.0));
        assert_eq!(state.previous_time, 10.5);
        assert_eq!(state.event_timestamps(), vec![10.0, 10.5, 10.5]);
    }
}
