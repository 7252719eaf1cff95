//! Concurrent capture of two event streams under one cancellation token.

use crate::collector::cancel::{CancelReason, CancellationToken};
use crate::collector::recorder::{
    CaptureError, Recording, StreamRecorder, StreamState, DEFAULT_POLL_INTERVAL,
};
use crate::collector::stream::EventStream;
use crate::collector::types::{wall_clock_secs, OnsetPredicate};
use crate::observe::sink::{NullSink, ObservationSink};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cancels the session if the owning recorder thread unwinds.
struct CancelOnPanic {
    token: CancellationToken,
    device_id: usize,
}

impl Drop for CancelOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.token.cancel_with(CancelReason::WorkerPanicked {
                device_id: self.device_id,
            });
        }
    }
}

enum Worker {
    Running(JoinHandle<Recording>),
    Failed(Recording),
}

impl Worker {
    fn is_finished(&self) -> bool {
        match self {
            Worker::Running(handle) => handle.is_finished(),
            Worker::Failed(_) => true,
        }
    }

    fn join(self, device_id: usize, start_time: f64) -> Recording {
        match self {
            Worker::Running(handle) => handle.join().unwrap_or_else(|_| {
                tracing::error!(device_id, "recorder thread panicked");
                Recording {
                    device_id,
                    state: StreamState::new(start_time),
                    fault: Some(CaptureError::WorkerPanicked { device_id }),
                }
            }),
            Worker::Failed(recording) => recording,
        }
    }
}

/// Both recordings of a finished dual capture.
#[derive(Debug)]
pub struct DualCaptureOutcome {
    pub first: Recording,
    pub second: Recording,
    /// Why the session was cancelled, if it was
    pub cancel_reason: Option<CancelReason>,
    pub elapsed: Duration,
}

impl DualCaptureOutcome {
    pub fn states(&self) -> (&StreamState, &StreamState) {
        (&self.first.state, &self.second.state)
    }

    pub fn faults(&self) -> impl Iterator<Item = &CaptureError> {
        self.first.fault.iter().chain(self.second.fault.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.faults().next().is_none()
    }
}

/// Runs two [`StreamRecorder`]s in parallel.
///
/// Device ids are 1 for the first stream and 2 for the second. The caller's
/// thread waits, re-checking every poll interval, until both recorders finish,
/// the token is cancelled, or the optional deadline passes; it then joins both
/// recorders before returning, so the returned states have no remaining writer.
#[derive(Clone)]
pub struct DualCapture {
    predicate: OnsetPredicate,
    poll_interval: Duration,
    deadline: Option<Duration>,
    start_time: Option<f64>,
    sink: Arc<dyn ObservationSink>,
}

impl DualCapture {
    pub fn new(predicate: OnsetPredicate) -> Self {
        Self {
            predicate,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            start_time: None,
            sink: Arc::new(NullSink),
        }
    }

    /// Interval for both the orchestrator's wait loop and each recorder's
    /// bounded read.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Cancel the session once this much time has passed.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use a fixed session start time instead of the wall clock.
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn run<A, B>(&self, stream1: A, stream2: B, token: &CancellationToken) -> DualCaptureOutcome
    where
        A: EventStream + 'static,
        B: EventStream + 'static,
    {
        let started = Instant::now();
        let start_time = self.start_time.unwrap_or_else(wall_clock_secs);

        let first = self.spawn_recorder(1, stream1, start_time, token);
        let second = self.spawn_recorder(2, stream2, start_time, token);
        tracing::info!("dual capture started");

        loop {
            if first.is_finished() && second.is_finished() {
                break;
            }
            if token.is_cancelled() {
                tracing::info!(reason = ?token.reason(), "capture cancelled");
                break;
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    tracing::info!(deadline_secs = deadline.as_secs_f64(), "capture deadline reached");
                    token.cancel_with(CancelReason::DeadlineReached);
                    break;
                }
            }
            thread::sleep(self.poll_interval);
        }

        let first = first.join(1, start_time);
        let second = second.join(2, start_time);

        DualCaptureOutcome {
            first,
            second,
            cancel_reason: token.reason(),
            elapsed: started.elapsed(),
        }
    }

    fn spawn_recorder<S>(
        &self,
        device_id: usize,
        stream: S,
        start_time: f64,
        token: &CancellationToken,
    ) -> Worker
    where
        S: EventStream + 'static,
    {
        let recorder = StreamRecorder::new(device_id, self.predicate)
            .with_poll_interval(self.poll_interval)
            .with_start_time(start_time);
        let worker_token = token.clone();
        let sink = Arc::clone(&self.sink);

        let spawned = thread::Builder::new()
            .name(format!("recorder-{device_id}"))
            .spawn(move || {
                let _guard = CancelOnPanic {
                    token: worker_token.clone(),
                    device_id,
                };
                let mut stream = stream;
                recorder.capture(&mut stream, &worker_token, sink.as_ref())
            });

        match spawned {
            Ok(handle) => Worker::Running(handle),
            Err(source) => {
                tracing::error!(device_id, error = %source, "failed to spawn recorder thread");
                token.cancel_with(CancelReason::StreamFault { device_id });
                Worker::Failed(Recording {
                    device_id,
                    state: StreamState::new(start_time),
                    fault: Some(CaptureError::Spawn { device_id, source }),
                })
            }
        }
    }
}
