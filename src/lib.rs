//! Onset Synchrony - timing capture and lag analysis for two MIDI sources.
//!
//! This library records note onsets from two independent controller streams in
//! parallel, then measures how each source keeps time and how far apart the
//! two sources play.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Onset Synchrony                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ EventStream │──▶│  Recorder 1 │──▶│             │             │
//! │  └─────────────┘   └─────────────┘   │   Stream    │             │
//! │  ┌─────────────┐   ┌─────────────┐   │   States    │             │
//! │  │ EventStream │──▶│  Recorder 2 │──▶│             │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │         │                 │                 │                    │
//! │         ▼                 ▼                 ▼                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │Cancellation │   │ Observation │   │   Filter    │             │
//! │  │   Token     │   │    Sink     │   │  Windowing  │             │
//! │  └─────────────┘   └─────────────┘   │  Synchrony  │──▶ Report   │
//! │                                      └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use onset_synchrony::{
//!     collector::{wall_clock_secs, CancellationToken, DualCapture, Metronome, OnsetPredicate},
//!     config::Config,
//!     core::ReportBuilder,
//! };
//! use std::time::Duration;
//!
//! let token = CancellationToken::new();
//! let start_time = wall_clock_secs();
//! let (stream1, _) = Metronome::new(Duration::from_millis(500)).spawn(token.clone());
//! let (stream2, _) = Metronome::new(Duration::from_millis(500))
//!     .with_offset(Duration::from_millis(20))
//!     .spawn(token.clone());
//!
//! let outcome = DualCapture::new(OnsetPredicate::default())
//!     .with_deadline(Duration::from_secs(5))
//!     .with_start_time(start_time)
//!     .run(stream1, stream2, &token);
//!
//! let report = ReportBuilder::new(&Config::default()).build(&outcome);
//! println!("{}", report.summary());
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod observe;

// Re-export key types at crate root for convenience
pub use collector::{
    CancelReason, CancellationToken, CaptureError, DualCapture, DualCaptureOutcome, Event,
    EventKind, EventStream, OnsetPredicate, StreamError, StreamRecorder, StreamState,
};
pub use config::{Config, ConfigError};
pub use self::core::{
    CrossCorrelationResult, IntervalFilter, ReportBuilder, SessionReport, SynchronyAnalyzer,
    WindowAggregator,
};
pub use observe::{CaptureStats, FanoutSink, Observation, ObservationSink, TracingSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
