//! Live observation output for capture sessions.
//!
//! Recorders push structured [`Observation`]s into an [`ObservationSink`];
//! this module provides the logging, channel, fan-out and counting sinks.

pub mod sink;
pub mod stats;

pub use sink::{ChannelSink, FanoutSink, NullSink, Observation, ObservationSink, TracingSink};
pub use stats::{
    create_shared_stats, CaptureStats, DeviceStats, SessionStats, SharedCaptureStats,
};
