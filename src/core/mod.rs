//! Post-capture analysis.
//!
//! This module contains:
//! - Outlier filtering and interval derivation
//! - Fixed-width window aggregation
//! - Cross-correlation synchrony estimation
//! - Session report building

pub mod filter;
pub mod report;
pub mod synchrony;
pub mod windowing;

// Re-export commonly used types
pub use filter::{derive_intervals, IntervalFilter, DEFAULT_DIFFERENCE_THRESHOLD};
pub use report::{ReportBuilder, SessionReport, SourceReport, SynchronyReport, PRODUCER_NAME};
pub use synchrony::{
    binarize, cross_correlate, CrossCorrelationResult, SynchronyAnalyzer, DEFAULT_RESOLUTION,
    MAX_BINS,
};
pub use windowing::{AggregationWindow, WindowAggregator, DEFAULT_WINDOW_SIZE, MAX_WINDOWS};
