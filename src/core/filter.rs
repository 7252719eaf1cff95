//! Outlier filtering and interval derivation.
//!
//! Intervals above the threshold are treated as idle gaps or stream re-syncs
//! rather than musical intervals, and are dropped silently.

use serde::{Deserialize, Serialize};

/// Default outlier cutoff in seconds.
pub const DEFAULT_DIFFERENCE_THRESHOLD: f64 = 2.0;

/// Drops interval samples above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalFilter {
    pub threshold: f64,
}

impl Default for IntervalFilter {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DIFFERENCE_THRESHOLD,
        }
    }
}

impl IntervalFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Values `<= threshold`, in their original order.
    pub fn filter(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .copied()
            .filter(|&v| v <= self.threshold)
            .collect()
    }

    /// Absolute differences of two interval sequences paired by position.
    ///
    /// Pairing stops at the shorter sequence, and differences above the
    /// threshold are dropped. This assumes both sources produced their onsets
    /// in the same order; nothing checks that they did.
    pub fn period_differences(&self, d1: &[f64], d2: &[f64]) -> Vec<f64> {
        d1.iter()
            .zip(d2)
            .map(|(a, b)| (a - b).abs())
            .filter(|&diff| diff <= self.threshold)
            .collect()
    }
}

/// Differences between adjacent timestamps. Empty for fewer than two.
pub fn derive_intervals(timestamps: &[f64]) -> Vec<f64> {
    timestamps.windows(2).map(|pair| pair[1] - pair[0]).collect()
}
