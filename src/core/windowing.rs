//! Fixed-width time window aggregation.
//!
//! A timestamped value sequence is cut into consecutive half-open windows of
//! equal width starting at the first timestamp, and each window is reduced to
//! the mean of the values that fall inside it.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Default aggregation width in seconds.
pub const DEFAULT_WINDOW_SIZE: f64 = 0.1;

/// Most windows one aggregation pass will walk.
pub const MAX_WINDOWS: usize = 1 << 22;

/// One aggregated window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationWindow {
    pub start: f64,
    pub end: f64,
    /// Number of samples that fell inside the window
    pub sample_count: usize,
    /// Mean of those samples, or 0 for an empty window
    pub mean_value: f64,
}

impl AggregationWindow {
    fn from_samples(start: f64, end: f64, samples: &[(f64, f64)]) -> Self {
        let mean_value = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|&(_, v)| v).mean()
        };

        Self {
            start,
            end,
            sample_count: samples.len(),
            mean_value,
        }
    }

    /// Check if a timestamp falls within this window.
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.end - self.start
    }
}

/// Reduces timestamped values into per-window means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowAggregator {
    pub window_size: f64,
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl WindowAggregator {
    pub fn new(window_size: f64) -> Self {
        Self { window_size }
    }

    /// Every window between the first and last timestamp, empty ones included.
    ///
    /// `timestamps` and `values` are paired by position; extra entries on the
    /// longer side are ignored. Windows start at `timestamps[0]` and continue
    /// while the window start is before `timestamps[last]`, so a single
    /// timestamp yields no windows.
    pub fn windows(&self, timestamps: &[f64], values: &[f64]) -> Vec<AggregationWindow> {
        let (Some(&start), Some(&end)) = (timestamps.first(), timestamps.last()) else {
            return Vec::new();
        };
        if !(self.window_size.is_finite() && self.window_size > 0.0) {
            tracing::warn!(window_size = self.window_size, "invalid window size; no windows produced");
            return Vec::new();
        }
        let span = (end - start) / self.window_size;
        if !span.is_finite() || span >= MAX_WINDOWS as f64 {
            tracing::warn!(
                window_size = self.window_size,
                span_secs = end - start,
                max_windows = MAX_WINDOWS,
                "too many windows for this span; no windows produced"
            );
            return Vec::new();
        }

        let mut samples: Vec<(f64, f64)> = timestamps
            .iter()
            .copied()
            .zip(values.iter().copied())
            .collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut cursor = samples.partition_point(|&(t, _)| t < start);
        let mut windows = Vec::new();
        let mut window_start = start;

        while window_start < end {
            let window_end = window_start + self.window_size;
            if window_end <= window_start {
                // Width lost to float precision at this magnitude.
                break;
            }

            let first = cursor;
            while cursor < samples.len() && samples[cursor].0 < window_end {
                cursor += 1;
            }
            windows.push(AggregationWindow::from_samples(
                window_start,
                window_end,
                &samples[first..cursor],
            ));

            window_start = window_end;
        }

        windows
    }

    /// Windows holding at least one sample, in chronological order.
    pub fn aggregate_windows(&self, timestamps: &[f64], values: &[f64]) -> Vec<AggregationWindow> {
        self.windows(timestamps, values)
            .into_iter()
            .filter(|w| !w.is_empty())
            .collect()
    }

    /// Window means with empty windows removed.
    ///
    /// An empty window is represented by a mean of 0 and then dropped, so a
    /// window whose samples genuinely average to 0 is dropped too. Use
    /// [`aggregate_windows`](Self::aggregate_windows) to tell them apart.
    pub fn aggregate(&self, timestamps: &[f64], values: &[f64]) -> Vec<f64> {
        self.windows(timestamps, values)
            .into_iter()
            .map(|w| w.mean_value)
            .filter(|&mean| mean != 0.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_contains() {
        let window = AggregationWindow::from_samples(1.0, 1.5, &[]);

        assert!(window.contains(1.0));
        assert!(window.contains(1.25));
        assert!(!window.contains(1.5));
        assert!(!window.contains(0.9));
        assert!(window.is_empty());
        assert_eq!(window.duration_secs(), 0.5);
    }

    #[test]
    fn test_empty_input() {
        let aggregator = WindowAggregator::new(0.1);
        assert!(aggregator.aggregate(&[], &[]).is_empty());
        assert!(WindowAggregator::new(5.0).aggregate(&[], &[]).is_empty());
    }

    #[test]
    fn test_single_window_mean() {
        let aggregator = WindowAggregator::new(10.0);
        assert_eq!(aggregator.aggregate(&[0.0, 1.0], &[1.0, 3.0]), vec![2.0]);
    }

    #[test]
    fn test_single_timestamp_yields_nothing() {
        let aggregator = WindowAggregator::new(1.0);
        assert!(aggregator.aggregate(&[4.0], &[0.5]).is_empty());
    }

    #[test]
    fn test_empty_windows_are_dropped() {
        let aggregator = WindowAggregator::new(1.0);
        let timestamps = [0.0, 0.5, 3.25, 3.5];
        let values = [1.0, 2.0, 4.0, 8.0];

        let windows = aggregator.windows(&timestamps, &values);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[1].sample_count, 0);
        assert_eq!(windows[2].sample_count, 0);

        assert_eq!(aggregator.aggregate(&timestamps, &values), vec![1.5, 6.0]);
    }

    #[test]
    fn test_boundary_sample_goes_to_next_window() {
        let aggregator = WindowAggregator::new(1.0);
        let timestamps = [0.0, 1.0, 1.5];
        let values = [1.0, 3.0, 5.0];

        let windows = aggregator.aggregate_windows(&timestamps, &values);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].sample_count, 1);
        assert_eq!(windows[1].sample_count, 2);
        assert_eq!(windows[1].mean_value, 4.0);
    }

    #[test]
    fn test_last_sample_on_boundary_is_excluded() {
        let aggregator = WindowAggregator::new(1.0);
        let windows = aggregator.windows(&[0.0, 2.0], &[1.0, 9.0]);

        assert_eq!(windows.len(), 2);
        assert_eq!(aggregator.aggregate(&[0.0, 2.0], &[1.0, 9.0]), vec![1.0]);
    }

    #[test]
    fn test_zero_mean_window_is_dropped_but_counted() {
        let aggregator = WindowAggregator::new(1.0);
        let timestamps = [0.0, 0.5, 1.5, 2.5];
        let values = [-1.0, 1.0, 2.0, 0.0];

        assert_eq!(aggregator.aggregate(&timestamps, &values), vec![2.0]);

        let windows = aggregator.aggregate_windows(&timestamps, &values);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].mean_value, 0.0);
        assert_eq!(windows[0].sample_count, 2);
    }

    #[test]
    fn test_values_shorter_than_timestamps() {
        let aggregator = WindowAggregator::new(1.0);
        let timestamps = [0.0, 0.5, 1.5, 2.5];
        let values = [2.0, 4.0];

        assert_eq!(aggregator.aggregate(&timestamps, &values), vec![3.0]);
    }

    #[test]
    fn test_tiny_window_size_is_capped() {
        let aggregator = WindowAggregator::new(1e-12);
        assert!(aggregator.windows(&[0.0, 1.0], &[1.0, 1.0]).is_empty());
        assert!(aggregator.aggregate(&[0.0, 1.0], &[1.0, 1.0]).is_empty());

        let windows = WindowAggregator::new(1e-5).windows(&[0.0, 1.0], &[1.0, 1.0]);
        assert!(windows.len() <= MAX_WINDOWS);
        assert_eq!(windows[0].sample_count, 1);
    }

    #[test]
    fn test_invalid_window_size() {
        assert!(WindowAggregator::new(0.0).aggregate(&[0.0, 1.0], &[1.0, 1.0]).is_empty());
        assert!(WindowAggregator::new(-1.0).aggregate(&[0.0, 1.0], &[1.0, 1.0]).is_empty());
    }
}
