//! Lag and synchrony estimation between two onset trains.
//!
//! Both onset sequences are shifted to a common origin, binarized into
//! indicator series at a fixed resolution, and fully cross-correlated. The lag
//! with the highest correlation estimates the offset between the sources.

use serde::{Deserialize, Serialize};

/// Default binarization bin width in seconds.
pub const DEFAULT_RESOLUTION: f64 = 0.01;

/// Largest indicator series the analyzer will build (about 46 hours at the
/// default resolution).
pub const MAX_BINS: usize = 1 << 24;

/// Full cross-correlation of two indicator series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCorrelationResult {
    /// Lag of each correlation value, in bins
    pub lags: Vec<i64>,
    pub correlations: Vec<f64>,
    /// Lag of the first maximum
    pub peak_lag: i64,
    pub peak_value: f64,
    /// Bin width in seconds
    pub resolution: f64,
}

impl CrossCorrelationResult {
    /// Peak lag converted to seconds.
    pub fn peak_lag_secs(&self) -> f64 {
        self.peak_lag as f64 * self.resolution
    }

    /// Correlation at a given lag, if it is in range.
    pub fn correlation_at(&self, lag: i64) -> Option<f64> {
        let first = *self.lags.first()?;
        let index = usize::try_from(lag - first).ok()?;
        self.correlations.get(index).copied()
    }
}

/// Binarizes onset trains and cross-correlates them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynchronyAnalyzer {
    pub resolution: f64,
}

impl Default for SynchronyAnalyzer {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl SynchronyAnalyzer {
    pub fn new(resolution: f64) -> Self {
        Self { resolution }
    }

    /// Cross-correlate two onset-timestamp sequences.
    ///
    /// Returns `None` when either sequence is empty or the resolution is not
    /// a positive finite number. A negative peak lag means the first source
    /// leads the second.
    pub fn analyze(
        &self,
        timestamps1: &[f64],
        timestamps2: &[f64],
    ) -> Option<CrossCorrelationResult> {
        let (&first1, &first2) = (timestamps1.first()?, timestamps2.first()?);
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            tracing::warn!(resolution = self.resolution, "invalid resolution; synchrony skipped");
            return None;
        }

        let origin = first1.min(first2);
        let normalized1: Vec<f64> = timestamps1.iter().map(|t| t - origin).collect();
        let normalized2: Vec<f64> = timestamps2.iter().map(|t| t - origin).collect();

        let last1 = normalized1.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let last2 = normalized2.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let duration = last1.max(last2);
        let Some(length) = self.series_length(duration) else {
            tracing::warn!(
                duration,
                resolution = self.resolution,
                max_bins = MAX_BINS,
                "onset span too long for this resolution; synchrony skipped"
            );
            return None;
        };

        let series1 = binarize(&normalized1, length, self.resolution);
        let series2 = binarize(&normalized2, length, self.resolution);
        let correlations = cross_correlate(&series1, &series2);

        let lag_origin = -(series2.len() as i64 - 1);
        let lags: Vec<i64> = (0..correlations.len() as i64).map(|i| lag_origin + i).collect();
        let (peak_index, peak_value) = first_peak(&correlations)?;

        tracing::debug!(
            bins = length,
            peak_lag = lags[peak_index],
            peak_value,
            "cross-correlation computed"
        );

        Some(CrossCorrelationResult {
            peak_lag: lags[peak_index],
            peak_value,
            lags,
            correlations,
            resolution: self.resolution,
        })
    }

    /// Bins needed so the onset at `duration` still lands inside the series,
    /// or `None` above [`MAX_BINS`].
    fn series_length(&self, duration: f64) -> Option<usize> {
        let last_bin = (duration / self.resolution).floor().max(0.0);
        if !last_bin.is_finite() || last_bin >= MAX_BINS as f64 {
            return None;
        }
        (last_bin as usize).checked_add(1)
    }
}

/// Indicator series of `length` bins with 1 in every bin holding an onset.
///
/// Several onsets in one bin still give 1; onsets outside the series are
/// ignored.
pub fn binarize(timestamps: &[f64], length: usize, resolution: f64) -> Vec<f64> {
    let mut series = vec![0.0; length];
    for &t in timestamps {
        if t < 0.0 {
            continue;
        }
        let index = (t / resolution).floor() as usize;
        if let Some(bin) = series.get_mut(index) {
            *bin = 1.0;
        }
    }
    series
}

/// Full cross-correlation, `c[k] = sum_n a[n + k] * b[n]`.
///
/// The output has `a.len() + b.len() - 1` values for lags
/// `-(b.len() - 1) ..= a.len() - 1`, in that order. Only non-zero samples are
/// visited, which keeps sparse onset trains cheap at fine resolutions.
pub fn cross_correlate(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let nonzero = |series: &[f64]| -> Vec<(usize, f64)> {
        series
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, v)| v != 0.0)
            .collect()
    };
    let active_a = nonzero(a);
    let active_b = nonzero(b);

    let mut out = vec![0.0; a.len() + b.len() - 1];
    let shift = b.len() - 1;
    for &(i, va) in &active_a {
        for &(j, vb) in &active_b {
            // lag k = i - j, stored at k + shift
            out[i + shift - j] += va * vb;
        }
    }
    out
}

/// Index and value of the first maximum.
fn first_peak(values: &[f64]) -> Option<(usize, f64)> {
    let mut iter = values.iter().copied().enumerate();
    let mut best = iter.next()?;
    for (index, value) in iter {
        if value > best.1 {
            best = (index, value);
        }
    }
    Some(best)
}
