//! Session report built from two finished recordings.
//!
//! The report collects per-source timing summaries, the four windowed
//! aggregate families and the synchrony estimate into one serializable value.

use crate::collector::cancel::CancelReason;
use crate::collector::dual::DualCaptureOutcome;
use crate::collector::recorder::StreamState;
use crate::config::Config;
use crate::core::filter::IntervalFilter;
use crate::core::synchrony::{CrossCorrelationResult, SynchronyAnalyzer};
use crate::core::windowing::WindowAggregator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "onset-synchrony";

/// Producer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
}

/// Timing summary and aggregates for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub device_id: usize,
    pub event_count: usize,
    pub onset_count: usize,
    /// Smallest delta between consecutive events
    pub min_delta: Option<f64>,
    /// Mean of the filtered onset-to-onset intervals
    pub mean_onset_interval: Option<f64>,
    /// Sample standard deviation of the same intervals (needs two or more)
    pub onset_interval_std_dev: Option<f64>,
    /// Window means of every event delta, unfiltered
    pub aggregated_intervals: Vec<f64>,
    /// Window means of the filtered per-onset deltas
    pub aggregated_onset_intervals: Vec<f64>,
    /// Window means of the filtered onset-to-onset intervals
    pub aggregated_derived_intervals: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Condensed cross-correlation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronyReport {
    /// Peak lag in bins; negative when source 1 leads
    pub peak_lag: i64,
    pub peak_lag_secs: f64,
    pub peak_value: f64,
    pub resolution: f64,
    /// Number of lags evaluated
    pub lag_count: usize,
}

impl From<&CrossCorrelationResult> for SynchronyReport {
    fn from(result: &CrossCorrelationResult) -> Self {
        Self {
            peak_lag: result.peak_lag,
            peak_lag_secs: result.peak_lag_secs(),
            peak_value: result.peak_value,
            resolution: result.resolution,
            lag_count: result.lags.len(),
        }
    }
}

/// Everything a capture session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub report_id: String,
    pub created_at: DateTime<Utc>,
    pub producer: ReportProducer,
    /// Settings the analysis ran with
    pub config: Config,
    pub sources: Vec<SourceReport>,
    /// Window means of the filtered per-position period differences
    pub aggregated_period_differences: Vec<f64>,
    /// `None` when either source has no onsets
    pub synchrony: Option<SynchronyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
    pub elapsed_secs: f64,
    pub faults: Vec<String>,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// Printable summary block.
    pub fn summary(&self) -> String {
        let mut out = String::from("Session Report:\n");
        for source in &self.sources {
            out.push_str(&format!(
                " - Device {}: {} events, {} onsets, min delta {}, mean onset interval {}\n",
                source.device_id,
                source.event_count,
                source.onset_count,
                format_secs(source.min_delta),
                format_secs(source.mean_onset_interval),
            ));
        }
        out.push_str(&format!(
            " - Period differences: {} windows\n",
            self.aggregated_period_differences.len()
        ));
        match &self.synchrony {
            Some(sync) => out.push_str(&format!(
                " - Synchrony: peak lag {} bins ({:.3} s), peak value {}\n",
                sync.peak_lag, sync.peak_lag_secs, sync.peak_value
            )),
            None => out.push_str(" - Synchrony: no synchrony data\n"),
        }
        for fault in &self.faults {
            out.push_str(&format!(" - Fault: {fault}\n"));
        }
        out.push_str(&format!(" - Elapsed: {:.1} seconds", self.elapsed_secs));
        out
    }
}

fn format_secs(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4} s"))
}

/// Builds [`SessionReport`]s with one set of analysis settings.
pub struct ReportBuilder {
    config: Config,
    filter: IntervalFilter,
    aggregator: WindowAggregator,
    analyzer: SynchronyAnalyzer,
}

impl ReportBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            filter: IntervalFilter::new(config.difference_threshold),
            aggregator: WindowAggregator::new(config.window_size),
            analyzer: SynchronyAnalyzer::new(config.resolution),
        }
    }

    /// Build the report for a finished capture, faults included.
    pub fn build(&self, outcome: &DualCaptureOutcome) -> SessionReport {
        let (state1, state2) = outcome.states();
        let mut report = self.build_from_states(state1, state2);

        for (source, recording) in report
            .sources
            .iter_mut()
            .zip([&outcome.first, &outcome.second])
        {
            source.device_id = recording.device_id;
            source.fault = recording.fault.as_ref().map(|f| f.to_string());
        }
        report.faults = outcome.faults().map(|f| f.to_string()).collect();
        report.cancel_reason = outcome.cancel_reason.clone();
        report.elapsed_secs = outcome.elapsed.as_secs_f64();
        report
    }

    /// Build the analysis part of a report from two stream states.
    pub fn build_from_states(&self, state1: &StreamState, state2: &StreamState) -> SessionReport {
        let derived1 = self.filter.filter(&state1.derived_onset_intervals());
        let derived2 = self.filter.filter(&state2.derived_onset_intervals());

        let sources = vec![
            self.source_report(1, state1, &derived1),
            self.source_report(2, state2, &derived2),
        ];

        let differences = self.filter.period_differences(&derived1, &derived2);
        let aggregated_period_differences = self
            .aggregator
            .aggregate(&state1.onset_timestamps, &differences);

        let synchrony = self
            .analyzer
            .analyze(&state1.onset_timestamps, &state2.onset_timestamps)
            .map(|result| SynchronyReport::from(&result));
        if synchrony.is_none() {
            tracing::info!("no synchrony data");
        }

        SessionReport {
            report_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            config: self.config.clone(),
            sources,
            aggregated_period_differences,
            synchrony,
            cancel_reason: None,
            elapsed_secs: 0.0,
            faults: Vec::new(),
        }
    }

    fn source_report(&self, device_id: usize, state: &StreamState, derived: &[f64]) -> SourceReport {
        let onset_intervals = self.filter.filter(&state.onset_intervals);

        let mean_onset_interval = if derived.is_empty() {
            None
        } else {
            Some(derived.iter().mean())
        };
        let onset_interval_std_dev = if derived.len() < 2 {
            None
        } else {
            Some(derived.iter().std_dev())
        };

        SourceReport {
            device_id,
            event_count: state.event_count(),
            onset_count: state.onset_count(),
            min_delta: state.min_delta(),
            mean_onset_interval,
            onset_interval_std_dev,
            aggregated_intervals: self
                .aggregator
                .aggregate(&state.event_timestamps(), &state.all_intervals),
            aggregated_onset_intervals: self
                .aggregator
                .aggregate(&state.onset_timestamps, &onset_intervals),
            aggregated_derived_intervals: self
                .aggregator
                .aggregate(&state.onset_timestamps, derived),
            fault: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{Event, OnsetPredicate};

    fn state_with_onsets(start: f64, onsets: &[f64]) -> StreamState {
        let predicate = OnsetPredicate::default();
        let mut state = StreamState::new(start);
        for &t in onsets {
            state.record(&Event::note_on(t, 60, 100), &predicate);
        }
        state
    }

    fn config(window_size: f64, resolution: f64) -> Config {
        Config {
            window_size,
            resolution,
            ..Config::default()
        }
    }

    #[test]
    fn test_report_for_offset_sources() {
        let state1 = state_with_onsets(0.0, &[0.0, 1.0, 2.0]);
        let state2 = state_with_onsets(0.0, &[0.5, 1.5, 2.5]);

        let report = ReportBuilder::new(&config(10.0, 0.5)).build_from_states(&state1, &state2);

        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].onset_count, 3);
        assert_eq!(report.sources[0].mean_onset_interval, Some(1.0));
        assert_eq!(report.sources[0].onset_interval_std_dev, Some(0.0));
        assert_eq!(report.sources[1].min_delta, Some(0.5));

        let sync = report.synchrony.unwrap();
        assert_eq!(sync.peak_lag, -1);
        assert_eq!(sync.peak_lag_secs, -0.5);
        assert_eq!(sync.peak_value, 3.0);
        assert_eq!(sync.lag_count, 11);
    }

    #[test]
    fn test_empty_sources_skip_synchrony() {
        let empty = StreamState::new(0.0);
        let report = ReportBuilder::new(&Config::default()).build_from_states(&empty, &empty);

        assert!(report.synchrony.is_none());
        assert!(report.aggregated_period_differences.is_empty());
        for source in &report.sources {
            assert_eq!(source.event_count, 0);
            assert_eq!(source.min_delta, None);
            assert_eq!(source.mean_onset_interval, None);
            assert!(source.aggregated_intervals.is_empty());
        }
        assert!(report.summary().contains("no synchrony data"));
    }

    #[test]
    fn test_outliers_are_filtered_before_aggregation() {
        // 5 s pause between the second and third onsets.
        let state = state_with_onsets(0.0, &[0.0, 0.5, 5.5, 6.0]);
        let report = ReportBuilder::new(&config(100.0, 0.5)).build_from_states(&state, &state);

        let source = &report.sources[0];
        assert_eq!(source.mean_onset_interval, Some(0.5));
        assert_eq!(source.aggregated_derived_intervals, vec![0.5]);
        // Identical sources differ by nothing, so every window mean is 0 and dropped.
        assert!(report.aggregated_period_differences.is_empty());
    }

    #[test]
    fn test_period_differences_aggregate() {
        let state1 = state_with_onsets(0.0, &[0.0, 1.0, 2.0]);
        let state2 = state_with_onsets(0.0, &[0.0, 1.25, 2.0]);

        let report = ReportBuilder::new(&config(10.0, 0.25)).build_from_states(&state1, &state2);
        assert_eq!(report.aggregated_period_differences, vec![0.25]);
    }

    #[test]
    fn test_report_serializes() {
        let state = state_with_onsets(0.0, &[0.0, 0.5]);
        let report = ReportBuilder::new(&Config::default()).build_from_states(&state, &state);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["producer"]["name"], PRODUCER_NAME);
        assert!(json.get("cancel_reason").is_none());
        assert_eq!(json["sources"][0]["onset_count"], 2);
    }
}
