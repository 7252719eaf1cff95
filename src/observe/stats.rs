//! Per-session capture counters.
//!
//! Counters are atomics so both recorder threads can update them through a
//! shared handle without locking.

use crate::collector::types::EventKind;
use crate::observe::sink::{Observation, ObservationSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct DeviceCounters {
    events: AtomicU64,
    onsets: AtomicU64,
    clock_ticks: AtomicU64,
}

impl DeviceCounters {
    fn snapshot(&self, device_id: usize) -> DeviceStats {
        DeviceStats {
            device_id,
            events: self.events.load(Ordering::Relaxed),
            onsets: self.onsets.load(Ordering::Relaxed),
            clock_ticks: self.clock_ticks.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.events.store(0, Ordering::Relaxed);
        self.onsets.store(0, Ordering::Relaxed);
        self.clock_ticks.store(0, Ordering::Relaxed);
    }
}

/// Live counters for one capture session.
///
/// Devices are numbered from 1. Observations from device ids outside
/// `1..=device_count` are counted as unattributed.
#[derive(Debug)]
pub struct CaptureStats {
    devices: Vec<DeviceCounters>,
    unattributed: AtomicU64,
    session_start: DateTime<Utc>,
}

impl CaptureStats {
    pub fn new(device_count: usize) -> Self {
        Self {
            devices: (0..device_count).map(|_| DeviceCounters::default()).collect(),
            unattributed: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    /// Count one observation.
    pub fn record(&self, observation: &Observation) {
        let Some(counters) = observation
            .device_id
            .checked_sub(1)
            .and_then(|slot| self.devices.get(slot))
        else {
            self.unattributed.fetch_add(1, Ordering::Relaxed);
            return;
        };

        counters.events.fetch_add(1, Ordering::Relaxed);
        if observation.is_onset {
            counters.onsets.fetch_add(1, Ordering::Relaxed);
        }
        if observation.kind == EventKind::Clock {
            counters.clock_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            devices: self
                .devices
                .iter()
                .enumerate()
                .map(|(slot, counters)| counters.snapshot(slot + 1))
                .collect(),
            unattributed: self.unattributed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_milliseconds() as f64
                / 1000.0,
        }
    }

    /// Printable summary block.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let mut out = String::from("Capture Statistics:\n");
        for device in &stats.devices {
            out.push_str(&format!(
                " - Device {}: {} events, {} onsets, {} clock ticks\n",
                device.device_id, device.events, device.onsets, device.clock_ticks
            ));
        }
        if stats.unattributed > 0 {
            out.push_str(&format!(" - Unattributed events: {}\n", stats.unattributed));
        }
        out.push_str(&format!(
            " - Session duration: {:.1} seconds",
            stats.session_duration_secs
        ));
        out
    }

    pub fn reset(&self) {
        for counters in &self.devices {
            counters.reset();
        }
        self.unattributed.store(0, Ordering::Relaxed);
    }
}

impl ObservationSink for CaptureStats {
    fn observe(&self, observation: &Observation) {
        self.record(observation);
    }
}

/// Counter snapshot for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub device_id: usize,
    pub events: u64,
    pub onsets: u64,
    pub clock_ticks: u64,
}

/// Counter snapshot for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub devices: Vec<DeviceStats>,
    pub unattributed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: f64,
}

/// Thread-safe shared capture statistics.
pub type SharedCaptureStats = Arc<CaptureStats>;

/// Create shared statistics for `device_count` devices.
pub fn create_shared_stats(device_count: usize) -> SharedCaptureStats {
    Arc::new(CaptureStats::new(device_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::Event;

    #[test]
    fn test_counts_per_device() {
        let stats = CaptureStats::new(2);

        stats.observe(&Observation::new(1, &Event::note_on(0.0, 60, 90), 0.1, true));
        stats.observe(&Observation::new(1, &Event::clock(0.1), 0.1, false));
        stats.observe(&Observation::new(2, &Event::note_on(0.2, 60, 0), 0.2, false));

        let snapshot = stats.stats();
        assert_eq!(snapshot.devices[0].events, 2);
        assert_eq!(snapshot.devices[0].onsets, 1);
        assert_eq!(snapshot.devices[0].clock_ticks, 1);
        assert_eq!(snapshot.devices[1].events, 1);
        assert_eq!(snapshot.devices[1].onsets, 0);
    }

    #[test]
    fn test_unknown_device_is_unattributed() {
        let stats = CaptureStats::new(2);
        stats.observe(&Observation::new(0, &Event::clock(0.0), 0.0, false));
        stats.observe(&Observation::new(3, &Event::clock(0.0), 0.0, false));

        assert_eq!(stats.stats().unattributed, 2);
    }

    #[test]
    fn test_reset() {
        let stats = CaptureStats::new(1);
        stats.observe(&Observation::new(1, &Event::note_on(0.0, 60, 90), 0.1, true));
        stats.reset();

        let snapshot = stats.stats();
        assert_eq!(snapshot.devices[0].events, 0);
        assert_eq!(snapshot.devices[0].onsets, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = CaptureStats::new(2);
        let summary = stats.summary();

        assert!(summary.contains("Device 1"));
        assert!(summary.contains("Device 2"));
        assert!(summary.contains("Session duration"));
        assert!(!summary.contains("Unattributed"));
    }
}
