//! Synthetic metronome source.
//!
//! Generates a steady onset train on a background thread and delivers it
//! through a [`ChannelStream`], stamped with the wall clock at emission like a
//! real device driver would. Used by the `simulate` command and tests.

use crate::collector::cancel::CancellationToken;
use crate::collector::stream::{
    channel_stream, ChannelStream, EventSender, DEFAULT_CHANNEL_CAPACITY,
};
use crate::collector::types::Event;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// MIDI clock resolution.
pub const CLOCK_TICKS_PER_BEAT: u32 = 24;

/// Longest single sleep of the producer, so it notices cancellation promptly.
const MAX_SLEEP: Duration = Duration::from_millis(20);

/// Configuration for one synthetic source.
#[derive(Debug, Clone)]
pub struct Metronome {
    /// Time between onsets
    pub period: Duration,
    /// Delay of every onset relative to the beat grid, wrapped into `[0, period)`
    pub offset: Duration,
    pub note: u8,
    pub velocity: u8,
    /// Emit 24 clock ticks per beat
    pub clock_ticks: bool,
    /// Stop after this many beats; runs until cancelled when `None`
    pub beats: Option<u64>,
}

impl Default for Metronome {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(500),
            offset: Duration::ZERO,
            note: 60,
            velocity: 100,
            clock_ticks: false,
            beats: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    due: Duration,
    event: Event,
}

impl Metronome {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_note(mut self, note: u8, velocity: u8) -> Self {
        self.note = note;
        self.velocity = velocity;
        self
    }

    pub fn with_clock_ticks(mut self, enabled: bool) -> Self {
        self.clock_ticks = enabled;
        self
    }

    pub fn with_beats(mut self, beats: u64) -> Self {
        self.beats = Some(beats);
        self
    }

    /// Events of beat `index`, ordered by due time relative to the session
    /// start. Each beat has an onset, a release a quarter period later, and
    /// optionally the clock ticks on the beat grid.
    fn beat_schedule(&self, index: u64) -> Vec<Scheduled> {
        let beat_start = self.period.mul_f64(index as f64);
        let offset = self.phase_offset();
        let onset_due = beat_start + offset;

        let mut schedule = vec![
            Scheduled {
                due: onset_due,
                event: Event::note_on(0.0, self.note, self.velocity),
            },
            Scheduled {
                due: onset_due + self.period / 4,
                event: Event::note_on(0.0, self.note, 0),
            },
        ];

        if self.clock_ticks {
            let tick = self.period / CLOCK_TICKS_PER_BEAT;
            schedule.extend((0..CLOCK_TICKS_PER_BEAT).map(|i| Scheduled {
                due: beat_start + tick * i,
                event: Event::clock(0.0),
            }));
        }

        schedule.sort_by_key(|s| s.due);
        schedule
    }

    /// Phase of the onsets on the beat grid: the offset modulo the period.
    ///
    /// A delay of a whole number of periods is no delay at all, so 300 ms on a
    /// 200 ms grid plays 100 ms behind the beat.
    pub fn phase_offset(&self) -> Duration {
        let period = self.period.as_nanos();
        if period == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.offset.as_nanos() % period) as u64)
    }

    /// Start producing events. The producer stops when the token is cancelled,
    /// the beat count is reached, or the stream is dropped; the stream then
    /// reports closed.
    pub fn spawn(self, token: CancellationToken) -> (ChannelStream, JoinHandle<u64>) {
        let (sender, stream) = channel_stream(DEFAULT_CHANNEL_CAPACITY);
        let handle = thread::spawn(move || self.produce(&sender, &token));
        (stream, handle)
    }

    /// Returns the number of beats emitted.
    fn produce(&self, sender: &EventSender, token: &CancellationToken) -> u64 {
        let origin = Instant::now();
        let mut beat = 0;

        while self.beats.map_or(true, |limit| beat < limit) {
            for scheduled in self.beat_schedule(beat) {
                if !wait_until(origin + scheduled.due, token) {
                    return beat;
                }
                if sender.send_now(scheduled.event).is_err() {
                    return beat;
                }
            }
            beat += 1;
        }

        beat
    }
}

/// Sleep until `deadline` in short slices. Returns `false` if cancelled first.
fn wait_until(deadline: Instant, token: &CancellationToken) -> bool {
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MAX_SLEEP));
    }
}
