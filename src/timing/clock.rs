// Tempo clock - converts SMF ticks into wall-clock deadlines

use crate::timing::tempo::TempoState;
use std::time::{Duration, Instant};

pub const MIN_SPEED_PERCENT: u16 = 25;
pub const MAX_SPEED_PERCENT: u16 = 400;

/// Tick-to-time converter for one file playback
///
/// Elapsed ticks only ever grow. Tempo changes affect conversions made after
/// them, never the time already accumulated. Conversion carries the division
/// remainder forward so long files do not drift.
#[derive(Debug, Clone)]
pub struct TempoClock {
    tempo: TempoState,
    speed_percent: u16,
    elapsed_ticks: u64,
    elapsed_micros: u64,
    remainder: u128,
}

impl TempoClock {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            tempo: TempoState::new(ticks_per_quarter),
            speed_percent: 100,
            elapsed_ticks: 0,
            elapsed_micros: 0,
            remainder: 0,
        }
    }

    pub fn tempo(&self) -> TempoState {
        self.tempo
    }

    fn divisor(&self) -> u128 {
        self.tempo.ticks_per_quarter as u128 * self.speed_percent as u128
    }

    /// Duration of `delta_ticks` at the current tempo and speed
    pub fn ticks_to_duration(&self, delta_ticks: u32) -> Duration {
        Duration::from_micros(self.ticks_to_micros(delta_ticks))
    }

    pub fn ticks_to_micros(&self, delta_ticks: u32) -> u64 {
        let scaled = delta_ticks as u128 * self.tempo.micros_per_quarter as u128 * 100;
        (scaled / self.divisor()) as u64
    }

    /// Move forward by `delta_ticks`; returns the new elapsed time in µs,
    /// which is the deadline of the event that carried this delta
    pub fn advance(&mut self, delta_ticks: u32) -> u64 {
        let scaled =
            delta_ticks as u128 * self.tempo.micros_per_quarter as u128 * 100 + self.remainder;
        let divisor = self.divisor();
        self.elapsed_micros += (scaled / divisor) as u64;
        self.remainder = scaled % divisor;
        self.elapsed_ticks += delta_ticks as u64;
        self.elapsed_micros
    }

    /// Tempo meta event: applies from now on
    pub fn apply_tempo(&mut self, micros_per_quarter: u32) {
        if micros_per_quarter == 0 {
            return;
        }
        // Remainder is in units of the old divisor only if the speed changes;
        // tempo changes keep the divisor so it stays valid.
        self.tempo.micros_per_quarter = micros_per_quarter;
        tracing::debug!(bpm = self.tempo.bpm(), "tempo change");
    }

    /// Playback speed in percent of the file tempo; returns the clamped value
    pub fn set_speed(&mut self, percent: u16) -> u16 {
        let percent = percent.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT);
        if percent != self.speed_percent {
            self.remainder = 0;
            self.speed_percent = percent;
        }
        percent
    }

    pub fn speed(&self) -> u16 {
        self.speed_percent
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.elapsed_micros
    }
}

/// Monotonic time base of the scheduler, in µs since creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Instant corresponding to a scheduler timestamp
    pub fn instant_at(&self, micros: u64) -> Instant {
        self.start + Duration::from_micros(micros)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
