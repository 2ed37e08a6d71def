// Tempo - musical time base shared by file playback and the step sequencer

use std::fmt;

/// 120 BPM, the SMF default until a tempo meta event says otherwise
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Resolution used when no file is open
pub const DEFAULT_TICKS_PER_QUARTER: u16 = 480;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Current tempo of a file
///
/// `ticks_per_quarter` comes from the header and never changes for a file;
/// `micros_per_quarter` follows tempo meta events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoState {
    pub micros_per_quarter: u32,
    pub ticks_per_quarter: u16,
}

impl TempoState {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            ticks_per_quarter: ticks_per_quarter.max(1),
        }
    }

    pub fn bpm(&self) -> f64 {
        MICROS_PER_MINUTE / self.micros_per_quarter as f64
    }

    /// Microseconds per quarter note for a BPM value
    pub fn micros_for_bpm(bpm: f64) -> u32 {
        (MICROS_PER_MINUTE / bpm.max(1.0)).round() as u32
    }
}

impl Default for TempoState {
    fn default() -> Self {
        Self::new(DEFAULT_TICKS_PER_QUARTER)
    }
}

impl fmt::Display for TempoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM @ {} PPQN", self.bpm(), self.ticks_per_quarter)
    }
}

/// Fixed step grid for the sequencer (e.g. 4 steps per quarter = 1/16 notes)
///
/// The grid keeps its own tempo so file tempo changes never move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepGrid {
    micros_per_quarter: u32,
    ticks_per_quarter: u16,
    steps_per_quarter: u16,
}

impl StepGrid {
    pub fn new(micros_per_quarter: u32, ticks_per_quarter: u16, steps_per_quarter: u16) -> Self {
        Self {
            micros_per_quarter: micros_per_quarter.max(1),
            ticks_per_quarter: ticks_per_quarter.max(1),
            steps_per_quarter: steps_per_quarter.max(1),
        }
    }

    pub fn from_bpm(bpm: f64, steps_per_quarter: u16) -> Self {
        Self::new(
            TempoState::micros_for_bpm(bpm),
            DEFAULT_TICKS_PER_QUARTER,
            steps_per_quarter,
        )
    }

    /// Length of one step in ticks of the owning file resolution
    pub fn step_ticks(&self) -> u32 {
        (self.ticks_per_quarter as u32 / self.steps_per_quarter as u32).max(1)
    }

    /// Length of one step in microseconds
    pub fn step_micros(&self) -> u64 {
        (self.micros_per_quarter as u64 / self.steps_per_quarter as u64).max(1)
    }

    /// Absolute time of step boundary `step` counted from `origin`
    pub fn boundary(&self, origin: u64, step: u64) -> u64 {
        origin + step * self.step_micros()
    }

    /// Index of the boundary nearest to `at`, counted from `origin`
    pub fn nearest_step(&self, origin: u64, at: u64) -> u64 {
        let elapsed = at.saturating_sub(origin);
        let step = self.step_micros();
        (elapsed + step / 2) / step
    }

    pub fn steps_per_quarter(&self) -> u16 {
        self.steps_per_quarter
    }

    pub fn bpm(&self) -> f64 {
        MICROS_PER_MINUTE / self.micros_per_quarter as f64
    }
}

impl Default for StepGrid {
    fn default() -> Self {
        Self::new(DEFAULT_MICROS_PER_QUARTER, DEFAULT_TICKS_PER_QUARTER, 4)
    }
}
