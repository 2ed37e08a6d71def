// Timing - tick/tempo conversion and the scheduler time base

pub mod clock;
pub mod tempo;

pub use clock::{MAX_SPEED_PERCENT, MIN_SPEED_PERCENT, MonotonicClock, TempoClock};
pub use tempo::{DEFAULT_MICROS_PER_QUARTER, DEFAULT_TICKS_PER_QUARTER, StepGrid, TempoState};
