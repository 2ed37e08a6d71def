// Sequencer module - piano-roll step sequencer
// Patterns of fixed-length steps, a quantizing recorder and the
// record/play/stop engine that feeds the router.

pub mod engine;
pub mod pattern;
pub mod recorder;
pub mod storage;

pub use engine::{SequencerEngine, SequencerError, SequencerState};
pub use pattern::{MAX_PATTERN_STEPS, Pattern, PatternId, SequencerStep, StepNote};
pub use recorder::StepRecorder;
pub use storage::{
    BANK_SLOT_PREFIX, PatternBank, blank_bank, load_bank, load_bank_slot, save_bank, save_bank_slot,
};
