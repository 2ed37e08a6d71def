// Pattern - a fixed-length loop of sequencer steps
// One pattern is what the step sequencer plays or records at a time.

use crate::sequencer::engine::SequencerError;
use serde::{Deserialize, Serialize};

/// Identifier of a pattern within the bank
pub type PatternId = u32;

pub const MAX_PATTERN_STEPS: usize = 64;

/// One note of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNote {
    pub pitch: u8,
    pub velocity: u8,
}

impl StepNote {
    pub fn new(pitch: u8, velocity: u8) -> Result<Self, SequencerError> {
        if pitch > 127 || velocity == 0 || velocity > 127 {
            return Err(SequencerError::InvalidNote { pitch, velocity });
        }
        Ok(Self { pitch, velocity })
    }
}

/// A grid cell: the notes that start at this step
///
/// A tied step keeps the previous step's notes sounding instead of
/// releasing them; its own notes that are not yet sounding still start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerStep {
    pub index: u16,
    pub notes: Vec<StepNote>,
    #[serde(default)]
    pub tied: bool,
}

impl SequencerStep {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            notes: Vec::new(),
            tied: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && !self.tied
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.notes.iter().any(|n| n.pitch == pitch)
    }

    /// Add a note, or update the velocity of a note already present
    pub fn upsert(&mut self, note: StepNote) {
        match self.notes.iter_mut().find(|n| n.pitch == note.pitch) {
            Some(existing) => existing.velocity = note.velocity,
            None => self.notes.push(note),
        }
    }

    pub fn remove(&mut self, pitch: u8) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.pitch != pitch);
        self.notes.len() != before
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.tied = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    /// MIDI channel the pattern plays on
    pub channel: u8,
    /// Stop at the end instead of wrapping to step 0
    #[serde(default = "default_looping")]
    pub looping: bool,
    steps: Vec<SequencerStep>,
}

fn default_looping() -> bool {
    true
}

impl Pattern {
    /// Create an empty pattern of `length` steps
    pub fn new(
        id: PatternId,
        name: impl Into<String>,
        length: usize,
        channel: u8,
    ) -> Result<Self, SequencerError> {
        if length == 0 || length > MAX_PATTERN_STEPS {
            return Err(SequencerError::InvalidPatternLength(length));
        }
        Ok(Self {
            id,
            name: name.into(),
            channel: channel & 0x0F,
            looping: true,
            steps: (0..length as u16).map(SequencerStep::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(SequencerStep::is_empty)
    }

    pub fn steps(&self) -> &[SequencerStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&SequencerStep> {
        self.steps.get(index)
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> Result<&mut SequencerStep, SequencerError> {
        let len = self.steps.len();
        self.steps
            .get_mut(index)
            .ok_or(SequencerError::StepOutOfRange { index, len })
    }

    /// Replace the notes of a step
    pub fn set_step(&mut self, index: usize, notes: Vec<StepNote>) -> Result<(), SequencerError> {
        let step = self.step_mut(index)?;
        step.notes.clear();
        for note in notes {
            step.upsert(note);
        }
        Ok(())
    }

    /// Add `pitch` to a step, or remove it when already there;
    /// returns whether the note is present afterwards
    pub fn toggle_note(
        &mut self,
        index: usize,
        pitch: u8,
        velocity: u8,
    ) -> Result<bool, SequencerError> {
        let note = StepNote::new(pitch, velocity)?;
        let step = self.step_mut(index)?;
        if step.remove(pitch) {
            Ok(false)
        } else {
            step.upsert(note);
            Ok(true)
        }
    }

    pub fn set_tied(&mut self, index: usize, tied: bool) -> Result<(), SequencerError> {
        self.step_mut(index)?.tied = tied;
        Ok(())
    }

    pub fn clear_step(&mut self, index: usize) -> Result<(), SequencerError> {
        self.step_mut(index)?.clear();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.steps.iter_mut().for_each(SequencerStep::clear);
    }

    pub fn note_count(&self) -> usize {
        self.steps.iter().map(|s| s.notes.len()).sum()
    }

    /// Check a pattern read from storage
    pub fn validate(&self) -> Result<(), SequencerError> {
        let len = self.steps.len();
        if len == 0 || len > MAX_PATTERN_STEPS {
            return Err(SequencerError::InvalidPatternLength(len));
        }
        if self.channel > 15 {
            return Err(SequencerError::InvalidChannel(self.channel));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.index as usize != index {
                return Err(SequencerError::StepOutOfRange {
                    index: step.index as usize,
                    len,
                });
            }
            for note in &step.notes {
                StepNote::new(note.pitch, note.velocity)?;
            }
        }
        Ok(())
    }
}
