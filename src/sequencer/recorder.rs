// Step recorder - writes live notes into a pattern at the nearest step

use crate::midi::event::MidiEvent;
use crate::sequencer::pattern::{Pattern, StepNote};
use std::collections::HashMap;

/// Quantizing recorder
///
/// Steps are counted from the start of recording, so step `n` lands on
/// pattern index `n % len` during pass `n / len`. The first note written to
/// an index in a pass replaces what was there; later notes in the same pass
/// add to it (chords). A note held across boundaries ties the steps it spans.
#[derive(Debug, Default)]
pub struct StepRecorder {
    /// pitch -> (absolute start step, velocity)
    held: HashMap<u8, (u64, u8)>,
    /// Per index, 1 + the pass it was last written in (0 = never)
    written: Vec<u64>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a take on a pattern of `len` steps
    pub fn start(&mut self, len: usize) {
        self.held.clear();
        self.written.clear();
        self.written.resize(len, 0);
    }

    /// Process a live event quantized to absolute step `step`
    ///
    /// Returns the pattern index that changed, if any.
    pub fn record(&mut self, pattern: &mut Pattern, event: &MidiEvent, step: u64) -> Option<usize> {
        if self.written.len() != pattern.len() {
            self.start(pattern.len());
        }
        let pitch = event.pitch()?;

        if event.is_note_on() {
            let note = StepNote::new(pitch, event.data2()).ok()?;
            let index = self.write(pattern, step, note, false);
            self.held.insert(pitch, (step, note.velocity));
            Some(index)
        } else if event.is_note_off() {
            let (start, velocity) = self.held.remove(&pitch)?;
            let note = StepNote::new(pitch, velocity).ok()?;
            // Tie at most one full loop so a long hold never wraps onto its own start
            let end = step.min(start + pattern.len() as u64);
            let mut last = None;
            for tied_step in start + 1..end {
                last = Some(self.write(pattern, tied_step, note, true));
            }
            last
        } else {
            None
        }
    }

    fn write(&mut self, pattern: &mut Pattern, step: u64, note: StepNote, tied: bool) -> usize {
        let len = pattern.len() as u64;
        let index = (step % len) as usize;
        let pass_tag = step / len + 1;

        if let Ok(cell) = pattern.step_mut(index) {
            if self.written[index] != pass_tag {
                cell.clear();
                self.written[index] = pass_tag;
            }
            cell.upsert(note);
            cell.tied |= tied;
        }
        index
    }

    /// End the take; notes still held keep only their start step
    pub fn finish(&mut self) -> usize {
        let held = self.held.len();
        self.held.clear();
        held
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}
