// Sequencer engine - record/play/stop state machine over a step grid

use crate::midi::event::MidiEvent;
use crate::sequencer::pattern::{Pattern, PatternId};
use crate::sequencer::recorder::StepRecorder;
use crate::timing::tempo::StepGrid;
use std::fmt;

/// Transport state of the step sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerState {
    Stopped,
    Recording,
    Playing,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequencerState::Stopped => "stopped",
            SequencerState::Recording => "recording",
            SequencerState::Playing => "playing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("Sequencer cannot go from {from} to {to}")]
    InvalidTransition {
        from: SequencerState,
        to: SequencerState,
    },

    #[error("Unknown pattern {0}")]
    UnknownPattern(PatternId),

    #[error("Pattern length {0} outside 1..=64 steps")]
    InvalidPatternLength(usize),

    #[error("Step {index} outside pattern of {len} steps")]
    StepOutOfRange { index: usize, len: usize },

    #[error("Invalid note: pitch {pitch}, velocity {velocity}")]
    InvalidNote { pitch: u8, velocity: u8 },

    #[error("Invalid MIDI channel {0}")]
    InvalidChannel(u8),
}

/// Step sequencer
///
/// Step boundaries are counted from the moment play or record started, on
/// the engine's own grid, so file tempo changes never move them. While
/// playing, [`poll`](Self::poll) emits each boundary's events stamped with the
/// boundary time.
#[derive(Debug)]
pub struct SequencerEngine {
    state: SequencerState,
    grid: StepGrid,
    patterns: Vec<Pattern>,
    current: usize,
    pending: Option<usize>,
    origin: u64,
    /// Boundary number (from origin) of the next boundary to play
    next_step: u64,
    /// Pattern index that boundary plays
    position: usize,
    /// (channel, pitch) started and not yet released
    sounding: Vec<(u8, u8)>,
    recorder: StepRecorder,
}

impl SequencerEngine {
    /// Engine over a pattern bank; an empty bank gets one blank pattern
    pub fn new(grid: StepGrid, mut patterns: Vec<Pattern>) -> Self {
        if patterns.is_empty() {
            patterns.extend(Pattern::new(0, "Pattern 1", 16, 9));
        }
        Self {
            state: SequencerState::Stopped,
            grid,
            patterns,
            current: 0,
            pending: None,
            origin: 0,
            next_step: 0,
            position: 0,
            sounding: Vec::new(),
            recorder: StepRecorder::new(),
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn grid(&self) -> StepGrid {
        self.grid
    }

    fn transition(&mut self, to: SequencerState) -> Result<(), SequencerError> {
        use SequencerState::*;
        let allowed = matches!(
            (self.state, to),
            (Stopped, Recording) | (Stopped, Playing) | (Recording, Stopped) | (Playing, Stopped)
        );
        if !allowed {
            return Err(SequencerError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::info!(from = %self.state, to = %to, "sequencer transition");
        self.state = to;
        Ok(())
    }

    /// Start recording live notes into the current pattern
    pub fn record(&mut self, now_micros: u64) -> Result<(), SequencerError> {
        self.transition(SequencerState::Recording)?;
        self.origin = now_micros;
        self.recorder.start(self.patterns[self.current].len());
        Ok(())
    }

    /// Start playing the current pattern from step 0 at `now_micros`
    pub fn play(&mut self, now_micros: u64) -> Result<(), SequencerError> {
        self.transition(SequencerState::Playing)?;
        self.origin = now_micros;
        self.next_step = 0;
        self.position = 0;
        self.sounding.clear();
        Ok(())
    }

    /// Stop recording or playing; returns note-offs for notes still sounding
    pub fn stop(&mut self) -> Result<Vec<MidiEvent>, SequencerError> {
        let was = self.state;
        self.transition(SequencerState::Stopped)?;
        if was == SequencerState::Recording {
            self.recorder.finish();
        }
        if let Some(index) = self.pending.take() {
            self.current = index;
        }
        Ok(self.release())
    }

    fn release(&mut self) -> Vec<MidiEvent> {
        self.sounding
            .drain(..)
            .map(|(channel, pitch)| MidiEvent::note_off(channel, pitch, 0))
            .collect()
    }

    /// Make pattern `id` current
    ///
    /// While playing, the switch waits for the next step boundary.
    pub fn select_pattern(&mut self, id: PatternId) -> Result<(), SequencerError> {
        let index = self
            .patterns
            .iter()
            .position(|p| p.id == id)
            .ok_or(SequencerError::UnknownPattern(id))?;

        match self.state {
            SequencerState::Playing => self.pending = Some(index),
            SequencerState::Recording => {
                self.current = index;
                self.recorder.start(self.patterns[index].len());
            }
            SequencerState::Stopped => self.current = index,
        }
        tracing::debug!(pattern = id, "pattern selected");
        Ok(())
    }

    /// Feed a live event; written into the pattern only while recording
    pub fn record_event(&mut self, at_micros: u64, event: &MidiEvent) -> Option<usize> {
        if self.state != SequencerState::Recording {
            return None;
        }
        let step = self.grid.nearest_step(self.origin, at_micros);
        let pattern = &mut self.patterns[self.current];
        self.recorder.record(pattern, event, step)
    }

    /// Time of the next boundary to play
    pub fn next_boundary(&self) -> Option<u64> {
        (self.state == SequencerState::Playing)
            .then(|| self.grid.boundary(self.origin, self.next_step))
    }

    /// Emit every boundary due by `now_micros` into `out`
    ///
    /// Returns true when a non-looping pattern reached its end and the
    /// engine stopped.
    pub fn poll(&mut self, now_micros: u64, out: &mut Vec<(u64, MidiEvent)>) -> bool {
        while self.state == SequencerState::Playing {
            let at = self.grid.boundary(self.origin, self.next_step);
            if at > now_micros {
                break;
            }
            if self.play_boundary(at, out) {
                return true;
            }
        }
        false
    }

    fn play_boundary(&mut self, at: u64, out: &mut Vec<(u64, MidiEvent)>) -> bool {
        if let Some(index) = self.pending.take() {
            if self.position >= self.patterns[self.current].len() {
                self.position = 0;
            }
            self.current = index;
            self.position %= self.patterns[index].len();
        }

        let pattern = &self.patterns[self.current];
        if self.position >= pattern.len() {
            if pattern.looping {
                self.position = 0;
            } else {
                out.extend(self.release().into_iter().map(|e| (at, e)));
                self.state = SequencerState::Stopped;
                tracing::info!("sequencer pattern ended");
                return true;
            }
        }

        let pattern = &self.patterns[self.current];
        let Some(step) = pattern.step(self.position) else {
            return false;
        };
        let channel = pattern.channel;

        if !step.tied {
            for (ch, pitch) in self.sounding.drain(..) {
                out.push((at, MidiEvent::note_off(ch, pitch, 0)));
            }
        }
        for note in &step.notes {
            if !self.sounding.contains(&(channel, note.pitch)) {
                out.push((at, MidiEvent::note_on(channel, note.pitch, note.velocity)));
                self.sounding.push((channel, note.pitch));
            }
        }

        self.position += 1;
        self.next_step += 1;
        false
    }

    pub fn current_pattern(&self) -> &Pattern {
        &self.patterns[self.current]
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Edit access to a pattern, allowed in every state
    pub fn pattern_mut(&mut self, id: PatternId) -> Result<&mut Pattern, SequencerError> {
        self.patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SequencerError::UnknownPattern(id))
    }

    /// Swap in a new bank; only while stopped
    pub fn replace_patterns(&mut self, patterns: Vec<Pattern>) -> Result<(), SequencerError> {
        if self.state != SequencerState::Stopped {
            return Err(SequencerError::InvalidTransition {
                from: self.state,
                to: SequencerState::Stopped,
            });
        }
        if patterns.is_empty() {
            return Err(SequencerError::InvalidPatternLength(0));
        }
        self.patterns = patterns;
        self.current = 0;
        self.pending = None;
        Ok(())
    }

    /// Notes currently held by the sequencer
    pub fn sounding(&self) -> &[(u8, u8)] {
        &self.sounding
    }

    /// Drop held notes on channels silenced elsewhere (bit `n` = channel `n`),
    /// so the next step holding them starts them again
    pub fn forget_channels(&mut self, mask: u16) {
        self.sounding.retain(|&(channel, _)| mask & (1 << channel) == 0);
    }
}
