// Playback cursor - position of the file player inside the decoded track

use crate::midi::event::{EventKind, MidiEvent};
use crate::smf::{FormatError, SmfDecoder};
use crate::timing::clock::TempoClock;
use crate::timing::tempo::TempoState;
use std::collections::{BTreeMap, VecDeque};

/// Decoding state of one file playback
///
/// Times are playback µs from the start of the file, as produced by the
/// tempo clock at the current speed. Events are decoded ahead into a small
/// buffer so the scheduler only pops from memory.
#[derive(Debug)]
pub struct PlaybackCursor {
    decoder: SmfDecoder,
    clock: TempoClock,
    pending: VecDeque<(u64, MidiEvent)>,
    end_of_track: bool,
    end_micros: Option<u64>,
    /// Playback time the cursor starts from (non-zero after a seek)
    start_micros: u64,
}

impl PlaybackCursor {
    pub fn new(decoder: SmfDecoder) -> Self {
        let clock = TempoClock::new(decoder.ticks_per_quarter());
        Self {
            decoder,
            clock,
            pending: VecDeque::new(),
            end_of_track: false,
            end_micros: None,
            start_micros: 0,
        }
    }

    /// Cursor positioned at `target_tick`
    ///
    /// Events before the target are not played; tempo changes take effect
    /// and the last program and controller values per channel are returned
    /// so the synth can be brought to the state the file expects there.
    pub fn seek(
        decoder: SmfDecoder,
        target_tick: u64,
        speed_percent: u16,
    ) -> Result<(Self, Vec<MidiEvent>), FormatError> {
        let mut cursor = Self::new(decoder);
        cursor.clock.set_speed(speed_percent);
        let mut chase: BTreeMap<(u8, u8, u8), MidiEvent> = BTreeMap::new();
        let mut reached = false;

        while let Some(result) = cursor.decoder.next() {
            let event = result?;
            let elapsed = cursor.clock.elapsed_ticks();
            if elapsed + event.delta_ticks as u64 >= target_tick {
                // Split the delta at the target so the remainder keeps its timing
                let before = (target_tick - elapsed) as u32;
                cursor.start_micros = cursor.clock.advance(before);
                cursor.accept(event.with_delta(event.delta_ticks - before));
                reached = true;
                break;
            }
            cursor.clock.advance(event.delta_ticks);
            match (event.kind, event.channel) {
                (EventKind::Tempo, _) => {
                    if let Some(micros) = event.tempo_micros() {
                        cursor.clock.apply_tempo(micros);
                    }
                }
                (EventKind::ProgramChange, Some(channel)) => {
                    chase.insert((channel, 0xC0, 0), event.with_delta(0));
                }
                (EventKind::ControlChange, Some(channel)) => {
                    chase.insert((channel, 0xB0, event.data1()), event.with_delta(0));
                }
                (EventKind::EndOfTrack, _) => {
                    cursor.end_of_track = true;
                    cursor.end_micros = Some(cursor.clock.elapsed_micros());
                }
                _ => {}
            }
        }

        if !reached {
            // Target beyond the end of the file
            cursor.finish_here();
            cursor.start_micros = cursor.clock.elapsed_micros();
        }
        Ok((cursor, chase.into_values().collect()))
    }

    /// Decode until an event lies beyond `horizon_micros` or the track ends
    ///
    /// A decode error ends the track at the last good event and is returned.
    pub fn fill(&mut self, horizon_micros: u64) -> Result<(), FormatError> {
        while !self.end_of_track {
            if self.pending.back().is_some_and(|(at, _)| *at > horizon_micros) {
                break;
            }
            match self.decoder.next() {
                Some(Ok(event)) => self.accept(event),
                Some(Err(e)) => {
                    self.finish_here();
                    return Err(e);
                }
                None => {
                    // Track without an end-of-track event
                    self.finish_here();
                }
            }
        }
        Ok(())
    }

    /// Take in an event whose delta has not been applied to the clock yet
    fn accept(&mut self, event: MidiEvent) {
        let at = self.clock.advance(event.delta_ticks);
        match event.kind {
            EventKind::Tempo => {
                if let Some(micros) = event.tempo_micros() {
                    self.clock.apply_tempo(micros);
                }
            }
            EventKind::EndOfTrack => {
                self.end_of_track = true;
                self.end_micros = Some(at);
            }
            _ if event.channel.is_some() => self.pending.push_back((at, event)),
            _ => {}
        }
    }

    fn finish_here(&mut self) {
        self.end_of_track = true;
        self.end_micros = Some(self.clock.elapsed_micros());
    }

    /// Next decoded event due at `now_micros`, with its playback time
    pub fn pop_due(&mut self, now_micros: u64) -> Option<(u64, MidiEvent)> {
        if self.pending.front()?.0 <= now_micros {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Playback time of the next thing that will happen
    pub fn next_deadline(&self) -> Option<u64> {
        match self.pending.front() {
            Some((at, _)) => Some(*at),
            None => self.end_micros,
        }
    }

    /// Everything played and the end-of-track time reached
    pub fn is_finished(&self, now_micros: u64) -> bool {
        self.end_of_track
            && self.pending.is_empty()
            && self.end_micros.is_some_and(|end| now_micros >= end)
    }

    pub fn start_micros(&self) -> u64 {
        self.start_micros
    }

    pub fn end_of_track(&self) -> bool {
        self.end_of_track
    }

    pub fn set_speed(&mut self, percent: u16) -> u16 {
        self.clock.set_speed(percent)
    }

    pub fn tempo(&self) -> TempoState {
        self.clock.tempo()
    }

    /// Ticks decoded so far (look-ahead included)
    pub fn decoded_ticks(&self) -> u64 {
        self.clock.elapsed_ticks()
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.decoder.ticks_per_quarter()
    }
}
