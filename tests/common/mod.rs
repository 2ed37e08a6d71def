//! Test helpers: a minimal format-0 SMF writer
#![allow(dead_code)]

use midistation::{EventKind, MidiEvent};

/// Builds a single-track file from events with delta times
pub struct SmfWriter {
    ticks_per_quarter: u16,
    running_status: bool,
    body: Vec<u8>,
    last_status: Option<u8>,
}

impl SmfWriter {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter,
            running_status: false,
            body: Vec::new(),
            last_status: None,
        }
    }

    /// Omit repeated channel status bytes
    pub fn with_running_status(mut self) -> Self {
        self.running_status = true;
        self
    }

    pub fn event(&mut self, event: &MidiEvent) -> &mut Self {
        write_var_len(&mut self.body, event.delta_ticks);
        match event.kind {
            EventKind::Tempo => {
                let micros = event.tempo_micros().unwrap_or(500_000).to_be_bytes();
                self.body.extend_from_slice(&[0xFF, 0x51, 0x03]);
                self.body.extend_from_slice(&micros[1..]);
                self.last_status = None;
            }
            EventKind::EndOfTrack => {
                self.body.extend_from_slice(&[0xFF, 0x2F, 0x00]);
                self.last_status = None;
            }
            _ => {
                let status = event.status | event.channel.unwrap_or(0);
                if !(self.running_status && self.last_status == Some(status)) {
                    self.body.push(status);
                }
                self.body.extend_from_slice(event.data());
                self.last_status = Some(status);
            }
        }
        self
    }

    pub fn events(&mut self, events: &[MidiEvent]) -> &mut Self {
        for event in events {
            self.event(event);
        }
        self
    }

    /// Raw bytes appended to the track body as they are
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        file_with(0, 1, self.ticks_per_quarter, &[self.body.as_slice()])
    }
}

/// Header plus one `MTrk` chunk per body
pub fn file_with(format: u16, tracks: u16, division: u16, bodies: &[&[u8]]) -> Vec<u8> {
    let mut bytes = b"MThd".to_vec();
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&format.to_be_bytes());
    bytes.extend_from_slice(&tracks.to_be_bytes());
    bytes.extend_from_slice(&division.to_be_bytes());
    for body in bodies {
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
    }
    bytes
}

pub fn write_var_len(out: &mut Vec<u8>, value: u32) {
    let mut groups = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        groups.push((rest & 0x7F) as u8 | 0x80);
        rest >>= 7;
    }
    out.extend(groups.iter().rev());
}

/// PC ch0 -> 5 at tick 0, NoteOn 60/100 at 480, NoteOff at 960, EOT (480 tpq)
pub fn two_note_song() -> Vec<u8> {
    SmfWriter::new(480)
        .events(&[
            MidiEvent::program_change(0, 5),
            MidiEvent::note_on(0, 60, 100).with_delta(480),
            MidiEvent::note_off(0, 60, 0).with_delta(480),
            MidiEvent::end_of_track(),
        ])
        .finish()
}
