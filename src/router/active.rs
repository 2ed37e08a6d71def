// Hanging-note tracker - which notes have been sent on without an off

use crate::midi::event::MidiEvent;
use crate::settings::types::CHANNEL_COUNT;

/// One 128-bit pitch set per channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNotes {
    notes: [u128; CHANNEL_COUNT],
}

impl ActiveNotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from an outbound event
    pub fn track(&mut self, event: &MidiEvent) {
        let (Some(channel), Some(pitch)) = (event.channel, event.pitch()) else {
            return;
        };
        let bit = 1u128 << (pitch & 0x7F);
        let slot = &mut self.notes[(channel & 0x0F) as usize];
        if event.is_note_on() {
            *slot |= bit;
        } else if event.is_note_off() {
            *slot &= !bit;
        }
    }

    pub fn is_sounding(&self, channel: u8, pitch: u8) -> bool {
        self.notes[(channel & 0x0F) as usize] & (1u128 << (pitch & 0x7F)) != 0
    }

    /// Bit `n` set when channel `n` has at least one sounding note
    pub fn channel_mask(&self) -> u16 {
        self.notes
            .iter()
            .enumerate()
            .filter(|(_, notes)| **notes != 0)
            .fold(0u16, |mask, (channel, _)| mask | (1 << channel))
    }

    pub fn clear_channels(&mut self, mask: u16) {
        for (channel, notes) in self.notes.iter_mut().enumerate() {
            if mask & (1 << channel) != 0 {
                *notes = 0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.notes = [0; CHANNEL_COUNT];
    }

    pub fn is_empty(&self) -> bool {
        self.notes.iter().all(|n| *n == 0)
    }
}

/// CC 123 for every channel in `mask`
pub fn all_notes_off_for(mask: u16) -> Vec<MidiEvent> {
    (0..CHANNEL_COUNT as u8)
        .filter(|channel| mask & (1 << channel) != 0)
        .map(MidiEvent::all_notes_off)
        .collect()
}
