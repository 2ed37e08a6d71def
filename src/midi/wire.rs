// Wire protocol - parses a raw MIDI IN byte stream into events
// Handles running status the same way the SMF decoder does for tracks.

use crate::midi::event::{MidiEvent, channel_data_len};

/// Incremental parser for a serial MIDI byte stream
///
/// Bytes may arrive split across reads. Real-time bytes (`0xF8..=0xFF`) can
/// appear anywhere, even between the data bytes of a message, and are
/// ignored. SysEx payloads are skipped until `0xF7` or the next status byte.
#[derive(Debug, Default)]
pub struct WireParser {
    running_status: Option<u8>,
    pending: [u8; 2],
    pending_len: usize,
    in_sysex: bool,
}

impl WireParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns an event once a message is complete
    pub fn push(&mut self, byte: u8) -> Option<MidiEvent> {
        if byte >= 0xF8 {
            return None;
        }

        if byte & 0x80 != 0 {
            self.pending_len = 0;
            match byte {
                0xF0 => {
                    self.in_sysex = true;
                    self.running_status = None;
                }
                0xF7 => {
                    self.in_sysex = false;
                }
                0xF1..=0xF6 => {
                    // System common cancels running status; payload is not routed
                    self.in_sysex = false;
                    self.running_status = None;
                }
                _ => {
                    self.in_sysex = false;
                    self.running_status = Some(byte);
                }
            }
            return None;
        }

        if self.in_sysex {
            return None;
        }

        let status = self.running_status?;
        self.pending[self.pending_len] = byte;
        self.pending_len += 1;

        let needed = channel_data_len(status);
        if self.pending_len < needed {
            return None;
        }
        self.pending_len = 0;
        let data2 = if needed == 2 { self.pending[1] } else { 0 };
        Some(MidiEvent::channel_message(status, self.pending[0], data2))
    }

    /// Feed a slice of bytes, handing every completed event to `emit`
    pub fn feed(&mut self, bytes: &[u8], mut emit: impl FnMut(MidiEvent)) {
        for &byte in bytes {
            if let Some(event) = self.push(byte) {
                emit(event);
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Append the wire bytes of every channel event to `out`
///
/// Meta and SysEx events are skipped. Running status is not used on output so
/// each message is self-contained on the UART.
pub fn encode_events<'a>(events: impl IntoIterator<Item = &'a MidiEvent>, out: &mut Vec<u8>) {
    for event in events {
        if let Some(wire) = event.to_wire() {
            out.extend_from_slice(wire.as_slice());
        }
    }
}
