// MIDI event types - shared by the SMF decoder, live input and the sequencer

/// Meta event type for a tempo change (3 data bytes, µs per quarter note)
pub const META_TEMPO: u8 = 0x51;
/// Meta event type for end of track
pub const META_END_OF_TRACK: u8 = 0x2F;
/// Status byte introducing a meta event in an SMF track
pub const STATUS_META: u8 = 0xFF;

/// Controller numbers the core cares about
pub const CC_VOLUME: u8 = 7;
pub const CC_REVERB: u8 = 91;
pub const CC_CHORUS: u8 = 93;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Universal real-time SysEx setting the master volume of every device
/// (`F0 7F 7F 04 01 lsb msb F7`); `volume` 0-127 goes in the MSB
pub fn master_volume_sysex(volume: u8) -> [u8; 8] {
    [0xF0, 0x7F, 0x7F, 0x04, 0x01, 0x00, volume.min(127), 0xF7]
}

/// Kind of a decoded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ProgramChange,
    ControlChange,
    Tempo,
    EndOfTrack,
    /// Anything else: aftertouch, pitch bend, channel pressure, SysEx,
    /// meta events other than tempo/end-of-track
    Other,
}

/// A single MIDI event
///
/// `delta_ticks` is the time since the previous event of the same source.
/// Channel messages carry `channel` (0-15) and up to two data bytes, every
/// data byte is masked to 0-127 on construction. Meta events have no channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    pub delta_ticks: u32,
    pub kind: EventKind,
    /// Raw status byte: `0x80..=0xEF` for channel messages (channel nibble
    /// cleared), `0xF0`/`0xF7` for SysEx, `0xFF` for meta events
    pub status: u8,
    pub channel: Option<u8>,
    data: [u8; 3],
    len: u8,
}

/// Number of data bytes following a channel status byte
pub fn channel_data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

impl MidiEvent {
    /// Build a channel voice message from a status byte and its data bytes
    ///
    /// The status nibble decides the kind, the low nibble the channel.
    pub fn channel_message(status: u8, data1: u8, data2: u8) -> Self {
        let message_type = status & 0xF0;
        let kind = match message_type {
            0x80 => EventKind::NoteOff,
            0x90 => EventKind::NoteOn,
            0xB0 => EventKind::ControlChange,
            0xC0 => EventKind::ProgramChange,
            _ => EventKind::Other,
        };
        let len = channel_data_len(status) as u8;
        Self {
            delta_ticks: 0,
            kind,
            status: message_type,
            channel: Some(status & 0x0F),
            data: [data1 & 0x7F, if len == 2 { data2 & 0x7F } else { 0 }, 0],
            len,
        }
    }

    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::channel_message(0x90 | (channel & 0x0F), pitch, velocity)
    }

    pub fn note_off(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::channel_message(0x80 | (channel & 0x0F), pitch, velocity)
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::channel_message(0xC0 | (channel & 0x0F), program, 0)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::channel_message(0xB0 | (channel & 0x0F), controller, value)
    }

    /// CC 123 for one channel
    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(channel, CC_ALL_NOTES_OFF, 0)
    }

    /// Tempo meta event (microseconds per quarter note, 24-bit)
    pub fn tempo(micros_per_quarter: u32) -> Self {
        let [_, a, b, c] = micros_per_quarter.min(0x00FF_FFFF).to_be_bytes();
        Self {
            delta_ticks: 0,
            kind: EventKind::Tempo,
            status: STATUS_META,
            channel: None,
            data: [a, b, c],
            len: 3,
        }
    }

    pub fn end_of_track() -> Self {
        Self {
            delta_ticks: 0,
            kind: EventKind::EndOfTrack,
            status: STATUS_META,
            channel: None,
            data: [0; 3],
            len: 0,
        }
    }

    /// A meta event the core does not interpret; only its type byte is kept
    pub fn other_meta(meta_type: u8) -> Self {
        Self {
            delta_ticks: 0,
            kind: EventKind::Other,
            status: STATUS_META,
            channel: None,
            data: [meta_type, 0, 0],
            len: 1,
        }
    }

    /// A SysEx event (`0xF0` or `0xF7`); the payload is not retained
    pub fn sysex(status: u8) -> Self {
        Self {
            delta_ticks: 0,
            kind: EventKind::Other,
            status,
            channel: None,
            data: [0; 3],
            len: 0,
        }
    }

    pub fn with_delta(mut self, delta_ticks: u32) -> Self {
        self.delta_ticks = delta_ticks;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn data1(&self) -> u8 {
        self.data[0]
    }

    pub fn data2(&self) -> u8 {
        self.data[1]
    }

    pub fn is_meta(&self) -> bool {
        self.status == STATUS_META
    }

    /// Sounding note-on (velocity > 0)
    pub fn is_note_on(&self) -> bool {
        self.kind == EventKind::NoteOn && self.data[1] > 0
    }

    /// Explicit note-off, or note-on with velocity 0
    pub fn is_note_off(&self) -> bool {
        self.kind == EventKind::NoteOff || (self.kind == EventKind::NoteOn && self.data[1] == 0)
    }

    /// Pitch of a note event
    pub fn pitch(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOn | EventKind::NoteOff => Some(self.data[0]),
            _ => None,
        }
    }

    /// Tempo carried by a tempo meta event
    pub fn tempo_micros(&self) -> Option<u32> {
        if self.kind == EventKind::Tempo {
            Some(u32::from_be_bytes([0, self.data[0], self.data[1], self.data[2]]))
        } else {
            None
        }
    }

    /// Replace the pitch of a note event, keeping everything else
    pub fn with_pitch(mut self, pitch: u8) -> Self {
        if self.pitch().is_some() {
            self.data[0] = pitch & 0x7F;
        }
        self
    }

    /// Replace the second data byte (velocity, controller value)
    pub fn with_data2(mut self, value: u8) -> Self {
        if self.len == 2 {
            self.data[1] = value & 0x7F;
        }
        self
    }

    /// Replace the first data byte (pitch, controller number, program)
    pub fn with_data1(mut self, value: u8) -> Self {
        if self.len >= 1 && self.channel.is_some() {
            self.data[0] = value & 0x7F;
        }
        self
    }

    /// Wire representation for MIDI OUT, `None` for meta and SysEx events
    pub fn to_wire(&self) -> Option<WireMessage> {
        let channel = self.channel?;
        let mut bytes = [0u8; 3];
        bytes[0] = self.status | channel;
        bytes[1..1 + self.len as usize].copy_from_slice(self.data());
        Some(WireMessage {
            bytes,
            len: 1 + self.len,
        })
    }

    /// Parse a complete raw MIDI message (as delivered by a MIDI port)
    ///
    /// Only channel voice messages are accepted. Unlike a note-off in a file,
    /// a live NoteOn with velocity 0 is kept as-is and treated as note-off by
    /// [`MidiEvent::is_note_off`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }
        let needed = channel_data_len(status);
        if bytes.len() < 1 + needed {
            return None;
        }
        if bytes[1..=needed].iter().any(|b| b & 0x80 != 0) {
            return None;
        }
        let data2 = if needed == 2 { bytes[2] } else { 0 };
        Some(Self::channel_message(status, bytes[1], data2))
    }
}

/// Raw bytes of one outbound channel message (status + 0-2 data bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireMessage {
    bytes: [u8; 3],
    len: u8,
}

impl WireMessage {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}
