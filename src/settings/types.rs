// Channel settings - per-channel instrument, volume and effect sends

use crate::midi::event::{CC_CHORUS, CC_REVERB, CC_VOLUME, MidiEvent};
use serde::{Deserialize, Serialize};

pub const CHANNEL_COUNT: usize = 16;
pub const DEFAULT_VOLUME: u8 = 100;

/// Settings of one MIDI channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSetting {
    pub channel: u8,
    pub program: u8,
    pub volume: u8,
    pub mute: bool,
    /// Reverb send level (CC 91)
    pub reverb: u8,
    /// Chorus send level (CC 93)
    pub chorus: u8,
    /// When set, every program change routed to this channel is replaced
    /// with this program
    pub program_override: Option<u8>,
}

impl ChannelSetting {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            program: 0,
            volume: DEFAULT_VOLUME,
            mute: false,
            reverb: 0,
            chorus: 0,
            program_override: None,
        }
    }

    /// Program actually sent to the synth
    pub fn effective_program(&self) -> u8 {
        self.program_override.unwrap_or(self.program)
    }

    /// Messages that bring the synthesizer in line with this setting
    pub fn restore_events(&self) -> [MidiEvent; 4] {
        [
            MidiEvent::program_change(self.channel, self.effective_program()),
            MidiEvent::control_change(self.channel, CC_VOLUME, self.volume),
            MidiEvent::control_change(self.channel, CC_REVERB, self.reverb),
            MidiEvent::control_change(self.channel, CC_CHORUS, self.chorus),
        ]
    }

    /// First out-of-range field, if any
    pub(crate) fn invalid_field(&self) -> Option<&'static str> {
        if self.channel as usize >= CHANNEL_COUNT {
            Some("channel")
        } else if self.program > 127 {
            Some("program")
        } else if self.volume > 127 {
            Some("volume")
        } else if self.reverb > 127 {
            Some("reverb")
        } else if self.chorus > 127 {
            Some("chorus")
        } else if self.program_override.is_some_and(|p| p > 127) {
            Some("program_override")
        } else {
            None
        }
    }
}

impl Default for ChannelSetting {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Default settings for all 16 channels
pub fn default_channels() -> [ChannelSetting; CHANNEL_COUNT] {
    std::array::from_fn(|channel| ChannelSetting::new(channel as u8))
}

/// A single user edit of one channel field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelUpdate {
    Program(u8),
    Volume(u8),
    Mute(bool),
    Reverb(u8),
    Chorus(u8),
    ProgramOverride(Option<u8>),
}

impl ChannelUpdate {
    /// Write the update into `setting`, values clamped to 0-127
    pub fn apply_to(&self, setting: &mut ChannelSetting) {
        match *self {
            ChannelUpdate::Program(p) => setting.program = p.min(127),
            ChannelUpdate::Volume(v) => setting.volume = v.min(127),
            ChannelUpdate::Mute(m) => setting.mute = m,
            ChannelUpdate::Reverb(v) => setting.reverb = v.min(127),
            ChannelUpdate::Chorus(v) => setting.chorus = v.min(127),
            ChannelUpdate::ProgramOverride(p) => setting.program_override = p.map(|p| p.min(127)),
        }
    }

    /// MIDI message telling the synth about an update already applied to
    /// `setting`; `None` when the synth has nothing to hear
    pub fn to_event(&self, setting: &ChannelSetting) -> Option<MidiEvent> {
        let channel = setting.channel;
        match self {
            ChannelUpdate::Program(_) | ChannelUpdate::ProgramOverride(_) => Some(
                MidiEvent::program_change(channel, setting.effective_program()),
            ),
            ChannelUpdate::Volume(_) => Some(MidiEvent::control_change(
                channel,
                CC_VOLUME,
                setting.volume,
            )),
            ChannelUpdate::Reverb(_) => Some(MidiEvent::control_change(
                channel,
                CC_REVERB,
                setting.reverb,
            )),
            ChannelUpdate::Chorus(_) => Some(MidiEvent::control_change(
                channel,
                CC_CHORUS,
                setting.chorus,
            )),
            // Muting silences what is already sounding
            ChannelUpdate::Mute(true) => Some(MidiEvent::all_notes_off(channel)),
            ChannelUpdate::Mute(false) => None,
        }
    }
}
