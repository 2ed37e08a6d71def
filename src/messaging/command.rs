// Control-surface commands - UI -> scheduler thread

use crate::sequencer::PatternId;
use crate::settings::ChannelUpdate;
use std::path::PathBuf;

/// Everything a front end (encoder, keyboard, CLI) may ask of the core
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open(PathBuf),
    Play,
    Pause,
    Stop,
    /// Seek the file player to an absolute tick
    Seek(u64),
    SetChannel { channel: u8, update: ChannelUpdate },
    /// Save channel settings: `None` to the station's own record, `Some(n)`
    /// to numbered record `n`
    SaveSettings(Option<u16>),
    /// Switch to numbered settings record `n`
    LoadSettings(u16),
    SavePatterns(Option<u16>),
    /// Replace the pattern bank with numbered record `n` (sequencer stopped)
    LoadPatterns(u16),
    SequencerRecord,
    SequencerPlay,
    SequencerStop,
    PatternSelect(PatternId),
    SetTranspose(i8),
    SetVelocityOffset(i8),
    SetSpeed(u16),
    SetMasterVolume(u8),
    Quit,
}
